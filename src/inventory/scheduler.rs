use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::{Rebalancer, Trigger};
use crate::history::RunHistory;

/// Periodic background task driving the rebalancer.
pub struct RebalanceScheduler {
    rebalancer: Arc<Rebalancer>,
    history: Arc<RwLock<RunHistory>>,
    period: Duration,
    shutdown: Arc<Notify>,
}

impl RebalanceScheduler {
    pub fn new(
        rebalancer: Arc<Rebalancer>,
        history: Arc<RwLock<RunHistory>>,
        period: Duration,
    ) -> Self {
        Self {
            rebalancer,
            history,
            period,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notifying this handle stops the task after the current tick.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_secs = self.period.as_secs(), "Rebalance scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick().await,
                    _ = self.shutdown.notified() => {
                        info!("Rebalance scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn tick(&self) {
        let started_at = Utc::now();
        match self.rebalancer.try_rebalance(Trigger::Scheduled).await {
            None => debug!("Previous rebalance still running, skipping tick"),
            Some(Ok(report)) => {
                for line in report.descriptions() {
                    debug!(run_id = %report.run_id, "{}", line);
                }
                self.history.write().await.record_report(&report);
            }
            Some(Err(err)) => {
                error!(error = %err, "Scheduled rebalance failed");
                self.history
                    .write()
                    .await
                    .record_failure(Trigger::Scheduled, started_at, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::memory::InMemoryStore;
    use crate::inventory::{ReplenishmentFiler, RetryPolicy};

    fn scheduler(store: &Arc<InMemoryStore>, history: &Arc<RwLock<RunHistory>>) -> RebalanceScheduler {
        let filer = ReplenishmentFiler::new(store.clone(), chrono::Duration::hours(24), RetryPolicy::default());
        let rebalancer = Arc::new(Rebalancer::new(store.clone(), filer, RetryPolicy::default()));
        RebalanceScheduler::new(rebalancer, history.clone(), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn each_tick_is_recorded_until_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Heparin");
        let icu = store.add_service("ICU");
        store.set_level(med, icu, 0, 3);
        let history = Arc::new(RwLock::new(RunHistory::default()));

        let scheduler = scheduler(&store, &history);
        let shutdown = scheduler.shutdown_handle();
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_millis(90)).await;
        shutdown.notify_one();
        handle.await.unwrap();

        assert!(history.read().await.len() >= 2);
        assert_eq!(store.requisitions().len(), 1);
    }

    #[tokio::test]
    async fn failed_runs_are_recorded_with_their_error() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_scan();
        let history = Arc::new(RwLock::new(RunHistory::default()));

        let scheduler = scheduler(&store, &history);
        let shutdown = scheduler.shutdown_handle();
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.notify_one();
        handle.await.unwrap();

        let history = history.read().await;
        assert!(history.len() >= 1);
        assert!(history.latest().unwrap().error.is_some());
    }
}
