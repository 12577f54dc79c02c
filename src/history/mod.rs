use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::inventory::{RebalanceReport, Trigger};

/// Summary of one rebalance run, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub deficits_found: usize,
    pub units_transferred: i64,
    pub requisitions_filed: usize,
    pub already_pending: usize,
    pub failures: usize,
    pub error: Option<String>,
}

/// Bounded in-memory log of recent runs, newest last.
#[derive(Debug)]
pub struct RunHistory {
    entries: VecDeque<RunSummary>,
    capacity: usize,
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, summary: RunSummary) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(summary);
    }

    pub fn record_report(&mut self, report: &RebalanceReport) {
        self.push(RunSummary {
            run_id: report.run_id,
            trigger: report.trigger,
            started_at: report.started_at,
            duration_ms: report.duration_ms(),
            deficits_found: report.deficits_found,
            units_transferred: report.units_transferred,
            requisitions_filed: report.requisitions_filed,
            already_pending: report.already_pending,
            failures: report.failures,
            error: None,
        });
    }

    pub fn record_failure(&mut self, trigger: Trigger, started_at: DateTime<Utc>, err: &AppError) {
        self.push(RunSummary {
            run_id: Uuid::new_v4(),
            trigger,
            started_at,
            duration_ms: (Utc::now() - started_at).num_milliseconds(),
            deficits_found: 0,
            units_transferred: 0,
            requisitions_filed: 0,
            already_pending: 0,
            failures: 0,
            error: Some(err.to_string()),
        });
    }

    pub fn latest(&self) -> Option<&RunSummary> {
        self.entries.back()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RunSummary> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Export all runs as a CSV string.
    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record([
            "run_id",
            "trigger",
            "started_at",
            "duration_ms",
            "deficits_found",
            "units_transferred",
            "requisitions_filed",
            "already_pending",
            "failures",
            "error",
        ])?;

        for e in &self.entries {
            wtr.write_record([
                e.run_id.to_string(),
                e.trigger.to_string(),
                e.started_at.to_rfc3339(),
                e.duration_ms.to_string(),
                e.deficits_found.to_string(),
                e.units_transferred.to_string(),
                e.requisitions_filed.to_string(),
                e.already_pending.to_string(),
                e.failures.to_string(),
                e.error.clone().unwrap_or_default(),
            ])?;
        }

        let data = wtr.into_inner()?;
        Ok(String::from_utf8(data)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::inventory::memory::InMemoryStore;
    use crate::inventory::{Rebalancer, ReplenishmentFiler, RetryPolicy};

    async fn report() -> RebalanceReport {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Heparin");
        let icu = store.add_service("ICU");
        let pharmacy = store.add_service("Pharmacy");
        store.set_level(med, icu, 1, 5);
        store.set_level(med, pharmacy, 20, 5);
        let filer = ReplenishmentFiler::new(store.clone(), chrono::Duration::hours(24), RetryPolicy::default());
        Rebalancer::new(store.clone(), filer, RetryPolicy::default())
            .rebalance(Trigger::Manual)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn oldest_runs_are_evicted_at_capacity() {
        let report = report().await;
        let mut history = RunHistory::new(2);
        for _ in 0..3 {
            history.record_report(&report);
        }
        history.record_failure(Trigger::Scheduled, Utc::now(), &AppError::Database(sqlx::Error::PoolTimedOut));

        assert_eq!(history.len(), 2);
        let latest = history.latest().unwrap();
        assert_eq!(latest.trigger, Trigger::Scheduled);
        assert!(latest.error.is_some());
    }

    #[tokio::test]
    async fn csv_has_a_header_and_one_row_per_run() {
        let report = report().await;
        let mut history = RunHistory::default();
        history.record_report(&report);

        let csv = history.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("run_id,trigger,started_at"));
        assert!(lines[1].contains(",manual,"));
        assert!(lines[1].contains(",4,"));
    }
}
