use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FilingOutcome, InventoryStore, ReplenishmentFiler, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::models::StockLevel;

/// What started a rebalance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        })
    }
}

/// One step taken while settling a deficit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RebalanceAction {
    Shortage {
        medication_id: Uuid,
        medication_name: String,
        service_id: Uuid,
        service_name: String,
        available: i32,
        minimum: i32,
    },
    Transferred {
        medication_id: Uuid,
        medication_name: String,
        from_service_id: Uuid,
        from_service_name: String,
        to_service_id: Uuid,
        to_service_name: String,
        quantity: i32,
    },
    RequisitionFiled {
        requisition_id: Uuid,
        medication_id: Uuid,
        medication_name: String,
        service_id: Uuid,
        service_name: String,
        quantity: i32,
    },
    AlreadyPending {
        medication_id: Uuid,
        medication_name: String,
        service_id: Uuid,
        service_name: String,
        shortfall: i32,
    },
    Failed {
        medication_id: Uuid,
        medication_name: String,
        service_id: Uuid,
        service_name: String,
        error: String,
    },
}

impl RebalanceAction {
    pub fn description(&self) -> String {
        match self {
            Self::Shortage {
                medication_name,
                service_name,
                ..
            } => format!(
                "Need to restock: {}, Service: {}",
                medication_name, service_name
            ),
            Self::Transferred {
                medication_name,
                from_service_name,
                to_service_name,
                quantity,
                ..
            } => format!(
                "Transferred {} units of {} from {} to {}",
                quantity, medication_name, from_service_name, to_service_name
            ),
            Self::RequisitionFiled {
                medication_name,
                service_name,
                ..
            } => format!(
                "Request created for {}, Service: {}",
                medication_name, service_name
            ),
            Self::AlreadyPending {
                medication_name,
                service_name,
                ..
            } => format!(
                "Request already exists for {}, Service: {}",
                medication_name, service_name
            ),
            Self::Failed {
                medication_name,
                service_name,
                error,
                ..
            } => format!(
                "Failed to rebalance {}, Service: {}: {}",
                medication_name, service_name, error
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub deficits_found: usize,
    pub units_transferred: i64,
    pub requisitions_filed: usize,
    pub already_pending: usize,
    pub failures: usize,
    pub actions: Vec<RebalanceAction>,
}

impl RebalanceReport {
    fn new(trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            started_at: now,
            finished_at: now,
            deficits_found: 0,
            units_transferred: 0,
            requisitions_filed: 0,
            already_pending: 0,
            failures: 0,
            actions: Vec::new(),
        }
    }

    fn push(&mut self, action: RebalanceAction) {
        match &action {
            RebalanceAction::Shortage { .. } => self.deficits_found += 1,
            RebalanceAction::Transferred { quantity, .. } => {
                self.units_transferred += i64::from(*quantity)
            }
            RebalanceAction::RequisitionFiled { .. } => self.requisitions_filed += 1,
            RebalanceAction::AlreadyPending { .. } => self.already_pending += 1,
            RebalanceAction::Failed { .. } => self.failures += 1,
        }
        self.actions.push(action);
    }

    /// Human-readable action list, in the order the actions happened.
    pub fn descriptions(&self) -> Vec<String> {
        self.actions.iter().map(RebalanceAction::description).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Moves surplus stock between services and files requisitions for the rest.
pub struct Rebalancer {
    inventory: Arc<dyn InventoryStore>,
    filer: ReplenishmentFiler,
    retry: RetryPolicy,
    running: Mutex<()>,
}

impl Rebalancer {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        filer: ReplenishmentFiler,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inventory,
            filer,
            retry,
            running: Mutex::new(()),
        }
    }

    /// Runs a full pass, waiting for any run already in progress.
    pub async fn rebalance(&self, trigger: Trigger) -> AppResult<RebalanceReport> {
        let _gate = self.running.lock().await;
        self.run(trigger).await
    }

    /// Runs a full pass unless one is already in progress.
    pub async fn try_rebalance(&self, trigger: Trigger) -> Option<AppResult<RebalanceReport>> {
        let _gate = self.running.try_lock().ok()?;
        Some(self.run(trigger).await)
    }

    async fn run(&self, trigger: Trigger) -> AppResult<RebalanceReport> {
        let mut report = RebalanceReport::new(trigger);

        let deficits = self
            .retry
            .run("stock_below_minimum", || self.inventory.stock_below_minimum())
            .await?;
        debug!(run_id = %report.run_id, deficits = deficits.len(), "Scanned stock levels");

        for level in &deficits {
            if let Err(err) = self.settle(level, &mut report).await {
                warn!(
                    medication_id = %level.medication_id,
                    service_id = %level.service_id,
                    error = %err,
                    "Could not settle deficit"
                );
                report.push(failed(level, err.to_string()));
            }
        }

        report.finished_at = Utc::now();
        info!(
            run_id = %report.run_id,
            %trigger,
            deficits = report.deficits_found,
            units_transferred = report.units_transferred,
            requisitions_filed = report.requisitions_filed,
            already_pending = report.already_pending,
            failures = report.failures,
            "Rebalance finished"
        );
        Ok(report)
    }

    async fn settle(&self, level: &StockLevel, report: &mut RebalanceReport) -> AppResult<()> {
        let (medication_id, service_id) = (level.medication_id, level.service_id);

        // The scan may be stale by the time this row comes up.
        let mut target = level.clone();
        target.available_quantity = self.current_quantity(medication_id, service_id).await?;
        if !target.is_below_minimum() {
            return Ok(());
        }

        report.push(RebalanceAction::Shortage {
            medication_id,
            medication_name: target.medication_name.clone(),
            service_id,
            service_name: target.service_name.clone(),
            available: target.available_quantity,
            minimum: target.minimum_quantity,
        });

        let holders = self
            .retry
            .run("surplus_holders", || {
                self.inventory.surplus_holders(medication_id, service_id)
            })
            .await?;

        for holder in &holders {
            let needed = target.deficit();
            if needed == 0 {
                break;
            }
            let quantity = holder.surplus().min(needed);
            if quantity == 0 {
                continue;
            }

            // A commit that fails with an I/O error may still have landed,
            // so only retry when Postgres reports a rollback.
            let moved = self
                .retry
                .run_when("transfer", AppError::is_rolled_back, || {
                    self.inventory
                        .transfer(medication_id, holder.service_id, service_id, quantity)
                })
                .await;

            match moved {
                Ok(Some(transfer)) => {
                    target.available_quantity += transfer.quantity;
                    report.push(RebalanceAction::Transferred {
                        medication_id,
                        medication_name: target.medication_name.clone(),
                        from_service_id: holder.service_id,
                        from_service_name: holder.service_name.clone(),
                        to_service_id: service_id,
                        to_service_name: target.service_name.clone(),
                        quantity: transfer.quantity,
                    });
                }
                Ok(None) => {
                    debug!(
                        medication_id = %medication_id,
                        service_id = %service_id,
                        "Target reached its minimum elsewhere"
                    );
                    break;
                }
                Err(err) => {
                    warn!(
                        medication_id = %medication_id,
                        from = %holder.service_id,
                        to = %service_id,
                        quantity,
                        error = %err,
                        "Transfer failed, trying next holder"
                    );
                    report.push(failed(level, format!("transfer from {}: {}", holder.service_name, err)));
                }
            }
        }

        target.available_quantity = self.current_quantity(medication_id, service_id).await?;
        let shortfall = target.deficit();
        if shortfall == 0 {
            return Ok(());
        }

        match self
            .filer
            .file_shortfall(medication_id, service_id, shortfall)
            .await?
        {
            FilingOutcome::Filed {
                requisition_id,
                quantity,
            } => report.push(RebalanceAction::RequisitionFiled {
                requisition_id,
                medication_id,
                medication_name: level.medication_name.clone(),
                service_id,
                service_name: level.service_name.clone(),
                quantity,
            }),
            FilingOutcome::AlreadyPending => report.push(RebalanceAction::AlreadyPending {
                medication_id,
                medication_name: level.medication_name.clone(),
                service_id,
                service_name: level.service_name.clone(),
                shortfall,
            }),
        }
        Ok(())
    }

    async fn current_quantity(&self, medication_id: Uuid, service_id: Uuid) -> AppResult<i32> {
        self.retry
            .run("current_quantity", || {
                self.inventory.current_quantity(medication_id, service_id)
            })
            .await
    }
}

fn failed(level: &StockLevel, error: String) -> RebalanceAction {
    RebalanceAction::Failed {
        medication_id: level.medication_id,
        medication_name: level.medication_name.clone(),
        service_id: level.service_id,
        service_name: level.service_name.clone(),
        error,
    }
}
