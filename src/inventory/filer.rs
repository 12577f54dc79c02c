use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::{RequisitionStore, RetryPolicy};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FilingOutcome {
    Filed { requisition_id: Uuid, quantity: i32 },
    AlreadyPending,
}

/// Files a requisition for whatever deficit rebalancing could not cover.
pub struct ReplenishmentFiler {
    requisitions: Arc<dyn RequisitionStore>,
    window: chrono::Duration,
    retry: RetryPolicy,
}

impl ReplenishmentFiler {
    pub fn new(
        requisitions: Arc<dyn RequisitionStore>,
        window: chrono::Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            requisitions,
            window,
            retry,
        }
    }

    /// Creates a pending requisition for `remaining_deficit` units unless an
    /// open one for the medication was filed within the window.
    pub async fn file_shortfall(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        remaining_deficit: i32,
    ) -> AppResult<FilingOutcome> {
        if remaining_deficit <= 0 {
            return Err(AppError::BadRequest(format!(
                "shortfall must be positive, got {}",
                remaining_deficit
            )));
        }

        let filed = self
            .retry
            .run("file_shortfall", || {
                self.requisitions.file_if_absent(
                    medication_id,
                    service_id,
                    remaining_deficit,
                    self.window,
                )
            })
            .await;

        match filed {
            Ok(requisition) => {
                info!(
                    requisition_id = %requisition.id,
                    medication_id = %medication_id,
                    service_id = %service_id,
                    quantity = remaining_deficit,
                    "Filed replenishment requisition"
                );
                Ok(FilingOutcome::Filed {
                    requisition_id: requisition.id,
                    quantity: remaining_deficit,
                })
            }
            Err(AppError::DuplicateRequisition(reason)) => {
                debug!(medication_id = %medication_id, %reason, "Replenishment already pending");
                Ok(FilingOutcome::AlreadyPending)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::inventory::memory::InMemoryStore;

    fn filer(store: &Arc<InMemoryStore>) -> ReplenishmentFiler {
        ReplenishmentFiler::new(store.clone(), Duration::hours(24), RetryPolicy::default())
    }

    #[tokio::test]
    async fn second_filing_in_window_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Heparin");
        let ward = store.add_service("Cardiology");
        let filer = filer(&store);

        let first = filer.file_shortfall(med, ward, 6).await.unwrap();
        let second = filer.file_shortfall(med, ward, 6).await.unwrap();

        assert!(matches!(first, FilingOutcome::Filed { quantity: 6, .. }));
        assert_eq!(second, FilingOutcome::AlreadyPending);
        assert_eq!(store.requisitions().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_filings_create_a_single_requisition() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Insulin");
        let ward = store.add_service("Endocrinology");
        let filer = Arc::new(filer(&store));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let filer = filer.clone();
            tasks.spawn(async move { filer.file_shortfall(med, ward, 3).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(store.requisitions().len(), 1);
    }

    #[tokio::test]
    async fn requisition_filed_an_hour_ago_blocks_a_new_one() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Morphine");
        let ward = store.add_service("Oncology");
        store.insert_requisition_at(med, ward, 4, Utc::now() - Duration::hours(1), false);

        let outcome = filer(&store).file_shortfall(med, ward, 4).await.unwrap();

        assert_eq!(outcome, FilingOutcome::AlreadyPending);
        assert_eq!(store.requisitions().len(), 1);
    }

    #[tokio::test]
    async fn requisitions_outside_the_window_do_not_block() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Morphine");
        let ward = store.add_service("Oncology");
        store.insert_requisition_at(med, ward, 4, Utc::now() - Duration::hours(25), false);

        let outcome = filer(&store).file_shortfall(med, ward, 4).await.unwrap();

        assert!(matches!(outcome, FilingOutcome::Filed { .. }));
        assert_eq!(store.requisitions().len(), 2);
    }

    #[tokio::test]
    async fn completed_requisitions_do_not_block() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Saline 0.9%");
        let ward = store.add_service("Emergency");
        store.insert_requisition_at(med, ward, 10, Utc::now() - Duration::minutes(5), true);

        let outcome = filer(&store).file_shortfall(med, ward, 10).await.unwrap();

        assert!(matches!(outcome, FilingOutcome::Filed { .. }));
    }

    #[tokio::test]
    async fn other_medications_do_not_block() {
        let store = Arc::new(InMemoryStore::new());
        let heparin = store.add_medication("Heparin");
        let insulin = store.add_medication("Insulin");
        let ward = store.add_service("ICU");
        store.insert_requisition_at(heparin, ward, 2, Utc::now(), false);

        let outcome = filer(&store).file_shortfall(insulin, ward, 2).await.unwrap();

        assert!(matches!(outcome, FilingOutcome::Filed { .. }));
    }

    #[tokio::test]
    async fn non_positive_shortfall_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let med = store.add_medication("Heparin");
        let ward = store.add_service("ICU");

        let result = filer(&store).file_shortfall(med, ward, 0).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(store.requisitions().is_empty());
    }
}
