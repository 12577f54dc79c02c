use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Requisition, StockLevel, StockTransfer};

/// Stock operations the rebalancer needs from the inventory store.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Every (medication, service) pair whose available quantity is under its minimum.
    async fn stock_below_minimum(&self) -> AppResult<Vec<StockLevel>>;

    /// Services other than `excluding_service_id` holding more than their own
    /// minimum of the medication, ordered by available quantity descending.
    async fn surplus_holders(
        &self,
        medication_id: Uuid,
        excluding_service_id: Uuid,
    ) -> AppResult<Vec<StockLevel>>;

    /// Atomically debits `from` and credits `to` with at most `quantity`
    /// units, capped at what `to` still lacks of its minimum. Returns `None`
    /// when `to` is already satisfied. Fails with `InsufficientStock` if
    /// `from` would drop below its minimum.
    async fn transfer(
        &self,
        medication_id: Uuid,
        from_service_id: Uuid,
        to_service_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<StockTransfer>>;

    async fn current_quantity(&self, medication_id: Uuid, service_id: Uuid) -> AppResult<i32>;
}

#[async_trait]
pub trait RequisitionStore: Send + Sync {
    /// A not-yet-complete requisition for the medication created within `window`.
    async fn has_pending_requisition(
        &self,
        medication_id: Uuid,
        window: chrono::Duration,
    ) -> AppResult<bool>;

    /// Files a pending automatic requisition with one line for `quantity` units.
    async fn create_requisition(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
    ) -> AppResult<Requisition>;

    /// Check-then-insert. Returns `DuplicateRequisition` when one is pending.
    ///
    /// The default composes the two calls above and is not atomic; stores
    /// that can lock should override it.
    async fn file_if_absent(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
        window: chrono::Duration,
    ) -> AppResult<Requisition> {
        if self.has_pending_requisition(medication_id, window).await? {
            return Err(AppError::DuplicateRequisition(format!(
                "medication {} already has an open requisition",
                medication_id
            )));
        }
        self.create_requisition(medication_id, service_id, quantity).await
    }
}
