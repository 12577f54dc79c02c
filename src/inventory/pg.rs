use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{InventoryStore, RequisitionStore};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{Requisition, StockLevel, StockTransfer};

/// Postgres-backed stores, delegating to the `db` query functions.
#[derive(Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
    delivery_lead: chrono::Duration,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool, delivery_lead: chrono::Duration) -> Self {
        Self {
            pool,
            delivery_lead,
        }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn stock_below_minimum(&self) -> AppResult<Vec<StockLevel>> {
        db::stock::fetch_below_minimum(&self.pool).await
    }

    async fn surplus_holders(
        &self,
        medication_id: Uuid,
        excluding_service_id: Uuid,
    ) -> AppResult<Vec<StockLevel>> {
        db::stock::fetch_surplus_holders(&self.pool, medication_id, excluding_service_id).await
    }

    async fn transfer(
        &self,
        medication_id: Uuid,
        from_service_id: Uuid,
        to_service_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<StockTransfer>> {
        db::stock::transfer(&self.pool, medication_id, from_service_id, to_service_id, quantity).await
    }

    async fn current_quantity(&self, medication_id: Uuid, service_id: Uuid) -> AppResult<i32> {
        db::stock::fetch_current_quantity(&self.pool, medication_id, service_id).await
    }
}

#[async_trait]
impl RequisitionStore for PgInventoryStore {
    async fn has_pending_requisition(
        &self,
        medication_id: Uuid,
        window: chrono::Duration,
    ) -> AppResult<bool> {
        let mut conn = self.pool.acquire().await?;
        db::requisitions::pending_exists(&mut *conn, medication_id, Utc::now() - window).await
    }

    async fn create_requisition(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
    ) -> AppResult<Requisition> {
        let mut tx = self.pool.begin().await?;
        let requisition = db::requisitions::insert_automatic(
            &mut *tx,
            medication_id,
            service_id,
            quantity,
            Utc::now() + self.delivery_lead,
        )
        .await?;
        tx.commit().await?;
        Ok(requisition)
    }

    async fn file_if_absent(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
        window: chrono::Duration,
    ) -> AppResult<Requisition> {
        let mut tx = self.pool.begin().await?;

        db::requisitions::lock_medication_filing(&mut *tx, medication_id).await?;
        if db::requisitions::pending_exists(&mut *tx, medication_id, Utc::now() - window).await? {
            // Dropping the transaction rolls back and releases the lock.
            return Err(AppError::DuplicateRequisition(format!(
                "medication {} already has an open requisition",
                medication_id
            )));
        }

        let requisition = db::requisitions::insert_automatic(
            &mut *tx,
            medication_id,
            service_id,
            quantity,
            Utc::now() + self.delivery_lead,
        )
        .await?;
        tx.commit().await?;
        Ok(requisition)
    }
}
