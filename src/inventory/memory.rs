//! In-memory store used by the rebalancer and filer tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{InventoryStore, RequisitionStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    Requisition, RequisitionOrigin, RequisitionState, StockLevel, StockTransfer,
};

#[derive(Debug, Clone)]
pub struct FiledRequisition {
    pub requisition: Requisition,
    pub medication_id: Uuid,
    pub quantity: i32,
}

#[derive(Default)]
struct State {
    names: HashMap<Uuid, String>,
    /// (medication, service) → (available, minimum)
    levels: BTreeMap<(Uuid, Uuid), (i32, i32)>,
    requisitions: Vec<FiledRequisition>,
    transfers: Vec<StockTransfer>,
    failing_sources: HashSet<Uuid>,
    /// Sources whose next transfer is applied but reported as a pool timeout.
    lost_acks: HashSet<Uuid>,
    scan_fails: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn named(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().names.insert(id, name.to_string());
        id
    }

    pub fn add_medication(&self, name: &str) -> Uuid {
        self.named(name)
    }

    pub fn add_service(&self, name: &str) -> Uuid {
        self.named(name)
    }

    pub fn set_level(&self, medication_id: Uuid, service_id: Uuid, available: i32, minimum: i32) {
        self.state
            .lock()
            .unwrap()
            .levels
            .insert((medication_id, service_id), (available, minimum));
    }

    pub fn available(&self, medication_id: Uuid, service_id: Uuid) -> i32 {
        self.state.lock().unwrap().levels[&(medication_id, service_id)].0
    }

    /// Units of the medication across every service.
    pub fn network_total(&self, medication_id: Uuid) -> i64 {
        self.state
            .lock()
            .unwrap()
            .levels
            .iter()
            .filter(|((med, _), _)| *med == medication_id)
            .map(|(_, (available, _))| *available as i64)
            .sum()
    }

    pub fn fail_transfers_from(&self, service_id: Uuid) {
        self.state.lock().unwrap().failing_sources.insert(service_id);
    }

    pub fn lose_next_ack_from(&self, service_id: Uuid) {
        self.state.lock().unwrap().lost_acks.insert(service_id);
    }

    pub fn fail_scan(&self) {
        self.state.lock().unwrap().scan_fails = true;
    }

    pub fn requisitions(&self) -> Vec<FiledRequisition> {
        self.state.lock().unwrap().requisitions.clone()
    }

    pub fn transfers(&self) -> Vec<StockTransfer> {
        self.state.lock().unwrap().transfers.clone()
    }

    pub fn insert_requisition_at(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
        created_at: DateTime<Utc>,
        completed: bool,
    ) {
        let mut state = self.state.lock().unwrap();
        let mut filed = new_requisition(medication_id, service_id, quantity);
        filed.requisition.created_at = created_at;
        filed.requisition.completed = completed;
        if completed {
            filed.requisition.state = RequisitionState::Complete;
        }
        state.requisitions.push(filed);
    }
}

fn new_requisition(medication_id: Uuid, service_id: Uuid, quantity: i32) -> FiledRequisition {
    let now = Utc::now();
    FiledRequisition {
        requisition: Requisition {
            id: Uuid::new_v4(),
            state: RequisitionState::Pending,
            origin: RequisitionOrigin::Automatic,
            requester_id: None,
            approver_id: None,
            receiving_service_id: service_id,
            source_service_id: None,
            supplier_id: None,
            completed: false,
            stock_credited: false,
            created_at: now,
            expected_delivery_at: Some(now + chrono::Duration::days(7)),
            delivered_at: None,
            updated_at: now,
        },
        medication_id,
        quantity,
    }
}

fn level_of(state: &State, key: (Uuid, Uuid), values: (i32, i32)) -> StockLevel {
    let name = |id: &Uuid| state.names.get(id).cloned().unwrap_or_default();
    StockLevel {
        medication_id: key.0,
        medication_name: name(&key.0),
        service_id: key.1,
        service_name: name(&key.1),
        service_location: name(&key.1),
        available_quantity: values.0,
        minimum_quantity: values.1,
        updated_at: Utc::now(),
    }
}

fn pending_in(state: &State, medication_id: Uuid, window: chrono::Duration) -> bool {
    let since = Utc::now() - window;
    state.requisitions.iter().any(|filed| {
        filed.medication_id == medication_id
            && !filed.requisition.completed
            && filed.requisition.created_at >= since
    })
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn stock_below_minimum(&self) -> AppResult<Vec<StockLevel>> {
        let state = self.state.lock().unwrap();
        if state.scan_fails {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }
        Ok(state
            .levels
            .iter()
            .filter(|(_, (available, minimum))| available < minimum)
            .map(|(key, values)| level_of(&state, *key, *values))
            .collect())
    }

    async fn surplus_holders(
        &self,
        medication_id: Uuid,
        excluding_service_id: Uuid,
    ) -> AppResult<Vec<StockLevel>> {
        let state = self.state.lock().unwrap();
        let mut holders: Vec<StockLevel> = state
            .levels
            .iter()
            .filter(|((med, svc), (available, minimum))| {
                *med == medication_id && *svc != excluding_service_id && available > minimum
            })
            .map(|(key, values)| level_of(&state, *key, *values))
            .collect();
        holders.sort_by(|a, b| {
            b.available_quantity
                .cmp(&a.available_quantity)
                .then(a.service_id.cmp(&b.service_id))
        });
        Ok(holders)
    }

    async fn transfer(
        &self,
        medication_id: Uuid,
        from_service_id: Uuid,
        to_service_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<StockTransfer>> {
        let mut state = self.state.lock().unwrap();
        if state.failing_sources.contains(&from_service_id) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }

        let (available, minimum) = *state
            .levels
            .get(&(medication_id, from_service_id))
            .ok_or_else(|| AppError::NotFound("source pair".to_string()))?;
        let (target_available, target_minimum) = *state
            .levels
            .get(&(medication_id, to_service_id))
            .ok_or_else(|| AppError::NotFound("target pair".to_string()))?;

        let quantity = quantity.min(target_minimum - target_available);
        if quantity <= 0 {
            return Ok(None);
        }
        if quantity > available - minimum {
            return Err(AppError::InsufficientStock(format!(
                "{} requested, {} surplus",
                quantity,
                available - minimum
            )));
        }

        if let Some(source) = state.levels.get_mut(&(medication_id, from_service_id)) {
            source.0 -= quantity;
        }
        if let Some(target) = state.levels.get_mut(&(medication_id, to_service_id)) {
            target.0 += quantity;
        }

        let record = StockTransfer {
            id: Uuid::new_v4(),
            medication_id,
            from_service_id,
            to_service_id,
            quantity,
            created_at: Utc::now(),
        };
        state.transfers.push(record.clone());

        if state.lost_acks.remove(&from_service_id) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(Some(record))
    }

    async fn current_quantity(&self, medication_id: Uuid, service_id: Uuid) -> AppResult<i32> {
        self.state
            .lock()
            .unwrap()
            .levels
            .get(&(medication_id, service_id))
            .map(|(available, _)| *available)
            .ok_or_else(|| AppError::NotFound("pair".to_string()))
    }
}

#[async_trait]
impl RequisitionStore for InMemoryStore {
    async fn has_pending_requisition(
        &self,
        medication_id: Uuid,
        window: chrono::Duration,
    ) -> AppResult<bool> {
        Ok(pending_in(&self.state.lock().unwrap(), medication_id, window))
    }

    async fn create_requisition(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
    ) -> AppResult<Requisition> {
        let filed = new_requisition(medication_id, service_id, quantity);
        let requisition = filed.requisition.clone();
        self.state.lock().unwrap().requisitions.push(filed);
        Ok(requisition)
    }

    async fn file_if_absent(
        &self,
        medication_id: Uuid,
        service_id: Uuid,
        quantity: i32,
        window: chrono::Duration,
    ) -> AppResult<Requisition> {
        let mut state = self.state.lock().unwrap();
        if pending_in(&state, medication_id, window) {
            return Err(AppError::DuplicateRequisition(medication_id.to_string()));
        }
        let filed = new_requisition(medication_id, service_id, quantity);
        let requisition = filed.requisition.clone();
        state.requisitions.push(filed);
        Ok(requisition)
    }
}
