//! Stock rebalancing across hospital services and automatic replenishment.

mod filer;
mod pg;
mod rebalancer;
mod retry;
mod scheduler;
mod store;

#[cfg(test)]
pub mod memory;

pub use filer::{FilingOutcome, ReplenishmentFiler};
pub use pg::PgInventoryStore;
pub use rebalancer::{RebalanceReport, Rebalancer, Trigger};
pub use retry::RetryPolicy;
pub use scheduler::RebalanceScheduler;
pub use store::{InventoryStore, RequisitionStore};
