mod hospital_service;
mod medication;
mod requisition;
mod staff;
mod stock;
mod supplier;

pub use hospital_service::*;
pub use medication::*;
pub use requisition::*;
pub use staff::*;
pub use stock::*;
pub use supplier::*;

use serde::Deserialize;

// ── Query parameters ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(100).clamp(1, 1_000)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
