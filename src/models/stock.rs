use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Stock of one medication at one hospital service, joined with display names.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockLevel {
    pub medication_id: Uuid,
    pub medication_name: String,
    pub service_id: Uuid,
    pub service_name: String,
    pub service_location: String,
    pub available_quantity: i32,
    pub minimum_quantity: i32,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    pub fn is_below_minimum(&self) -> bool {
        self.available_quantity < self.minimum_quantity
    }

    /// Units missing to reach the minimum (0 when satisfied).
    pub fn deficit(&self) -> i32 {
        (self.minimum_quantity - self.available_quantity).max(0)
    }

    /// Units that can leave this service without dropping it below its minimum.
    pub fn surplus(&self) -> i32 {
        (self.available_quantity - self.minimum_quantity).max(0)
    }
}

/// Ledger row for units moved between services by the rebalancer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockTransfer {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub from_service_id: Uuid,
    pub to_service_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

// ── Request payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertStock {
    pub medication_id: Uuid,
    pub service_id: Uuid,
    pub available_quantity: i32,
    pub minimum_quantity: i32,
}

impl UpsertStock {
    pub fn validate(&self) -> AppResult<()> {
        if self.available_quantity < 0 || self.minimum_quantity < 0 {
            return Err(AppError::BadRequest(
                "quantities must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustStock {
    pub medication_id: Uuid,
    pub service_id: Uuid,
    pub quantity: i32,
}

impl AdjustStock {
    pub fn validate(&self) -> AppResult<()> {
        if self.quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SetMinimum {
    pub medication_id: Uuid,
    pub service_id: Uuid,
    pub minimum_quantity: i32,
}

// ── Query parameters ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct StockFilters {
    pub below_minimum: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(available: i32, minimum: i32) -> StockLevel {
        StockLevel {
            medication_id: Uuid::new_v4(),
            medication_name: "Amoxicillin".to_string(),
            service_id: Uuid::new_v4(),
            service_name: "Pediatrics".to_string(),
            service_location: "Block B".to_string(),
            available_quantity: available,
            minimum_quantity: minimum,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn deficit_and_surplus_never_go_negative() {
        let short = level(2, 10);
        assert!(short.is_below_minimum());
        assert_eq!(short.deficit(), 8);
        assert_eq!(short.surplus(), 0);

        let rich = level(50, 5);
        assert!(!rich.is_below_minimum());
        assert_eq!(rich.deficit(), 0);
        assert_eq!(rich.surplus(), 45);
    }

    #[test]
    fn exact_minimum_is_satisfied() {
        let at_min = level(10, 10);
        assert!(!at_min.is_below_minimum());
        assert_eq!(at_min.surplus(), 0);
    }

    #[test]
    fn adjustment_requires_positive_quantity() {
        let adjust = AdjustStock {
            medication_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(adjust.validate().is_err());
    }
}
