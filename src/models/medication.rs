use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    /// Therapeutic class or presentation, e.g. "Antibiotic" or "Injectable".
    pub kind: String,
    pub batch: Option<String>,
    pub expires_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Request payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateMedication {
    pub name: String,
    pub kind: String,
    pub batch: Option<String>,
    pub expires_on: Option<NaiveDate>,
}

impl CreateMedication {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".to_string()));
        }
        if self.kind.trim().is_empty() {
            return Err(AppError::BadRequest("kind must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMedication {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub batch: Option<String>,
    pub expires_on: Option<NaiveDate>,
}
