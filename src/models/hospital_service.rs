use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// A stock-holding site inside the hospital network (ward, pharmacy, ER...).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HospitalService {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub open_24h: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHospitalService {
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    #[serde(default)]
    pub open_24h: bool,
}

impl CreateHospitalService {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".to_string()));
        }
        if self.location.trim().is_empty() {
            return Err(AppError::BadRequest("location must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateHospitalService {
    pub name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub open_24h: Option<bool>,
}
