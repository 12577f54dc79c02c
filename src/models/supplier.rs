use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSupplier {
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
}

impl CreateSupplier {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".to_string()));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(AppError::BadRequest(format!("'{}' is not an email address", email)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupplier {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_email_is_rejected() {
        let payload = CreateSupplier {
            name: "MedDistrib".to_string(),
            contact: None,
            email: Some("orders.meddistrib.example".to_string()),
        };
        assert!(payload.validate().is_err());
    }
}
