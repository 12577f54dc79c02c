//! Parameterized list/get/delete shared by every catalog table.
//!
//! Table and column names come from `Resource` constants, never from user
//! input, so building the statement with `format!` stays injection-free.

use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{HospitalService, Medication, Page, Staff, Supplier};

pub trait Resource: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    /// Human label used in error messages.
    const LABEL: &'static str;
    const ORDER_BY: &'static str = "created_at DESC";
}

impl Resource for Medication {
    const TABLE: &'static str = "medications";
    const COLUMNS: &'static str = "id, name, kind, batch, expires_on, created_at, updated_at";
    const LABEL: &'static str = "Medication";
    const ORDER_BY: &'static str = "name ASC";
}

impl Resource for HospitalService {
    const TABLE: &'static str = "hospital_services";
    const COLUMNS: &'static str =
        "id, name, location, description, open_24h, created_at, updated_at";
    const LABEL: &'static str = "Hospital service";
    const ORDER_BY: &'static str = "name ASC";
}

impl Resource for Supplier {
    const TABLE: &'static str = "suppliers";
    const COLUMNS: &'static str = "id, name, contact, email, created_at, updated_at";
    const LABEL: &'static str = "Supplier";
    const ORDER_BY: &'static str = "name ASC";
}

impl Resource for Staff {
    const TABLE: &'static str = "staff";
    const COLUMNS: &'static str =
        "id, name, service_id, is_administrator, created_at, updated_at";
    const LABEL: &'static str = "Staff member";
}

pub async fn list<T: Resource>(pool: &PgPool, page: &Page) -> AppResult<Vec<T>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
        T::COLUMNS,
        T::TABLE,
        T::ORDER_BY
    );

    let rows = sqlx::query_as::<_, T>(&sql)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn get<T: Resource>(pool: &PgPool, id: Uuid) -> AppResult<T> {
    let sql = format!("SELECT {} FROM {} WHERE id = $1", T::COLUMNS, T::TABLE);

    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", T::LABEL, id)))
}

pub async fn delete<T: Resource>(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let sql = format!("DELETE FROM {} WHERE id = $1", T::TABLE);

    let result = sqlx::query(&sql).bind(id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} {} not found", T::LABEL, id)));
    }
    Ok(())
}
