pub mod crud;
pub mod requisitions;
pub mod stock;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;

// ── Medications ───────────────────────────────────────────────────────────────

pub async fn insert_medication(pool: &PgPool, payload: &CreateMedication) -> AppResult<Medication> {
    let medication = sqlx::query_as::<_, Medication>(
        r#"
        INSERT INTO medications (name, kind, batch, expires_on)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, kind, batch, expires_on, created_at, updated_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.kind.trim())
    .bind(&payload.batch)
    .bind(payload.expires_on)
    .fetch_one(pool)
    .await?;

    Ok(medication)
}

pub async fn update_medication(
    pool: &PgPool,
    id: Uuid,
    payload: &UpdateMedication,
) -> AppResult<Medication> {
    // Fetch existing to merge optional fields
    let existing: Medication = crud::get(pool, id).await?;

    sqlx::query_as::<_, Medication>(
        r#"
        UPDATE medications
        SET name       = $1,
            kind       = $2,
            batch      = $3,
            expires_on = $4,
            updated_at = $5
        WHERE id = $6
        RETURNING id, name, kind, batch, expires_on, created_at, updated_at
        "#,
    )
    .bind(payload.name.as_deref().unwrap_or(&existing.name))
    .bind(payload.kind.as_deref().unwrap_or(&existing.kind))
    .bind(payload.batch.as_deref().or(existing.batch.as_deref()))
    .bind(payload.expires_on.or(existing.expires_on))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Medication {} not found", id)))
}

// ── Hospital services ─────────────────────────────────────────────────────────

pub async fn insert_service(
    pool: &PgPool,
    payload: &CreateHospitalService,
) -> AppResult<HospitalService> {
    let service = sqlx::query_as::<_, HospitalService>(
        r#"
        INSERT INTO hospital_services (name, location, description, open_24h)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, location, description, open_24h, created_at, updated_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.location.trim())
    .bind(&payload.description)
    .bind(payload.open_24h)
    .fetch_one(pool)
    .await?;

    Ok(service)
}

pub async fn update_service(
    pool: &PgPool,
    id: Uuid,
    payload: &UpdateHospitalService,
) -> AppResult<HospitalService> {
    let existing: HospitalService = crud::get(pool, id).await?;

    sqlx::query_as::<_, HospitalService>(
        r#"
        UPDATE hospital_services
        SET name        = $1,
            location    = $2,
            description = $3,
            open_24h    = $4,
            updated_at  = $5
        WHERE id = $6
        RETURNING id, name, location, description, open_24h, created_at, updated_at
        "#,
    )
    .bind(payload.name.as_deref().unwrap_or(&existing.name))
    .bind(payload.location.as_deref().unwrap_or(&existing.location))
    .bind(payload.description.as_deref().or(existing.description.as_deref()))
    .bind(payload.open_24h.unwrap_or(existing.open_24h))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Hospital service {} not found", id)))
}

// ── Suppliers ─────────────────────────────────────────────────────────────────

pub async fn insert_supplier(pool: &PgPool, payload: &CreateSupplier) -> AppResult<Supplier> {
    let supplier = sqlx::query_as::<_, Supplier>(
        r#"
        INSERT INTO suppliers (name, contact, email)
        VALUES ($1, $2, $3)
        RETURNING id, name, contact, email, created_at, updated_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.contact)
    .bind(&payload.email)
    .fetch_one(pool)
    .await?;

    Ok(supplier)
}

pub async fn update_supplier(
    pool: &PgPool,
    id: Uuid,
    payload: &UpdateSupplier,
) -> AppResult<Supplier> {
    let existing: Supplier = crud::get(pool, id).await?;

    sqlx::query_as::<_, Supplier>(
        r#"
        UPDATE suppliers
        SET name       = $1,
            contact    = $2,
            email      = $3,
            updated_at = $4
        WHERE id = $5
        RETURNING id, name, contact, email, created_at, updated_at
        "#,
    )
    .bind(payload.name.as_deref().unwrap_or(&existing.name))
    .bind(payload.contact.as_deref().or(existing.contact.as_deref()))
    .bind(payload.email.as_deref().or(existing.email.as_deref()))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Supplier {} not found", id)))
}

// ── Staff ─────────────────────────────────────────────────────────────────────

pub async fn insert_staff(pool: &PgPool, payload: &CreateStaff) -> AppResult<Staff> {
    let staff = sqlx::query_as::<_, Staff>(
        r#"
        INSERT INTO staff (name, service_id, is_administrator)
        VALUES ($1, $2, $3)
        RETURNING id, name, service_id, is_administrator, created_at, updated_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.service_id)
    .bind(payload.is_administrator)
    .fetch_one(pool)
    .await?;

    Ok(staff)
}

pub async fn update_staff(pool: &PgPool, id: Uuid, payload: &UpdateStaff) -> AppResult<Staff> {
    let existing: Staff = crud::get(pool, id).await?;

    sqlx::query_as::<_, Staff>(
        r#"
        UPDATE staff
        SET name             = $1,
            service_id       = $2,
            is_administrator = $3,
            updated_at       = $4
        WHERE id = $5
        RETURNING id, name, service_id, is_administrator, created_at, updated_at
        "#,
    )
    .bind(payload.name.as_deref().unwrap_or(&existing.name))
    .bind(payload.service_id.or(existing.service_id))
    .bind(payload.is_administrator.unwrap_or(existing.is_administrator))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Staff member {} not found", id)))
}
