//! Catalog tables: medications, hospital services, suppliers and staff.
//!
//! List/get/delete are generic over `db::crud::Resource`; create and update
//! stay per table because their payloads differ.

use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    db::{self, crud::Resource},
    error::AppResult,
    models::*,
    AppState,
};

// ── Generic ───────────────────────────────────────────────────────────────────

pub async fn list<T: Resource>(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let rows: Vec<T> = db::crud::list(&state.db, &page).await?;
    let elapsed = start.elapsed();

    info!(
        table = T::TABLE,
        count = rows.len(),
        elapsed_ms = elapsed.as_millis(),
        "Listed rows"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": rows,
            "count": rows.len(),
            "limit": page.limit(),
            "offset": page.offset(),
            "query_time_ms": elapsed.as_secs_f64() * 1000.0,
        })),
    ))
}

pub async fn get_one<T: Resource>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let row: T = db::crud::get(&state.db, id).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": row }))))
}

pub async fn delete_one<T: Resource>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    db::crud::delete::<T>(&state.db, id).await?;

    info!(table = T::TABLE, id = %id, "Deleted row");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": format!("{} {} deleted", T::LABEL, id) })),
    ))
}

fn created<T: serde::Serialize>(row: T) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::CREATED, Json(serde_json::json!({ "data": row })))
}

fn updated<T: serde::Serialize>(row: T) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "data": row })))
}

// ── Medications ───────────────────────────────────────────────────────────────

pub async fn create_medication(
    State(state): State<AppState>,
    Json(payload): Json<CreateMedication>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let medication = db::insert_medication(&state.db, &payload).await?;
    info!(id = %medication.id, name = %medication.name, "Created medication");
    Ok(created(medication))
}

pub async fn update_medication(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMedication>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let medication = db::update_medication(&state.db, id, &payload).await?;
    info!(id = %id, "Updated medication");
    Ok(updated(medication))
}

// ── Hospital services ─────────────────────────────────────────────────────────

pub async fn create_service(
    State(state): State<AppState>,
    Json(payload): Json<CreateHospitalService>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let service = db::insert_service(&state.db, &payload).await?;
    info!(id = %service.id, name = %service.name, "Created hospital service");
    Ok(created(service))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateHospitalService>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let service = db::update_service(&state.db, id, &payload).await?;
    info!(id = %id, "Updated hospital service");
    Ok(updated(service))
}

// ── Suppliers ─────────────────────────────────────────────────────────────────

pub async fn create_supplier(
    State(state): State<AppState>,
    Json(payload): Json<CreateSupplier>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let supplier = db::insert_supplier(&state.db, &payload).await?;
    info!(id = %supplier.id, name = %supplier.name, "Created supplier");
    Ok(created(supplier))
}

pub async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSupplier>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let supplier = db::update_supplier(&state.db, id, &payload).await?;
    info!(id = %id, "Updated supplier");
    Ok(updated(supplier))
}

// ── Staff ─────────────────────────────────────────────────────────────────────

pub async fn create_staff(
    State(state): State<AppState>,
    Json(payload): Json<CreateStaff>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let staff = db::insert_staff(&state.db, &payload).await?;
    info!(id = %staff.id, administrator = staff.is_administrator, "Created staff member");
    Ok(created(staff))
}

pub async fn update_staff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStaff>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let staff = db::update_staff(&state.db, id, &payload).await?;
    info!(id = %id, "Updated staff member");
    Ok(updated(staff))
}
