use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    db,
    error::AppResult,
    models::{AdjustStock, Page, SetMinimum, StockFilters, UpsertStock},
    AppState,
};

// ── Reads ─────────────────────────────────────────────────────────────────────

pub async fn list_stock(
    State(state): State<AppState>,
    Query(filters): Query<StockFilters>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let levels = db::stock::fetch_levels(&state.db, &filters).await?;
    let elapsed = start.elapsed();

    info!(
        count = levels.len(),
        below_minimum = filters.below_minimum.unwrap_or(false),
        elapsed_ms = elapsed.as_millis(),
        "Listed stock levels"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": levels,
            "count": levels.len(),
            "query_time_ms": elapsed.as_secs_f64() * 1000.0,
        })),
    ))
}

pub async fn stock_for_service(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let levels = db::stock::fetch_levels_for_service(&state.db, service_id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": levels, "count": levels.len() })),
    ))
}

pub async fn get_level(
    State(state): State<AppState>,
    Path((medication_id, service_id)): Path<(Uuid, Uuid)>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let level = db::stock::fetch_level(&state.db, medication_id, service_id).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": level }))))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let transfers = db::stock::fetch_transfers(&state.db, &page).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": transfers, "count": transfers.len() })),
    ))
}

// ── Writes ────────────────────────────────────────────────────────────────────

pub async fn upsert_level(
    State(state): State<AppState>,
    Json(payload): Json<UpsertStock>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let level = db::stock::upsert_level(&state.db, &payload).await?;

    info!(
        medication_id = %level.medication_id,
        service_id = %level.service_id,
        available = level.available_quantity,
        minimum = level.minimum_quantity,
        "Upserted stock level"
    );

    Ok((StatusCode::OK, Json(serde_json::json!({ "data": level }))))
}

pub async fn add_stock(
    State(state): State<AppState>,
    Json(payload): Json<AdjustStock>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let level = db::stock::add_stock(&state.db, &payload).await?;

    info!(
        medication_id = %level.medication_id,
        service_id = %level.service_id,
        added = payload.quantity,
        available = level.available_quantity,
        "Added stock"
    );

    Ok((StatusCode::OK, Json(serde_json::json!({ "data": level }))))
}

pub async fn remove_stock(
    State(state): State<AppState>,
    Json(payload): Json<AdjustStock>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    payload.validate()?;
    let level = db::stock::remove_stock(&state.db, &payload).await?;

    info!(
        medication_id = %level.medication_id,
        service_id = %level.service_id,
        removed = payload.quantity,
        available = level.available_quantity,
        "Removed stock"
    );

    Ok((StatusCode::OK, Json(serde_json::json!({ "data": level }))))
}

pub async fn set_minimum(
    State(state): State<AppState>,
    Json(payload): Json<SetMinimum>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let level = db::stock::set_minimum(&state.db, &payload).await?;

    info!(
        medication_id = %level.medication_id,
        service_id = %level.service_id,
        minimum = level.minimum_quantity,
        below_minimum = level.is_below_minimum(),
        "Set stock minimum"
    );

    Ok((StatusCode::OK, Json(serde_json::json!({ "data": level }))))
}
