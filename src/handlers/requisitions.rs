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
    models::{ActorPayload, CreateRequisition, RequisitionFilters, RequisitionState},
    AppState,
};

// ── Create / read ─────────────────────────────────────────────────────────────

pub async fn create_requisition(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequisition>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let detail = db::requisitions::insert_manual(&state.db, &payload).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": detail }))))
}

pub async fn list_requisitions(
    State(state): State<AppState>,
    Query(filters): Query<RequisitionFilters>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let requisitions = db::requisitions::fetch_requisitions(&state.db, &filters).await?;
    info!(count = requisitions.len(), state = ?filters.state, "Listed requisitions");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": requisitions, "count": requisitions.len() })),
    ))
}

pub async fn pending_approval(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let requisitions = db::requisitions::fetch_pending_approval(&state.db).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": requisitions, "count": requisitions.len() })),
    ))
}

pub async fn requisitions_for_service(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let requisitions = db::requisitions::fetch_for_service(&state.db, service_id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": requisitions, "count": requisitions.len() })),
    ))
}

pub async fn get_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let detail = db::requisitions::fetch_requisition(&state.db, id).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": detail }))))
}

// ── State machine ─────────────────────────────────────────────────────────────

async fn move_to(
    state: &AppState,
    id: Uuid,
    next: RequisitionState,
    actor_id: Uuid,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let detail = db::requisitions::transition(
        &state.db,
        id,
        next,
        actor_id,
        state.config.stock_credit_policy,
    )
    .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": detail }))))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    move_to(&state, id, RequisitionState::Approved, payload.actor_id).await
}

pub async fn fulfill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    move_to(&state, id, RequisitionState::InFulfillment, payload.actor_id).await
}

pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    move_to(&state, id, RequisitionState::Complete, payload.actor_id).await
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    move_to(&state, id, RequisitionState::Cancelled, payload.actor_id).await
}

pub async fn delete_requisition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    db::requisitions::delete_requisition(&state.db, id).await?;
    info!(id = %id, "Deleted requisition");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": format!("Requisition {} deleted", id) })),
    ))
}
