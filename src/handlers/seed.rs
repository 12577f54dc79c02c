use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{error::AppResult, seed, AppState};

#[derive(Debug, Deserialize)]
pub struct SeedParams {
    pub services: Option<usize>,
    pub medications: Option<usize>,
}

// ── POST /api/seed ────────────────────────────────────────────────────────────

pub async fn seed_data(
    State(state): State<AppState>,
    Query(params): Query<SeedParams>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let services = params.services.unwrap_or(6).clamp(1, 50);
    let medications = params.medications.unwrap_or(40).clamp(1, 2_000);

    let start = Instant::now();
    let summary = seed::seed_hospital(&state.db, services, medications).await?;
    let elapsed = start.elapsed();

    info!(seed_ms = elapsed.as_millis(), "Seed request finished");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "seeded": summary,
            "seed_time_ms": elapsed.as_secs_f64() * 1000.0,
        })),
    ))
}
