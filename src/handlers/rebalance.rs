use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::info;

use crate::{error::AppResult, inventory::Trigger, AppState};

// ── POST /api/stock-balancer/balance ──────────────────────────────────────────

pub async fn balance(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    info!("Manual rebalance requested");
    let started_at = Utc::now();
    let start = Instant::now();

    let report = match state.rebalancer.rebalance(Trigger::Manual).await {
        Ok(report) => report,
        Err(err) => {
            state
                .history
                .write()
                .await
                .record_failure(Trigger::Manual, started_at, &err);
            return Err(err);
        }
    };
    let elapsed = start.elapsed();

    state.history.write().await.record_report(&report);

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "actions": report.descriptions(),
            "report": report,
            "elapsed_ms": elapsed.as_secs_f64() * 1000.0,
        })),
    ))
}

// ── GET /api/stock-balancer/history ───────────────────────────────────────────

pub async fn history(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let history = state.history.read().await;
    let runs: Vec<_> = history.entries().collect();

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "count": history.len(),
            "latest": history.latest(),
            "runs": runs,
        })),
    ))
}

// ── GET /api/stock-balancer/history/csv ───────────────────────────────────────

pub async fn history_csv(State(state): State<AppState>) -> AppResult<Response> {
    let csv = state.history.read().await.to_csv()?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"rebalance_runs.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
