use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use crate::{db, error::AppResult, AppState};

/// Stock under its minimum plus requisitions waiting for an administrator.
pub async fn alerts(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let (low_stock, pending) = tokio::try_join!(
        db::stock::fetch_below_minimum(&state.db),
        db::requisitions::fetch_pending_approval(&state.db),
    )?;

    info!(
        low_stock = low_stock.len(),
        pending_approval = pending.len(),
        "Collected alerts"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "low_stock": low_stock,
            "pending_approval": pending,
            "total": low_stock.len() + pending.len(),
        })),
    ))
}
