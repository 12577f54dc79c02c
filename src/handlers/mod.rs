pub mod alerts;
pub mod catalog;
pub mod rebalance;
pub mod requisitions;
pub mod seed;
pub mod stock;

use axum::{http::StatusCode, Json};
use serde_json::json;

pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok", "service": "hospital-supply" })))
}
