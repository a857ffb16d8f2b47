use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

/// GET /health: latest drift check. 503 while positions are out of sync.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let latest = state.health.read().await;

    match latest.as_ref() {
        None => (StatusCode::OK, Json(json!({ "status": "pending" }))),
        Some(result) if result.is_healthy() => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "result": result })),
        ),
        Some(result) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "drift",
                "drift_coins": result.drift.len(),
                "result": result,
            })),
        ),
    }
}
