use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

/// GET /api/status: current system status.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let mode = if state.dry_run { "dry_run" } else { "live" };
    let active_trades = state.ledger.snapshot().await;
    let stream_state = *state.stream_state.borrow();
    let last_health_check = state
        .health
        .read()
        .await
        .as_ref()
        .map(|r| r.timestamp);

    Json(json!({
        "mode": mode,
        "network": state.config.network.to_string(),
        "target_address": state.config.target_address,
        "our_address": state.our_address,
        "vault_address": state.config.vault_address,
        "active_trade_count": active_trades.len(),
        "active_trades": active_trades,
        "max_concurrent_trades": state.config.max_concurrent_trades,
        "fill_stream": stream_state.as_str(),
        "last_health_check": last_health_check,
    }))
}
