pub mod api;
pub mod app;
pub mod config;
pub mod errors;
pub mod execution;
pub mod gateway;
pub mod hyperliquid;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod services;

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::AppConfig;
use crate::execution::trade_ledger::TradeLedger;
use crate::ingestion::fill_stream::StreamState;
use crate::services::health_monitor::SharedHealth;

/// Read-only view shared with the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub our_address: String,
    pub dry_run: bool,
    pub ledger: TradeLedger,
    pub health: SharedHealth,
    pub stream_state: watch::Receiver<StreamState>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
