//! Process wiring: builds the components, starts the workers and tears them
//! down in order.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::errors::GatewayError;
use crate::execution::copy_engine::{CopyEngine, CopyEngineConfig};
use crate::execution::order_executor::OrderExecutor;
use crate::execution::trade_ledger::TradeLedger;
use crate::gateway::{ExchangeGateway, FillTransport};
use crate::hyperliquid::signing::SigningError;
use crate::hyperliquid::{ActionSigner, ExchangeClient, HyperliquidFillTransport, HyperliquidGateway, InfoClient};
use crate::ingestion::fill_stream::{FillHandler, FillStream, FillStreamError, FillSubscription};
use crate::models::FillEvent;
use crate::retry::{BackoffPolicy, RetryPolicy};
use crate::services::health_monitor::{HealthMonitor, HealthMonitorConfig, HealthMonitorHandle};
use crate::services::notifier::{NoopNotifier, NotificationSink, TelegramNotifier};
use crate::AppState;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    FillStream(#[from] FillStreamError),
}

/// External collaborators the core runs against.
pub struct Components {
    pub gateway: Arc<dyn ExchangeGateway>,
    pub transport: Arc<dyn FillTransport>,
    pub notifier: Arc<dyn NotificationSink>,
    /// Account whose equity and positions are mirrored into.
    pub our_address: String,
}

impl Components {
    /// Hyperliquid REST + WebSocket adapters, plus Telegram when configured.
    pub fn hyperliquid(config: &AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(GatewayError::from)?;

        let exchange = match &config.private_key {
            Some(key) => {
                let signer = ActionSigner::new(key, config.is_mainnet(), config.vault_address.as_deref())?;
                tracing::info!(signer = %signer.address(), "Signing key loaded");
                Some(ExchangeClient::new(http.clone(), config.api_url.clone(), signer))
            }
            None => None,
        };

        // Trades land on the vault when one is set, so size against it.
        let our_address = config
            .vault_address
            .clone()
            .or_else(|| config.our_address.clone())
            .or_else(|| exchange.as_ref().map(|e| e.signer().address().to_string()))
            .ok_or_else(|| AppError::Config("OUR_ADDRESS or PRIVATE_KEY must be set".into()))?
            .to_lowercase();

        let info = InfoClient::new(http, config.api_url.clone());
        let transport = HyperliquidFillTransport::new(&config.ws_url)?;

        let notifier: Arc<dyn NotificationSink> = match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())),
            _ => Arc::new(NoopNotifier),
        };

        Ok(Self {
            gateway: Arc::new(HyperliquidGateway::new(info, exchange)),
            transport: Arc::new(transport),
            notifier,
            our_address,
        })
    }
}

/// Running application. Dropping it without [`App::shutdown`] leaves the
/// background tasks running.
pub struct App {
    state: AppState,
    subscription: FillSubscription,
    health: HealthMonitorHandle,
    engine_stop: watch::Sender<bool>,
    engine_task: JoinHandle<()>,
    notifier: Arc<dyn NotificationSink>,
}

impl App {
    /// Start the copy engine worker, the health monitor and the fill stream.
    pub async fn start(config: AppConfig, components: Components, metrics_handle: PrometheusHandle) -> Self {
        let Components {
            gateway,
            transport,
            notifier,
            our_address,
        } = components;
        let dry_run = config.effective_dry_run();
        let target_address = config.target_address.to_lowercase();

        if dry_run {
            tracing::warn!("DRY-RUN mode: orders are logged, never sent");
        }

        // --- Copy engine: single consumer of the fill queue ---
        let ledger = TradeLedger::new(config.max_concurrent_trades);
        let executor = OrderExecutor::new(gateway.clone(), dry_run, config.market_slippage_pct);
        let engine = CopyEngine::new(
            gateway.clone(),
            executor,
            ledger.clone(),
            notifier.clone(),
            CopyEngineConfig {
                our_address: our_address.clone(),
                target_address: target_address.clone(),
                risk_limits: config.risk_limits(),
                fetch_retry: RetryPolicy::default(),
            },
        );
        let (fill_tx, fill_rx) = mpsc::channel::<FillEvent>(config.fill_queue_capacity);
        let (engine_stop, engine_stop_rx) = watch::channel(false);
        let engine_task = tokio::spawn(engine.run(fill_rx, engine_stop_rx));

        // --- Health monitor ---
        let monitor = HealthMonitor::new(
            gateway,
            notifier.clone(),
            HealthMonitorConfig {
                our_address: our_address.clone(),
                target_address: target_address.clone(),
                interval: config.health_check_interval(),
                drift_threshold: config.drift_threshold,
            },
        );
        let health_latest = monitor.latest();
        let health = monitor.spawn();

        // --- Fill stream → queue ---
        let stream = FillStream::new(
            transport,
            BackoffPolicy::RECONNECT,
            config.ws_max_reconnect_attempts,
            notifier.clone(),
        );
        let handler: Arc<dyn FillHandler> = Arc::new(fill_tx);
        let subscription = stream.subscribe(target_address.clone(), handler);

        let summary = format!(
            "Target: `{}`\nOurs: `{}`\nNetwork: {}\nMode: {}",
            target_address,
            our_address,
            config.network,
            if dry_run { "dry-run" } else { "live" },
        );
        tracing::info!(
            target = %target_address,
            ours = %our_address,
            network = %config.network,
            dry_run,
            "Copy trader started"
        );
        notifier.startup(&summary).await;

        let state = AppState {
            config: Arc::new(config),
            our_address,
            dry_run,
            ledger,
            health: health_latest,
            stream_state: subscription.state(),
            metrics_handle,
        };

        Self {
            state,
            subscription,
            health,
            engine_stop,
            engine_task,
            notifier,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Resolves only when the fill stream has failed for good.
    pub async fn fatal(&mut self) -> FillStreamError {
        match self.subscription.join().await {
            Err(e) => e,
            Ok(()) => std::future::pending().await,
        }
    }

    /// Stop taking fills, stop the health timer, then let the engine finish
    /// the fill it is working on.
    pub async fn shutdown(mut self, reason: &str) {
        tracing::info!(reason, "Shutting down");

        self.subscription.unsubscribe();
        if let Err(e) = self.subscription.join().await {
            tracing::warn!(error = %e, "Fill stream had already failed");
        }

        self.health.stop().await;

        let _ = self.engine_stop.send(true);
        if let Err(e) = self.engine_task.await {
            tracing::error!(error = %e, "Copy engine task ended abnormally");
        }

        self.notifier.shutdown(reason).await;
        tracing::info!("Shutdown complete");
    }
}
