use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::{mpsc, watch};

use crate::errors::GatewayError;
use crate::gateway::ExchangeGateway;
use crate::models::{AccountEquity, FillEvent, Position, TradeAction, TradeResult};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::services::notifier::NotificationSink;

use super::order_executor::OrderExecutor;
use super::risk_engine::{self, CopyDecision, MirrorSnapshot, RiskLimits, RiskViolation, SkipReason};
use super::trade_ledger::TradeLedger;

/// Configuration for the copy engine.
#[derive(Debug, Clone)]
pub struct CopyEngineConfig {
    /// Account (or vault) whose equity we size against.
    pub our_address: String,
    /// Account being mirrored.
    pub target_address: String,
    pub risk_limits: RiskLimits,
    /// Retry policy for the equity/position snapshot fetches.
    pub fetch_retry: RetryPolicy,
}

/// What happened to one fill.
#[derive(Debug, Clone)]
pub enum FillOutcome {
    Executed(TradeResult),
    Skipped(SkipReason),
    Rejected(RiskViolation),
    /// Equity/position snapshot could not be fetched; nothing was traded.
    SnapshotFailed(GatewayError),
}

struct AccountsSnapshot {
    our_equity: AccountEquity,
    target_equity: AccountEquity,
    target_positions: Vec<Position>,
}

/// Single consumer of the target's fills. Owning the only mutable path to the
/// ledger, it processes one fill at a time in arrival order.
pub struct CopyEngine {
    gateway: Arc<dyn ExchangeGateway>,
    executor: OrderExecutor,
    ledger: TradeLedger,
    notifier: Arc<dyn NotificationSink>,
    config: CopyEngineConfig,
}

impl CopyEngine {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        executor: OrderExecutor,
        ledger: TradeLedger,
        notifier: Arc<dyn NotificationSink>,
        config: CopyEngineConfig,
    ) -> Self {
        Self {
            gateway,
            executor,
            ledger,
            notifier,
            config,
        }
    }

    /// Run the copy engine loop until the channel closes or shutdown is
    /// signalled. A fill already being handled is always finished first.
    pub async fn run(self, mut rx: mpsc::Receiver<FillEvent>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            target_address = %self.config.target_address,
            dry_run = self.executor.is_dry_run(),
            max_concurrent = self.config.risk_limits.max_concurrent_trades,
            "Copy engine started"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Copy engine stopping");
                        break;
                    }
                }
                maybe_fill = rx.recv() => {
                    let Some(fill) = maybe_fill else {
                        tracing::warn!("Fill channel closed, copy engine shutting down");
                        break;
                    };
                    self.handle_fill(&fill).await;
                }
            }
        }
    }

    /// Process a single fill: snapshot → decide → execute → ledger → notify.
    pub async fn handle_fill(&self, fill: &FillEvent) -> FillOutcome {
        let start = Instant::now();
        tracing::info!(
            coin = %fill.coin,
            direction = %fill.direction,
            size = %fill.size,
            price = %fill.price,
            "Processing target fill"
        );

        let outcome = self.process(fill).await;
        histogram!("fill_processing_seconds").record(start.elapsed().as_secs_f64());
        outcome
    }

    async fn process(&self, fill: &FillEvent) -> FillOutcome {
        // 1. Fresh state for both accounts
        let snapshot = match self.fetch_snapshot().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(coin = %fill.coin, error = %e, "Failed to fetch account state, skipping fill");
                self.notify_error("Failed to fetch account state", fill, &e.to_string())
                    .await;
                return FillOutcome::SnapshotFailed(e);
            }
        };

        // 2. Risk engine decision
        let active_trades = self.ledger.count().await;
        let coin_tracked = self.ledger.contains(&fill.coin).await;
        let mirror = MirrorSnapshot {
            our_equity: &snapshot.our_equity,
            target_equity: &snapshot.target_equity,
            target_positions: &snapshot.target_positions,
            active_trades,
            coin_tracked,
        };

        let params = match risk_engine::evaluate(fill, &mirror, &self.config.risk_limits) {
            CopyDecision::Trade(params) => params,
            CopyDecision::Skip(reason) => {
                counter!("trades_skipped_total").increment(1);
                tracing::info!(coin = %fill.coin, reason = %reason, "Fill skipped");
                return FillOutcome::Skipped(reason);
            }
            CopyDecision::Rejected(violation) => {
                counter!("trades_rejected_total").increment(1);
                tracing::warn!(
                    coin = %fill.coin,
                    violation = %violation,
                    "Risk check failed, order rejected"
                );
                return FillOutcome::Rejected(violation);
            }
        };

        tracing::info!(
            coin = %params.coin,
            action = %params.action,
            side = %params.side,
            size = %params.size,
            leverage = params.leverage,
            our_equity = %snapshot.our_equity.account_value,
            target_equity = %snapshot.target_equity.account_value,
            "Position sized"
        );

        // 3. Execute
        let result = self.executor.execute(&params).await;

        // 4. Ledger only moves on success
        if result.success {
            counter!("trades_copied_total").increment(1);
            match params.action {
                TradeAction::Open => {
                    self.ledger.mark_opened(&params.coin).await;
                }
                TradeAction::Close => {
                    self.ledger.mark_closed(&params.coin).await;
                }
                TradeAction::Reduce => {}
            }
        }

        // 5. Notify (failed executions included)
        self.notifier.trade_copied(fill, &params, &result).await;

        FillOutcome::Executed(result)
    }

    async fn fetch_snapshot(&self) -> Result<AccountsSnapshot, GatewayError> {
        let policy = &self.config.fetch_retry;
        let gateway = &self.gateway;
        let ours = self.config.our_address.as_str();
        let target = self.config.target_address.as_str();

        let (our_equity, target_equity, target_positions) = tokio::try_join!(
            retry_with_backoff(
                policy,
                "our_equity",
                |_| gateway.account_equity(ours),
                GatewayError::is_retryable,
            ),
            retry_with_backoff(
                policy,
                "target_equity",
                |_| gateway.account_equity(target),
                GatewayError::is_retryable,
            ),
            retry_with_backoff(
                policy,
                "target_positions",
                |_| gateway.positions(target),
                GatewayError::is_retryable,
            ),
        )
        .map_err(|failure| failure.error)?;

        Ok(AccountsSnapshot {
            our_equity: our_equity.0,
            target_equity: target_equity.0,
            target_positions: target_positions.0,
        })
    }

    async fn notify_error(&self, message: &str, fill: &FillEvent, error: &str) {
        let mut context = BTreeMap::new();
        context.insert("coin".to_string(), fill.coin.clone());
        context.insert("direction".to_string(), fill.direction.to_string());
        context.insert("size".to_string(), fill.size.to_string());
        context.insert("error".to_string(), error.to_string());
        self.notifier.error(message, &context).await;
    }
}
