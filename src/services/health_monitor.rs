use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::errors::GatewayError;
use crate::gateway::ExchangeGateway;
use crate::models::{HealthCheckResult, Position, PositionDrift};
use crate::services::notifier::NotificationSink;

/// Latest health-check result, shared with the HTTP status surface.
pub type SharedHealth = Arc<RwLock<Option<HealthCheckResult>>>;

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub our_address: String,
    pub target_address: String,
    pub interval: Duration,
    /// Absolute size difference above which a coin counts as drifted.
    pub drift_threshold: Decimal,
}

/// Periodically compares our positions against the target's.
pub struct HealthMonitor {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn NotificationSink>,
    config: HealthMonitorConfig,
    latest: SharedHealth,
}

/// Handle to a spawned monitor loop.
pub struct HealthMonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitorHandle {
    /// Cancel the timer. A cycle already running is allowed to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}

impl HealthMonitor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn NotificationSink>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            gateway,
            notifier,
            config,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn latest(&self) -> SharedHealth {
        self.latest.clone()
    }

    /// Run the check loop in its own task. The first cycle runs immediately.
    pub fn spawn(self) -> HealthMonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                interval_secs = self.config.interval.as_secs(),
                threshold = %self.config.drift_threshold,
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        // Not raced against stop: a started cycle completes.
                        self.run_check().await;
                    }
                }
            }

            tracing::info!("Health monitor stopped");
        });

        HealthMonitorHandle { stop_tx, task }
    }

    /// One health-check cycle. On fetch failure the previous result stays.
    pub async fn run_check(&self) -> Option<HealthCheckResult> {
        metrics::counter!("health_checks_total").increment(1);

        let result = match self.fetch().await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Health check failed");
                let mut context = BTreeMap::new();
                context.insert("error".to_string(), e.to_string());
                self.notifier.error("Health check failed", &context).await;
                return None;
            }
        };

        metrics::gauge!("drift_coins").set(result.drift.len() as f64);

        if result.is_healthy() {
            tracing::info!(
                positions = result.our_positions.len(),
                our_equity = %result.our_equity.account_value,
                target_equity = %result.target_equity.account_value,
                "Health check: positions in sync"
            );
        } else {
            for (coin, drift) in &result.drift {
                tracing::warn!(
                    coin = %coin,
                    our_size = %drift.our_size,
                    target_size = %drift.target_size,
                    difference = %drift.difference,
                    "Position drift detected"
                );
            }
            self.notifier.health_check(&result).await;
        }

        *self.latest.write().await = Some(result.clone());
        Some(result)
    }

    async fn fetch(&self) -> Result<HealthCheckResult, GatewayError> {
        let gateway = &self.gateway;
        let ours = self.config.our_address.as_str();
        let target = self.config.target_address.as_str();

        let (our_positions, target_positions, our_equity, target_equity) = tokio::try_join!(
            gateway.positions(ours),
            gateway.positions(target),
            gateway.account_equity(ours),
            gateway.account_equity(target),
        )?;

        let drift = detect_drift(&our_positions, &target_positions, self.config.drift_threshold);

        Ok(HealthCheckResult {
            timestamp: Utc::now(),
            our_positions,
            target_positions,
            our_equity,
            target_equity,
            drift,
        })
    }
}

/// Coins whose size differs from the target's by more than `threshold`, plus
/// any coin we hold that the target does not.
pub fn detect_drift(
    ours: &[Position],
    target: &[Position],
    threshold: Decimal,
) -> BTreeMap<String, PositionDrift> {
    let our_sizes: BTreeMap<&str, Decimal> =
        ours.iter().map(|p| (p.coin.as_str(), p.size)).collect();

    let mut drift = BTreeMap::new();

    for pos in target {
        let our_size = our_sizes.get(pos.coin.as_str()).copied().unwrap_or(Decimal::ZERO);
        let difference = (pos.size - our_size).abs();
        if difference > threshold {
            drift.insert(
                pos.coin.clone(),
                PositionDrift {
                    our_size,
                    target_size: pos.size,
                    difference,
                },
            );
        }
    }

    for pos in ours {
        if pos.size.is_zero() || target.iter().any(|t| t.coin == pos.coin) {
            continue;
        }
        drift.insert(
            pos.coin.clone(),
            PositionDrift {
                our_size: pos.size,
                target_size: Decimal::ZERO,
                difference: pos.size.abs(),
            },
        );
    }

    drift
}
