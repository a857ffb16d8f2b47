use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use crate::models::{CopyTradeParams, FillEvent, HealthCheckResult, TradeResult};

/// Outbound notifications. Every method is fire-and-forget: implementations
/// log their own failures and never block the caller's flow on them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn trade_copied(&self, fill: &FillEvent, params: &CopyTradeParams, result: &TradeResult);

    async fn error(&self, message: &str, context: &BTreeMap<String, String>);

    async fn health_check(&self, result: &HealthCheckResult);

    async fn startup(&self, summary: &str);

    async fn shutdown(&self, reason: &str);
}

/// Sink used when no notification channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn trade_copied(&self, _: &FillEvent, _: &CopyTradeParams, _: &TradeResult) {}
    async fn error(&self, _: &str, _: &BTreeMap<String, String>) {}
    async fn health_check(&self, _: &HealthCheckResult) {}
    async fn startup(&self, _: &str) {}
    async fn shutdown(&self, _: &str) {}
}

/// Telegram notification service. Failures are logged but never block the main flow.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: "https://api.telegram.org".to_string(),
            bot_token,
            chat_id,
        }
    }

    /// Point the notifier at a different Bot API host (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Send a Telegram message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(
                        status = %resp.status(),
                        "Telegram sendMessage returned non-2xx"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn trade_copied(&self, fill: &FillEvent, params: &CopyTradeParams, result: &TradeResult) {
        self.send(&format_trade_copied(fill, params, result)).await;
    }

    async fn error(&self, message: &str, context: &BTreeMap<String, String>) {
        self.send(&format_error(message, context)).await;
    }

    async fn health_check(&self, result: &HealthCheckResult) {
        self.send(&format_health_check(result)).await;
    }

    async fn startup(&self, summary: &str) {
        self.send(&format!("*Copy Trader Started*\n{summary}")).await;
    }

    async fn shutdown(&self, reason: &str) {
        self.send(&format!("*Copy Trader Stopped*\nReason: {reason}")).await;
    }
}

/// Format a copied-trade message.
pub fn format_trade_copied(fill: &FillEvent, params: &CopyTradeParams, result: &TradeResult) -> String {
    let mode = if result.dry_run { " [DRY-RUN]" } else { "" };
    if result.success {
        format!(
            "*Trade Copied*{}\nCoin: {}\nTarget: {} {} @ {}\nOurs: {} {} ({}) {}x\nOrder: `{}`",
            mode,
            params.coin,
            fill.direction,
            fill.size,
            fill.price,
            params.side,
            params.size,
            params.action,
            params.leverage,
            result.order_id.as_deref().unwrap_or("-"),
        )
    } else {
        format!(
            "*Copy Failed*\nCoin: {}\nOurs: {} {} ({})\nAttempts: {}\nError: {}",
            params.coin,
            params.side,
            params.size,
            params.action,
            result.attempts,
            result.error_message.as_deref().unwrap_or("unknown"),
        )
    }
}

/// Format an error with its context as `key: value` lines.
pub fn format_error(message: &str, context: &BTreeMap<String, String>) -> String {
    let mut text = format!("*Error*\n{message}");
    for (key, value) in context {
        text.push_str(&format!("\n{key}: {value}"));
    }
    text
}

/// Format a health-check report listing every drifted coin.
pub fn format_health_check(result: &HealthCheckResult) -> String {
    if result.is_healthy() {
        return format!(
            "*Health Check OK*\nOur equity: ${}\nTarget equity: ${}",
            result.our_equity.account_value.round_dp(2),
            result.target_equity.account_value.round_dp(2),
        );
    }

    let mut text = format!("*Position Drift* ({} coins)", result.drift.len());
    for (coin, drift) in &result.drift {
        text.push_str(&format!(
            "\n{}: ours {} / target {} (diff {})",
            coin, drift.our_size, drift.target_size, drift.difference
        ));
    }
    text
}
