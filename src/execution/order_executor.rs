use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::GatewayError;
use crate::gateway::{ExchangeGateway, OrderRequest, TimeInForce};
use crate::models::{CopyTradeParams, Side, TradeResult, WireDecimal};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Order id reported for dry-run executions.
pub const DRY_RUN_ORDER_ID: &str = "dry-run";

#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("ambiguous order response: neither resting nor filled")]
    AmbiguousResponse,
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::Gateway(e) => e.is_retryable(),
            ExecutionError::Rejected(_) => false,
            ExecutionError::AmbiguousResponse => true,
        }
    }
}

/// Places copy orders through the gateway with bounded retries.
///
/// `execute` never fails: every outcome, including exhausted retries, comes
/// back as a [`TradeResult`].
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    retry_policy: RetryPolicy,
    dry_run: bool,
    /// Percent the limit price is moved through the book so the GTC order fills.
    slippage_pct: Decimal,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, dry_run: bool, slippage_pct: Decimal) -> Self {
        Self {
            gateway,
            retry_policy: RetryPolicy::default(),
            dry_run,
            slippage_pct,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Canonical wire order for a set of copy params.
    pub fn build_order(&self, params: &CopyTradeParams) -> OrderRequest {
        let limit_price = marketable_price(params.side, params.reference_price, self.slippage_pct);
        OrderRequest {
            coin: params.coin.clone(),
            side: params.side,
            size: WireDecimal::from(params.size),
            limit_price: WireDecimal::from(limit_price),
            order_type: params.order_type,
            time_in_force: TimeInForce::Gtc,
            reduce_only: params.reduce_only,
            leverage: params.leverage,
            client_order_id: Some(format!("0x{}", Uuid::new_v4().simple())),
        }
    }

    /// Execute a copy-trade order:
    /// 1. Dry-run short-circuit (no network calls at all)
    /// 2. Best-effort leverage update
    /// 3. Place the order, retrying transient failures
    pub async fn execute(&self, params: &CopyTradeParams) -> TradeResult {
        let order = self.build_order(params);

        if self.dry_run {
            tracing::info!(
                coin = %order.coin,
                side = %order.side,
                size = %order.size,
                limit_price = %order.limit_price,
                reduce_only = order.reduce_only,
                leverage = order.leverage,
                "[DRY-RUN] Would place order"
            );
            return TradeResult {
                dry_run: true,
                ..TradeResult::succeeded(params.clone(), DRY_RUN_ORDER_ID.to_string(), 0)
            };
        }

        if order.leverage > 1 {
            if let Err(e) = self.gateway.update_leverage(&order.coin, order.leverage).await {
                tracing::warn!(
                    coin = %order.coin,
                    leverage = order.leverage,
                    error = %e,
                    "Failed to set leverage, placing order anyway"
                );
            }
        }

        tracing::info!(
            coin = %order.coin,
            side = %order.side,
            size = %order.size,
            limit_price = %order.limit_price,
            reduce_only = order.reduce_only,
            "Placing order"
        );

        let gateway = &self.gateway;
        let order_ref = &order;
        let outcome = retry_with_backoff(
            &self.retry_policy,
            "place_order",
            |_attempt| async move {
                let response = gateway.place_order(order_ref).await?;
                if let Some(order_id) = response.order_id() {
                    return Ok(order_id);
                }
                match response.error {
                    Some(msg) => Err(ExecutionError::Rejected(msg)),
                    None => Err(ExecutionError::AmbiguousResponse),
                }
            },
            ExecutionError::is_retryable,
        )
        .await;

        match outcome {
            Ok((order_id, attempts)) => {
                tracing::info!(coin = %order.coin, order_id, attempts, "Order placed");
                TradeResult::succeeded(params.clone(), order_id.to_string(), attempts)
            }
            Err(failure) => {
                metrics::counter!("orders_failed_total").increment(1);
                tracing::error!(
                    coin = %order.coin,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Order execution failed"
                );
                TradeResult::failed(params.clone(), failure.error.to_string(), failure.attempts)
            }
        }
    }
}

/// Move the reference price through the book: up for buys, down for sells.
pub fn marketable_price(side: Side, reference: Decimal, slippage_pct: Decimal) -> Decimal {
    let factor = slippage_pct / Decimal::ONE_HUNDRED;
    match side {
        Side::Buy => reference * (Decimal::ONE + factor),
        Side::Sell => reference * (Decimal::ONE - factor),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{FilledOrder, OrderResponse, RestingOrder};
    use crate::models::{AccountEquity, OrderType, Position, TradeAction};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Gateway double that replays scripted order responses.
    #[derive(Default)]
    struct ScriptedGateway {
        responses: Mutex<VecDeque<Result<OrderResponse, GatewayError>>>,
        orders: Mutex<Vec<OrderRequest>>,
        leverage_calls: Mutex<Vec<(String, u32)>>,
        fail_leverage: bool,
    }

    impl ScriptedGateway {
        fn with_responses(responses: Vec<Result<OrderResponse, GatewayError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for ScriptedGateway {
        async fn account_equity(&self, _address: &str) -> Result<AccountEquity, GatewayError> {
            Ok(AccountEquity::default())
        }

        async fn positions(&self, _address: &str) -> Result<Vec<Position>, GatewayError> {
            Ok(Vec::new())
        }

        async fn update_leverage(&self, coin: &str, leverage: u32) -> Result<(), GatewayError> {
            self.leverage_calls.lock().unwrap().push((coin.to_string(), leverage));
            if self.fail_leverage {
                return Err(GatewayError::Network("leverage endpoint down".into()));
            }
            Ok(())
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, GatewayError> {
            self.orders.lock().unwrap().push(order.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Network("no scripted response".into())))
        }
    }

    fn params(leverage: u32) -> CopyTradeParams {
        CopyTradeParams {
            coin: "ETH".into(),
            action: TradeAction::Open,
            side: Side::Buy,
            size: dec!(1.500),
            reference_price: dec!(2000.0),
            order_type: OrderType::Market,
            reduce_only: false,
            leverage,
        }
    }

    fn resting(order_id: u64) -> Result<OrderResponse, GatewayError> {
        Ok(OrderResponse {
            resting: Some(RestingOrder { order_id }),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls() {
        let gateway = Arc::new(ScriptedGateway::default());
        let executor = OrderExecutor::new(gateway.clone(), true, dec!(5));

        let result = executor.execute(&params(5)).await;

        assert!(result.success);
        assert!(result.dry_run);
        assert_eq!(result.order_id.as_deref(), Some(DRY_RUN_ORDER_ID));
        assert!(gateway.orders.lock().unwrap().is_empty());
        assert!(gateway.leverage_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_is_canonicalized() {
        let gateway = Arc::new(ScriptedGateway::with_responses(vec![resting(11)]));
        let executor = OrderExecutor::new(gateway.clone(), false, dec!(5));

        let result = executor.execute(&params(1)).await;

        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("11"));
        let orders = gateway.orders.lock().unwrap();
        assert_eq!(orders[0].size.as_str(), "1.5");
        assert_eq!(orders[0].limit_price.as_str(), "2100");
        assert_eq!(orders[0].time_in_force, TimeInForce::Gtc);
        // Leverage 1 needs no update
        assert!(gateway.leverage_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leverage_failure_does_not_abort() {
        let gateway = Arc::new(ScriptedGateway {
            fail_leverage: true,
            ..ScriptedGateway::with_responses(vec![Ok(OrderResponse {
                filled: Some(FilledOrder {
                    order_id: 5,
                    total_size: "1.5".into(),
                    average_price: "2001".into(),
                }),
                ..Default::default()
            })])
        });
        let executor = OrderExecutor::new(gateway.clone(), false, dec!(5));

        let result = executor.execute(&params(5)).await;

        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("5"));
        assert_eq!(
            gateway.leverage_calls.lock().unwrap().as_slice(),
            &[("ETH".to_string(), 5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguous_response_is_retried() {
        let gateway = Arc::new(ScriptedGateway::with_responses(vec![
            Ok(OrderResponse::default()),
            Err(GatewayError::Network("timeout".into())),
            resting(99),
        ]));
        let executor = OrderExecutor::new(gateway.clone(), false, dec!(5));

        let result = executor.execute(&params(1)).await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(gateway.orders.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let gateway = Arc::new(ScriptedGateway::with_responses(vec![Ok(OrderResponse {
            error: Some("Order has invalid size.".into()),
            ..Default::default()
        })]));
        let executor = OrderExecutor::new(gateway.clone(), false, dec!(5));

        let result = executor.execute(&params(1)).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert!(result.error_message.unwrap().contains("invalid size"));
        assert_eq!(gateway.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_failed_result() {
        let gateway = Arc::new(ScriptedGateway::with_responses(vec![
            Err(GatewayError::RateLimited("slow down".into())),
            Err(GatewayError::RateLimited("slow down".into())),
            Err(GatewayError::Network("connection reset".into())),
        ]));
        let executor = OrderExecutor::new(gateway.clone(), false, dec!(5));

        let result = executor.execute(&params(1)).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(
            result.error_message.as_deref(),
            Some("network error: connection reset")
        );
    }

    #[test]
    fn test_marketable_price() {
        assert_eq!(marketable_price(Side::Buy, dec!(100), dec!(5)), dec!(105));
        assert_eq!(marketable_price(Side::Sell, dec!(100), dec!(5)), dec!(95));
    }
}
