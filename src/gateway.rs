//! Abstract exchange boundary consumed by the mirroring core.
//!
//! The Hyperliquid adapter in [`crate::hyperliquid`] implements both traits;
//! tests substitute in-memory doubles.

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::GatewayError;
use crate::models::{AccountEquity, FillEvent, OrderType, Position, Side, WireDecimal};

/// Time-in-force for placed orders. Copy orders are always good-till-cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Alo,
}

/// A fully canonicalized order ready for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub coin: String,
    pub side: Side,
    pub size: WireDecimal,
    pub limit_price: WireDecimal,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    pub leverage: u32,
    /// 128-bit client order id, `0x`-prefixed hex.
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestingOrder {
    pub order_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledOrder {
    pub order_id: u64,
    pub total_size: String,
    pub average_price: String,
}

/// Per-order status from the exchange. At most one branch is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderResponse {
    pub resting: Option<RestingOrder>,
    pub filled: Option<FilledOrder>,
    pub error: Option<String>,
}

impl OrderResponse {
    pub fn order_id(&self) -> Option<u64> {
        self.resting
            .as_ref()
            .map(|r| r.order_id)
            .or_else(|| self.filled.as_ref().map(|f| f.order_id))
    }
}

/// Account queries and order placement.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Margin summary. `Account` error on a malformed response, `Network` otherwise.
    async fn account_equity(&self, address: &str) -> Result<AccountEquity, GatewayError>;

    /// Open perp positions. Malformed entries are skipped, not fatal.
    async fn positions(&self, address: &str) -> Result<Vec<Position>, GatewayError>;

    /// Set cross leverage for a coin on our account.
    async fn update_leverage(&self, coin: &str, leverage: u32) -> Result<(), GatewayError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, GatewayError>;
}

/// Decoded content of one stream message.
#[derive(Debug, Clone)]
pub enum FillMessage {
    Fills(Vec<FillEvent>),
    /// Historical replay sent right after subscribing; never mirrored.
    Snapshot(usize),
    /// Subscription acks, pongs and other channels.
    Ignored,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to decode stream message: {0}")]
pub struct DecodeError(pub String);

/// An open, subscribed connection delivering raw text frames.
#[async_trait]
pub trait FillConnection: Send {
    /// Next text frame. `None` once the connection is closed for any reason.
    async fn recv(&mut self) -> Option<String>;

    async fn close(&mut self);
}

/// Factory for fill subscriptions on a given address.
#[async_trait]
pub trait FillTransport: Send + Sync + 'static {
    /// Open a connection and send the subscribe request for `address`.
    async fn connect(&self, address: &str) -> Result<Box<dyn FillConnection>, GatewayError>;

    fn decode(&self, raw: &str) -> Result<FillMessage, DecodeError>;
}
