use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Side;

/// What mirroring a fill means for our own position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Open,
    Reduce,
    Close,
}

impl TradeAction {
    pub fn is_reduce_only(self) -> bool {
        !matches!(self, TradeAction::Open)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Open => write!(f, "open"),
            TradeAction::Reduce => write!(f, "reduce"),
            TradeAction::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Aggressively priced GTC limit order, the exchange's market-order form.
    Market,
    Limit,
}

/// Computed order intent for one fill. Built fresh per fill, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyTradeParams {
    pub coin: String,
    pub action: TradeAction,
    pub side: Side,
    pub size: Decimal,
    /// The target's fill price; the executor derives the limit price from it.
    pub reference_price: Decimal,
    pub order_type: OrderType,
    pub reduce_only: bool,
    pub leverage: u32,
}

impl CopyTradeParams {
    /// `size × reference_price`, `None` on overflow.
    pub fn notional(&self) -> Option<Decimal> {
        self.size.checked_mul(self.reference_price)
    }
}

/// Outcome of one execution attempt sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub error_message: Option<String>,
    pub params: CopyTradeParams,
    pub attempts: u32,
    pub dry_run: bool,
}

impl TradeResult {
    pub fn succeeded(params: CopyTradeParams, order_id: String, attempts: u32) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            error_message: None,
            params,
            attempts,
            dry_run: false,
        }
    }

    pub fn failed(params: CopyTradeParams, error: String, attempts: u32) -> Self {
        Self {
            success: false,
            order_id: None,
            error_message: Some(error),
            params,
            attempts,
            dry_run: false,
        }
    }
}
