pub mod fill;
pub mod health;
pub mod position;
pub mod trade;
pub mod wire;

pub use fill::FillEvent;
pub use health::{HealthCheckResult, PositionDrift};
pub use position::{AccountEquity, Leverage, LeverageKind, Position};
pub use trade::{CopyTradeParams, OrderType, TradeAction, TradeResult};
pub use wire::WireDecimal;

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Order / fill side. Hyperliquid encodes bids as `"B"` and asks as `"A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "B" | "BID" | "BUY" => Some(Side::Buy),
            "A" | "ASK" | "SELL" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Direction: the exchange's description of what a fill did to the position
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
    /// Flips ("Long > Short"), spot fills, liquidations and anything unknown.
    Other(String),
}

impl Direction {
    pub fn from_api_str(s: &str) -> Self {
        match s.trim() {
            "Open Long" => Direction::OpenLong,
            "Close Long" => Direction::CloseLong,
            "Open Short" => Direction::OpenShort,
            "Close Short" => Direction::CloseShort,
            other => Direction::Other(other.to_string()),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Direction::OpenLong | Direction::OpenShort)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Direction::CloseLong | Direction::CloseShort)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::OpenLong => write!(f, "Open Long"),
            Direction::CloseLong => write!(f, "Close Long"),
            Direction::OpenShort => write!(f, "Open Short"),
            Direction::CloseShort => write!(f, "Close Short"),
            Direction::Other(raw) => write!(f, "{raw}"),
        }
    }
}
