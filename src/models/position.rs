use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeverageKind {
    Cross,
    Isolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leverage {
    pub kind: LeverageKind,
    pub value: u32,
}

/// Snapshot of one perp position. Never updated in place; re-fetch instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub coin: String,
    /// Signed size: positive long, negative short.
    pub size: Decimal,
    pub entry_price: Option<Decimal>,
    pub leverage: Leverage,
    pub liquidation_price: Option<Decimal>,
    pub margin_used: Decimal,
    pub unrealized_pnl: Decimal,
    pub position_value: Decimal,
}

/// Account-level margin summary, one snapshot per query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountEquity {
    pub account_value: Decimal,
    pub total_margin_used: Decimal,
    pub total_notional_position: Decimal,
    pub total_raw_usd: Decimal,
    pub withdrawable: Decimal,
}
