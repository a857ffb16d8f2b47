use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Direction, Side};

/// One fill notification for the monitored address. Core pipeline message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub coin: String,
    pub price: Decimal,
    pub size: Decimal,
    pub side: Side,
    pub direction: Direction,
    /// Signed position size before this fill was applied.
    pub start_position: Decimal,
    pub timestamp: DateTime<Utc>,
    pub hash: Option<String>,
    pub order_id: Option<u64>,
    pub trade_id: Option<u64>,
    pub closed_pnl: Option<Decimal>,
    pub fee: Option<Decimal>,
}

impl FillEvent {
    pub fn notional(&self) -> Decimal {
        self.size * self.price
    }
}

impl fmt::Display for FillEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fill: coin={} dir={} side={} size={} price={} start={}",
            self.coin, self.direction, self.side, self.size, self.price, self.start_position,
        )
    }
}
