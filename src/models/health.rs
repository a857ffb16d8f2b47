use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AccountEquity, Position};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDrift {
    pub our_size: Decimal,
    pub target_size: Decimal,
    pub difference: Decimal,
}

/// Result of one health-check cycle. Only the latest one is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub timestamp: DateTime<Utc>,
    pub our_positions: Vec<Position>,
    pub target_positions: Vec<Position>,
    pub our_equity: AccountEquity,
    pub target_equity: AccountEquity,
    pub drift: BTreeMap<String, PositionDrift>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.drift.is_empty()
    }
}
