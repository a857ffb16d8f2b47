use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::{
    AccountEquity, CopyTradeParams, Direction, FillEvent, OrderType, Position, Side, TradeAction,
};

use super::position_sizer::{
    calculate_position_size, cap_position_size, determine_leverage, max_position_value,
};

/// Configurable risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Extra scale applied on top of the equity ratio (default 1.0).
    pub size_multiplier: Decimal,
    /// Leverage ceiling (default 10x).
    pub max_leverage: u32,
    /// Max single position value as percent of our equity (default 50).
    pub max_position_size_pct: Decimal,
    /// Smallest order notional the exchange accepts, in USD (default 10).
    pub min_notional: Decimal,
    /// Max coins mirrored at the same time (default 5).
    pub max_concurrent_trades: usize,
    /// Coins never copied, compared case-insensitively.
    pub blocked_assets: Vec<String>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            size_multiplier: Decimal::ONE,
            max_leverage: 10,
            max_position_size_pct: Decimal::from(50),
            min_notional: Decimal::from(10),
            max_concurrent_trades: 5,
            blocked_assets: Vec::new(),
        }
    }
}

impl RiskLimits {
    pub fn is_blocked(&self, coin: &str) -> bool {
        self.blocked_assets
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(coin))
    }
}

/// Risk check violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskViolation {
    #[error("asset {coin} is blocked")]
    BlockedAsset { coin: String },

    #[error("order notional overflows")]
    NotionalOverflow,

    #[error("notional {notional} below minimum {min}")]
    BelowMinNotional { notional: Decimal, min: Decimal },

    #[error("leverage {leverage}x exceeds max {max}x")]
    LeverageTooHigh { leverage: u32, max: u32 },

    #[error("position value {notional} exceeds max {max} ({pct}% of equity)")]
    PositionTooLarge {
        notional: Decimal,
        max: Decimal,
        pct: Decimal,
    },
}

/// Why a fill was deliberately not mirrored.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    ConcurrencyLimit { active: usize, max: usize },
    NonPositiveSize { size: Option<Decimal> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ConcurrencyLimit { active, max } => {
                write!(f, "max concurrent trades reached ({active}/{max})")
            }
            SkipReason::NonPositiveSize { size: Some(size) } => {
                write!(f, "computed size {size} is not positive")
            }
            SkipReason::NonPositiveSize { size: None } => {
                write!(f, "computed size overflowed")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CopyDecision {
    Trade(CopyTradeParams),
    Skip(SkipReason),
    Rejected(RiskViolation),
}

/// Both accounts' state at the time a fill is processed.
#[derive(Debug, Clone, Copy)]
pub struct MirrorSnapshot<'a> {
    pub our_equity: &'a AccountEquity,
    pub target_equity: &'a AccountEquity,
    pub target_positions: &'a [Position],
    /// Coins currently tracked in the trade ledger.
    pub active_trades: usize,
    /// Whether the fill's coin is already one of the tracked coins.
    pub coin_tracked: bool,
}

/// Classify a fill: opens open, closes close only when they flattened the
/// target's pre-fill position, everything else reduces.
pub fn classify_action(fill: &FillEvent) -> TradeAction {
    if fill.direction.is_open() {
        TradeAction::Open
    } else if fill.direction.is_close() && fill.start_position.abs() <= fill.size {
        TradeAction::Close
    } else {
        TradeAction::Reduce
    }
}

/// Order side for our mirror order.
pub fn determine_side(
    action: TradeAction,
    fill: &FillEvent,
    target_position: Option<&Position>,
) -> Side {
    match action {
        TradeAction::Open => match fill.direction {
            Direction::OpenLong => Side::Buy,
            Direction::OpenShort => Side::Sell,
            _ => fill.side,
        },
        TradeAction::Reduce | TradeAction::Close => match target_position {
            Some(pos) if pos.size > Decimal::ZERO => Side::Sell,
            Some(pos) if pos.size < Decimal::ZERO => Side::Buy,
            _ => fill.side,
        },
    }
}

/// Validation gate, run in fixed order; the first failure wins.
pub fn validate_trade(
    params: &CopyTradeParams,
    our_equity: Decimal,
    limits: &RiskLimits,
) -> Result<(), RiskViolation> {
    // 1. Blocked asset
    if limits.is_blocked(&params.coin) {
        return Err(RiskViolation::BlockedAsset {
            coin: params.coin.clone(),
        });
    }

    // 2. Minimum notional
    let Some(notional) = params.notional() else {
        return Err(RiskViolation::NotionalOverflow);
    };
    if notional < limits.min_notional {
        return Err(RiskViolation::BelowMinNotional {
            notional,
            min: limits.min_notional,
        });
    }

    // 3. Leverage ceiling
    if params.leverage > limits.max_leverage {
        return Err(RiskViolation::LeverageTooHigh {
            leverage: params.leverage,
            max: limits.max_leverage,
        });
    }

    // 4. Position value vs equity
    if let Some(max) = max_position_value(our_equity, limits.max_position_size_pct) {
        if notional > max {
            return Err(RiskViolation::PositionTooLarge {
                notional,
                max,
                pct: limits.max_position_size_pct,
            });
        }
    }

    Ok(())
}

/// Turn a target fill into our mirror order, or explain why not.
pub fn evaluate(fill: &FillEvent, snapshot: &MirrorSnapshot<'_>, limits: &RiskLimits) -> CopyDecision {
    let action = classify_action(fill);

    if action == TradeAction::Open
        && !snapshot.coin_tracked
        && snapshot.active_trades >= limits.max_concurrent_trades
    {
        return CopyDecision::Skip(SkipReason::ConcurrencyLimit {
            active: snapshot.active_trades,
            max: limits.max_concurrent_trades,
        });
    }

    let our_equity = snapshot.our_equity.account_value;
    let raw = calculate_position_size(
        our_equity,
        snapshot.target_equity.account_value,
        fill.size,
        limits.size_multiplier,
    );
    let size = match raw {
        Some(size) if size > Decimal::ZERO => {
            cap_position_size(size, our_equity, limits.max_position_size_pct)
        }
        other => return CopyDecision::Skip(SkipReason::NonPositiveSize { size: other }),
    };
    if size <= Decimal::ZERO {
        return CopyDecision::Skip(SkipReason::NonPositiveSize { size: Some(size) });
    }

    let target_position = snapshot
        .target_positions
        .iter()
        .find(|p| p.coin == fill.coin);

    let params = CopyTradeParams {
        coin: fill.coin.clone(),
        action,
        side: determine_side(action, fill, target_position),
        size,
        reference_price: fill.price,
        order_type: OrderType::Market,
        reduce_only: action.is_reduce_only(),
        leverage: determine_leverage(target_position, limits.max_leverage),
    };

    match validate_trade(&params, our_equity, limits) {
        Ok(()) => CopyDecision::Trade(params),
        Err(violation) => CopyDecision::Rejected(violation),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
