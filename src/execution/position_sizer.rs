use rust_decimal::Decimal;

use crate::models::Position;

/// Equity-ratio sizing: `ourEquity / targetEquity * targetSize * multiplier`.
///
/// With zero target equity the ratio is undefined, so the target's size is
/// scaled by the multiplier alone. Returns `None` on arithmetic overflow;
/// callers treat that like a non-positive size and skip the trade.
pub fn calculate_position_size(
    our_equity: Decimal,
    target_equity: Decimal,
    target_size: Decimal,
    size_multiplier: Decimal,
) -> Option<Decimal> {
    if target_equity.is_zero() {
        tracing::warn!(
            target_size = %target_size,
            multiplier = %size_multiplier,
            "Target equity is zero, sizing from raw target size"
        );
        return target_size.checked_mul(size_multiplier);
    }

    let ratio = our_equity.checked_div(target_equity)?;
    ratio.checked_mul(target_size)?.checked_mul(size_multiplier)
}

/// Clamp a size to `ourEquity * maxPositionSizePercent / 100`.
pub fn cap_position_size(
    size: Decimal,
    our_equity: Decimal,
    max_position_size_pct: Decimal,
) -> Decimal {
    match max_position_value(our_equity, max_position_size_pct) {
        Some(max) => size.min(max),
        None => size,
    }
}

/// Largest allowed position value in USD. `None` when the product overflows,
/// in which case no realistic order can exceed it.
pub fn max_position_value(our_equity: Decimal, max_position_size_pct: Decimal) -> Option<Decimal> {
    our_equity
        .checked_mul(max_position_size_pct)?
        .checked_div(Decimal::ONE_HUNDRED)
}

/// Follow the target's leverage on the coin (1x when unknown), capped.
pub fn determine_leverage(target_position: Option<&Position>, max_leverage: u32) -> u32 {
    let leverage = target_position.map(|p| p.leverage.value).unwrap_or(1).max(1);
    leverage.min(max_leverage)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
