mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;

use hypercopy::execution::position_sizer::{
    calculate_position_size, cap_position_size, max_position_value,
};
use hypercopy::execution::risk_engine::{evaluate, CopyDecision, MirrorSnapshot, RiskLimits};
use hypercopy::models::{AccountEquity, Direction};

fn dec_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn equity(value: Decimal) -> AccountEquity {
    AccountEquity {
        account_value: value,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn test_size_scales_with_equity_ratio(
        target_equity in 1i64..1_000_000,
        ratio_pct in 1i64..400,
        size_cents in 1i64..1_000_000,
        mult_pct in 1i64..300,
    ) {
        let target = Decimal::from(target_equity);
        let ratio = Decimal::new(ratio_pct, 2);
        let ours = target * ratio;
        let size = dec_cents(size_cents);
        let mult = Decimal::new(mult_pct, 2);

        let sized = calculate_position_size(ours, target, size, mult).unwrap();
        prop_assert_eq!(sized, ratio * size * mult);
    }

    #[test]
    fn test_zero_target_equity_uses_raw_size(
        our_equity in 0i64..1_000_000,
        size_cents in 1i64..1_000_000,
        mult_pct in 1i64..300,
    ) {
        let size = dec_cents(size_cents);
        let mult = Decimal::new(mult_pct, 2);

        let sized = calculate_position_size(Decimal::from(our_equity), Decimal::ZERO, size, mult);
        prop_assert_eq!(sized, Some(size * mult));
    }

    #[test]
    fn test_cap_never_exceeds_limit_or_input(
        size_cents in 0i64..100_000_000,
        equity_cents in 0i64..100_000_000,
        pct in 1i64..=100,
    ) {
        let size = dec_cents(size_cents);
        let eq = dec_cents(equity_cents);
        let pct = Decimal::from(pct);

        let capped = cap_position_size(size, eq, pct);
        let max = max_position_value(eq, pct).unwrap();
        prop_assert!(capped <= size);
        prop_assert!(capped <= max);
        if size <= max {
            prop_assert_eq!(capped, size);
        }
    }

    #[test]
    fn test_approved_opens_respect_every_limit(
        our_equity in 100i64..100_000,
        target_equity in 100i64..1_000_000,
        size_cents in 1i64..10_000,
        price_cents in 1i64..10_000_000,
        leverage in 1u32..50,
    ) {
        let limits = RiskLimits::default();
        let ours = equity(Decimal::from(our_equity));
        let theirs = equity(Decimal::from(target_equity));
        let positions = vec![common::position("ETH", dec_cents(size_cents), leverage)];
        let snapshot = MirrorSnapshot {
            our_equity: &ours,
            target_equity: &theirs,
            target_positions: &positions,
            active_trades: 0,
            coin_tracked: false,
        };
        let fill = common::fill(
            "ETH",
            Direction::OpenLong,
            dec_cents(size_cents),
            dec_cents(price_cents),
            Decimal::ZERO,
        );

        if let CopyDecision::Trade(params) = evaluate(&fill, &snapshot, &limits) {
            prop_assert!(params.size > Decimal::ZERO);
            prop_assert!(params.leverage <= limits.max_leverage);
            let notional = params.notional().unwrap();
            let max = max_position_value(ours.account_value, limits.max_position_size_pct).unwrap();
            prop_assert!(notional >= limits.min_notional);
            prop_assert!(notional <= max);
            prop_assert!(!params.reduce_only);
        }
    }
}
