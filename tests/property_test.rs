//! Property tests for the engine invariants.

mod common;

use approx::relative_eq;
use backfolio::domain::backtest::run_backtest;
use backfolio::domain::portfolio::PortfolioWeights;
use backfolio::domain::signal::generate;
use backfolio::domain::strategy::{RsiParams, SmaCrossoverParams, StrategyKind};
use common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn strategy_kind() -> impl Strategy<Value = StrategyKind> {
    prop_oneof![
        Just(StrategyKind::BuyAndHold),
        (1usize..6, 1usize..10).prop_map(|(short, extra)| {
            StrategyKind::MovingAverageCrossover(SmaCrossoverParams::new(short, short + extra).unwrap())
        }),
        (1usize..15, 10.0f64..45.0, 55.0f64..90.0).prop_map(|(period, oversold, overbought)| {
            StrategyKind::RsiThreshold(RsiParams::new(period, oversold, overbought).unwrap())
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn constant_prices_never_move_equity(
        price in 0.5f64..5_000.0,
        days in 1usize..120,
        kind in strategy_kind(),
    ) {
        let series = series_from_closes("A", date(2024, 1, 1), &vec![price; days]);
        let result = run_backtest(&[series], &strategy("p", kind), &sample_config())
            .unwrap()
            .into_result()
            .unwrap();

        prop_assert_eq!(result.performance_metrics.total_return, 0.0);
        prop_assert_eq!(result.performance_metrics.max_drawdown, 0.0);
    }

    #[test]
    fn equal_weights_sum_to_one(n in 1usize..60) {
        let codes: Vec<String> = (0..n).map(|i| format!("C{i}")).collect();
        let weights = PortfolioWeights::equal(codes).unwrap();
        prop_assert_eq!(weights.len(), n);
        prop_assert!((weights.total() - 1.0).abs() <= 1e-9);
    }

    #[test]
    fn normalised_weights_are_accepted(raw in prop::collection::vec(0.01f64..100.0, 1..30)) {
        let sum: f64 = raw.iter().sum();
        let map: BTreeMap<String, f64> = raw
            .iter()
            .enumerate()
            .map(|(i, w)| (format!("C{i}"), w / sum))
            .collect();
        let weights = PortfolioWeights::new(map).unwrap();
        prop_assert!(relative_eq!(weights.total(), 1.0, epsilon = 1e-9));
    }

    #[test]
    fn signals_ignore_future_prices(
        closes in prop::collection::vec(1.0f64..500.0, 2..80),
        cut in 1usize..80,
        kind in strategy_kind(),
    ) {
        let cut = cut.min(closes.len());
        let full = series_from_closes("A", date(2024, 1, 1), &closes);
        let truncated = series_from_closes("A", date(2024, 1, 1), &closes[..cut]);

        let full_signals = generate(&full, &kind).unwrap().signals();
        let prefix_signals = generate(&truncated, &kind).unwrap().signals();
        prop_assert_eq!(&full_signals[..cut], &prefix_signals[..]);
    }

    #[test]
    fn rerunning_is_bit_identical(
        closes in prop::collection::vec(1.0f64..500.0, 2..80),
        kind in strategy_kind(),
    ) {
        let series = series_from_closes("A", date(2024, 1, 1), &closes);
        let strategy = strategy("again", kind);
        let first = run_backtest(std::slice::from_ref(&series), &strategy, &sample_config()).unwrap();
        let second = run_backtest(std::slice::from_ref(&series), &strategy, &sample_config()).unwrap();

        let (first, second) = (first.into_result().unwrap(), second.into_result().unwrap());
        prop_assert_eq!(&first.equity_curve, &second.equity_curve);
        prop_assert_eq!(&first.trades, &second.trades);
    }

    #[test]
    fn buy_and_hold_equity_rises_with_prices(
        steps in prop::collection::vec(0.01f64..10.0, 1..100),
        start in 1.0f64..1_000.0,
    ) {
        let closes: Vec<f64> = std::iter::once(start)
            .chain(steps.iter().scan(start, |price, step| {
                *price += step;
                Some(*price)
            }))
            .collect();
        let series = series_from_closes("A", date(2024, 1, 1), &closes);
        let result = run_backtest(&[series], &buy_and_hold(), &sample_config())
            .unwrap()
            .into_result()
            .unwrap();

        for pair in result.equity_curve.windows(2) {
            prop_assert!(pair[1].capital >= pair[0].capital);
        }
        prop_assert_eq!(result.performance_metrics.max_drawdown, 0.0);
    }

    #[test]
    fn drawdown_is_bounded(closes in prop::collection::vec(1.0f64..500.0, 2..120)) {
        let series = series_from_closes("A", date(2024, 1, 1), &closes);
        let result = run_backtest(&[series], &buy_and_hold(), &sample_config())
            .unwrap()
            .into_result()
            .unwrap();

        let drawdown = result.performance_metrics.max_drawdown;
        prop_assert!((-100.0..=0.0).contains(&drawdown));
    }
}
