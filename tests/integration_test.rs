//! Integration tests for the backtest pipeline.
//!
//! Tests cover:
//! - Full backtest over a mock data port with repeated crossovers
//! - No look-ahead: future bars never change earlier ticks
//! - Equal weighting of simultaneous entries
//! - Dollar-volume universe selection
//! - Partial universe loading (some codes skipped, others proceed)
//! - Portfolio accounting and metrics consistency

mod common;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use common::*;
use macross::domain::backtest::{run_backtest, warmup_start, BacktestConfig, BacktestResult};
use macross::domain::code_data::build_unified_timeline;
use macross::domain::error::MacrossError;
use macross::domain::execution::{ExecutionConfig, SlippageModel};
use macross::domain::metrics::Metrics;
use macross::domain::strategy::CrossoverConfig;
use macross::domain::universe::{load_universe, SkipReason, UniverseRule};
use std::collections::HashMap;

fn start() -> NaiveDate {
    date(2022, 2, 1)
}

fn end() -> NaiveDate {
    date(2022, 7, 1)
}

fn config() -> BacktestConfig {
    BacktestConfig {
        start_date: start(),
        end_date: end(),
        initial_capital: 100_000.0,
        risk_free_rate: 0.0,
        exchange: "US".into(),
        benchmark: None,
        execution: ExecutionConfig {
            slippage: SlippageModel::Fixed { spread: 0.0 },
            ..ExecutionConfig::default()
        },
    }
}

fn wave_port(codes: &[&str], days: usize) -> MockDataPort {
    let closes = wave_closes(days, 100.0, 20.0, 40.0);
    codes.iter().fold(MockDataPort::new(), |port, code| {
        port.with_bars(code, bars_from_closes(code, date(2022, 1, 1), &closes, 100_000))
    })
}

fn run(
    port: &MockDataPort,
    codes: &[&str],
    strategy: &CrossoverConfig,
    rule: &UniverseRule,
) -> BacktestResult {
    let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    let loaded = load_universe(
        port,
        &codes,
        "US",
        warmup_start(start(), strategy.lookback()),
        end(),
        strategy.lookback(),
    )
    .unwrap();
    let timeline = build_unified_timeline(&loaded.data);
    run_backtest(&loaded.data, &timeline, strategy, rule, &config()).unwrap()
}

mod full_backtest_pipeline {
    use super::*;

    #[test]
    fn wave_prices_produce_round_trips() {
        let port = wave_port(&["AAPL"], 200);
        let result = run(&port, &["AAPL"], &fast_strategy(), &UniverseRule::Static);

        assert!(!result.portfolio.closed_trades.is_empty());
        for trade in &result.portfolio.closed_trades {
            assert_eq!(trade.code, "AAPL");
            assert!(trade.entry_date >= start());
            assert!(trade.exit_date > trade.entry_date);
        }
    }

    #[test]
    fn equity_curve_covers_every_tick_in_range() {
        let port = wave_port(&["AAPL", "MSFT"], 200);
        let result = run(&port, &["AAPL", "MSFT"], &fast_strategy(), &UniverseRule::Static);

        let expected = (end() - start()).num_days() as usize + 1;
        assert_eq!(result.portfolio.equity_curve.len(), expected);
        assert_eq!(result.ticks.len(), expected);
        assert_eq!(result.portfolio.equity_curve[0].date, start());
    }

    #[test]
    fn every_exit_is_a_full_liquidation() {
        let port = wave_port(&["AAPL"], 200);
        let result = run(&port, &["AAPL"], &fast_strategy(), &UniverseRule::Static);

        let exits: usize = result.ticks.iter().map(|t| t.decision.exits.len()).sum();
        assert!(exits > 0);
        for tick in &result.ticks {
            for exit in &tick.decision.exits {
                assert_eq!(tick.decision.weight_of(&exit.code), Some(0.0));
                let fill = tick.fills.iter().find(|f| f.code == exit.code).unwrap();
                assert!(fill.quantity < 0);
                assert_eq!(fill.unfilled, 0);
            }
        }
    }
}

mod look_ahead {
    use super::*;

    #[test]
    fn future_bars_do_not_change_past_ticks() {
        let full = wave_port(&["AAPL"], 200);
        let truncated = wave_port(&["AAPL"], 150);
        let strategy = fast_strategy();

        let a = run(&full, &["AAPL"], &strategy, &UniverseRule::Static);
        let b = run(&truncated, &["AAPL"], &strategy, &UniverseRule::Static);

        assert!(b.ticks.len() < a.ticks.len());
        for (x, y) in a.ticks.iter().zip(&b.ticks) {
            assert_eq!(x.date, y.date);
            assert_eq!(x.decision, y.decision);
            assert_eq!(x.fills, y.fills);
            assert_relative_eq!(x.equity, y.equity, epsilon = 1e-9);
        }
    }
}

mod equal_weighting {
    use super::*;

    #[test]
    fn simultaneous_entries_split_evenly() {
        let port = wave_port(&["AAPL", "MSFT"], 200);
        let result = run(&port, &["AAPL", "MSFT"], &fast_strategy(), &UniverseRule::Static);

        let first_entry = result
            .ticks
            .iter()
            .find(|t| !t.decision.cross_up.is_empty())
            .unwrap();
        assert_eq!(first_entry.decision.cross_up, vec!["AAPL", "MSFT"]);
        assert_eq!(first_entry.decision.weight_of("AAPL"), Some(0.5));
        assert_eq!(first_entry.decision.weight_of("MSFT"), Some(0.5));

        let total: f64 = first_entry
            .decision
            .instructions
            .iter()
            .map(|i| i.target_weight)
            .sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }
}

mod dollar_volume_universe {
    use super::*;

    #[test]
    fn only_the_most_liquid_instrument_trades() {
        let closes = wave_closes(200, 100.0, 20.0, 40.0);
        let port = MockDataPort::new()
            .with_bars("THIN", bars_from_closes("THIN", date(2022, 1, 1), &closes, 1_000))
            .with_bars("DEEP", bars_from_closes("DEEP", date(2022, 1, 1), &closes, 500_000));
        let rule = UniverseRule::TopDollarVolume {
            top_n: 1,
            window: 5,
        };

        let result = run(&port, &["THIN", "DEEP"], &fast_strategy(), &rule);

        assert!(!result.portfolio.closed_trades.is_empty());
        assert!(result.portfolio.closed_trades.iter().all(|t| t.code == "DEEP"));
        assert!(result.portfolio.positions.keys().all(|c| c == "DEEP"));
        assert!(result.ticks.iter().all(|t| t.universe <= 1));
    }
}

mod partial_universe {
    use super::*;

    #[test]
    fn failing_and_short_codes_are_skipped() {
        let strategy = fast_strategy();
        let port = wave_port(&["AAPL"], 200)
            .with_error("BROKEN", "disk error")
            .with_bars("NEW", generate_bars("NEW", date(2022, 1, 28), 3, 50.0));
        let codes: Vec<String> = ["AAPL", "BROKEN", "NEW", "GONE"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let loaded = load_universe(
            &port,
            &codes,
            "US",
            warmup_start(start(), strategy.lookback()),
            end(),
            strategy.lookback(),
        )
        .unwrap();

        assert_eq!(loaded.data.len(), 1);
        assert_eq!(loaded.data[0].code, "AAPL");
        let reasons: HashMap<&str, &SkipReason> = loaded
            .skipped
            .iter()
            .map(|s| (s.code.as_str(), &s.reason))
            .collect();
        assert!(matches!(reasons["BROKEN"], SkipReason::NoData));
        assert!(matches!(reasons["GONE"], SkipReason::NoData));
        assert!(matches!(reasons["NEW"], SkipReason::InsufficientBars { bars: 3 }));
    }

    #[test]
    fn nothing_loadable_is_insufficient_data() {
        let port = MockDataPort::new().with_error("AAPL", "gone");
        let result = load_universe(
            &port,
            &["AAPL".to_string()],
            "US",
            start(),
            end(),
            9,
        );
        assert!(matches!(result, Err(MacrossError::InsufficientData { .. })));
    }
}

mod accounting {
    use super::*;

    #[test]
    fn final_equity_is_cash_plus_marked_positions() {
        let port = wave_port(&["AAPL", "MSFT"], 200);
        let result = run(&port, &["AAPL", "MSFT"], &fast_strategy(), &UniverseRule::Static);
        let portfolio = &result.portfolio;

        assert!(portfolio.cash >= 0.0);
        let last_date = portfolio.equity_curve.last().unwrap().date;
        let marked: f64 = portfolio
            .positions
            .values()
            .map(|p| {
                let bars = port.data.get(&p.code).unwrap();
                let close = bars.iter().find(|b| b.date == last_date).unwrap().close;
                p.market_value(close)
            })
            .sum();
        assert_relative_eq!(
            portfolio.equity_curve.last().unwrap().equity,
            portfolio.cash + marked,
            epsilon = 1e-6
        );
    }

    #[test]
    fn metrics_agree_with_portfolio() {
        let port = wave_port(&["AAPL"], 200);
        let result = run(&port, &["AAPL"], &fast_strategy(), &UniverseRule::Static);
        let metrics = Metrics::compute(&result.portfolio, 0.0, None);

        assert_eq!(metrics.total_trades, result.portfolio.closed_trades.len());
        assert!(metrics.trades_won + metrics.trades_lost <= metrics.total_trades);
        let final_equity = result.portfolio.equity_curve.last().unwrap().equity;
        assert_relative_eq!(
            metrics.total_return,
            final_equity / 100_000.0 - 1.0,
            epsilon = 1e-12
        );
        assert!(metrics.max_drawdown >= 0.0 && metrics.max_drawdown < 1.0);
    }
}
