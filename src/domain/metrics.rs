//! Performance metrics and statistics.

use super::benchmark::ReturnPoint;
use super::portfolio::{EquityPoint, Portfolio};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub benchmark_return: Option<f64>,
    pub excess_return: Option<f64>,
}

impl Metrics {
    /// `benchmark` is the cumulative benchmark series; its last value is the
    /// benchmark's total return.
    pub fn compute(
        portfolio: &Portfolio,
        risk_free_rate: f64,
        benchmark: Option<&[ReturnPoint]>,
    ) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let initial_capital = portfolio.initial_capital;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, daily_rf);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        for trade in &portfolio.closed_trades {
            if trade.pnl > 0.0 {
                trades_won += 1;
                total_wins += trade.pnl;
            } else if trade.pnl < 0.0 {
                trades_lost += 1;
                total_losses += trade.pnl.abs();
            }
        }
        let total_trades = portfolio.closed_trades.len();

        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };
        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let benchmark_return = benchmark.and_then(|b| b.last()).map(|r| r.value);
        let excess_return = benchmark_return.map(|b| total_return - b);

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            benchmark_return,
            excess_return,
        }
    }
}

/// Largest peak-to-trough fraction and the longest run of days below a peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0i64;
    let mut duration = 0i64;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }

    (max_dd, max_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                w[1].equity / w[0].equity - 1.0
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let excess = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        excess / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside = (returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();

    let sortino = if downside > 0.0 {
        excess / downside * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
