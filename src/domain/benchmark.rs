//! Benchmark return series for post-run comparison.

use crate::domain::code_data::CodeData;
use crate::domain::portfolio::EquityPoint;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Cumulative returns of the algorithm and, when configured, the benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReturn {
    pub date: NaiveDate,
    pub equity: f64,
    pub algorithm: f64,
    pub benchmark: Option<f64>,
}

/// Daily simple returns of the benchmark closes over `timeline`.
///
/// The first date is 0. Dates where the benchmark has no bar carry its last
/// close forward, giving a 0 return.
pub fn daily_returns(benchmark: &CodeData, timeline: &[NaiveDate]) -> Vec<ReturnPoint> {
    let mut prev: Option<f64> = None;
    timeline
        .iter()
        .map(|&date| {
            let close = benchmark.close_on_or_before(date);
            let value = match (prev, close) {
                (Some(p), Some(c)) if p > 0.0 => c / p - 1.0,
                _ => 0.0,
            };
            if close.is_some() {
                prev = close;
            }
            ReturnPoint { date, value }
        })
        .collect()
}

/// Running `Π(1 + r) − 1`.
pub fn cumulative(returns: &[ReturnPoint]) -> Vec<ReturnPoint> {
    let mut growth = 1.0;
    returns
        .iter()
        .map(|r| {
            growth *= 1.0 + r.value;
            ReturnPoint {
                date: r.date,
                value: growth - 1.0,
            }
        })
        .collect()
}

/// Aligns the equity curve with optional cumulative benchmark returns by date.
pub fn period_returns(
    equity_curve: &[EquityPoint],
    initial_capital: f64,
    benchmark: Option<&[ReturnPoint]>,
) -> Vec<PeriodReturn> {
    equity_curve
        .iter()
        .map(|point| PeriodReturn {
            date: point.date,
            equity: point.equity,
            algorithm: if initial_capital > 0.0 {
                point.equity / initial_capital - 1.0
            } else {
                0.0
            },
            benchmark: benchmark.and_then(|b| {
                b.iter()
                    .find(|r| r.date == point.date)
                    .map(|r| r.value)
            }),
        })
        .collect()
}
