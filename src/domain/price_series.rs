//! Close-price series and trailing moving averages.
//!
//! A [`PriceSeries`] is the engine's view of price history: closes ascending by
//! date. "Today" is the last point; "yesterday" is the window ending one point
//! earlier, so every average needs `window + 1` points.

use crate::domain::error::MacrossError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub code: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(code: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            code: code.into(),
            points,
        }
    }

    /// Builds a series from closes with consecutive calendar dates starting at `start`.
    pub fn from_closes(code: impl Into<String>, start: NaiveDate, closes: &[f64]) -> Self {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect();
        Self::new(code, points)
    }

    /// The last `lookback` closes strictly before `date`.
    ///
    /// `bars` must be ascending by date. Fails when fewer than `lookback` bars
    /// precede `date`; a truncated window is never returned.
    pub fn history_before(
        code: &str,
        bars: &[OhlcvBar],
        date: NaiveDate,
        lookback: usize,
    ) -> Result<Self, MacrossError> {
        let end = bars.partition_point(|bar| bar.date < date);
        if end < lookback {
            return Err(MacrossError::InsufficientHistory {
                code: code.to_string(),
                window: lookback.saturating_sub(1),
                have: end,
                need: lookback,
            });
        }
        let points = bars[end - lookback..end]
            .iter()
            .map(|bar| PricePoint {
                date: bar.date,
                close: bar.close,
            })
            .collect();
        Ok(Self::new(code, points))
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    /// Mean of the `window` closes ending `lag` points before the latest.
    ///
    /// `lag = 0` is today's average, `lag = 1` yesterday's. The series must hold
    /// at least `window + 1` points even for `lag = 0`.
    pub fn trailing_mean(&self, window: usize, lag: usize) -> Result<f64, MacrossError> {
        let need = window + lag.max(1);
        if window == 0 || self.points.len() < need {
            return Err(MacrossError::InsufficientHistory {
                code: self.code.clone(),
                window,
                have: self.points.len(),
                need,
            });
        }
        let end = self.points.len() - lag;
        let sum: f64 = self.points[end - window..end].iter().map(|p| p.close).sum();
        Ok(sum / window as f64)
    }
}
