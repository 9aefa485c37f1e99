//! Daily OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct OhlcvBar {
    pub code: String,
    pub exchange: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// close * volume
    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume as f64
    }

    pub fn is_traded(&self) -> bool {
        self.volume > 0
    }
}
