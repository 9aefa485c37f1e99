#![allow(dead_code)]

use chrono::NaiveDate;
use macross::domain::code_data::CodeData;
use macross::domain::error::MacrossError;
pub use macross::domain::ohlcv::OhlcvBar;
use macross::domain::strategy::CrossoverConfig;
use macross::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub categories: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            categories: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn with_category(mut self, code: &str, category: &str) -> Self {
        self.categories
            .insert(code.to_string(), category.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        code: &str,
        _exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, MacrossError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(MacrossError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self, _exchange: &str) -> Result<Vec<String>, MacrossError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn instrument_category(&self, code: &str) -> Result<Option<String>, MacrossError> {
        Ok(self.categories.get(code).cloned())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per calendar day from `start_date`, open equal to close.
pub fn bars_from_closes(
    code: &str,
    start_date: NaiveDate,
    closes: &[f64],
    volume: i64,
) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            code: code.to_string(),
            exchange: "US".to_string(),
            date: start_date + chrono::Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        })
        .collect()
}

/// Steadily rising closes.
pub fn generate_bars(
    code: &str,
    start_date: NaiveDate,
    count: usize,
    start_price: f64,
) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + i as f64).collect();
    bars_from_closes(code, start_date, &closes, 100_000)
}

/// Sine-wave closes that cross their moving averages repeatedly.
pub fn wave_closes(count: usize, base: f64, amplitude: f64, period: f64) -> Vec<f64> {
    (0..count)
        .map(|i| base + amplitude * (i as f64 * std::f64::consts::TAU / period).sin())
        .collect()
}

pub fn make_code_data(code: &str, bars: Vec<OhlcvBar>) -> CodeData {
    CodeData::new(code.to_string(), "US".to_string(), bars)
}

pub fn fast_strategy() -> CrossoverConfig {
    CrossoverConfig {
        name: "Fast Crossover".into(),
        short_window: 3,
        long_window: 8,
        stop_loss_pct: 0.05,
        take_profit_pct: 0.08,
    }
}
