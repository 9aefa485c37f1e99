//! Per-instrument bar storage and unified timeline.

use crate::domain::error::MacrossError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::price_series::PriceSeries;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct CodeData {
    pub code: String,
    pub exchange: String,
    pub ohlcv: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl CodeData {
    /// `ohlcv` is sorted by date on construction.
    pub fn new(code: String, exchange: String, mut ohlcv: Vec<OhlcvBar>) -> Self {
        ohlcv.sort_by_key(|bar| bar.date);
        let date_index = ohlcv
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            code,
            exchange,
            ohlcv,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.ohlcv.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.ohlcv[i])
    }

    /// Number of bars dated strictly before `date`.
    pub fn bars_before(&self, date: NaiveDate) -> usize {
        self.ohlcv.partition_point(|bar| bar.date < date)
    }

    /// The last `count` bars strictly before `date`, oldest first.
    pub fn window_before(&self, date: NaiveDate, count: usize) -> &[OhlcvBar] {
        let end = self.bars_before(date);
        &self.ohlcv[end.saturating_sub(count)..end]
    }

    pub fn last_close_before(&self, date: NaiveDate) -> Option<f64> {
        self.window_before(date, 1).first().map(|bar| bar.close)
    }

    /// Close on `date`, else the latest close before it.
    pub fn close_on_or_before(&self, date: NaiveDate) -> Option<f64> {
        self.get_bar(date)
            .map(|bar| bar.close)
            .or_else(|| self.last_close_before(date))
    }

    /// Bar on `date`, else the latest bar before it.
    pub fn bar_on_or_before(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.get_bar(date)
            .or_else(|| self.window_before(date, 1).first())
    }

    pub fn history_before(
        &self,
        date: NaiveDate,
        lookback: usize,
    ) -> Result<PriceSeries, MacrossError> {
        PriceSeries::history_before(&self.code, &self.ohlcv, date, lookback)
    }
}

pub fn build_unified_timeline(codes: &[CodeData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = codes
        .iter()
        .flat_map(|cd| cd.ohlcv.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
