//! Universe selection.
//!
//! Candidates come from the configured code list or every symbol the data
//! source has for the exchange. They are screened once by security category
//! and loaded with enough warm-up history. Each tick then picks the active
//! universe from the loaded set, either the whole static list or the top-N
//! by trailing dollar volume.

use crate::domain::code_data::CodeData;
use crate::domain::error::MacrossError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),

    #[error("no candidate instruments after category screen")]
    NoCandidates,
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniverseRule {
    /// Every loaded instrument, every tick.
    Static,
    /// The `top_n` instruments by mean dollar volume over the `window` bars
    /// before the tick.
    TopDollarVolume { top_n: usize, window: usize },
}

/// Allow-list of security categories; empty admits everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFilter {
    allowed: Vec<String>,
}

impl CategoryFilter {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: categories
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn admits(&self, category: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        category
            .map(|c| self.allowed.contains(&c.trim().to_lowercase()))
            .unwrap_or(false)
    }

    /// Keeps the codes whose recorded category is admitted.
    pub fn screen(
        &self,
        data_port: &dyn DataPort,
        codes: Vec<String>,
    ) -> Result<Vec<String>, MacrossError> {
        if self.is_empty() {
            return Ok(codes);
        }
        let mut kept = Vec::with_capacity(codes.len());
        for code in codes {
            let category = data_port.instrument_category(&code)?;
            if self.admits(category.as_deref()) {
                kept.push(code);
            }
        }
        Ok(kept)
    }
}

#[derive(Debug, Clone)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

pub struct LoadedUniverse {
    pub data: Vec<CodeData>,
    pub skipped: Vec<SkippedCode>,
}

/// Fetches bars for every candidate, dropping codes without at least `min_bars`.
pub fn load_universe(
    data_port: &dyn DataPort,
    codes: &[String],
    exchange: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    min_bars: usize,
) -> Result<LoadedUniverse, MacrossError> {
    let mut data = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let ohlcv = match data_port.fetch_ohlcv(code, exchange, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(code = %code, exchange, error = %e, "skipping instrument");
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if ohlcv.is_empty() {
            warn!(code = %code, exchange, "skipping instrument: no data found");
            skipped.push(SkippedCode {
                code: code.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        if ohlcv.len() < min_bars {
            warn!(
                code = %code,
                exchange,
                bars = ohlcv.len(),
                minimum = min_bars,
                "skipping instrument: insufficient bars"
            );
            skipped.push(SkippedCode {
                code: code.clone(),
                reason: SkipReason::InsufficientBars { bars: ohlcv.len() },
            });
            continue;
        }

        info!(code = %code, bars = ohlcv.len(), "loaded");
        data.push(CodeData::new(code.clone(), exchange.to_string(), ohlcv));
    }

    if data.is_empty() {
        return Err(MacrossError::InsufficientData {
            code: "all".to_string(),
            exchange: exchange.to_string(),
            bars: 0,
            minimum: min_bars,
        });
    }

    if !skipped.is_empty() {
        info!(
            loaded = data.len(),
            candidates = codes.len(),
            exchange,
            "universe partially loaded"
        );
    }

    Ok(LoadedUniverse { data, skipped })
}

/// Mean `close * volume` over the last `window` bars before `date`, or
/// `None` when fewer than `window` bars exist.
pub fn average_dollar_volume(data: &CodeData, date: NaiveDate, window: usize) -> Option<f64> {
    if window == 0 {
        return None;
    }
    let bars = data.window_before(date, window);
    if bars.len() < window {
        return None;
    }
    Some(bars.iter().map(|b| b.dollar_volume()).sum::<f64>() / window as f64)
}

/// Codes ranked by trailing dollar volume, highest first, ties by code.
pub fn rank_by_dollar_volume(
    data: &[CodeData],
    date: NaiveDate,
    window: usize,
    top_n: usize,
) -> Vec<String> {
    let mut ranked: Vec<(&str, f64)> = data
        .iter()
        .filter_map(|cd| average_dollar_volume(cd, date, window).map(|dv| (cd.code.as_str(), dv)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
        .into_iter()
        .take(top_n)
        .map(|(code, _)| code.to_string())
        .collect()
}

/// Active universe for one tick: the rule's pick, restricted to instruments
/// with at least `lookback` bars before `date`.
pub fn select_universe(
    rule: &UniverseRule,
    data: &[CodeData],
    date: NaiveDate,
    lookback: usize,
) -> Vec<String> {
    let picked: Vec<String> = match rule {
        UniverseRule::Static => data.iter().map(|cd| cd.code.clone()).collect(),
        UniverseRule::TopDollarVolume { top_n, window } => {
            rank_by_dollar_volume(data, date, *window, *top_n)
        }
    };
    picked
        .into_iter()
        .filter(|code| {
            data.iter()
                .find(|cd| &cd.code == code)
                .is_some_and(|cd| cd.bars_before(date) >= lookback)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, day).unwrap()
    }

    fn code_data(code: &str, closes_volumes: &[(f64, i64)]) -> CodeData {
        let bars = closes_volumes
            .iter()
            .enumerate()
            .map(|(i, &(close, volume))| OhlcvBar {
                code: code.into(),
                exchange: "US".into(),
                date: d(3 + i as u32),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect();
        CodeData::new(code.into(), "US".into(), bars)
    }

    #[test]
    fn test_parse_codes_basic() {
        let result = parse_codes("AAPL,MSFT,XOM").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "XOM"]);
    }

    #[test]
    fn test_parse_codes_trims_and_uppercases() {
        let result = parse_codes("  aapl , Msft ,xom").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "XOM"]);
    }

    #[test]
    fn test_parse_codes_empty_token() {
        assert!(matches!(
            parse_codes("AAPL,,MSFT"),
            Err(UniverseError::EmptyToken)
        ));
    }

    #[test]
    fn test_parse_codes_duplicate() {
        let result = parse_codes("AAPL,MSFT,aapl");
        assert!(matches!(result, Err(UniverseError::DuplicateCode(s)) if s == "AAPL"));
    }

    #[test]
    fn category_filter_is_case_insensitive() {
        let filter = CategoryFilter::new(["Domestic Common Stock"]);
        assert!(filter.admits(Some("domestic common stock")));
        assert!(!filter.admits(Some("ADR Common Stock")));
        assert!(!filter.admits(None));
    }

    #[test]
    fn empty_category_filter_admits_all() {
        let filter = CategoryFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        assert!(filter.admits(None));
    }

    #[test]
    fn average_dollar_volume_uses_bars_before_date() {
        let cd = code_data("AAPL", &[(10.0, 100), (20.0, 100), (1000.0, 100)]);
        // bars before Jan 5: Jan 3 ($1000) and Jan 4 ($2000)
        assert_eq!(average_dollar_volume(&cd, d(5), 1), Some(2000.0));
        assert_eq!(average_dollar_volume(&cd, d(5), 2), Some(1500.0));
        assert_eq!(average_dollar_volume(&cd, d(5), 3), None);
    }

    #[test]
    fn rank_by_dollar_volume_orders_and_truncates() {
        let data = vec![
            code_data("AAA", &[(10.0, 100), (10.0, 100)]),
            code_data("BBB", &[(10.0, 300), (10.0, 300)]),
            code_data("CCC", &[(10.0, 200), (10.0, 200)]),
            code_data("DDD", &[(10.0, 300), (10.0, 300)]),
        ];
        let ranked = rank_by_dollar_volume(&data, d(5), 1, 3);
        assert_eq!(ranked, vec!["BBB", "DDD", "CCC"]);
    }

    #[test]
    fn select_static_requires_lookback() {
        let data = vec![
            code_data("AAA", &[(10.0, 100), (10.0, 100), (10.0, 100)]),
            code_data("BBB", &[(10.0, 100)]),
        ];
        assert_eq!(
            select_universe(&UniverseRule::Static, &data, d(6), 3),
            vec!["AAA"]
        );
    }

    #[test]
    fn select_top_dollar_volume() {
        let data = vec![
            code_data("AAA", &[(10.0, 100), (10.0, 100)]),
            code_data("BBB", &[(10.0, 500), (10.0, 500)]),
        ];
        let rule = UniverseRule::TopDollarVolume { top_n: 1, window: 1 };
        assert_eq!(select_universe(&rule, &data, d(5), 2), vec!["BBB"]);
    }
}
