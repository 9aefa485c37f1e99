//! CSV file data adapter.
//!
//! Prices live in `{base}/{CODE}_{EXCHANGE}.csv` with a
//! `date,open,high,low,close,volume` header; columns are matched by name.
//! Optional security categories live in `{base}/instruments.csv` with a
//! `code,category` header.

use crate::domain::error::MacrossError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::position::Position;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const INSTRUMENTS_FILE: &str = "instruments.csv";
const PRICE_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
    categories: HashMap<String, String>,
}

impl CsvAdapter {
    /// Loads `instruments.csv` eagerly when present.
    pub fn new(base_path: PathBuf) -> Result<Self, MacrossError> {
        let categories = load_categories(&base_path.join(INSTRUMENTS_FILE))?;
        Ok(Self {
            base_path,
            categories,
        })
    }

    fn csv_path(&self, code: &str, exchange: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", code, exchange))
    }
}

fn data_error(reason: impl Into<String>) -> MacrossError {
    MacrossError::Data {
        reason: reason.into(),
    }
}

fn column_index(headers: &StringRecord, path: &Path) -> Result<[usize; 6], MacrossError> {
    let mut index = [0usize; 6];
    for (slot, name) in index.iter_mut().zip(PRICE_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                data_error(format!("{}: missing {} column", path.display(), name))
            })?;
    }
    Ok(index)
}

fn field<T: FromStr>(
    record: &StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> Result<T, MacrossError>
where
    T::Err: std::fmt::Display,
{
    let raw = record
        .get(idx)
        .ok_or_else(|| data_error(format!("line {line}: missing {name} value")))?;
    raw.trim()
        .parse()
        .map_err(|e| data_error(format!("line {line}: invalid {name} value {raw:?}: {e}")))
}

fn load_categories(path: &Path) -> Result<HashMap<String, String>, MacrossError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;
    let mut categories = HashMap::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
        if let (Some(code), Some(category)) = (record.get(0), record.get(1)) {
            categories.insert(code.trim().to_uppercase(), category.trim().to_string());
        }
    }
    Ok(categories)
}

/// Reads a `code,quantity,cost_basis` holdings file.
///
/// Rows with a non-positive quantity are ignored. Positions are dated `as_of`.
/// A non-positive or non-finite cost basis, or a code listed twice, is a data error.
pub fn read_holdings(
    path: &Path,
    exchange: &str,
    as_of: NaiveDate,
) -> Result<HashMap<String, Position>, MacrossError> {
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;
    let mut holdings = HashMap::new();
    let mut seen = HashSet::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let code = record
            .get(0)
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| data_error(format!("line {line}: missing code value")))?;
        let quantity: i64 = field(&record, 1, "quantity", line)?;
        let cost_basis: f64 = field(&record, 2, "cost_basis", line)?;
        if !cost_basis.is_finite() || cost_basis <= 0.0 {
            return Err(data_error(format!(
                "line {line}: cost_basis must be a positive number, got {cost_basis}"
            )));
        }
        if !seen.insert(code.clone()) {
            return Err(data_error(format!("line {line}: duplicate holding {code}")));
        }
        if quantity <= 0 {
            continue;
        }
        holdings.insert(
            code.clone(),
            Position {
                code,
                exchange: exchange.to_string(),
                quantity,
                cost_basis,
                entry_date: as_of,
                target_weight: 0.0,
            },
        );
    }
    Ok(holdings)
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        code: &str,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, MacrossError> {
        let path = self.csv_path(code, exchange);
        if !path.exists() {
            return Err(MacrossError::NoData {
                code: code.to_string(),
                exchange: exchange.to_string(),
            });
        }

        let mut rdr = csv::Reader::from_path(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;
        let headers = rdr
            .headers()
            .map_err(|e| data_error(format!("CSV parse error: {}", e)))?
            .clone();
        let [date_i, open_i, high_i, low_i, close_i, volume_i] = column_index(&headers, &path)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date_str = record
                .get(date_i)
                .ok_or_else(|| data_error(format!("line {line}: missing date value")))?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
                .map_err(|e| data_error(format!("line {line}: invalid date format: {e}")))?;

            if date < start_date || date > end_date {
                continue;
            }

            bars.push(OhlcvBar {
                code: code.to_string(),
                exchange: exchange.to_string(),
                date,
                open: field(&record, open_i, "open", line)?,
                high: field(&record, high_i, "high", line)?,
                low: field(&record, low_i, "low", line)?,
                close: field(&record, close_i, "close", line)?,
                volume: field::<f64>(&record, volume_i, "volume", line)? as i64,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, MacrossError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let suffix = format!("_{}.csv", exchange);
        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(code) = name_str.strip_suffix(&suffix) {
                if !code.is_empty() {
                    symbols.push(code.to_string());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn instrument_category(&self, code: &str) -> Result<Option<String>, MacrossError> {
        Ok(self.categories.get(&code.to_uppercase()).cloned())
    }
}
