//! Historical data access port trait.

use crate::domain::error::MacrossError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Daily bars for `code` within `[start_date, end_date]`, ascending by date.
    fn fetch_ohlcv(
        &self,
        code: &str,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, MacrossError>;

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, MacrossError>;

    /// Security category (e.g. "Domestic Common Stock"), if the source records one.
    fn instrument_category(&self, code: &str) -> Result<Option<String>, MacrossError>;
}
