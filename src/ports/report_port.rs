//! Report output port trait.

use std::path::Path;

use crate::domain::benchmark::PeriodReturn;
use crate::domain::error::MacrossError;
use crate::domain::metrics::Metrics;
use crate::domain::position::ClosedTrade;
use crate::domain::strategy::CrossoverConfig;

/// Everything a finished run hands to a report writer.
pub struct ReportContext<'a> {
    pub strategy: &'a CrossoverConfig,
    pub metrics: &'a Metrics,
    pub returns: &'a [PeriodReturn],
    pub trades: &'a [ClosedTrade],
}

pub trait ReportPort {
    fn write(&self, report: &ReportContext<'_>, output_dir: &Path) -> Result<(), MacrossError>;
}
