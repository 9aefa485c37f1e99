//! Market collaborators queried by the decision engine during a tick.

use crate::domain::error::MacrossError;

/// Single-point price lookup for held instruments outside the active universe.
pub trait PriceHistoryPort {
    /// Most recent close strictly before the current tick.
    ///
    /// `Ok(None)` means the provider knows of no price; errors are the
    /// provider's own and are passed through unchanged.
    fn latest_close(&self, code: &str) -> Result<Option<f64>, MacrossError>;
}

pub trait TradabilityPort {
    fn can_trade(&self, code: &str) -> bool;
}
