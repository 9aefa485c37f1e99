//! Crossover strategy parameters.

use crate::domain::error::MacrossError;

/// Process-wide strategy configuration, fixed once a run starts.
///
/// `stop_loss_pct` and `take_profit_pct` are fractions of cost basis (0.05 = 5%).
#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverConfig {
    pub name: String,
    pub short_window: usize,
    pub long_window: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        CrossoverConfig {
            name: "MA Crossover".into(),
            short_window: 5,
            long_window: 35,
            stop_loss_pct: 0.015,
            take_profit_pct: 0.03,
        }
    }
}

impl CrossoverConfig {
    /// Closes needed per instrument to evaluate the long average today and yesterday.
    pub fn lookback(&self) -> usize {
        self.short_window.max(self.long_window) + 1
    }

    /// Stop-loss exit price for a given cost basis.
    pub fn stop_price(&self, cost_basis: f64) -> f64 {
        cost_basis * (1.0 - self.stop_loss_pct)
    }

    /// Take-profit exit price for a given cost basis.
    pub fn target_price(&self, cost_basis: f64) -> f64 {
        cost_basis * (1.0 + self.take_profit_pct)
    }

    pub fn validate(&self) -> Result<(), MacrossError> {
        if self.short_window == 0 {
            return Err(invalid("short_window", "short_window must be at least 1"));
        }
        if self.long_window == 0 {
            return Err(invalid("long_window", "long_window must be at least 1"));
        }
        if self.short_window >= self.long_window {
            return Err(invalid(
                "short_window",
                "short_window must be less than long_window",
            ));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(invalid("stop_loss", "stop_loss must be between 0 and 1"));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct < 1.0) {
            return Err(invalid("take_profit", "take_profit must be between 0 and 1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> MacrossError {
    MacrossError::ConfigInvalid {
        section: "strategy".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
