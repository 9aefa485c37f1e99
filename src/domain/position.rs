//! Held positions and realised trades.

use chrono::NaiveDate;

/// A long holding as tracked by the executor.
///
/// The decision engine reads `cost_basis` only; quantity and dates belong to
/// the portfolio side.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub code: String,
    pub exchange: String,
    pub quantity: i64,
    pub cost_basis: f64,
    pub entry_date: NaiveDate,
    pub target_weight: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.cost_basis)
    }

    /// Adds shares at `price`, moving the cost basis to the weighted average.
    pub fn add_shares(&mut self, quantity: i64, price: f64) {
        let total = self.quantity + quantity;
        if total > 0 {
            self.cost_basis = (self.cost_basis * self.quantity as f64 + price * quantity as f64)
                / total as f64;
        }
        self.quantity = total;
    }
}

/// One sell fill against a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub code: String,
    pub exchange: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub pnl: f64,
}
