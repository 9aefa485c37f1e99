//! Portfolio state and equity tracking.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.code.clone(), position);
    }

    pub fn get_position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    pub fn get_position_mut(&mut self, code: &str) -> Option<&mut Position> {
        self.positions.get_mut(code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.positions.contains_key(code)
    }

    pub fn remove_position(&mut self, code: &str) -> Option<Position> {
        self.positions.remove(code)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Shares currently held, zero when flat.
    pub fn quantity_of(&self, code: &str) -> i64 {
        self.positions.get(code).map_or(0, |p| p.quantity)
    }

    /// Read-only copy of current holdings handed to the decision engine.
    pub fn holdings_snapshot(&self) -> HashMap<String, Position> {
        self.positions.clone()
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }

    /// Cash plus positions valued at `price_map`. Positions without a price
    /// fall back to cost basis.
    pub fn total_equity(&self, price_map: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = price_map.get(&pos.code).copied().unwrap_or(pos.cost_basis);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }
}
