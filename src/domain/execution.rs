//! Order execution and fill simulation.
//!
//! Turns a target weight into a share order against one daily bar, applying
//! the configured commission and slippage models. Unfilled remainders are
//! dropped at the end of the tick.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use super::engine::AllocationInstruction;
use super::ohlcv::OhlcvBar;
use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommissionModel {
    /// `rate` times traded value.
    PerDollar { rate: f64 },
    /// `cost` per share, at least `min_trade_cost` per fill.
    PerShare { cost: f64, min_trade_cost: f64 },
}

impl Default for CommissionModel {
    fn default() -> Self {
        CommissionModel::PerDollar { rate: 0.001 }
    }
}

impl CommissionModel {
    pub fn calculate(&self, quantity: i64, price: f64) -> f64 {
        let shares = quantity.unsigned_abs() as f64;
        match *self {
            CommissionModel::PerDollar { rate } => shares * price * rate,
            CommissionModel::PerShare {
                cost,
                min_trade_cost,
            } => (shares * cost).max(min_trade_cost),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlippageModel {
    /// Buys pay half the spread above the reference price, sells receive half below.
    Fixed { spread: f64 },
    /// Fill at most `volume_limit` of the bar's volume; impact grows with the
    /// square of the filled volume share.
    VolumeShare { volume_limit: f64, price_impact: f64 },
}

impl Default for SlippageModel {
    fn default() -> Self {
        SlippageModel::VolumeShare {
            volume_limit: 0.025,
            price_impact: 0.05,
        }
    }
}

impl SlippageModel {
    /// Shares fillable on `bar` for an order of `quantity` (signed).
    pub fn fillable(&self, quantity: i64, bar: &OhlcvBar) -> i64 {
        match *self {
            SlippageModel::Fixed { .. } => quantity,
            SlippageModel::VolumeShare { volume_limit, .. } => {
                let cap = (volume_limit * bar.volume.max(0) as f64).floor() as i64;
                quantity.signum() * quantity.abs().min(cap)
            }
        }
    }

    /// Execution price for a fill of `quantity` (signed) at reference `price`.
    pub fn execution_price(&self, quantity: i64, price: f64, bar: &OhlcvBar) -> f64 {
        let direction = quantity.signum() as f64;
        match *self {
            SlippageModel::Fixed { spread } => price + direction * spread / 2.0,
            SlippageModel::VolumeShare { price_impact, .. } => {
                if bar.volume <= 0 {
                    return price;
                }
                let volume_share = quantity.unsigned_abs() as f64 / bar.volume as f64;
                let impact = volume_share * volume_share * price_impact * price;
                price + direction * impact
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPrice {
    #[default]
    Open,
    Close,
}

impl FillPrice {
    pub fn of(&self, bar: &OhlcvBar) -> f64 {
        match self {
            FillPrice::Open => bar.open,
            FillPrice::Close => bar.close,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionConfig {
    pub commission: CommissionModel,
    pub slippage: SlippageModel,
    pub fill_price: FillPrice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub code: String,
    /// Signed: positive bought, negative sold.
    pub quantity: i64,
    pub execution_price: f64,
    pub commission: f64,
    /// Shares ordered but not filled on this bar.
    pub unfilled: i64,
}

/// Shares needed to hold `target_weight` of `equity` at `price`.
pub fn target_shares(target_weight: f64, equity: f64, price: f64) -> i64 {
    if price <= 0.0 || equity <= 0.0 || target_weight <= 0.0 {
        return 0;
    }
    (target_weight * equity / price).floor() as i64
}

/// Moves the position in `code` toward `target_weight` of `equity`.
///
/// Buys are capped by available cash including commission. Each sell records
/// a [`ClosedTrade`] against the position's cost basis. Returns `None` when
/// nothing trades.
pub fn rebalance(
    portfolio: &mut Portfolio,
    code: &str,
    exchange: &str,
    target_weight: f64,
    bar: &OhlcvBar,
    equity: f64,
    date: NaiveDate,
    config: &ExecutionConfig,
) -> Option<Fill> {
    let reference = config.fill_price.of(bar);
    let current = portfolio.quantity_of(code);
    let wanted = if target_weight <= 0.0 {
        0
    } else {
        target_shares(target_weight, equity, reference)
    };
    let ordered = wanted - current;
    if ordered == 0 {
        return None;
    }

    let mut quantity = config.slippage.fillable(ordered, bar);
    if quantity == 0 {
        debug!(code, ordered, "no volume available to fill");
        return None;
    }
    let mut execution_price = config.slippage.execution_price(quantity, reference, bar);

    if quantity > 0 {
        quantity = affordable(portfolio.cash, quantity, execution_price, &config.commission);
        if quantity == 0 {
            debug!(code, ordered, "insufficient cash to buy");
            return None;
        }
        execution_price = config.slippage.execution_price(quantity, reference, bar);
    }

    let commission = config.commission.calculate(quantity, execution_price);

    if quantity > 0 {
        buy(portfolio, code, exchange, quantity, execution_price, commission, date);
    } else {
        sell(portfolio, code, -quantity, execution_price, commission, date);
    }
    if let Some(position) = portfolio.get_position_mut(code) {
        position.target_weight = target_weight;
    }

    Some(Fill {
        code: code.to_string(),
        quantity,
        execution_price,
        commission,
        unfilled: ordered - quantity,
    })
}

/// Largest quantity up to `quantity` whose cost plus commission fits in `cash`.
fn affordable(cash: f64, quantity: i64, price: f64, commission: &CommissionModel) -> i64 {
    let mut q = quantity.min((cash / price).floor().max(0.0) as i64);
    while q > 0 && q as f64 * price + commission.calculate(q, price) > cash {
        let over = q as f64 * price + commission.calculate(q, price) - cash;
        q -= ((over / price).ceil() as i64).max(1);
    }
    q.max(0)
}

fn buy(
    portfolio: &mut Portfolio,
    code: &str,
    exchange: &str,
    quantity: i64,
    price: f64,
    commission: f64,
    date: NaiveDate,
) {
    portfolio.cash -= quantity as f64 * price + commission;
    match portfolio.get_position_mut(code) {
        Some(position) => position.add_shares(quantity, price),
        None => portfolio.add_position(Position {
            code: code.to_string(),
            exchange: exchange.to_string(),
            quantity,
            cost_basis: price,
            entry_date: date,
            target_weight: 0.0,
        }),
    }
}

fn sell(
    portfolio: &mut Portfolio,
    code: &str,
    quantity: i64,
    price: f64,
    commission: f64,
    date: NaiveDate,
) {
    let Some(position) = portfolio.get_position_mut(code) else {
        return;
    };
    let quantity = quantity.min(position.quantity);
    position.quantity -= quantity;

    let trade = ClosedTrade {
        code: position.code.clone(),
        exchange: position.exchange.clone(),
        quantity,
        entry_price: position.cost_basis,
        exit_price: price,
        entry_date: position.entry_date,
        exit_date: date,
        pnl: quantity as f64 * (price - position.cost_basis) - commission,
    };
    let flat = position.quantity == 0;

    portfolio.cash += quantity as f64 * price - commission;
    portfolio.record_trade(trade);
    if flat {
        portfolio.remove_position(code);
    }
}

/// Applies one tick's instructions: sells first so their proceeds fund buys.
///
/// `bars` holds the tick-date bar per code; instructions without one are
/// skipped. `equity` is the portfolio value at fill prices before trading.
pub fn apply_instructions(
    portfolio: &mut Portfolio,
    instructions: &[AllocationInstruction],
    bars: &HashMap<String, &OhlcvBar>,
    equity: f64,
    date: NaiveDate,
    config: &ExecutionConfig,
) -> Vec<Fill> {
    let (sells, buys): (Vec<&AllocationInstruction>, Vec<&AllocationInstruction>) =
        instructions.iter().partition(|instr| {
            bars.get(&instr.code).is_some_and(|bar| {
                let wanted = target_shares(instr.target_weight, equity, config.fill_price.of(bar));
                wanted < portfolio.quantity_of(&instr.code)
            })
        });

    let mut fills = Vec::new();
    for instr in sells.into_iter().chain(buys) {
        let Some(bar) = bars.get(&instr.code) else {
            debug!(code = %instr.code, "no bar on tick date, instruction skipped");
            continue;
        };
        if let Some(fill) = rebalance(
            portfolio,
            &instr.code,
            &bar.exchange,
            instr.target_weight,
            bar,
            equity,
            date,
            config,
        ) {
            fills.push(fill);
        }
    }
    fills
}
