//! Crossover decision engine.
//!
//! One call per tick. Given price windows for the active universe and a
//! snapshot of current holdings, [`decide`] returns target-weight
//! instructions:
//!
//! 1. Classify every universe instrument as crossing up, down, or neither.
//! 2. Exit pass: each holding is flattened on take-profit, stop-loss, or a
//!    downward cross. The exit set is computed first; the residual holdings
//!    are the set difference.
//! 3. Entry pass: when anything crossed up, upward crosses plus residual
//!    holdings are equal-weighted. Instruments exited this tick never
//!    receive a weight.
//!
//! The engine holds no state and mutates nothing it is given.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use crate::domain::crossover::{Crossover, MovingAverages};
use crate::domain::error::MacrossError;
use crate::domain::position::Position;
use crate::domain::price_series::PriceSeries;
use crate::domain::strategy::CrossoverConfig;
use crate::ports::market_port::{PriceHistoryPort, TradabilityPort};

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationInstruction {
    pub code: String,
    /// Fraction of portfolio value in `[0, 1]`; zero flattens the position.
    pub target_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    CrossDown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::CrossDown => write!(f, "cross-down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub code: String,
    pub cost_basis: f64,
    pub price: f64,
    pub reason: ExitReason,
}

/// Per-tick inputs. Every universe instrument needs a short and a long series.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub universe: &'a [String],
    pub short_closes: &'a HashMap<String, PriceSeries>,
    pub long_closes: &'a HashMap<String, PriceSeries>,
    pub holdings: &'a HashMap<String, Position>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// Exits (weight 0) first, then entry/rebalance weights. One per instrument.
    pub instructions: Vec<AllocationInstruction>,
    pub exits: Vec<ExitSignal>,
    pub cross_up: Vec<String>,
    pub cross_down: Vec<String>,
    /// Merged-set instruments skipped because they could not be traded.
    pub untradable: Vec<String>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn weight_of(&self, code: &str) -> Option<f64> {
        self.instructions
            .iter()
            .find(|i| i.code == code)
            .map(|i| i.target_weight)
    }
}

pub fn decide<M>(
    input: &TickInput<'_>,
    config: &CrossoverConfig,
    market: &M,
) -> Result<Decision, MacrossError>
where
    M: PriceHistoryPort + TradabilityPort + ?Sized,
{
    let (cross_up, cross_down) = classify_universe(input, config)?;
    debug!(
        universe = input.universe.len(),
        cross_up = cross_up.len(),
        cross_down = cross_down.len(),
        "classified crossovers"
    );

    let sell_signals: HashSet<&str> = cross_down.iter().map(String::as_str).collect();
    let exits = exit_pass(input, config, &sell_signals, market)?;
    let exited: HashSet<&str> = exits.iter().map(|e| e.code.as_str()).collect();

    let mut instructions: Vec<AllocationInstruction> = exits
        .iter()
        .map(|e| AllocationInstruction {
            code: e.code.clone(),
            target_weight: 0.0,
        })
        .collect();

    let mut untradable = Vec::new();
    let buy_set: Vec<&str> = cross_up
        .iter()
        .map(String::as_str)
        .filter(|code| !exited.contains(code))
        .collect();

    if !buy_set.is_empty() {
        let mut merged = buy_set;
        let in_buy: HashSet<&str> = merged.iter().copied().collect();
        let residual: BTreeSet<&str> = input
            .holdings
            .keys()
            .map(String::as_str)
            .filter(|code| !exited.contains(code) && !in_buy.contains(code))
            .collect();
        merged.extend(residual);

        let weight = 1.0 / merged.len() as f64;
        for code in merged {
            if market.can_trade(code) {
                instructions.push(AllocationInstruction {
                    code: code.to_string(),
                    target_weight: weight,
                });
            } else {
                debug!(code = %code, "skipping untradable instrument");
                untradable.push(code.to_string());
            }
        }
    }

    Ok(Decision {
        instructions,
        exits,
        cross_up,
        cross_down,
        untradable,
    })
}

fn classify_universe(
    input: &TickInput<'_>,
    config: &CrossoverConfig,
) -> Result<(Vec<String>, Vec<String>), MacrossError> {
    let mut seen = HashSet::new();
    let mut cross_up = Vec::new();
    let mut cross_down = Vec::new();

    for code in input.universe {
        if !seen.insert(code.as_str()) {
            continue;
        }
        let short = series_for(input.short_closes, code, config.short_window)?;
        let long = series_for(input.long_closes, code, config.long_window)?;
        match MovingAverages::compute(short, long, config)?.classify() {
            Crossover::Up => cross_up.push(code.clone()),
            Crossover::Down => cross_down.push(code.clone()),
            Crossover::None => {}
        }
    }

    Ok((cross_up, cross_down))
}

fn series_for<'a>(
    closes: &'a HashMap<String, PriceSeries>,
    code: &str,
    window: usize,
) -> Result<&'a PriceSeries, MacrossError> {
    closes
        .get(code)
        .ok_or_else(|| MacrossError::InsufficientHistory {
            code: code.to_string(),
            window,
            have: 0,
            need: window + 1,
        })
}

fn exit_pass<M>(
    input: &TickInput<'_>,
    config: &CrossoverConfig,
    sell_signals: &HashSet<&str>,
    market: &M,
) -> Result<Vec<ExitSignal>, MacrossError>
where
    M: PriceHistoryPort + ?Sized,
{
    let held: BTreeSet<&String> = input.holdings.keys().collect();
    let mut exits = Vec::new();

    for code in held {
        let position = &input.holdings[code];
        let price = current_price(input, code, market)?;
        let cost_basis = position.cost_basis;

        let reason = if price > config.target_price(cost_basis) {
            Some(ExitReason::TakeProfit)
        } else if price < config.stop_price(cost_basis) {
            Some(ExitReason::StopLoss)
        } else if sell_signals.contains(code.as_str()) {
            Some(ExitReason::CrossDown)
        } else {
            None
        };

        if let Some(reason) = reason {
            info!(
                code = %code,
                cost_basis,
                price,
                reason = %reason,
                "exiting position"
            );
            exits.push(ExitSignal {
                code: code.clone(),
                cost_basis,
                price,
                reason,
            });
        }
    }

    Ok(exits)
}

/// Latest close from the active feed, else a single-point lookup.
fn current_price<M>(input: &TickInput<'_>, code: &str, market: &M) -> Result<f64, MacrossError>
where
    M: PriceHistoryPort + ?Sized,
{
    if let Some(price) = input.short_closes.get(code).and_then(|s| s.latest_close()) {
        return Ok(price);
    }
    debug!(code = %code, "held instrument outside active feed, looking up latest close");
    market
        .latest_close(code)?
        .ok_or_else(|| MacrossError::MissingPrice {
            code: code.to_string(),
        })
}
