//! Daily backtest loop.
//!
//! Each tick on date T sees only closes strictly before T. Instructions fill
//! at T's bar (open by default) and the portfolio is marked at T's close.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::domain::code_data::CodeData;
use crate::domain::engine::{decide, Decision, TickInput};
use crate::domain::error::MacrossError;
use crate::domain::execution::{apply_instructions, ExecutionConfig, Fill, FillPrice};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::portfolio::Portfolio;
use crate::domain::strategy::CrossoverConfig;
use crate::domain::universe::{select_universe, UniverseRule};
use crate::ports::market_port::{PriceHistoryPort, TradabilityPort};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub exchange: String,
    pub benchmark: Option<String>,
    pub execution: ExecutionConfig,
}

/// First date to load so that `bars` trading days exist before `start`.
pub fn warmup_start(start: NaiveDate, bars: usize) -> NaiveDate {
    let calendar_days = (bars * 7).div_ceil(5) + 10;
    start - Duration::days(calendar_days as i64)
}

/// Market state as of one date.
///
/// With a fill price the view belongs to a backtest tick and an instrument is
/// tradable only when it has a traded bar on that date. Without one (a
/// standalone signal run) the latest bar on or before the date decides.
pub struct MarketView<'a> {
    index: &'a HashMap<&'a str, &'a CodeData>,
    date: NaiveDate,
    fill_price: Option<FillPrice>,
}

impl<'a> MarketView<'a> {
    pub fn new(
        index: &'a HashMap<&'a str, &'a CodeData>,
        date: NaiveDate,
        fill_price: FillPrice,
    ) -> Self {
        Self {
            index,
            date,
            fill_price: Some(fill_price),
        }
    }

    pub fn as_of(index: &'a HashMap<&'a str, &'a CodeData>, date: NaiveDate) -> Self {
        Self {
            index,
            date,
            fill_price: None,
        }
    }

    fn bar(&self, code: &str) -> Option<&'a OhlcvBar> {
        self.index.get(code).and_then(|cd| cd.get_bar(self.date))
    }
}

impl PriceHistoryPort for MarketView<'_> {
    fn latest_close(&self, code: &str) -> Result<Option<f64>, MacrossError> {
        Ok(self
            .index
            .get(code)
            .and_then(|cd| cd.last_close_before(self.date)))
    }
}

impl TradabilityPort for MarketView<'_> {
    fn can_trade(&self, code: &str) -> bool {
        match self.fill_price {
            Some(fill_price) => self
                .bar(code)
                .is_some_and(|bar| bar.is_traded() && fill_price.of(bar) > 0.0),
            None => self
                .index
                .get(code)
                .and_then(|cd| cd.bar_on_or_before(self.date))
                .is_some_and(|bar| bar.is_traded() && bar.close > 0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TickSummary {
    pub date: NaiveDate,
    pub universe: usize,
    pub decision: Decision,
    pub fills: Vec<Fill>,
    pub equity: f64,
}

#[derive(Debug)]
pub struct BacktestResult {
    pub portfolio: Portfolio,
    pub ticks: Vec<TickSummary>,
}

/// Runs the crossover strategy over every `timeline` date in the configured range.
pub fn run_backtest(
    data: &[CodeData],
    timeline: &[NaiveDate],
    strategy: &CrossoverConfig,
    rule: &UniverseRule,
    config: &BacktestConfig,
) -> Result<BacktestResult, MacrossError> {
    let index: HashMap<&str, &CodeData> = data.iter().map(|cd| (cd.code.as_str(), cd)).collect();
    let lookback = strategy.lookback();
    let mut portfolio = Portfolio::new(config.initial_capital);
    let mut ticks = Vec::new();

    for &date in timeline
        .iter()
        .filter(|&&d| d >= config.start_date && d <= config.end_date)
    {
        let universe = select_universe(rule, data, date, lookback);
        let mut short_closes = HashMap::with_capacity(universe.len());
        let mut long_closes = HashMap::with_capacity(universe.len());
        for code in &universe {
            let Some(cd) = index.get(code.as_str()) else {
                continue;
            };
            short_closes.insert(code.clone(), cd.history_before(date, strategy.short_window + 1)?);
            long_closes.insert(code.clone(), cd.history_before(date, lookback)?);
        }

        let holdings = portfolio.holdings_snapshot();
        let market = MarketView::new(&index, date, config.execution.fill_price);
        let input = TickInput {
            universe: &universe,
            short_closes: &short_closes,
            long_closes: &long_closes,
            holdings: &holdings,
        };
        let decision = decide(&input, strategy, &market)?;

        let fills = if decision.is_empty() {
            Vec::new()
        } else {
            let bars: HashMap<String, &OhlcvBar> = decision
                .instructions
                .iter()
                .filter_map(|instr| market.bar(&instr.code).map(|bar| (instr.code.clone(), bar)))
                .collect();
            let equity = portfolio.total_equity(&fill_prices(&portfolio, &market));
            apply_instructions(
                &mut portfolio,
                &decision.instructions,
                &bars,
                equity,
                date,
                &config.execution,
            )
        };

        let equity = portfolio.total_equity(&closing_prices(&portfolio, &index, date));
        portfolio.record_equity(date, equity);
        debug!(
            %date,
            universe = universe.len(),
            instructions = decision.instructions.len(),
            fills = fills.len(),
            equity,
            "tick"
        );

        ticks.push(TickSummary {
            date,
            universe: universe.len(),
            decision,
            fills,
            equity,
        });
    }

    info!(
        ticks = ticks.len(),
        trades = portfolio.closed_trades.len(),
        open_positions = portfolio.position_count(),
        "backtest complete"
    );

    Ok(BacktestResult { portfolio, ticks })
}

/// Holding prices at the tick's fill point, else the last known close.
fn fill_prices(portfolio: &Portfolio, market: &MarketView<'_>) -> HashMap<String, f64> {
    portfolio
        .positions
        .keys()
        .filter_map(|code| {
            let price = match (market.bar(code), market.fill_price) {
                (Some(bar), Some(fill_price)) => Some(fill_price.of(bar)),
                _ => market.latest_close(code).ok().flatten(),
            };
            price.map(|p| (code.clone(), p))
        })
        .collect()
}

fn closing_prices(
    portfolio: &Portfolio,
    index: &HashMap<&str, &CodeData>,
    date: NaiveDate,
) -> HashMap<String, f64> {
    portfolio
        .positions
        .keys()
        .filter_map(|code| {
            index
                .get(code.as_str())
                .and_then(|cd| cd.close_on_or_before(date))
                .map(|p| (code.clone(), p))
        })
        .collect()
}
