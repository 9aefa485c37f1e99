//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

use crate::adapters::csv_adapter::{read_holdings, CsvAdapter};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult, MarketView};
use crate::domain::benchmark::{self, PeriodReturn, ReturnPoint};
use crate::domain::code_data::{build_unified_timeline, CodeData};
use crate::domain::config_validation::{
    parse_date, validate_all, validate_strategy_config, validate_universe_config,
};
use crate::domain::engine::{self, Decision, TickInput};
use crate::domain::error::MacrossError;
use crate::domain::execution::{CommissionModel, ExecutionConfig, FillPrice, SlippageModel};
use crate::domain::metrics::Metrics;
use crate::domain::position::Position;
use crate::domain::strategy::CrossoverConfig;
use crate::domain::universe::{
    load_universe, parse_codes, select_universe, CategoryFilter, UniverseError, UniverseRule,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportContext, ReportPort};

#[derive(Parser, Debug)]
#[command(name = "macross", about = "Moving-average crossover backtester")]
pub struct Cli {
    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for returns.csv, trades.csv and summary.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the engine's instructions for one date
    Signals {
        #[arg(short, long)]
        config: PathBuf,
        /// Tick date (YYYY-MM-DD); only closes before it are used
        #[arg(long)]
        date: NaiveDate,
        /// CSV with code,quantity,cost_basis columns
        #[arg(long)]
        holdings: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Parses a `--log-level` value, defaulting to INFO.
pub fn log_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Signals {
            config,
            date,
            holdings,
        } => run_signals(&config, date, holdings.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

fn fail(e: &MacrossError) -> ExitCode {
    error!("{e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

pub fn open_data_port(adapter: &dyn ConfigPort) -> Result<CsvAdapter, MacrossError> {
    let data_dir = adapter
        .get_string("backtest", "data_dir")
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| MacrossError::ConfigMissing {
            section: "backtest".into(),
            key: "data_dir".into(),
        })?;
    CsvAdapter::new(PathBuf::from(data_dir.trim()))
}

fn exchange(adapter: &dyn ConfigPort) -> Result<String, MacrossError> {
    adapter
        .get_string("backtest", "exchange")
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| MacrossError::ConfigMissing {
            section: "backtest".into(),
            key: "exchange".into(),
        })
}

fn invalid(section: &str, key: &str, reason: String) -> MacrossError {
    MacrossError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason,
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, MacrossError> {
    let start_date = parse_date(
        adapter.get_string("backtest", "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        adapter.get_string("backtest", "end_date").as_deref(),
        "end_date",
    )?;

    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_capital: adapter.get_double("backtest", "initial_capital", 100_000.0),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", 0.0),
        exchange: exchange(adapter)?,
        benchmark: adapter
            .get_string("backtest", "benchmark")
            .map(|b| b.trim().to_uppercase())
            .filter(|b| !b.is_empty()),
        execution: build_execution_config(adapter)?,
    })
}

pub fn build_execution_config(adapter: &dyn ConfigPort) -> Result<ExecutionConfig, MacrossError> {
    let commission = match adapter
        .get_string("execution", "commission")
        .map(|c| c.trim().to_lowercase())
        .as_deref()
    {
        None | Some("per_dollar") => CommissionModel::PerDollar {
            rate: adapter.get_double("execution", "commission_rate", 0.001),
        },
        Some("per_share") => CommissionModel::PerShare {
            cost: adapter.get_double("execution", "commission_per_share", 0.005),
            min_trade_cost: adapter.get_double("execution", "min_trade_cost", 0.0),
        },
        Some(other) => {
            return Err(invalid(
                "execution",
                "commission",
                format!("unknown commission model {other:?}"),
            ))
        }
    };

    let slippage = match adapter
        .get_string("execution", "slippage")
        .map(|s| s.trim().to_lowercase())
        .as_deref()
    {
        None | Some("volume_share") => SlippageModel::VolumeShare {
            volume_limit: adapter.get_double("execution", "volume_limit", 0.025),
            price_impact: adapter.get_double("execution", "price_impact", 0.05),
        },
        Some("fixed") => SlippageModel::Fixed {
            spread: adapter.get_double("execution", "spread", 0.0),
        },
        Some(other) => {
            return Err(invalid(
                "execution",
                "slippage",
                format!("unknown slippage model {other:?}"),
            ))
        }
    };

    let fill_price = match adapter
        .get_string("backtest", "fill_price")
        .map(|f| f.trim().to_lowercase())
        .as_deref()
    {
        None | Some("open") => FillPrice::Open,
        Some("close") => FillPrice::Close,
        Some(other) => {
            return Err(invalid(
                "backtest",
                "fill_price",
                format!("unknown fill price {other:?}"),
            ))
        }
    };

    Ok(ExecutionConfig {
        commission,
        slippage,
        fill_price,
    })
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<CrossoverConfig, MacrossError> {
    let defaults = CrossoverConfig::default();
    let window = |key: &str, default: usize| {
        adapter.get_int("strategy", key, default as i64).max(0) as usize
    };
    let strategy = CrossoverConfig {
        name: adapter
            .get_string("strategy", "name")
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(defaults.name),
        short_window: window("short_window", defaults.short_window),
        long_window: window("long_window", defaults.long_window),
        stop_loss_pct: adapter.get_double("strategy", "stop_loss", defaults.stop_loss_pct),
        take_profit_pct: adapter.get_double("strategy", "take_profit", defaults.take_profit_pct),
    };
    strategy.validate()?;
    Ok(strategy)
}

pub fn build_universe_rule(adapter: &dyn ConfigPort) -> Result<UniverseRule, MacrossError> {
    match adapter
        .get_string("universe", "mode")
        .map(|m| m.trim().to_lowercase())
        .as_deref()
    {
        None | Some("static") => Ok(UniverseRule::Static),
        Some("dollar_volume") => Ok(UniverseRule::TopDollarVolume {
            top_n: adapter.get_int("universe", "top_n", 100).max(1) as usize,
            window: adapter
                .get_int("universe", "dollar_volume_window", 1)
                .max(1) as usize,
        }),
        Some(other) => Err(invalid(
            "universe",
            "mode",
            format!("unknown universe mode {other:?}"),
        )),
    }
}

/// Bars of history needed before the first tick for both the averages and
/// the dollar-volume ranking.
pub fn warmup_bars(strategy: &CrossoverConfig, rule: &UniverseRule) -> usize {
    match rule {
        UniverseRule::Static => strategy.lookback(),
        UniverseRule::TopDollarVolume { window, .. } => strategy.lookback().max(*window),
    }
}

/// Candidate codes: the configured list, or every symbol on the exchange for
/// a dollar-volume universe without one, screened by category.
pub fn resolve_codes(
    adapter: &dyn ConfigPort,
    data_port: &dyn DataPort,
    exchange: &str,
    rule: &UniverseRule,
) -> Result<Vec<String>, MacrossError> {
    let configured = adapter
        .get_string("universe", "codes")
        .filter(|c| !c.trim().is_empty());

    let codes = match (configured, rule) {
        (Some(codes), _) => parse_codes(&codes)?,
        (None, UniverseRule::TopDollarVolume { .. }) => data_port.list_symbols(exchange)?,
        (None, UniverseRule::Static) => {
            return Err(MacrossError::ConfigMissing {
                section: "universe".into(),
                key: "codes".into(),
            })
        }
    };

    let filter = CategoryFilter::new(adapter.get_list("universe", "categories"));
    let codes = filter.screen(data_port, codes)?;
    if codes.is_empty() {
        return Err(UniverseError::NoCandidates.into());
    }
    Ok(codes)
}

/// Everything a finished backtest produced.
pub struct BacktestOutcome {
    pub strategy: CrossoverConfig,
    pub config: BacktestConfig,
    pub result: BacktestResult,
    pub metrics: Metrics,
    pub returns: Vec<PeriodReturn>,
}

/// Validates the configuration, loads data through `data_port` and runs the loop.
pub fn execute_backtest(
    data_port: &dyn DataPort,
    adapter: &dyn ConfigPort,
) -> Result<BacktestOutcome, MacrossError> {
    validate_all(adapter)?;
    let strategy = build_strategy(adapter)?;
    let config = build_backtest_config(adapter)?;
    let rule = build_universe_rule(adapter)?;
    info!(strategy = %strategy.name, "strategy loaded");

    let codes = resolve_codes(adapter, data_port, &config.exchange, &rule)?;
    let load_start =
        backtest_engine::warmup_start(config.start_date, warmup_bars(&strategy, &rule));
    info!(
        candidates = codes.len(),
        exchange = %config.exchange,
        from = %load_start,
        to = %config.end_date,
        "loading universe"
    );
    let loaded = load_universe(
        data_port,
        &codes,
        &config.exchange,
        load_start,
        config.end_date,
        strategy.lookback(),
    )?;

    let timeline = build_unified_timeline(&loaded.data);
    info!(
        codes = loaded.data.len(),
        dates = timeline.len(),
        start = %config.start_date,
        end = %config.end_date,
        "running backtest"
    );
    let result = backtest_engine::run_backtest(&loaded.data, &timeline, &strategy, &rule, &config)?;
    if result.portfolio.equity_curve.is_empty() {
        return Err(MacrossError::NoData {
            code: "all".into(),
            exchange: config.exchange.clone(),
        });
    }

    let tick_dates: Vec<NaiveDate> = result.ticks.iter().map(|t| t.date).collect();
    let benchmark_returns = config
        .benchmark
        .as_deref()
        .and_then(|code| benchmark_series(data_port, code, &config, &tick_dates));

    let metrics = Metrics::compute(
        &result.portfolio,
        config.risk_free_rate,
        benchmark_returns.as_deref(),
    );
    let returns = benchmark::period_returns(
        &result.portfolio.equity_curve,
        config.initial_capital,
        benchmark_returns.as_deref(),
    );

    Ok(BacktestOutcome {
        strategy,
        config,
        result,
        metrics,
        returns,
    })
}

/// Cumulative benchmark returns over the tick dates; `None` when unavailable.
fn benchmark_series(
    data_port: &dyn DataPort,
    code: &str,
    config: &BacktestConfig,
    dates: &[NaiveDate],
) -> Option<Vec<ReturnPoint>> {
    match data_port.fetch_ohlcv(code, &config.exchange, config.start_date, config.end_date) {
        Ok(bars) if !bars.is_empty() => {
            let data = CodeData::new(code.to_string(), config.exchange.clone(), bars);
            Some(benchmark::cumulative(&benchmark::daily_returns(&data, dates)))
        }
        Ok(_) => {
            warn!(code, "benchmark has no data in range");
            None
        }
        Err(e) => {
            warn!(code, error = %e, "benchmark unavailable");
            None
        }
    }
}

pub fn print_summary(outcome: &BacktestOutcome) {
    let m = &outcome.metrics;
    let portfolio = &outcome.result.portfolio;
    println!("=== {} ===", outcome.strategy.name);
    println!(
        "Period:           {} to {}",
        outcome.config.start_date, outcome.config.end_date
    );
    let final_equity = portfolio
        .equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(portfolio.initial_capital);
    println!("Final Equity:     {:.2}", final_equity);
    println!("Total Return:     {:.2}%", m.total_return * 100.0);
    println!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    println!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    println!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    println!(
        "Max Drawdown:     -{:.1}% ({} days)",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    println!("Total Trades:     {}", m.total_trades);
    println!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:    {:.2}", m.profit_factor);
    println!("Open Positions:   {}", portfolio.position_count());
    if let (Some(bench), Some(excess)) = (m.benchmark_return, m.excess_return) {
        println!("Benchmark Return: {:.2}%", bench * 100.0);
        println!("Excess Return:    {:.2}%", excess * 100.0);
    }
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    adapter: &dyn ConfigPort,
    output_dir: Option<&Path>,
) -> ExitCode {
    let outcome = match execute_backtest(data_port, adapter) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };
    print_summary(&outcome);

    if let Some(dir) = output_dir {
        let ctx = ReportContext {
            strategy: &outcome.strategy,
            metrics: &outcome.metrics,
            returns: &outcome.returns,
            trades: &outcome.result.portfolio.closed_trades,
        };
        if let Err(e) = CsvReportAdapter.write(&ctx, dir) {
            return fail(&e);
        }
        info!(dir = %dir.display(), "report written");
    }
    ExitCode::SUCCESS
}

fn run_backtest(config_path: &Path, output_dir: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    run_backtest_pipeline(&data_port, &adapter, output_dir)
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        return fail(&e);
    }

    let parsed = build_strategy(&adapter).and_then(|s| {
        Ok((
            s,
            build_backtest_config(&adapter)?,
            build_universe_rule(&adapter)?,
        ))
    });
    let (strategy, config, rule) = match parsed {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    println!("Strategy:   {}", strategy.name);
    println!(
        "  windows:  short {} / long {}",
        strategy.short_window, strategy.long_window
    );
    println!(
        "  exits:    stop_loss {} / take_profit {}",
        strategy.stop_loss_pct, strategy.take_profit_pct
    );
    println!("Backtest:   {} to {}", config.start_date, config.end_date);
    println!("  capital:  {:.2}", config.initial_capital);
    println!("  exchange: {}", config.exchange);
    if let Some(bench) = &config.benchmark {
        println!("  benchmark: {}", bench);
    }
    match &rule {
        UniverseRule::Static => println!(
            "Universe:   static {}",
            adapter.get_list("universe", "codes").join(", ")
        ),
        UniverseRule::TopDollarVolume { top_n, window } => println!(
            "Universe:   top {} by {}-day dollar volume",
            top_n, window
        ),
    }
    println!("Execution:  {:?}", config.execution);
    println!("Dry run complete: configuration is valid");
    ExitCode::SUCCESS
}

/// Runs the engine once for `date` using only bars before it.
pub fn compute_signals(
    data_port: &dyn DataPort,
    adapter: &dyn ConfigPort,
    date: NaiveDate,
    holdings: &HashMap<String, Position>,
) -> Result<Decision, MacrossError> {
    validate_strategy_config(adapter)?;
    validate_universe_config(adapter)?;
    let strategy = build_strategy(adapter)?;
    let rule = build_universe_rule(adapter)?;
    let exchange = exchange(adapter)?;

    let candidates = resolve_codes(adapter, data_port, &exchange, &rule)?;
    let lookback = strategy.lookback();
    let load_start = backtest_engine::warmup_start(date, warmup_bars(&strategy, &rule));
    let mut data =
        load_universe(data_port, &candidates, &exchange, load_start, date, lookback)?.data;
    let universe = select_universe(&rule, &data, date, lookback);

    // Holdings only need a prior close for the exit pass; feed errors surface as-is.
    let loaded: BTreeSet<String> = data.iter().map(|cd| cd.code.clone()).collect();
    let held: BTreeSet<&String> = holdings.keys().filter(|c| !loaded.contains(*c)).collect();
    for code in held {
        let bars = data_port.fetch_ohlcv(code, &exchange, load_start, date)?;
        if bars.is_empty() {
            warn!(code = %code, "held instrument has no bars");
            continue;
        }
        data.push(CodeData::new(code.clone(), exchange.clone(), bars));
    }
    let index: HashMap<&str, &CodeData> =
        data.iter().map(|cd| (cd.code.as_str(), cd)).collect();

    let mut short_closes = HashMap::new();
    let mut long_closes = HashMap::new();
    for code in &universe {
        if let Some(cd) = index.get(code.as_str()) {
            short_closes.insert(code.clone(), cd.history_before(date, strategy.short_window + 1)?);
            long_closes.insert(code.clone(), cd.history_before(date, lookback)?);
        }
    }

    let market = MarketView::as_of(&index, date);
    let input = TickInput {
        universe: &universe,
        short_closes: &short_closes,
        long_closes: &long_closes,
        holdings,
    };
    engine::decide(&input, &strategy, &market)
}

fn run_signals(config_path: &Path, date: NaiveDate, holdings_path: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let holdings = match holdings_path {
        Some(path) => {
            let exchange = adapter
                .get_string("backtest", "exchange")
                .unwrap_or_default();
            match read_holdings(path, exchange.trim(), date) {
                Ok(h) => h,
                Err(e) => return fail(&e),
            }
        }
        None => HashMap::new(),
    };

    let decision = match compute_signals(&data_port, &adapter, date, &holdings) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    println!("date: {}", date);
    println!("cross_up: {}", decision.cross_up.join(", "));
    println!("cross_down: {}", decision.cross_down.join(", "));
    for exit in &decision.exits {
        let pnl = holdings
            .get(&exit.code)
            .map(|p| p.unrealized_pnl(exit.price))
            .unwrap_or(0.0);
        println!(
            "exit: {} {} (cost basis {:.4}, price {:.4}, pnl {:.2})",
            exit.code, exit.reason, exit.cost_basis, exit.price, pnl
        );
    }
    if !decision.untradable.is_empty() {
        println!("untradable: {}", decision.untradable.join(", "));
    }
    for instr in &decision.instructions {
        println!("{}\t{:.4}", instr.code, instr.target_weight);
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match validate_all(&adapter) {
        Ok(()) => {
            println!("{}: configuration is valid", config_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let listed = exchange(&adapter).and_then(|exchange| {
        let port = open_data_port(&adapter)?;
        let symbols = port.list_symbols(&exchange)?;
        Ok((exchange, symbols))
    });
    let (exchange, symbols) = match listed {
        Ok(l) => l,
        Err(e) => return fail(&e),
    };

    if symbols.is_empty() {
        warn!(exchange = %exchange, "no symbols found");
    }
    for symbol in &symbols {
        println!("{}", symbol);
    }
    info!(count = symbols.len(), exchange = %exchange, "symbols listed");
    ExitCode::SUCCESS
}
