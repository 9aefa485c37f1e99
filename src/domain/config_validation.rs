//! Configuration validation.
//!
//! Every key is checked before any data is touched.

use crate::domain::error::MacrossError;
use crate::domain::strategy::CrossoverConfig;
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    require_non_empty(config, "backtest", "exchange")?;
    require_non_empty(config, "backtest", "data_dir")?;
    validate_choice(config, "backtest", "fill_price", &["open", "close"])?;
    if let Some(benchmark) = config.get_string("backtest", "benchmark") {
        if benchmark.trim().is_empty() {
            return Err(invalid("backtest", "benchmark", "benchmark must not be empty"));
        }
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    let defaults = CrossoverConfig::default();
    let short_window = window(config, "short_window", defaults.short_window)?;
    let long_window = window(config, "long_window", defaults.long_window)?;
    let stop_loss_pct = number(config, "strategy", "stop_loss")?.unwrap_or(defaults.stop_loss_pct);
    let take_profit_pct =
        number(config, "strategy", "take_profit")?.unwrap_or(defaults.take_profit_pct);

    CrossoverConfig {
        name: defaults.name,
        short_window,
        long_window,
        stop_loss_pct,
        take_profit_pct,
    }
    .validate()
}

pub fn validate_universe_config(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    let mode = validate_choice(config, "universe", "mode", &["static", "dollar_volume"])?;
    let codes = config
        .get_string("universe", "codes")
        .filter(|c| !c.trim().is_empty());

    match mode.as_deref().unwrap_or("static") {
        "static" => {
            let Some(codes) = codes else {
                return Err(MacrossError::ConfigMissing {
                    section: "universe".to_string(),
                    key: "codes".to_string(),
                });
            };
            parse_codes(&codes)?;
        }
        _ => {
            if let Some(codes) = codes {
                parse_codes(&codes)?;
            }
            for key in ["top_n", "dollar_volume_window"] {
                if let Some(value) = number(config, "universe", key)? {
                    if value < 1.0 || value.fract() != 0.0 {
                        return Err(invalid(
                            "universe",
                            key,
                            &format!("{key} must be a whole number of at least 1"),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn validate_execution_config(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    validate_choice(config, "execution", "commission", &["per_dollar", "per_share"])?;
    validate_choice(config, "execution", "slippage", &["volume_share", "fixed"])?;

    for key in [
        "commission_rate",
        "commission_per_share",
        "min_trade_cost",
        "price_impact",
        "spread",
    ] {
        if let Some(value) = number(config, "execution", key)? {
            if value < 0.0 {
                return Err(invalid(
                    "execution",
                    key,
                    &format!("{key} must be non-negative"),
                ));
            }
        }
    }

    if let Some(value) = number(config, "execution", "volume_limit")? {
        if value <= 0.0 || value > 1.0 {
            return Err(invalid(
                "execution",
                "volume_limit",
                "volume_limit must be in (0, 1]",
            ));
        }
    }
    Ok(())
}

/// Runs all four section validators in file order.
pub fn validate_all(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    validate_backtest_config(config)?;
    validate_strategy_config(config)?;
    validate_universe_config(config)?;
    validate_execution_config(config)
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    if let Some(value) = number(config, "backtest", "initial_capital")? {
        if value <= 0.0 {
            return Err(invalid(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    if let Some(value) = number(config, "backtest", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "backtest",
                "risk_free_rate",
                "risk_free_rate must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), MacrossError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, MacrossError> {
    match value {
        None => Err(MacrossError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                &format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn require_non_empty(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<(), MacrossError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(MacrossError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Lower-cased value of an enumerated key, if present.
fn validate_choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, MacrossError> {
    let Some(value) = config.get_string(section, key) else {
        return Ok(None);
    };
    let value = value.trim().to_lowercase();
    if allowed.contains(&value.as_str()) {
        Ok(Some(value))
    } else {
        Err(invalid(
            section,
            key,
            &format!("expected one of {}", allowed.join(", ")),
        ))
    }
}

/// Strict numeric read; a present but unparsable value is an error.
fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, MacrossError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(section, key, &format!("{key} must be a number"))),
    }
}

fn window(config: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, MacrossError> {
    match number(config, "strategy", key)? {
        None => Ok(default),
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(_) => Err(invalid(
            "strategy",
            key,
            &format!("{key} must be a whole number"),
        )),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> MacrossError {
    MacrossError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
