//! Configuration validation.
//!
//! Validates config sections before anything is loaded or simulated.

use crate::domain::error::BacktestError;
use crate::domain::returns::RebalancePeriod;
use crate::domain::strategy::StrategyKind;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Numeric strategy parameters recognised in `[strategy]`.
pub const STRATEGY_PARAM_KEYS: [&str; 5] =
    ["short_window", "long_window", "period", "oversold", "overbought"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_rebalance(config)?;
    validate_dates(config)?;
    validate_codes(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match config.get_string("data", "directory") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(BacktestError::config_missing("data", "directory")),
    }
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let kind = match config.get_string("strategy", "kind") {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(BacktestError::config_missing("strategy", "kind")),
    };
    let params = strategy_params(config)?;
    StrategyKind::from_params(&kind, &params)?;
    Ok(())
}

pub fn validate_report_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match config.get_string("report", "format") {
        None => Ok(()),
        Some(f) if matches!(f.trim().to_lowercase().as_str(), "json" | "csv") => Ok(()),
        Some(f) => Err(BacktestError::config_invalid(
            "report",
            "format",
            format!("unknown format '{}' (expected json or csv)", f),
        )),
    }
}

/// Parse an optional number; present but unparsable values are errors.
pub fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| {
                BacktestError::config_invalid(section, key, format!("'{}' is not a number", raw))
            }),
    }
}

pub fn strategy_params(config: &dyn ConfigPort) -> Result<BTreeMap<String, f64>, BacktestError> {
    let mut params = BTreeMap::new();
    for key in STRATEGY_PARAM_KEYS {
        if let Some(value) = number(config, "strategy", key)? {
            params.insert(key.to_string(), value);
        }
    }
    Ok(params)
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, BacktestError> {
    match value {
        None => Err(BacktestError::config_missing("backtest", field)),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            BacktestError::config_invalid(
                "backtest",
                field,
                format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match number(config, "backtest", "initial_capital")? {
        Some(value) if value <= 0.0 => Err(BacktestError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        )),
        _ => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match number(config, "backtest", "risk_free_rate")? {
        Some(value) if !(0.0..1.0).contains(&value) => Err(BacktestError::config_invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        )),
        _ => Ok(()),
    }
}

fn validate_rebalance(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(raw) = config.get_string("backtest", "rebalance") {
        raw.parse::<RebalancePeriod>()
            .map_err(|reason| BacktestError::config_invalid("backtest", "rebalance", reason))?;
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(BacktestError::config_invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let non_empty = |key: &str| {
        config
            .get_string("backtest", key)
            .is_some_and(|v| !v.trim().is_empty())
    };

    if non_empty("universe_file") {
        return match number(config, "backtest", "top_n")? {
            Some(n) if n < 1.0 || n.fract() != 0.0 => Err(BacktestError::config_invalid(
                "backtest",
                "top_n",
                "top_n must be a whole number of at least 1",
            )),
            _ => Ok(()),
        };
    }
    if non_empty("codes") || non_empty("code") {
        return Ok(());
    }
    Err(BacktestError::config_missing("backtest", "code"))
}
