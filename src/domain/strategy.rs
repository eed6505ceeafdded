//! Strategy definitions: the closed set of signal rules and their parameters.
//!
//! Parameters arrive as a loose name → number mapping (from an INI section or
//! a stored strategy record) and are validated into one struct per rule
//! before any simulation starts.

use crate::domain::error::BacktestError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_SHORT_WINDOW: usize = 20;
pub const DEFAULT_LONG_WINDOW: usize = 50;
pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;

/// Moving-average crossover windows; `1 <= short_window < long_window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmaCrossoverParams {
    short_window: usize,
    long_window: usize,
}

impl SmaCrossoverParams {
    pub fn new(short_window: usize, long_window: usize) -> Result<Self, BacktestError> {
        if short_window < 1 {
            return Err(BacktestError::invalid_params(
                "sma_crossover",
                "short_window must be at least 1",
            ));
        }
        if short_window >= long_window {
            return Err(BacktestError::invalid_params(
                "sma_crossover",
                format!(
                    "short_window ({}) must be less than long_window ({})",
                    short_window, long_window
                ),
            ));
        }
        Ok(Self {
            short_window,
            long_window,
        })
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }
}

/// RSI threshold rule; `period >= 1`, `0 <= oversold < overbought <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RsiParams {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiParams {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Result<Self, BacktestError> {
        if period < 1 {
            return Err(BacktestError::invalid_params("rsi", "period must be at least 1"));
        }
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(oversold) || !in_range(overbought) {
            return Err(BacktestError::invalid_params(
                "rsi",
                "oversold and overbought must lie within 0..=100",
            ));
        }
        if oversold >= overbought {
            return Err(BacktestError::invalid_params(
                "rsi",
                format!(
                    "oversold ({}) must be below overbought ({})",
                    oversold, overbought
                ),
            ));
        }
        Ok(Self {
            period,
            oversold,
            overbought,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn oversold(&self) -> f64 {
        self.oversold
    }

    pub fn overbought(&self) -> f64 {
        self.overbought
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    BuyAndHold,
    #[serde(rename = "sma_crossover")]
    MovingAverageCrossover(SmaCrossoverParams),
    #[serde(rename = "rsi")]
    RsiThreshold(RsiParams),
}

impl StrategyKind {
    /// Build a validated rule from its name and a parameter mapping.
    /// Missing parameters take their defaults.
    pub fn from_params(kind: &str, params: &BTreeMap<String, f64>) -> Result<Self, BacktestError> {
        match kind.trim().to_lowercase().as_str() {
            "buy_and_hold" | "buy_hold" => Ok(StrategyKind::BuyAndHold),
            "sma_crossover" | "moving_average_crossover" => {
                let short = window_param(params, "sma_crossover", "short_window", DEFAULT_SHORT_WINDOW)?;
                let long = window_param(params, "sma_crossover", "long_window", DEFAULT_LONG_WINDOW)?;
                Ok(StrategyKind::MovingAverageCrossover(SmaCrossoverParams::new(short, long)?))
            }
            "rsi" | "rsi_threshold" => {
                let period = window_param(params, "rsi", "period", DEFAULT_RSI_PERIOD)?;
                let oversold = params.get("oversold").copied().unwrap_or(DEFAULT_OVERSOLD);
                let overbought = params.get("overbought").copied().unwrap_or(DEFAULT_OVERBOUGHT);
                Ok(StrategyKind::RsiThreshold(RsiParams::new(period, oversold, overbought)?))
            }
            other => Err(BacktestError::invalid_params(
                other,
                "unknown strategy kind (expected buy_and_hold, sma_crossover or rsi)",
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::BuyAndHold => "buy_and_hold",
            StrategyKind::MovingAverageCrossover(_) => "sma_crossover",
            StrategyKind::RsiThreshold(_) => "rsi",
        }
    }

    /// Number of leading bars that cannot carry a signal.
    pub fn warmup_bars(&self) -> usize {
        match self {
            StrategyKind::BuyAndHold => 0,
            StrategyKind::MovingAverageCrossover(p) => p.long_window - 1,
            StrategyKind::RsiThreshold(p) => p.period,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::BuyAndHold => write!(f, "BUY_AND_HOLD"),
            StrategyKind::MovingAverageCrossover(p) => {
                write!(f, "SMA_CROSSOVER({},{})", p.short_window, p.long_window)
            }
            StrategyKind::RsiThreshold(p) => {
                write!(f, "RSI({}, {}/{})", p.period, p.oversold, p.overbought)
            }
        }
    }
}

fn window_param(
    params: &BTreeMap<String, f64>,
    strategy: &str,
    key: &str,
    default: usize,
) -> Result<usize, BacktestError> {
    match params.get(key) {
        None => Ok(default),
        Some(&v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(&v) => Err(BacktestError::invalid_params(
            strategy,
            format!("{} must be a whole non-negative number, got {}", key, v),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Strategy {
    pub name: String,
    pub description: String,
    pub kind: StrategyKind,
}
