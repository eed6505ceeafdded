//! Signal generation: price history → per-date position (-1 / 0 / +1).
//!
//! The signal on bar `i` only reads bars `0..=i`. It is applied to the return
//! realised from bar `i` to bar `i + 1` by the returns engine.

use crate::domain::error::BacktestError;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::price_series::PriceSeries;
use crate::domain::strategy::{RsiParams, SmaCrossoverParams, StrategyKind};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Short,
    Flat,
    Long,
}

impl Signal {
    pub fn position(self) -> f64 {
        match self {
            Signal::Short => -1.0,
            Signal::Flat => 0.0,
            Signal::Long => 1.0,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Short => f.write_str("short"),
            Signal::Flat => f.write_str("flat"),
            Signal::Long => f.write_str("long"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalPoint {
    pub date: NaiveDate,
    /// `None` while the rule's indicators are still warming up.
    pub signal: Option<Signal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    pub code: String,
    pub points: Vec<SignalPoint>,
}

impl SignalSeries {
    pub fn signals(&self) -> Vec<Option<Signal>> {
        self.points.iter().map(|p| p.signal).collect()
    }
}

pub fn generate(series: &PriceSeries, kind: &StrategyKind) -> Result<SignalSeries, BacktestError> {
    if series.is_empty() {
        return Err(BacktestError::DataUnavailable {
            code: series.code.clone(),
        });
    }

    let signals = match kind {
        StrategyKind::BuyAndHold => vec![Some(Signal::Long); series.len()],
        StrategyKind::MovingAverageCrossover(params) => sma_crossover(series, params),
        StrategyKind::RsiThreshold(params) => rsi_threshold(series, params),
    };

    let points = series
        .bars
        .iter()
        .zip(signals)
        .map(|(bar, signal)| SignalPoint {
            date: bar.date,
            signal,
        })
        .collect();

    Ok(SignalSeries {
        code: series.code.clone(),
        points,
    })
}

/// `generate` for a rule given by name and a loose parameter mapping.
pub fn generate_with_params(
    series: &PriceSeries,
    kind: &str,
    params: &BTreeMap<String, f64>,
) -> Result<SignalSeries, BacktestError> {
    let kind = StrategyKind::from_params(kind, params)?;
    generate(series, &kind)
}

fn sma_crossover(series: &PriceSeries, params: &SmaCrossoverParams) -> Vec<Option<Signal>> {
    let short = calculate_sma(&series.bars, params.short_window());
    let long = calculate_sma(&series.bars, params.long_window());

    short
        .values
        .iter()
        .zip(&long.values)
        .map(|(s, l)| match (s.get(), l.get()) {
            (Some(s), Some(l)) if s > l => Some(Signal::Long),
            (Some(s), Some(l)) if s < l => Some(Signal::Short),
            (Some(_), Some(_)) => Some(Signal::Flat),
            _ => None,
        })
        .collect()
}

fn rsi_threshold(series: &PriceSeries, params: &RsiParams) -> Vec<Option<Signal>> {
    calculate_rsi(&series.bars, params.period())
        .values
        .iter()
        .map(|point| {
            point.get().map(|rsi| {
                if rsi < params.oversold() {
                    Signal::Long
                } else if rsi > params.overbought() {
                    Signal::Short
                } else {
                    Signal::Flat
                }
            })
        })
        .collect()
}
