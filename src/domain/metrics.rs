//! Performance metrics derived from a simulation.
//!
//! `Metrics` keeps raw fractions. `PerformanceMetrics` is the rounded,
//! percent-scaled view handed to reports.

use super::portfolio::EquityPoint;
use serde::Serialize;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub cagr: f64,
    /// `None` with fewer than two returns or zero variance.
    pub sharpe_ratio: Option<f64>,
    /// Largest peak-to-trough decline, as a fraction <= 0.
    pub max_drawdown: f64,
    /// Only reported for single-instrument runs.
    pub win_rate: Option<f64>,
    pub total_trades: usize,
    pub final_capital: f64,
}

impl Metrics {
    pub fn compute(
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        daily_returns: &[f64],
        risk_free_rate: f64,
    ) -> Self {
        let final_capital = equity_curve
            .last()
            .map(|p| p.capital)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            final_capital / initial_capital - 1.0
        } else {
            0.0
        };

        let elapsed_days = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days(),
            _ => 0,
        };
        let years = elapsed_days as f64 / DAYS_PER_YEAR;
        let growth = 1.0 + total_return;
        let cagr = if years > 0.0 && growth > 0.0 {
            growth.powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        Metrics {
            total_return,
            cagr,
            sharpe_ratio: sharpe_ratio(daily_returns, risk_free_rate / TRADING_DAYS_PER_YEAR),
            max_drawdown: compute_drawdown(equity_curve),
            win_rate: None,
            total_trades: 0,
            final_capital,
        }
    }

    pub fn summary(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            cagr: round2(self.cagr * 100.0),
            sharpe: self.sharpe_ratio.map(round2),
            total_return: round2(self.total_return * 100.0),
            max_drawdown: round2(self.max_drawdown * 100.0),
            win_rate: self.win_rate.map(|w| round2(w * 100.0)),
            total_trades: self.total_trades,
        }
    }
}

/// Presentation form: percentages rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    #[serde(rename = "CAGR")]
    pub cagr: f64,
    #[serde(rename = "Sharpe")]
    pub sharpe: Option<f64>,
    #[serde(rename = "TotalReturn")]
    pub total_return: f64,
    #[serde(rename = "MaxDrawdown")]
    pub max_drawdown: f64,
    #[serde(rename = "WinRate")]
    pub win_rate: Option<f64>,
    #[serde(rename = "TotalTrades")]
    pub total_trades: usize,
}

pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid "-0.0" in reports
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// min(equity / running_peak - 1), so 0 for a curve that never falls.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.capital;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.capital > peak {
            peak = point.capital;
        } else if peak > 0.0 {
            max_dd = max_dd.min(point.capital / peak - 1.0);
        }
    }
    max_dd
}

/// Annualised Sharpe ratio with sample standard deviation (n - 1).
fn sharpe_ratio(returns: &[f64], daily_rf: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if !stddev.is_finite() || stddev <= f64::EPSILON * mean.abs().max(1.0) {
        return None;
    }
    Some((mean - daily_rf) / stddev * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Share of strictly positive returns among the given ones.
pub fn win_rate(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let wins = returns.iter().filter(|&&r| r > 0.0).count();
    Some(wins as f64 / returns.len() as f64)
}
