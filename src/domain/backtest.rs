//! Backtest orchestration: prices → signals → returns → equity → metrics.
//!
//! `run_backtest` is pure over its inputs. Independent runs share nothing and
//! `run_many` fans them out over a rayon pool.

use crate::domain::error::BacktestError;
use crate::domain::metrics::{Metrics, PerformanceMetrics, round2, win_rate};
use crate::domain::monthly::{MonthlyReturn, instrument_monthly_returns, monthly_returns};
use crate::domain::portfolio::{
    AllocationSnapshot, EquityPoint, PortfolioWeights, daily_equity, daily_portfolio_returns,
    simulate,
};
use crate::domain::price_series::{PriceSeries, align_closes};
use crate::domain::returns::{RebalancePeriod, period_returns, strategy_daily_returns};
use crate::domain::signal::{SignalSeries, generate};
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::domain::trade_log::{Trade, extract};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    /// `None` picks daily for one instrument, quarterly for a basket.
    pub rebalance: Option<RebalancePeriod>,
    /// Annual rate, subtracted from daily returns in the Sharpe ratio.
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    pub fn rebalance_for(&self, instruments: usize) -> RebalancePeriod {
        self.rebalance.unwrap_or(if instruments <= 1 {
            RebalancePeriod::Daily
        } else {
            RebalancePeriod::Quarterly
        })
    }

    fn check(&self) -> Result<(), BacktestError> {
        if self.start_date > self.end_date {
            return Err(BacktestError::invalid_params(
                "backtest",
                format!(
                    "start_date ({}) must not be after end_date ({})",
                    self.start_date, self.end_date
                ),
            ));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::invalid_params(
                "backtest",
                format!("initial_capital must be positive, got {}", self.initial_capital),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(BacktestError::invalid_params(
                "backtest",
                "risk_free_rate must be a finite number",
            ));
        }
        Ok(())
    }
}

/// Outcome of one run, built once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub strategy: StrategyKind,
    pub codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub rebalance: RebalancePeriod,
    pub equity_curve: Vec<EquityPoint>,
    pub allocation_history: Vec<AllocationSnapshot>,
    pub performance_metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    /// Month-over-month returns of the daily marked-to-market equity.
    pub monthly_returns: Vec<MonthlyReturn>,
    /// Month-over-month close returns per instrument, for comparison.
    pub instrument_monthly_returns: BTreeMap<String, Vec<MonthlyReturn>>,
    #[serde(skip)]
    pub metrics: Metrics,
}

impl BacktestResult {
    /// Copy with money, prices and percentages rounded to two decimals.
    pub fn rounded(&self) -> BacktestResult {
        let mut out = self.clone();
        for point in &mut out.equity_curve {
            point.capital = round2(point.capital);
        }
        for snapshot in &mut out.allocation_history {
            for value in snapshot.allocations.values_mut() {
                *value = round2(*value);
            }
        }
        for trade in &mut out.trades {
            trade.entry_price = round2(trade.entry_price);
            trade.exit_price = round2(trade.exit_price);
            trade.return_pct = round2(trade.return_pct);
        }
        let instrument_months = out.instrument_monthly_returns.values_mut().flatten();
        for month in out.monthly_returns.iter_mut().chain(instrument_months) {
            month.return_pct = round2(month.return_pct);
        }
        out
    }

    pub fn final_capital(&self) -> f64 {
        self.metrics.final_capital
    }
}

/// A run either completes or finds nothing to simulate.
#[derive(Debug, Clone, PartialEq)]
pub enum BacktestOutcome {
    Completed(Box<BacktestResult>),
    NoData { reason: String },
}

impl BacktestOutcome {
    pub fn result(&self) -> Option<&BacktestResult> {
        match self {
            BacktestOutcome::Completed(result) => Some(result.as_ref()),
            BacktestOutcome::NoData { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<BacktestResult> {
        match self {
            BacktestOutcome::Completed(result) => Some(*result),
            BacktestOutcome::NoData { .. } => None,
        }
    }
}

pub fn run_backtest(
    series: &[PriceSeries],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestOutcome, BacktestError> {
    config.check()?;

    let mut seen = HashSet::new();
    if let Some(dup) = series.iter().find(|s| !seen.insert(s.code.as_str())) {
        return Err(BacktestError::InvalidPriceData {
            code: dup.code.clone(),
            reason: "more than one series supplied for this code".to_string(),
        });
    }

    let windowed: Vec<PriceSeries> = series
        .iter()
        .map(|s| s.within(config.start_date, config.end_date))
        .filter(|s| !s.is_empty())
        .collect();

    if windowed.is_empty() {
        let reason = format!(
            "no price data between {} and {}",
            config.start_date, config.end_date
        );
        tracing::warn!(strategy = %strategy.name, "{}", reason);
        return Ok(BacktestOutcome::NoData { reason });
    }

    let codes: Vec<String> = windowed.iter().map(|s| s.code.clone()).collect();
    let weights = PortfolioWeights::equal(codes.iter().cloned())?;
    let rebalance = config.rebalance_for(windowed.len());
    tracing::info!(
        strategy = %strategy.name,
        kind = %strategy.kind,
        instruments = windowed.len(),
        %rebalance,
        "running backtest"
    );

    let signals: BTreeMap<String, SignalSeries> = windowed
        .iter()
        .map(|s| generate(s, &strategy.kind).map(|sig| (s.code.clone(), sig)))
        .collect::<Result<_, _>>()?;

    let daily = strategy_daily_returns(&align_closes(&windowed), &signals);
    let periods = period_returns(&daily, rebalance);
    let simulation = simulate(&periods, &weights, config.initial_capital)?;

    let portfolio_daily: Vec<f64> = daily_portfolio_returns(&daily, &weights)
        .into_iter()
        .map(|(_, r)| r)
        .collect();

    let mut trades: Vec<Trade> = windowed
        .iter()
        .filter_map(|s| signals.get(&s.code).map(|sig| extract(sig, s)))
        .flatten()
        .collect();
    trades.sort_by(|a, b| {
        a.entry_date
            .cmp(&b.entry_date)
            .then_with(|| a.code.cmp(&b.code))
    });

    let mut metrics = Metrics::compute(
        &simulation.equity_curve,
        config.initial_capital,
        &portfolio_daily,
        config.risk_free_rate,
    );
    if windowed.len() == 1 {
        metrics.win_rate = win_rate(&portfolio_daily);
    }
    metrics.total_trades = trades.len();

    let summary = metrics.summary();
    tracing::info!(
        strategy = %strategy.name,
        total_return = summary.total_return,
        max_drawdown = summary.max_drawdown,
        trades = trades.len(),
        "backtest complete"
    );

    Ok(BacktestOutcome::Completed(Box::new(BacktestResult {
        strategy_name: strategy.name.clone(),
        strategy: strategy.kind,
        codes,
        start_date: config.start_date,
        end_date: config.end_date,
        initial_capital: config.initial_capital,
        rebalance,
        monthly_returns: monthly_returns(&daily_equity(
            &daily,
            rebalance,
            &weights,
            config.initial_capital,
        )),
        instrument_monthly_returns: windowed
            .iter()
            .map(|s| (s.code.clone(), instrument_monthly_returns(s)))
            .collect(),
        equity_curve: simulation.equity_curve,
        allocation_history: simulation.allocation_history,
        performance_metrics: summary,
        trades,
        metrics,
    })))
}

/// Run several strategies over the same prices in parallel. Results keep
/// the order of `strategies`.
pub fn run_many(
    series: &[PriceSeries],
    strategies: &[Strategy],
    config: &BacktestConfig,
) -> Vec<Result<BacktestOutcome, BacktestError>> {
    strategies
        .par_iter()
        .map(|strategy| run_backtest(series, strategy, config))
        .collect()
}
