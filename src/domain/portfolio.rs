//! Portfolio weights and capital compounding across rebalance periods.

use crate::domain::error::BacktestError;
use crate::domain::returns::{DailyReturns, PeriodReturns, RebalancePeriod};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Fixed instrument weights, held constant for a whole run.
/// Finite, non-negative and summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioWeights {
    weights: BTreeMap<String, f64>,
}

impl PortfolioWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, BacktestError> {
        if weights.is_empty() {
            return Err(BacktestError::InvalidWeights {
                reason: "at least one instrument is required".into(),
            });
        }
        if let Some((code, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(BacktestError::InvalidWeights {
                reason: format!("weight for {} must be finite and non-negative, got {}", code, w),
            });
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(BacktestError::InvalidWeights {
                reason: format!("weights must sum to 1, got {}", total),
            });
        }
        Ok(Self { weights })
    }

    /// Equal weight across the given instruments. Duplicates count once.
    pub fn equal<I, S>(codes: I) -> Result<Self, BacktestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes: Vec<String> = codes.into_iter().map(Into::into).collect();
        let mut weights: BTreeMap<String, f64> = codes.into_iter().map(|c| (c, 0.0)).collect();
        let share = 1.0 / weights.len() as f64;
        for w in weights.values_mut() {
            *w = share;
        }
        Self::new(weights)
    }

    /// Weight of `code`, 0 for instruments outside the portfolio.
    pub fn get(&self, code: &str) -> f64 {
        self.weights.get(code).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.weights.iter()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Σ wᵢ·rᵢ; instruments missing from `returns` contribute 0.
    pub fn portfolio_return(&self, returns: &BTreeMap<String, f64>) -> f64 {
        self.weights
            .iter()
            .map(|(code, w)| w * returns.get(code).copied().unwrap_or(0.0))
            .sum()
    }

    fn split(&self, capital: f64) -> BTreeMap<String, f64> {
        self.weights
            .iter()
            .map(|(code, w)| (code.clone(), capital * w))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub capital: f64,
}

/// Dollar allocation per instrument at one equity point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSnapshot {
    pub date: NaiveDate,
    pub allocations: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Simulation {
    pub equity_curve: Vec<EquityPoint>,
    pub allocation_history: Vec<AllocationSnapshot>,
}

impl Simulation {
    pub fn final_capital(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.capital)
    }
}

/// Compound `initial_capital` through every period.
///
/// The curve opens with `initial_capital` on the first calendar date and then
/// carries one point per period, dated at the period's last trading day. A
/// period ending on that opening date adds nothing and is skipped.
pub fn simulate(
    returns: &PeriodReturns,
    weights: &PortfolioWeights,
    initial_capital: f64,
) -> Result<Simulation, BacktestError> {
    if !initial_capital.is_finite() || initial_capital <= 0.0 {
        return Err(BacktestError::invalid_params(
            "portfolio",
            format!("initial_capital must be positive, got {}", initial_capital),
        ));
    }

    let Some(first_date) = returns.first_date else {
        return Ok(Simulation::default());
    };

    let anchor = EquityPoint {
        date: first_date,
        capital: initial_capital,
    };
    let equity_curve: Vec<EquityPoint> = std::iter::once(anchor)
        .chain(
            returns
                .periods
                .iter()
                .filter(|period| period.end != first_date)
                .scan(initial_capital, |capital, period| {
                    *capital *= 1.0 + weights.portfolio_return(&period.returns);
                    Some(EquityPoint {
                        date: period.end,
                        capital: *capital,
                    })
                }),
        )
        .collect();

    let allocation_history = equity_curve
        .iter()
        .map(|point| AllocationSnapshot {
            date: point.date,
            allocations: weights.split(point.capital),
        })
        .collect();

    Ok(Simulation {
        equity_curve,
        allocation_history,
    })
}

/// Weighted daily portfolio returns, one per date on which at least one
/// held instrument has a defined return.
pub fn daily_portfolio_returns(daily: &DailyReturns, weights: &PortfolioWeights) -> Vec<(NaiveDate, f64)> {
    daily
        .dates
        .iter()
        .enumerate()
        .filter_map(|(t, date)| {
            let mut any_defined = false;
            let mut total = 0.0;
            for (code, w) in weights.iter() {
                if let Some(r) = daily.column(code).and_then(|column| column[t]) {
                    any_defined = true;
                    total += w * r;
                }
            }
            any_defined.then_some((*date, total))
        })
        .collect()
}

/// Equity marked to market on every calendar date.
///
/// Weights drift within a rebalance period and snap back at each new period
/// start, so the value on a period's last day equals the matching `simulate`
/// point.
pub fn daily_equity(
    daily: &DailyReturns,
    frequency: RebalancePeriod,
    weights: &PortfolioWeights,
    initial_capital: f64,
) -> Vec<EquityPoint> {
    let mut curve = Vec::with_capacity(daily.dates.len());
    let mut growth: BTreeMap<&str, f64> = BTreeMap::new();
    let mut period: Option<NaiveDate> = None;
    let mut base = initial_capital;
    let mut value = initial_capital;

    for (t, date) in daily.dates.iter().enumerate() {
        let start = frequency.period_start(*date);
        if period != Some(start) {
            period = Some(start);
            base = value;
            growth.clear();
        }
        for (code, column) in &daily.columns {
            if let Some(r) = column[t] {
                *growth.entry(code.as_str()).or_insert(1.0) *= 1.0 + r;
            }
        }
        let drift: f64 = growth
            .iter()
            .map(|(code, g)| weights.get(code) * (g - 1.0))
            .sum();
        value = base * (1.0 + drift);
        curve.push(EquityPoint {
            date: *date,
            capital: value,
        });
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::returns::{PeriodReturn, period_returns};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn period(start: NaiveDate, end: NaiveDate, returns: &[(&str, f64)]) -> PeriodReturn {
        PeriodReturn {
            start,
            end,
            returns: returns.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
        }
    }

    fn daily_periods(first: NaiveDate, periods: Vec<PeriodReturn>) -> PeriodReturns {
        PeriodReturns {
            frequency: RebalancePeriod::Daily,
            first_date: Some(first),
            periods,
        }
    }

    #[test]
    fn equal_weights_sum_to_one() {
        let weights = PortfolioWeights::equal(["A", "B", "C"]).unwrap();
        assert_eq!(weights.len(), 3);
        assert!((weights.total() - 1.0).abs() < 1e-9);
        assert!((weights.get("B") - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(weights.get("Z"), 0.0);
    }

    #[test]
    fn equal_weights_dedupe_codes() {
        let weights = PortfolioWeights::equal(["A", "A", "B"]).unwrap();
        assert_eq!(weights.len(), 2);
        assert!((weights.get("A") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_weights_rejected() {
        let err = PortfolioWeights::equal(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidWeights { .. }));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let weights: BTreeMap<String, f64> = [("A".to_string(), 0.5), ("B".to_string(), 0.4)].into();
        assert!(matches!(
            PortfolioWeights::new(weights),
            Err(BacktestError::InvalidWeights { reason }) if reason.contains("sum to 1")
        ));
    }

    #[test]
    fn negative_or_nan_weights_rejected() {
        let negative: BTreeMap<String, f64> = [("A".to_string(), 1.5), ("B".to_string(), -0.5)].into();
        assert!(PortfolioWeights::new(negative).is_err());
        let nan: BTreeMap<String, f64> = [("A".to_string(), f64::NAN)].into();
        assert!(PortfolioWeights::new(nan).is_err());
    }

    #[test]
    fn simulate_compounds_multiplicatively() {
        let first = d(2024, 1, 1);
        let returns = daily_periods(
            first,
            vec![
                period(first, first, &[]),
                period(d(2024, 1, 2), d(2024, 1, 2), &[("A", 0.10)]),
                period(d(2024, 1, 3), d(2024, 1, 3), &[("A", 0.10)]),
            ],
        );
        let weights = PortfolioWeights::equal(["A"]).unwrap();
        let sim = simulate(&returns, &weights, 100_000.0).unwrap();

        let capitals: Vec<f64> = sim.equity_curve.iter().map(|p| p.capital).collect();
        assert_eq!(capitals.len(), 3);
        assert!((capitals[0] - 100_000.0).abs() < 1e-6);
        assert!((capitals[1] - 110_000.0).abs() < 1e-6);
        assert!((capitals[2] - 121_000.0).abs() < 1e-6);
        assert_eq!(sim.equity_curve[2].date, d(2024, 1, 3));
        assert!((sim.final_capital().unwrap() - 121_000.0).abs() < 1e-6);
    }

    #[test]
    fn missing_instrument_contributes_zero() {
        let first = d(2024, 1, 1);
        let returns = daily_periods(
            first,
            vec![period(d(2024, 1, 2), d(2024, 3, 31), &[("A", 0.20)])],
        );
        let weights = PortfolioWeights::equal(["A", "B"]).unwrap();
        let sim = simulate(&returns, &weights, 1_000.0).unwrap();
        assert!((sim.equity_curve[1].capital - 1_100.0).abs() < 1e-9);
    }

    #[test]
    fn allocation_snapshots_follow_equity() {
        let first = d(2024, 1, 1);
        let returns = daily_periods(
            first,
            vec![period(d(2024, 1, 2), d(2024, 1, 2), &[("A", 0.10), ("B", -0.10)])],
        );
        let weights = PortfolioWeights::equal(["A", "B"]).unwrap();
        let sim = simulate(&returns, &weights, 1_000.0).unwrap();

        assert_eq!(sim.allocation_history.len(), sim.equity_curve.len());
        for (snapshot, point) in sim.allocation_history.iter().zip(&sim.equity_curve) {
            assert_eq!(snapshot.date, point.date);
            let total: f64 = snapshot.allocations.values().sum();
            assert!((total - point.capital).abs() < 1e-9);
        }
        assert!((sim.allocation_history[1].allocations["A"] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn simulate_no_dates_is_empty() {
        let returns = PeriodReturns {
            frequency: RebalancePeriod::Quarterly,
            first_date: None,
            periods: vec![],
        };
        let weights = PortfolioWeights::equal(["A"]).unwrap();
        let sim = simulate(&returns, &weights, 100.0).unwrap();
        assert!(sim.equity_curve.is_empty());
        assert!(sim.allocation_history.is_empty());
        assert_eq!(sim.final_capital(), None);
    }

    #[test]
    fn simulate_rejects_non_positive_capital() {
        let returns = daily_periods(d(2024, 1, 1), vec![]);
        let weights = PortfolioWeights::equal(["A"]).unwrap();
        assert!(simulate(&returns, &weights, 0.0).is_err());
        assert!(simulate(&returns, &weights, f64::NAN).is_err());
    }

    #[test]
    fn simulate_is_deterministic() {
        let first = d(2024, 1, 1);
        let returns = daily_periods(
            first,
            vec![
                period(d(2024, 1, 2), d(2024, 1, 2), &[("A", 0.013)]),
                period(d(2024, 1, 3), d(2024, 1, 3), &[("A", -0.007)]),
            ],
        );
        let weights = PortfolioWeights::equal(["A"]).unwrap();
        let first_run = simulate(&returns, &weights, 50_000.0).unwrap();
        let second_run = simulate(&returns, &weights, 50_000.0).unwrap();
        assert_eq!(first_run, second_run);
    }

    #[test]
    fn daily_portfolio_returns_skip_empty_days() {
        let daily = DailyReturns {
            dates: vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)],
            columns: [
                ("A".to_string(), vec![None, Some(0.02), Some(0.04)]),
                ("B".to_string(), vec![None, None, Some(-0.02)]),
            ]
            .into(),
        };
        let weights = PortfolioWeights::equal(["A", "B"]).unwrap();
        let series = daily_portfolio_returns(&daily, &weights);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, d(2024, 1, 2));
        assert!((series[0].1 - 0.01).abs() < 1e-12);
        assert!((series[1].1 - 0.01).abs() < 1e-12);
    }

    #[test]
    fn daily_equity_meets_simulate_at_period_ends() {
        let dates: Vec<NaiveDate> = [(1, 30), (1, 31), (2, 1), (3, 29), (4, 1), (4, 2)]
            .iter()
            .map(|&(m, day)| d(2024, m, day))
            .collect();
        let daily = DailyReturns {
            dates,
            columns: [
                ("A".to_string(), vec![None, Some(0.10), Some(-0.05), Some(0.20), Some(0.01), None]),
                ("B".to_string(), vec![None, Some(-0.02), None, Some(0.03), Some(-0.04), Some(0.02)]),
            ]
            .into(),
        };
        let weights = PortfolioWeights::equal(["A", "B"]).unwrap();
        let frequency = RebalancePeriod::Quarterly;

        let curve = daily_equity(&daily, frequency, &weights, 1_000.0);
        let sim = simulate(&period_returns(&daily, frequency), &weights, 1_000.0).unwrap();

        assert_eq!(curve.len(), 6);
        assert!((curve[0].capital - 1_000.0).abs() < 1e-9);
        // Mid-quarter points drift with the basket.
        assert!((curve[1].capital - 1_040.0).abs() < 1e-9);
        for point in &sim.equity_curve {
            let daily_point = curve.iter().find(|p| p.date == point.date).unwrap();
            assert!((daily_point.capital - point.capital).abs() < 1e-9);
        }
    }

    #[test]
    fn daily_equity_empty_calendar() {
        let daily = DailyReturns {
            dates: vec![],
            columns: BTreeMap::new(),
        };
        let weights = PortfolioWeights::equal(["A"]).unwrap();
        assert!(daily_equity(&daily, RebalancePeriod::Monthly, &weights, 10.0).is_empty());
    }
}
