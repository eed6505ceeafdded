//! Returns engine: aligned closes + signals → daily and per-period returns.
//!
//! A position taken on date `t-1` earns the close-to-close move from `t-1`
//! to `t`. Daily returns are compounded within each rebalance period; days
//! without a defined return contribute nothing.

use crate::domain::price_series::{AlignedCloses, PriceSeries, align_closes};
use crate::domain::signal::{Signal, SignalSeries};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalancePeriod {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl RebalancePeriod {
    /// First calendar day of the grid bucket containing `date`.
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        let first_of = |month: u32| NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date);
        match self {
            RebalancePeriod::Daily => date,
            RebalancePeriod::Weekly => {
                date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            RebalancePeriod::Monthly => first_of(date.month()),
            RebalancePeriod::Quarterly => first_of((date.month0() / 3) * 3 + 1),
            RebalancePeriod::Annually => first_of(1),
        }
    }
}

impl FromStr for RebalancePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "d" => Ok(RebalancePeriod::Daily),
            "weekly" | "w" => Ok(RebalancePeriod::Weekly),
            "monthly" | "m" => Ok(RebalancePeriod::Monthly),
            "quarterly" | "q" => Ok(RebalancePeriod::Quarterly),
            "annually" | "yearly" | "y" => Ok(RebalancePeriod::Annually),
            other => Err(format!(
                "unknown rebalance period '{}' (expected daily, weekly, monthly, quarterly or annually)",
                other
            )),
        }
    }
}

impl fmt::Display for RebalancePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebalancePeriod::Daily => "daily",
            RebalancePeriod::Weekly => "weekly",
            RebalancePeriod::Monthly => "monthly",
            RebalancePeriod::Quarterly => "quarterly",
            RebalancePeriod::Annually => "annually",
        };
        f.write_str(name)
    }
}

/// Per-instrument daily returns on the unified calendar. `None` = undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReturns {
    pub dates: Vec<NaiveDate>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl DailyReturns {
    pub fn column(&self, code: &str) -> Option<&[Option<f64>]> {
        self.columns.get(code).map(|c| c.as_slice())
    }

    /// Dated returns of one instrument, skipping undefined days.
    pub fn defined(&self, code: &str) -> Vec<(NaiveDate, f64)> {
        self.column(code)
            .map(|column| {
                self.dates
                    .iter()
                    .zip(column)
                    .filter_map(|(date, r)| r.map(|r| (*date, r)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Plain close-to-close changes, i.e. a permanently long position.
pub fn price_daily_returns(aligned: &AlignedCloses) -> DailyReturns {
    let columns = aligned
        .columns
        .iter()
        .map(|(code, closes)| {
            let positions = vec![Some(Signal::Long); closes.len()];
            (code.clone(), position_returns(closes, &positions))
        })
        .collect();

    DailyReturns {
        dates: aligned.dates.clone(),
        columns,
    }
}

/// Signal-weighted daily returns. Instruments without a signal series have no
/// defined returns.
pub fn strategy_daily_returns(
    aligned: &AlignedCloses,
    signals: &BTreeMap<String, SignalSeries>,
) -> DailyReturns {
    let columns = aligned
        .columns
        .iter()
        .map(|(code, closes)| {
            let positions = match signals.get(code) {
                Some(series) => carry_forward(series, &aligned.dates),
                None => vec![None; closes.len()],
            };
            (code.clone(), position_returns(closes, &positions))
        })
        .collect();

    DailyReturns {
        dates: aligned.dates.clone(),
        columns,
    }
}

/// Project a signal onto `timeline`: each date takes the latest signal dated
/// on or before it.
pub fn carry_forward(series: &SignalSeries, timeline: &[NaiveDate]) -> Vec<Option<Signal>> {
    let mut next = 0;
    let mut current: Option<Signal> = None;
    timeline
        .iter()
        .map(|date| {
            while next < series.points.len() && series.points[next].date <= *date {
                current = series.points[next].signal;
                next += 1;
            }
            current
        })
        .collect()
}

fn position_returns(closes: &[Option<f64>], positions: &[Option<Signal>]) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|t| {
            if t == 0 {
                return None;
            }
            match (closes[t - 1], closes[t], positions[t - 1]) {
                (Some(prev), Some(curr), Some(signal)) if prev > 0.0 => {
                    Some(signal.position() * (curr / prev - 1.0))
                }
                _ => None,
            }
        })
        .collect()
}

/// One rebalance period: grid start, last trading date inside it, and the
/// compounded return of every instrument with data in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReturn {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub returns: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReturns {
    pub frequency: RebalancePeriod,
    /// First date of the underlying calendar.
    pub first_date: Option<NaiveDate>,
    pub periods: Vec<PeriodReturn>,
}

impl PeriodReturns {
    /// Period start date → instrument → compounded return.
    pub fn by_start(&self) -> BTreeMap<NaiveDate, &BTreeMap<String, f64>> {
        self.periods.iter().map(|p| (p.start, &p.returns)).collect()
    }
}

pub fn period_returns(daily: &DailyReturns, frequency: RebalancePeriod) -> PeriodReturns {
    let mut periods: Vec<PeriodReturn> = Vec::new();
    let mut growth: BTreeMap<String, f64> = BTreeMap::new();

    for (t, date) in daily.dates.iter().enumerate() {
        let start = frequency.period_start(*date);
        let opens_new_period = periods.last().is_none_or(|p| p.start != start);
        if opens_new_period {
            if let Some(done) = periods.last_mut() {
                done.returns = compounded(&mut growth);
            }
            periods.push(PeriodReturn {
                start,
                end: *date,
                returns: BTreeMap::new(),
            });
        }
        if let Some(current) = periods.last_mut() {
            current.end = *date;
        }

        for (code, column) in &daily.columns {
            if let Some(r) = column[t] {
                *growth.entry(code.clone()).or_insert(1.0) *= 1.0 + r;
            }
        }
    }
    if let Some(done) = periods.last_mut() {
        done.returns = compounded(&mut growth);
    }

    PeriodReturns {
        frequency,
        first_date: daily.dates.first().copied(),
        periods,
    }
}

fn compounded(growth: &mut BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    std::mem::take(growth)
        .into_iter()
        .map(|(code, g)| (code, g - 1.0))
        .collect()
}

/// Raw price returns per rebalance period for a basket of instruments.
pub fn price_period_returns(series: &[PriceSeries], frequency: RebalancePeriod) -> PeriodReturns {
    period_returns(&price_daily_returns(&align_closes(series)), frequency)
}
