//! Month-over-month returns for equity curves and single instruments.

use crate::domain::portfolio::EquityPoint;
use crate::domain::price_series::PriceSeries;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub return_pct: f64,
}

/// Compounded return of each calendar month in the curve.
///
/// A month's return runs from the previous month's last value (or the first
/// value of the curve) to its own last value.
pub fn monthly_returns(equity_curve: &[EquityPoint]) -> Vec<MonthlyReturn> {
    month_over_month(equity_curve.iter().map(|p| (p.date, p.capital)))
}

/// Month-end close changes of one instrument, in percent.
pub fn instrument_monthly_returns(series: &PriceSeries) -> Vec<MonthlyReturn> {
    month_over_month(series.bars.iter().map(|bar| (bar.date, bar.close)))
}

fn month_over_month(values: impl Iterator<Item = (NaiveDate, f64)>) -> Vec<MonthlyReturn> {
    let mut opening: Option<f64> = None;
    let mut month_end: BTreeMap<(i32, u32), f64> = BTreeMap::new();

    for (date, value) in values {
        opening.get_or_insert(value);
        month_end.insert((date.year(), date.month()), value);
    }

    let Some(mut reference) = opening else {
        return Vec::new();
    };

    month_end
        .into_iter()
        .map(|((year, month), end)| {
            let return_pct = if reference > 0.0 {
                (end / reference - 1.0) * 100.0
            } else {
                0.0
            };
            reference = end;
            MonthlyReturn {
                year,
                month,
                return_pct,
            }
        })
        .collect()
}
