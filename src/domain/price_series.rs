//! Per-instrument price history and unified multi-instrument calendar.

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Ordered daily bars for one instrument. Dates are strictly increasing.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub code: String,
    pub bars: Vec<PriceBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl PriceSeries {
    pub fn new(code: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, BacktestError> {
        let code = code.into();

        for bar in &bars {
            if let Some(reason) = bar.defect() {
                return Err(BacktestError::InvalidPriceData { code, reason });
            }
        }
        if let Some(pair) = bars.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(BacktestError::InvalidPriceData {
                reason: format!(
                    "dates must be strictly increasing ({} followed by {})",
                    pair[0].date, pair[1].date
                ),
                code,
            });
        }

        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(Self {
            code,
            bars,
            date_index,
        })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// Copy of this series holding only bars on or before `date`.
    pub fn truncated_to(&self, date: NaiveDate) -> PriceSeries {
        let end = self.bars.partition_point(|b| b.date <= date);
        self.slice(0, end)
    }

    /// Copy of this series restricted to `start..=end`.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let from = self.bars.partition_point(|b| b.date < start);
        let to = self.bars.partition_point(|b| b.date <= end).max(from);
        self.slice(from, to)
    }

    fn slice(&self, from: usize, to: usize) -> PriceSeries {
        let bars = self.bars[from..to].to_vec();
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        PriceSeries {
            code: self.code.clone(),
            bars,
            date_index,
        }
    }
}

/// Union of all trading dates across the given series, ascending.
pub fn build_unified_timeline(series: &[PriceSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// Closes of several instruments on one calendar.
///
/// Each column is forward-filled: a date with no bar takes the most recent
/// earlier close. Dates before an instrument's first bar stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedCloses {
    pub dates: Vec<NaiveDate>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl AlignedCloses {
    pub fn column(&self, code: &str) -> Option<&[Option<f64>]> {
        self.columns.get(code).map(|c| c.as_slice())
    }
}

pub fn align_closes(series: &[PriceSeries]) -> AlignedCloses {
    let dates = build_unified_timeline(series);

    let columns = series
        .iter()
        .map(|s| {
            let mut last: Option<f64> = None;
            let column = dates
                .iter()
                .map(|date| {
                    if let Some(bar) = s.get_bar(*date) {
                        last = Some(bar.close);
                    }
                    last
                })
                .collect();
            (s.code.clone(), column)
        })
        .collect();

    AlignedCloses { dates, columns }
}
