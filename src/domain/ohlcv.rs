//! Daily OHLCV price bar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One instrument's prices on one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    /// Reason this bar is unusable, if any: prices must be finite and non-negative.
    pub fn defect(&self) -> Option<String> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        fields.iter().find_map(|&(name, value)| {
            if !value.is_finite() {
                Some(format!("{} on {} is not a finite number", name, self.date))
            } else if value < 0.0 {
                Some(format!("{} on {} is negative ({})", name, self.date, value))
            } else {
                None
            }
        })
    }
}
