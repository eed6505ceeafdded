//! Instrument universe selection port.

use crate::domain::error::BacktestError;
use chrono::NaiveDate;

pub trait UniverseSelector {
    /// The `top_n` highest-ranked instrument codes as of `as_of`, best first.
    fn select(&self, as_of: NaiveDate, top_n: usize) -> Result<Vec<String>, BacktestError>;
}
