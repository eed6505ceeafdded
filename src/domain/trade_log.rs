//! Trade log: discrete round trips read off signal transitions.
//!
//! A transition is a bar whose signal differs from the bar before it
//! (warm-up bars count as flat). Each stretch between two consecutive
//! transitions is one trade in the direction of the first. Stretches spent
//! flat are not trades, and the last stretch is still open so it is not
//! reported.

use crate::domain::price_series::PriceSeries;
use crate::domain::signal::{Signal, SignalSeries};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub code: String,
    pub side: Signal,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Direction-adjusted percentage return.
    pub return_pct: f64,
}

impl Trade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }

    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }
}

/// Dates and new values of every signal change, in order.
pub fn transitions(signals: &SignalSeries) -> Vec<(NaiveDate, Signal)> {
    signals
        .points
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].signal.unwrap_or(Signal::Flat);
            let curr = w[1].signal.unwrap_or(Signal::Flat);
            (prev != curr).then_some((w[1].date, curr))
        })
        .collect()
}

pub fn extract(signals: &SignalSeries, prices: &PriceSeries) -> Vec<Trade> {
    transitions(signals)
        .windows(2)
        .filter(|w| w[0].1 != Signal::Flat)
        .filter_map(|w| {
            let (entry_date, side) = w[0];
            let (exit_date, _) = w[1];
            let entry_price = prices.get_bar(entry_date)?.close;
            let exit_price = prices.get_bar(exit_date)?.close;
            if entry_price <= 0.0 {
                return None;
            }
            let raw_pct = (exit_price / entry_price - 1.0) * 100.0;
            Some(Trade {
                code: prices.code.clone(),
                side,
                entry_date,
                exit_date,
                entry_price,
                exit_price,
                return_pct: side.position() * raw_pct,
            })
        })
        .collect()
}
