//! Core domain types and the backtest engine.

pub mod ohlcv;
pub mod price_series;
pub mod indicator;
pub mod strategy;
pub mod signal;
pub mod returns;
pub mod portfolio;
pub mod metrics;
pub mod trade_log;
pub mod monthly;
pub mod backtest;
pub mod universe;
pub mod config_validation;
pub mod error;
