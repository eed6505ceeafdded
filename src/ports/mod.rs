//! Port traits: the engine's boundary to data, configuration and reports.

pub mod config_port;
pub mod data_port;
pub mod report_port;
pub mod universe_port;
