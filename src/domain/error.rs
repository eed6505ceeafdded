//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for backfolio.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("no price data available for {code}")]
    DataUnavailable { code: String },

    #[error("invalid parameters for {strategy}: {reason}")]
    InvalidParameters { strategy: String, reason: String },

    #[error("invalid price data for {code}: {reason}")]
    InvalidPriceData { code: String, reason: String },

    #[error("invalid portfolio weights: {reason}")]
    InvalidWeights { reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BacktestError {
    pub(crate) fn invalid_params(strategy: &str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidParameters {
            strategy: strategy.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BacktestError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_missing(section: &str, key: &str) -> Self {
        BacktestError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err {
            BacktestError::Io(_) | BacktestError::Serialization(_) => 1,
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. } => 2,
            BacktestError::DataSource { .. } => 3,
            BacktestError::InvalidParameters { .. }
            | BacktestError::InvalidWeights { .. }
            | BacktestError::Universe(_) => 4,
            BacktestError::DataUnavailable { .. } | BacktestError::InvalidPriceData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
