//! Error types for curve loading, blending and weight-grid search.

use thiserror::Error;

/// Main error type for the portfolio combination engine.
#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("Equity curve not found for {strategy}: {path}")]
    NotFound { strategy: String, path: String },

    #[error("Malformed equity curve: {0}")]
    Malformed(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("No common dates found across equity curves")]
    NoCommonDates,

    #[error("No data to compute metrics from")]
    NoData,

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MosaicError {
    /// Whether the error only invalidates the combination it was raised for.
    ///
    /// The weight-grid sweep drops candidates failing with one of these and
    /// keeps going.
    pub fn is_candidate_local(&self) -> bool {
        matches!(
            self,
            MosaicError::NotFound { .. }
                | MosaicError::Malformed(_)
                | MosaicError::InvalidWeights(_)
                | MosaicError::NoCommonDates
                | MosaicError::NoData
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MosaicError>;
