use serde::Serialize;
use thiserror::Error;

/// Source-level errors for market and rate data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("API error: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No data available for {symbol}")]
    NoData { symbol: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for data operations
pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    /// Create a parse error with context
    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        DataError::Parse {
            message: message.into(),
        }
    }

    /// Create an API error with status code
    pub fn api_error<S: Into<String>>(status_code: u16, message: S) -> Self {
        DataError::Api {
            status_code,
            message: message.into(),
        }
    }
}

/// Per-identifier failure reported inside a snapshot.
///
/// The two kinds render the same way to the pipeline but stay apart for
/// diagnostics: `NotFound` means the batch response had no entry for the
/// symbol, `NoData` means it had one but nothing usable was left after
/// dropping gaps.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstrumentError {
    #[error("Data not found")]
    #[serde(rename = "Data not found")]
    NotFound,

    #[error("No data available")]
    #[serde(rename = "No data available")]
    NoData,
}
