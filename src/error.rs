//! Error types for ABA Forecast

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by training, artifact handling and request parsing.
///
/// Malformed situational values inside a prediction request are not errors:
/// they are substituted with defaults during feature derivation.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Dataset not found at {}. Generate it first with `forecast generate`", path.display())]
    DatasetNotFound { path: PathBuf },

    #[error("Required column missing from dataset: {0}")]
    MissingColumn(String),

    #[error("Invalid value {value:?} in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Dataset contains no rows")]
    EmptyDataset,

    #[error("Dataset contains a single class; both escalation labels are required to train")]
    SingleClass,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model fitting failed: {0}")]
    ModelFit(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    #[error("Feature schema mismatch: model expects {expected:?}, runtime produces {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Failed to parse request: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl From<bincode::Error> for ForecastError {
    fn from(e: bincode::Error) -> Self {
        ForecastError::Artifact(e.to_string())
    }
}
