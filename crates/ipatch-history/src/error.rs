//! Error types for the history layer.

use crate::buffer::Version;
use thiserror::Error;

/// Errors that can occur when addressing or persisting history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("Version {version} is outside the retained window [{base}, {current}]")]
    OutOfWindow {
        version: Version,
        base: Version,
        current: Version,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;
