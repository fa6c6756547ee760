//! Payload error types

use crate::outcome::FailureKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("no output")]
    Empty,
    
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    
    #[error("field {field} is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },
    
    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

impl PayloadError {
    /// Structural problems are malformed output; conversion problems on an
    /// otherwise well-formed document are unexpected.
    pub fn kind(&self) -> FailureKind {
        match self {
            PayloadError::Empty | PayloadError::Json(_) => FailureKind::MalformedOutput,
            PayloadError::InvalidTimestamp { .. }
            | PayloadError::NotNumeric { .. }
            | PayloadError::OutOfRange { .. } => FailureKind::Unexpected,
        }
    }
}
