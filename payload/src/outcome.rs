//! Outcome of one invocation attempt

use crate::error::PayloadError;
use crate::result::MeasurementResult;
use std::fmt;

/// Closed set of reasons an invocation can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The tool exited with a non-zero status
    ProcessError,
    /// The tool exceeded its wall-clock budget and was killed
    Timeout,
    /// Empty or structurally unparsable output
    MalformedOutput,
    /// Anything else, including spawn errors and field conversion errors
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ProcessError => "process_error",
            FailureKind::Timeout => "timeout",
            FailureKind::MalformedOutput => "malformed_output",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ProbeFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl From<PayloadError> for ProbeFailure {
    fn from(err: PayloadError) -> Self {
        ProbeFailure::new(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success(MeasurementResult),
    Failure(ProbeFailure),
}

impl ProbeOutcome {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        ProbeOutcome::Failure(ProbeFailure::new(kind, detail))
    }
    
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }
}

impl From<Result<MeasurementResult, PayloadError>> for ProbeOutcome {
    fn from(parsed: Result<MeasurementResult, PayloadError>) -> Self {
        match parsed {
            Ok(result) => ProbeOutcome::Success(result),
            Err(e) => ProbeOutcome::Failure(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_payload_error_kinds() {
        assert_eq!(PayloadError::Empty.kind(), FailureKind::MalformedOutput);
        
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(PayloadError::from(json_err).kind(), FailureKind::MalformedOutput);
        
        let err = PayloadError::NotNumeric { field: "server.id", value: "abc".into() };
        assert_eq!(err.kind(), FailureKind::Unexpected);
    }
    
    #[test]
    fn test_empty_output_detail() {
        let outcome = ProbeOutcome::from(MeasurementResult::from_json(""));
        match outcome {
            ProbeOutcome::Failure(f) => {
                assert_eq!(f.kind, FailureKind::MalformedOutput);
                assert_eq!(f.detail, "no output");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
    
    #[test]
    fn test_kind_labels() {
        assert_eq!(FailureKind::ProcessError.to_string(), "process_error");
        assert_eq!(FailureKind::Timeout.as_str(), "timeout");
    }
}
