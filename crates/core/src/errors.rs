use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure tags surfaced to clients in the error envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ClassifierUnavailable,
    QueryGenerationFailed,
    UnsafeQuery,
    QueryExecutionFailed,
    HypothesisGenerationFailed,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        Self::InvalidInput,
        Self::ClassifierUnavailable,
        Self::QueryGenerationFailed,
        Self::UnsafeQuery,
        Self::QueryExecutionFailed,
        Self::HypothesisGenerationFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ClassifierUnavailable => "classifier_unavailable",
            Self::QueryGenerationFailed => "query_generation_failed",
            Self::UnsafeQuery => "unsafe_query",
            Self::QueryExecutionFailed => "query_execution_failed",
            Self::HypothesisGenerationFailed => "hypothesis_generation_failed",
        }
    }

    /// Whether resubmitting the same question verbatim can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ClassifierUnavailable
                | Self::QueryGenerationFailed
                | Self::QueryExecutionFailed
                | Self::HypothesisGenerationFailed
        )
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            Self::InvalidInput => "Enter a non-empty question and try again.",
            Self::ClassifierUnavailable => {
                "The language model is not reachable. Check that it is running and retry."
            }
            Self::QueryGenerationFailed => "No query could be generated. Try rephrasing the question.",
            Self::UnsafeQuery => {
                "The generated query was blocked because it was not read-only. Rephrase the question instead of retrying it."
            }
            Self::QueryExecutionFailed => {
                "The generated query failed against the dataset. Try a more specific question."
            }
            Self::HypothesisGenerationFailed => {
                "No testable hypotheses were produced. Try naming the factors you are interested in."
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AnalysisError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }
}

/// Failure reported by an external collaborator (LLM, data source, renderer, ...).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{capability} is unavailable: {message}")]
    Unavailable { capability: &'static str, message: String },
    #[error("{capability} timed out after {after_ms} ms")]
    Timeout { capability: &'static str, after_ms: u64 },
    #[error("{capability} returned unusable output: {message}")]
    InvalidOutput { capability: &'static str, message: String },
    #[error("{capability} rejected the request: {message}")]
    Rejected { capability: &'static str, message: String },
}

impl CapabilityError {
    pub fn unavailable(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable { capability, message: message.into() }
    }

    pub fn invalid_output(capability: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOutput { capability, message: message.into() }
    }

    pub fn rejected(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected { capability, message: message.into() }
    }

    pub fn capability(&self) -> &'static str {
        match self {
            Self::Unavailable { capability, .. }
            | Self::Timeout { capability, .. }
            | Self::InvalidOutput { capability, .. }
            | Self::Rejected { capability, .. } => capability,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Converts the collaborator failure into the taxonomy entry owned by the caller,
    /// keeping the original error text for diagnostics.
    pub fn into_analysis(self, kind: ErrorKind) -> AnalysisError {
        AnalysisError::new(kind, self.to_string())
    }
}

/// Transport-level failures; these never carry an analysis envelope.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}
