//! Shared error taxonomy.

use serde::{Deserialize, Serialize};

/// The kind of an engine error.
///
/// Concrete error enums map onto one of these so callers can decide how to
/// react without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input at the boundary. Surfaced immediately, never retried.
    Validation,
    /// Entity missing. Logged as a warning; cancels the current work unit.
    NotFound,
    /// Network failure, HTTP 5xx or timeout. The retry classifier decides.
    Transient,
    /// Vendor rejection. No retry; the enclosing job is marked failed.
    Fatal,
    /// Invalid rule configuration. The evaluator is filtered out.
    EvaluatorConstruction,
}

impl ErrorKind {
    /// Returns true if the work unit may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::EvaluatorConstruction => "evaluator_construction",
        };
        f.write_str(s)
    }
}
