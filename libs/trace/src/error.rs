//! Trace errors.

use ctrlplane_reconcile::ErrorKind;
use thiserror::Error;

/// Errors validating a trace token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token is not `payload.signature` or the payload is malformed.
    #[error("invalid format")]
    InvalidFormat,

    /// The signature does not match the payload.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token is past its expiry.
    #[error("token expired")]
    Expired,

    /// The signing key was rejected by the MAC.
    #[error("invalid signing key")]
    InvalidKey,
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Errors recording, attaching or persisting spans.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// A span in a batch lacks a required attribute. The batch is rejected.
    #[error("missing required attribute {attribute} on span {span_name:?} (trace_id={trace_id}, span_id={span_id})")]
    MissingAttribute {
        attribute: &'static str,
        span_name: String,
        trace_id: String,
        span_id: String,
    },

    /// Token validation failed.
    #[error("trace token rejected: {0}")]
    Token(#[from] TokenError),

    /// The token was issued for another trace.
    #[error("token trace {token} does not match recorder trace {recorder}")]
    TraceMismatch { token: String, recorder: String },

    /// No job span for the token's job id.
    #[error("no job span for job {0}")]
    JobSpanNotFound(String),

    /// The recorder has no signer configured.
    #[error("trace tokens are not enabled on this recorder")]
    TokensDisabled,

    /// The backing store failed.
    #[error("persistence store error: {0}")]
    Store(String),
}

impl TraceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingAttribute { .. }
            | Self::Token(_)
            | Self::TraceMismatch { .. }
            | Self::TokensDisabled => ErrorKind::Validation,
            Self::JobSpanNotFound(_) => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::Transient,
        }
    }
}
