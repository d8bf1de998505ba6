use thiserror::Error;

use ctrlplane_id::VerificationId;
use ctrlplane_reconcile::ErrorKind;

use crate::model::VerificationStatus;
use crate::store::StoreError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("verification not found: {0}")]
    NotFound(VerificationId),

    /// A success or failure condition is not valid CEL.
    #[error("invalid condition {expression:?}: {message}")]
    InvalidCondition { expression: String, message: String },

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCondition { .. } => ErrorKind::Validation,
            Self::Recorder(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

/// Measurement write failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecorderError {
    #[error("verification not found: {0}")]
    NotFound(VerificationId),

    #[error("verification {id} has no metric {index} ({len} metrics)")]
    MetricIndexOutOfRange {
        id: VerificationId,
        index: usize,
        len: usize,
    },

    /// Terminal verifications only accept message updates.
    #[error("verification {id} is {status}")]
    Terminal {
        id: VerificationId,
        status: VerificationStatus,
    },
}

impl RecorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::MetricIndexOutOfRange { .. } => ErrorKind::NotFound,
            Self::Terminal { .. } => ErrorKind::Validation,
        }
    }
}

/// A provider could not take a measurement.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid provider config: {0}")]
    InvalidConfig(String),

    #[error("missing provider context: {0}")]
    MissingContext(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::InvalidConfig(_) | Self::Template(_) => ErrorKind::Validation,
            Self::MissingContext(_) => ErrorKind::NotFound,
        }
    }
}
