//! Diff errors.

use ctrlplane_reconcile::ErrorKind;
use thiserror::Error;

/// Errors the deep walker can hit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// Nesting exceeded the configured depth.
    #[error("diff depth limit {limit} exceeded at {path}")]
    DepthExceeded { path: String, limit: usize },
}

impl DiffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DepthExceeded { .. } => ErrorKind::Validation,
        }
    }
}
