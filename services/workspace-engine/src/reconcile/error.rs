use thiserror::Error;

use ctrlplane_reconcile::ErrorKind;

use crate::model::ReleaseTarget;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The target left the release-target set.
    #[error("release target not found: {0}")]
    TargetNotFound(ReleaseTarget),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TargetNotFound(_) => ErrorKind::NotFound,
            Self::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
