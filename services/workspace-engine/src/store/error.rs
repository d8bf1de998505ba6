use thiserror::Error;

use ctrlplane_reconcile::ErrorKind;

use super::EntityKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The entity failed a store-level check.
    #[error("invalid {kind} {id}: {message}")]
    Invalid {
        kind: EntityKind,
        id: String,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Invalid { .. } => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
