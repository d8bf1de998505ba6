use thiserror::Error;

use ctrlplane_id::RuleId;
use ctrlplane_reconcile::ErrorKind;
use ctrlplane_rrule::RRuleError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// A rule's configuration cannot produce an evaluator.
    #[error("invalid rule {rule_id}: {source}")]
    InvalidRule {
        rule_id: RuleId,
        #[source]
        source: RRuleError,
    },

    /// An entity the evaluation needs is missing.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRule { .. } => ErrorKind::EvaluatorConstruction,
            Self::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
