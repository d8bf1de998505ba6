use thiserror::Error;

use ctrlplane_events::EventError;
use ctrlplane_id::{JobAgentId, JobId};
use ctrlplane_reconcile::{is_retryable_message, ErrorKind};

use crate::store::StoreError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job {0} has no job agent")]
    NoAgent(JobId),

    #[error("job agent not found: {0}")]
    AgentNotFound(JobAgentId),

    #[error("no dispatcher registered for job agent type {0:?}")]
    UnknownAgentType(String),

    /// The agent config is missing a field or has the wrong shape.
    #[error("invalid {agent} config: {message}")]
    InvalidConfig { agent: &'static str, message: String },

    /// The vendor answered with an error status.
    #[error("{vendor} returned HTTP {status}: {message}")]
    Vendor {
        vendor: &'static str,
        status: u16,
        message: String,
    },

    /// The vendor could not be reached, or its response could not be read.
    /// `transient` is set for connect failures and timeouts.
    #[error("{vendor} request failed: {message}")]
    Transport {
        vendor: &'static str,
        message: String,
        transient: bool,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Connect failures and timeouts are transient. Other vendor and
    /// transport failures go through the retry classifier; everything else
    /// is decided by variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAgent(_)
            | Self::UnknownAgentType(_)
            | Self::InvalidConfig { .. }
            | Self::Template(_) => ErrorKind::Validation,
            Self::AgentNotFound(_) => ErrorKind::NotFound,
            Self::Transport { transient: true, .. } => ErrorKind::Transient,
            Self::Vendor { .. } | Self::Transport { .. } => {
                if is_retryable_message(&self.to_string()) {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Fatal
                }
            }
            Self::Event(_) => ErrorKind::Transient,
            Self::Store(e) => e.kind(),
        }
    }
}
