//! Event type definitions and payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_id::{JobAgentId, JobId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    // Jobs
    pub const JOB_CREATED: &str = "job.created";
    pub const JOB_UPDATED: &str = "job.updated";

    // Releases
    pub const RELEASE_CREATED: &str = "release.created";

    // Verifications
    pub const VERIFICATION_STARTED: &str = "verification.started";
    pub const VERIFICATION_COMPLETED: &str = "verification.completed";
}

// =============================================================================
// Status Enums
// =============================================================================

/// Job status.
///
/// `Successful`, `Failure` and `Cancelled` are terminal: once a job
/// reaches one of them no dispatcher may move it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    Pending,
    InProgress,
    Successful,
    Failure,
    Cancelled,
}

impl JobStatus {
    /// Returns true if no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failure | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Successful => "successful",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job fields a `job.updated` receiver is allowed to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobUpdateField {
    Status,
    Message,
    Metadata,
    UpdatedAt,
    CompletedAt,
}

// =============================================================================
// Payloads
// =============================================================================

/// Partial job carried by a `job.updated` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Payload of a `job.updated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdateEvent {
    /// The job to update.
    pub id: JobId,

    /// Agent that produced the update, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<JobAgentId>,

    /// New values; only the fields named in `fields_to_update` apply.
    pub job: JobPatch,

    /// Which fields of `job` the receiver must apply.
    pub fields_to_update: Vec<JobUpdateField>,
}

impl JobUpdateEvent {
    /// Builds the update a self-resolving dispatcher emits when a job
    /// finishes: status, message, updatedAt and completedAt.
    pub fn completion(id: JobId, status: JobStatus, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent_id: None,
            job: JobPatch {
                status: Some(status),
                message: Some(message.into()),
                metadata: None,
                updated_at: Some(now),
                completed_at: status.is_terminal().then_some(now),
            },
            fields_to_update: vec![
                JobUpdateField::Status,
                JobUpdateField::Message,
                JobUpdateField::UpdatedAt,
                JobUpdateField::CompletedAt,
            ],
        }
    }

    /// Returns true if the event asks for `field` to be applied.
    pub fn updates(&self, field: JobUpdateField) -> bool {
        self.fields_to_update.contains(&field)
    }
}
