//! Event envelope - the common wrapper for all published events.

use chrono::Utc;
use ctrlplane_id::WorkspaceId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::EventError;
use crate::types::{event_types, JobUpdateEvent};

/// The event envelope.
///
/// Wire shape: `{eventType, workspaceId, data, timestamp}` with
/// `timestamp` in unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<P> {
    /// The event type (e.g. "job.updated").
    pub event_type: String,

    /// Workspace the event belongs to.
    pub workspace_id: WorkspaceId,

    /// Event-specific payload.
    pub data: P,

    /// When the event was produced, unix seconds.
    pub timestamp: i64,
}

impl<P> EventEnvelope<P> {
    /// Creates an envelope stamped with the current time.
    pub fn new(event_type: impl Into<String>, workspace_id: WorkspaceId, data: P) -> Self {
        Self {
            event_type: event_type.into(),
            workspace_id,
            data,
            timestamp: Utc::now().timestamp(),
        }
    }
}

impl<P: Serialize> EventEnvelope<P> {
    /// Encodes the envelope as a `(key, value)` message.
    ///
    /// The key is the workspace id so all events of one workspace land on
    /// the same partition.
    pub fn encode(&self) -> Result<(Vec<u8>, Vec<u8>), EventError> {
        let key = self.workspace_id.as_str().as_bytes().to_vec();
        let value = serde_json::to_vec(self)?;
        Ok((key, value))
    }
}

impl<P: DeserializeOwned> EventEnvelope<P> {
    /// Decodes an envelope from a message value.
    pub fn decode(value: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(value)?)
    }
}

/// Builds a `job.updated` envelope.
pub fn job_updated(workspace_id: WorkspaceId, event: JobUpdateEvent) -> EventEnvelope<JobUpdateEvent> {
    EventEnvelope::new(event_types::JOB_UPDATED, workspace_id, event)
}

/// Reads only the event type of an encoded envelope.
pub fn peek_event_type(value: &[u8]) -> Result<String, EventError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Head {
        event_type: String,
    }
    let head: Head = serde_json::from_slice(value)?;
    Ok(head.event_type)
}
