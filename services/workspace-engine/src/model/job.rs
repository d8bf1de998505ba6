use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_events::{JobStatus, JobUpdateEvent, JobUpdateField};
use ctrlplane_id::{JobAgentId, JobId, ReleaseId};
use serde::{Deserialize, Serialize};

use super::JsonMap;

/// A unit of work handed to a job agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub release_id: ReleaseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_agent_id: Option<JobAgentId>,
    #[serde(default)]
    pub job_agent_config: JsonMap,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(release_id: ReleaseId, job_agent_id: Option<JobAgentId>, config: JsonMap) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            release_id,
            job_agent_id,
            job_agent_config: config,
            status: JobStatus::Pending,
            message: None,
            metadata: BTreeMap::new(),
            external_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply the fields an update event names. Terminal jobs are never
    /// changed. Returns true if the job changed.
    pub fn apply_update(&mut self, event: &JobUpdateEvent) -> bool {
        if self.is_terminal() {
            return false;
        }
        let before = self.clone();
        let patch = &event.job;
        let all = event.fields_to_update.is_empty();

        if all || event.updates(JobUpdateField::Status) {
            if let Some(status) = patch.status {
                self.status = status;
            }
        }
        if all || event.updates(JobUpdateField::Message) {
            if let Some(message) = &patch.message {
                self.message = Some(message.clone());
            }
        }
        if all || event.updates(JobUpdateField::Metadata) {
            if let Some(metadata) = &patch.metadata {
                self.metadata.extend(metadata.clone());
            }
        }
        if all || event.updates(JobUpdateField::CompletedAt) {
            if let Some(at) = patch.completed_at {
                self.completed_at = Some(at);
            }
        }
        if self.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }

        let changed = *self != before;
        if changed {
            self.updated_at = match patch.updated_at {
                Some(at) if all || event.updates(JobUpdateField::UpdatedAt) => at,
                _ => Utc::now(),
            };
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(ReleaseId::from("rel"), None, JsonMap::new())
    }

    #[test]
    fn test_completion_applies() {
        let mut j = job();
        let event = JobUpdateEvent::completion(j.id.clone(), JobStatus::Successful, "done");
        assert!(j.apply_update(&event));
        assert_eq!(j.status, JobStatus::Successful);
        assert_eq!(j.message.as_deref(), Some("done"));
        assert!(j.completed_at.is_some());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut j = job();
        j.status = JobStatus::Failure;
        let event = JobUpdateEvent::completion(j.id.clone(), JobStatus::Successful, "late");
        assert!(!j.apply_update(&event));
        assert_eq!(j.status, JobStatus::Failure);
    }

    #[test]
    fn test_only_named_fields_apply() {
        let mut j = job();
        let mut event = JobUpdateEvent::completion(j.id.clone(), JobStatus::InProgress, "ignored");
        event.fields_to_update = vec![JobUpdateField::Status];
        assert!(j.apply_update(&event));
        assert_eq!(j.status, JobStatus::InProgress);
        assert!(j.message.is_none());
    }
}
