//! Self-resolving dispatcher for tests and demos.
//!
//! Marks the job finished after a delay: the store is updated directly and
//! a `job.updated` event goes out, as a real agent would send. Resolution
//! tasks are tracked so shutdown can wait for the pending ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use ctrlplane_events::{job_updated, publish_envelope, JobStatus, JobUpdateEvent, Producer};
use ctrlplane_id::JobId;

use super::dispatcher::{decode_config, DispatchJob, DispatchOutcome, Dispatcher};
use super::error::DispatchError;
use crate::store::Store;

pub const TEST_RUNNER: &str = "test-runner";

/// Delay before the job resolves when the config sets none.
pub const DEFAULT_AUTO_RESOLVE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestRunnerConfig {
    #[serde(default)]
    delay_seconds: Option<u64>,
    /// `successful` (default) or `failure`.
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    message: Option<String>,
}

pub struct TestRunnerDispatcher {
    store: Arc<Store>,
    producer: Arc<dyn Producer>,
    default_delay: Duration,
    tasks: TaskTracker,
}

impl TestRunnerDispatcher {
    pub fn new(store: Arc<Store>, producer: Arc<dyn Producer>) -> Self {
        Self {
            store,
            producer,
            default_delay: DEFAULT_AUTO_RESOLVE_DELAY,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Spawn resolutions on `tasks` instead of a private tracker.
    pub fn with_tracker(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tasks
    }
}

#[async_trait]
impl Dispatcher for TestRunnerDispatcher {
    fn agent_type(&self) -> &'static str {
        TEST_RUNNER
    }

    async fn dispatch_job(&self, job: &DispatchJob) -> Result<DispatchOutcome, DispatchError> {
        let config: TestRunnerConfig = decode_config(TEST_RUNNER, &job.config)?;
        let status = match config.status {
            None => JobStatus::Successful,
            Some(s @ (JobStatus::Successful | JobStatus::Failure)) => s,
            Some(other) => {
                return Err(DispatchError::InvalidConfig {
                    agent: TEST_RUNNER,
                    message: format!("status must be successful or failure, got {other}"),
                })
            }
        };
        let delay = config
            .delay_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_delay);
        let message = config
            .message
            .unwrap_or_else(|| format!("Test runner resolved job as {status}"));

        // Not tied to the caller: cancelling dispatch must not stop the resolution.
        self.tasks.spawn(resolve_later(
            Arc::clone(&self.store),
            Arc::clone(&self.producer),
            job.job.id.clone(),
            delay,
            status,
            message,
        ));

        debug!(job_id = %job.job.id, delay_secs = delay.as_secs(), "Test runner scheduled resolution");
        Ok(DispatchOutcome::external(job.job.id.to_string())
            .with_message("Test runner job started")
            .with_metadata("testRunner.delaySeconds", delay.as_secs().to_string()))
    }
}

async fn resolve_later(
    store: Arc<Store>,
    producer: Arc<dyn Producer>,
    job_id: JobId,
    delay: Duration,
    status: JobStatus,
    message: String,
) {
    tokio::time::sleep(delay).await;

    let event = JobUpdateEvent::completion(job_id.clone(), status, message);
    let mut resolved = false;
    let updated = store.jobs.update(&job_id, |job| resolved = job.apply_update(&event));
    match updated {
        Some(_) if resolved => {}
        Some(job) => {
            debug!(job_id = %job_id, status = %job.status, "Job already terminal, not resolving");
            return;
        }
        None => {
            warn!(job_id = %job_id, "Job vanished before test runner resolved it");
            return;
        }
    }

    let envelope = job_updated(store.workspace_id().clone(), event);
    match publish_envelope(producer.as_ref(), &envelope).await {
        Ok(()) => info!(job_id = %job_id, status = %status, "Test runner resolved job"),
        Err(e) => warn!(job_id = %job_id, error = %e, "Failed to publish job update"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Job, JsonMap};
    use ctrlplane_events::{EventEnvelope, InMemoryProducer};
    use ctrlplane_id::{ReleaseId, WorkspaceId};
    use serde_json::json;

    fn setup() -> (Arc<Store>, Arc<InMemoryProducer>, Job) {
        let store = Arc::new(Store::new(WorkspaceId::from("ws")));
        let job = Job::new(ReleaseId::from("rel"), None, JsonMap::new());
        store.jobs.upsert(job.clone());
        (store, Arc::new(InMemoryProducer::new()), job)
    }

    fn dispatch_job(job: &Job, config: serde_json::Value) -> DispatchJob {
        DispatchJob {
            job: job.clone(),
            config: config.as_object().cloned().unwrap(),
            context: serde_json::Value::Null,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_delay() {
        let (store, producer, job) = setup();
        let dispatcher = TestRunnerDispatcher::new(Arc::clone(&store), producer.clone());

        let outcome = dispatcher
            .dispatch_job(&dispatch_job(&job, json!({"delaySeconds": 2, "status": "failure"})))
            .await
            .unwrap();
        assert_eq!(outcome.external_id.as_deref(), Some(job.id.as_str()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(producer.published().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let published = producer.published().await;
        assert_eq!(published.len(), 1);
        let envelope: EventEnvelope<JobUpdateEvent> =
            EventEnvelope::decode(&published[0].value).unwrap();
        assert_eq!(envelope.event_type, "job.updated");
        assert_eq!(envelope.data.id, job.id);
        assert_eq!(envelope.data.job.status, Some(JobStatus::Failure));

        let stored = store.jobs.get(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Failure);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_resolutions_are_tracked() {
        let (store, producer, job) = setup();
        let tasks = TaskTracker::new();
        let dispatcher = TestRunnerDispatcher::new(Arc::clone(&store), producer.clone())
            .with_tracker(tasks.clone());
        dispatcher
            .dispatch_job(&dispatch_job(&job, json!({"delaySeconds": 3, "message": "done"})))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);

        tasks.close();
        tasks.wait().await;
        assert!(tasks.is_empty());
        let stored = store.jobs.get(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Successful);
        assert_eq!(stored.message.as_deref(), Some("done"));
        assert_eq!(producer.published().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_job_is_left_alone() {
        let (store, producer, job) = setup();
        let dispatcher = TestRunnerDispatcher::new(Arc::clone(&store), producer.clone());
        dispatcher
            .dispatch_job(&dispatch_job(&job, json!({})))
            .await
            .unwrap();

        store.jobs.update(&job.id, |j| j.status = JobStatus::Cancelled);
        tokio::time::sleep(DEFAULT_AUTO_RESOLVE_DELAY + Duration::from_secs(1)).await;
        assert!(producer.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_terminal_status() {
        let (store, producer, job) = setup();
        let dispatcher = TestRunnerDispatcher::new(store, producer);
        let err = dispatcher
            .dispatch_job(&dispatch_job(&job, json!({"status": "in-progress"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig { .. }));
    }
}
