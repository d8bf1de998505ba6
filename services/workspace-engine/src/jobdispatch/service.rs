//! The dispatch call site.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use ctrlplane_events::{job_updated, publish_envelope, JobStatus, JobUpdateEvent, Producer};
use ctrlplane_reconcile::RetryPolicy;

use super::dispatcher::{DispatchJob, DispatchOutcome, DispatcherRegistry};
use super::error::DispatchError;
use crate::model::{Job, JsonMap};
use crate::store::{EntityKind, Store, StoreError};
use crate::template::{render_value, TemplatableJob};

/// Hands jobs to the dispatcher for their agent type.
///
/// Retry lives here and nowhere else: transient failures are retried with
/// the [`RetryPolicy`] backoff, anything else fails the job at once.
pub struct JobDispatchService {
    store: Arc<Store>,
    registry: DispatcherRegistry,
    producer: Arc<dyn Producer>,
    retry: RetryPolicy,
}

impl JobDispatchService {
    pub fn new(
        store: Arc<Store>,
        registry: DispatcherRegistry,
        producer: Arc<dyn Producer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            producer,
            retry,
        }
    }

    pub fn registry(&self) -> &DispatcherRegistry {
        &self.registry
    }

    /// Dispatch a stored job. On success the job moves to `in-progress`
    /// with the vendor handle; on failure it is marked `failure`, a
    /// `job.updated` event goes out and the error is returned.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn dispatch(&self, job: &Job) -> Result<Job, DispatchError> {
        match self.try_dispatch(job).await {
            Ok(outcome) => Ok(self.mark_dispatched(job, outcome)),
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "Job dispatch failed");
                self.mark_failed(job, &e).await;
                Err(e)
            }
        }
    }

    async fn try_dispatch(&self, job: &Job) -> Result<DispatchOutcome, DispatchError> {
        let agent_id = job
            .job_agent_id
            .clone()
            .ok_or_else(|| DispatchError::NoAgent(job.id.clone()))?;
        let agent = self
            .store
            .job_agents
            .get(&agent_id)
            .ok_or_else(|| DispatchError::AgentNotFound(agent_id.clone()))?;
        let dispatcher = self.registry.get(&agent.agent_type)?;

        let context = self.templatable_job(job)?.to_context()?;
        let config = match render_value(&Value::Object(job.job_agent_config.clone()), &context)? {
            Value::Object(map) => map,
            _ => JsonMap::new(),
        };
        let request = DispatchJob {
            job: job.clone(),
            config,
            context,
        };

        let mut attempt = 1;
        loop {
            match dispatcher.dispatch_job(&request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.kind().is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        agent_type = dispatcher.agent_type(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Dispatch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The context dispatcher templates render against.
    pub fn templatable_job(&self, job: &Job) -> Result<TemplatableJob, DispatchError> {
        let release = self
            .store
            .releases
            .get(&job.release_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Release, &job.release_id))?;
        let entities = self.store.target_entities(&release.release_target)?;
        Ok(TemplatableJob {
            id: job.id.clone(),
            version: release.version.clone(),
            variables: release.variables.clone(),
            release,
            deployment: entities.deployment,
            environment: entities.environment,
            resource: entities.resource,
        })
    }

    fn mark_dispatched(&self, job: &Job, outcome: DispatchOutcome) -> Job {
        info!(external_id = ?outcome.external_id, "Job dispatched");
        self.store
            .jobs
            .update(&job.id, |stored| {
                if stored.status == JobStatus::Pending {
                    stored.status = JobStatus::InProgress;
                }
                if outcome.external_id.is_some() {
                    stored.external_id = outcome.external_id.clone();
                }
                if outcome.message.is_some() {
                    stored.message = outcome.message.clone();
                }
                stored.metadata.extend(outcome.metadata.clone());
                stored.updated_at = Utc::now();
            })
            .unwrap_or_else(|| job.clone())
    }

    async fn mark_failed(&self, job: &Job, err: &DispatchError) {
        let event = JobUpdateEvent::completion(job.id.clone(), JobStatus::Failure, err.to_string());
        self.store.jobs.update(&job.id, |stored| {
            stored.apply_update(&event);
        });
        let envelope = job_updated(self.store.workspace_id().clone(), event);
        if let Err(e) = publish_envelope(self.producer.as_ref(), &envelope).await {
            warn!(job_id = %job.id, error = %e, "Failed to publish job failure");
        }
    }
}
