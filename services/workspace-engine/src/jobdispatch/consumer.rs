//! Applies `job.updated` events to the job store.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use ctrlplane_events::{event_types, peek_event_type, EventEnvelope, JobStatus, JobUpdateEvent, Message};
use ctrlplane_trace::TriggerReason;

use super::error::DispatchError;
use crate::reconcile::ReconcileRequest;
use crate::store::Store;

pub struct JobUpdateConsumer {
    store: Arc<Store>,
    requests: mpsc::UnboundedSender<ReconcileRequest>,
}

impl JobUpdateConsumer {
    pub fn new(store: Arc<Store>, requests: mpsc::UnboundedSender<ReconcileRequest>) -> Self {
        Self { store, requests }
    }

    /// Apply one message. Returns the reconciliation the update calls
    /// for: a job that is now terminal re-triggers its release target.
    pub fn handle(&self, value: &[u8]) -> Result<Option<ReconcileRequest>, DispatchError> {
        let event_type = peek_event_type(value)?;
        if event_type != event_types::JOB_UPDATED {
            debug!(event_type = %event_type, "Ignoring event");
            return Ok(None);
        }
        let envelope: EventEnvelope<JobUpdateEvent> = EventEnvelope::decode(value)?;
        if &envelope.workspace_id != self.store.workspace_id() {
            debug!(workspace_id = %envelope.workspace_id, "Ignoring event for another workspace");
            return Ok(None);
        }

        let event = envelope.data;
        let Some(job) = self.store.jobs.update(&event.id, |job| {
            if !job.apply_update(&event) {
                debug!(job_id = %job.id, status = %job.status, "Job update changed nothing");
            }
        }) else {
            warn!(job_id = %event.id, "Job update for unknown job");
            return Ok(None);
        };
        if !job.is_terminal() {
            return Ok(None);
        }

        let Some(release) = self.store.releases.get(&job.release_id) else {
            warn!(job_id = %job.id, release_id = %job.release_id, "Terminal job has no release");
            return Ok(None);
        };
        let trigger = match job.status {
            JobStatus::Successful => TriggerReason::JobSuccess,
            _ => TriggerReason::JobFailure,
        };
        info!(job_id = %job.id, status = %job.status, target = %release.release_target, "Job finished");
        Ok(Some(ReconcileRequest::new(release.release_target, trigger)))
    }

    /// Consume messages until the channel closes or shutdown is signaled.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut messages: mpsc::UnboundedReceiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Starting job update consumer");
        loop {
            tokio::select! {
                message = messages.recv() => {
                    let Some(message) = message else {
                        info!("Job update channel closed");
                        break;
                    };
                    match self.handle(&message.value) {
                        Ok(Some(request)) => {
                            if self.requests.send(request).is_err() {
                                warn!("Reconcile queue closed, dropping request");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Failed to apply job update"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Job update consumer shutting down");
                        break;
                    }
                }
            }
        }
    }
}
