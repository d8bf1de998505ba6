//! Reconciles one release target.
//!
//! ```text
//! planning     newest deployable version under every policy
//! eligibility  release already current? job in flight? retries left?
//! execution    persist release → create job → dispatch → start verification
//! ```
//!
//! Every phase is recorded on a trace that is flushed when the
//! reconciliation ends, whatever the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use ctrlplane_events::JobStatus;
use ctrlplane_id::{JobId, ReleaseId, TraceId};
use ctrlplane_reconcile::DEFAULT_MAX_ATTEMPTS;
use ctrlplane_trace::{
    attr, EligibilityPhase, ExecutionPhase, PersistenceStore, ReconcileTarget, Recorder,
    SpanHandle, SpanStatus, TokenSigner, TriggerReason,
};

use super::error::{ReconcileError, Result};
use crate::jobdispatch::JobDispatchService;
use crate::model::{deep_merge, Job, Release, ReleaseTarget};
use crate::policy::PolicyManager;
use crate::store::{Store, TargetEntities};
use crate::verification::VerificationScheduler;

/// Job metadata key carrying the signed trace token.
pub const TRACE_TOKEN_METADATA_KEY: &str = "ctrlplane/trace-token";
/// Job metadata key carrying the trace id.
pub const TRACE_ID_METADATA_KEY: &str = "ctrlplane/trace-id";

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Failed jobs a release may accumulate before it is no longer
    /// retried.
    pub max_job_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_job_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No version passes policy. Re-check at `next_evaluation_time`.
    Blocked {
        next_evaluation_time: Option<DateTime<Utc>>,
    },
    /// The desired release is already deployed.
    UpToDate { release_id: ReleaseId },
    /// A job for the desired release is still running.
    InFlight { release_id: ReleaseId, job_id: JobId },
    /// The desired release failed too many times.
    RetriesExhausted { release_id: ReleaseId, failures: u32 },
    /// The deployment has no usable job agent.
    NoJobAgent { release_id: ReleaseId },
    Dispatched { release_id: ReleaseId, job_id: JobId },
    DispatchFailed {
        release_id: ReleaseId,
        job_id: JobId,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    pub trace_id: TraceId,
    pub outcome: ReconcileOutcome,
}

pub struct ReleaseTargetReconciler {
    store: Arc<Store>,
    policy: PolicyManager,
    dispatch: Arc<JobDispatchService>,
    verifications: VerificationScheduler,
    traces: Arc<dyn PersistenceStore>,
    signer: Arc<TokenSigner>,
    config: ReconcilerConfig,
    /// One lock per target; reconciliations of a target never overlap.
    locks: Mutex<HashMap<ReleaseTarget, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReleaseTargetReconciler {
    pub fn new(
        store: Arc<Store>,
        dispatch: Arc<JobDispatchService>,
        verifications: VerificationScheduler,
        traces: Arc<dyn PersistenceStore>,
        signer: Arc<TokenSigner>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            policy: PolicyManager::new(store.clone()),
            store,
            dispatch,
            verifications,
            traces,
            signer,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn target_lock(&self, target: &ReleaseTarget) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(target.clone()).or_default())
    }

    #[instrument(skip(self), fields(release_target = %target, trigger = %trigger))]
    pub async fn reconcile(
        &self,
        target: &ReleaseTarget,
        trigger: TriggerReason,
    ) -> Result<ReconcileResult> {
        let lock = self.target_lock(target);
        let _guard = lock.lock().await;

        let recorder = Recorder::builder(self.store.workspace_id().as_str(), target, trigger)
            .token_signer(Arc::clone(&self.signer))
            .start();
        let root = recorder.root();

        let result = self.run(&recorder, &root, target, Utc::now()).await;
        match &result {
            Ok(outcome) => {
                root.set_attribute("ctrlplane.outcome", format!("{outcome:?}"));
                root.end(SpanStatus::Completed);
            }
            Err(e) => {
                root.set_attribute("ctrlplane.error", e.to_string());
                root.end(SpanStatus::Failed);
            }
        }

        if let Err(e) = recorder.flush(self.traces.as_ref()).await {
            warn!(trace_id = %recorder.trace_id(), error = %e, "Failed to persist reconciliation trace");
        }

        result.map(|outcome| ReconcileResult {
            trace_id: recorder.trace_id().clone(),
            outcome,
        })
    }

    async fn run(
        &self,
        recorder: &Recorder,
        root: &ReconcileTarget,
        target: &ReleaseTarget,
        at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        if !self.store.release_targets.contains(target) {
            return Err(ReconcileError::TargetNotFound(target.clone()));
        }
        let entities = self.store.target_entities(target)?;

        // Planning
        let planning = root.planning();
        let versions = self.store.versions_for_deployment(&target.deployment_id);
        let deployable = self
            .policy
            .find_deployable_version(target, &entities, &versions, Some(&planning), at)
            .await;
        planning.end(SpanStatus::Completed);
        let Some(version) = deployable.version else {
            debug!(next_evaluation_time = ?deployable.next_evaluation_time, "No deployable version");
            return Ok(ReconcileOutcome::Blocked {
                next_evaluation_time: deployable.next_evaluation_time,
            });
        };

        let variables = self
            .store
            .resolve_variables(&entities.deployment, &entities.resource);
        let release = Release::new(target.clone(), version, variables);
        let release_id = release.id();
        root.set_release_id(release_id.as_str());

        // Eligibility
        if let Some(outcome) = self.check_eligibility(root, target, &release_id) {
            return Ok(outcome);
        }

        // Execution
        let execution = root.execution();
        let outcome = self
            .execute(recorder, &execution, &entities, release)
            .await;
        execution.end(SpanStatus::Completed);
        Ok(outcome)
    }

    /// Returns the outcome that stops this reconciliation, if any.
    fn check_eligibility(
        &self,
        root: &ReconcileTarget,
        target: &ReleaseTarget,
        release_id: &ReleaseId,
    ) -> Option<ReconcileOutcome> {
        let eligibility = root.eligibility();
        let outcome = self.eligibility_outcome(&eligibility, target, release_id);
        match &outcome {
            None => eligibility.decision(true, "Eligible for deployment"),
            Some(o) => eligibility.decision(false, &format!("{o:?}")),
        };
        eligibility.end(SpanStatus::Completed);
        outcome
    }

    fn eligibility_outcome(
        &self,
        eligibility: &EligibilityPhase,
        target: &ReleaseTarget,
        release_id: &ReleaseId,
    ) -> Option<ReconcileOutcome> {
        let current = eligibility.check("Release already current");
        if self
            .store
            .current_release(target)
            .is_some_and(|r| &r.id() == release_id)
        {
            current.fail("Desired release is already deployed");
            return Some(ReconcileOutcome::UpToDate {
                release_id: release_id.clone(),
            });
        }
        current.pass("Desired release differs from current");

        let jobs = self.store.jobs_for_release(release_id);
        let in_flight = eligibility.check("Job in flight");
        if let Some(job) = jobs.iter().find(|j| !j.is_terminal()) {
            in_flight.fail(&format!("Job {} is {}", job.id, job.status));
            return Some(ReconcileOutcome::InFlight {
                release_id: release_id.clone(),
                job_id: job.id.clone(),
            });
        }
        in_flight.pass("No job in flight");

        let retries = eligibility.check("Retry limit");
        let failures = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failure)
            .count() as u32;
        if failures >= self.config.max_job_attempts {
            retries.fail(&format!(
                "{failures} failed jobs, limit {}",
                self.config.max_job_attempts
            ));
            return Some(ReconcileOutcome::RetriesExhausted {
                release_id: release_id.clone(),
                failures,
            });
        }
        retries.pass(&format!("{failures} failed jobs"));
        None
    }

    async fn execute(
        &self,
        recorder: &Recorder,
        execution: &ExecutionPhase,
        entities: &TargetEntities,
        release: Release,
    ) -> ReconcileOutcome {
        let release_id = release.id();

        let persist = execution.action("Persist release");
        let step = persist.step("Upsert release");
        if self.store.releases.contains(&release_id) {
            step.finish(SpanStatus::Skipped, "Release exists");
        } else {
            self.store.releases.upsert(release.clone());
            step.finish(SpanStatus::Completed, "Release stored");
        }
        persist.end(SpanStatus::Completed);

        let create = execution.action("Create job");
        let agent = entities
            .deployment
            .job_agent_id
            .as_ref()
            .and_then(|id| self.store.job_agents.get(id));
        let Some(agent) = agent else {
            warn!(deployment_id = %entities.deployment.id, "Deployment has no usable job agent");
            create
                .step("Resolve job agent")
                .finish(SpanStatus::Failed, "No job agent");
            create.end(SpanStatus::Failed);
            return ReconcileOutcome::NoJobAgent { release_id };
        };

        let mut config = agent.config.clone();
        deep_merge(&mut config, &entities.deployment.job_agent_config);
        let mut job = Job::new(release_id.clone(), Some(agent.id.clone()), config);
        let job_span = execution.job(&job.id);
        job_span.set_attribute(attr::RELEASE_ID, release_id.as_str());
        job.metadata.insert(
            TRACE_ID_METADATA_KEY.to_string(),
            recorder.trace_id().to_string(),
        );
        if let Some(token) = job_span.token() {
            job.metadata
                .insert(TRACE_TOKEN_METADATA_KEY.to_string(), token);
        }
        self.store.jobs.upsert(job.clone());
        create
            .step("Store job")
            .finish(SpanStatus::Completed, &format!("Job {} created", job.id));
        create.end(SpanStatus::Completed);

        let job = match self.dispatch.dispatch(&job).await {
            Ok(job) => {
                job_span.set_attribute("ctrlplane.job_status", job.status.as_str());
                job_span.end(SpanStatus::Completed);
                job
            }
            Err(e) => {
                job_span.set_attribute(attr::MESSAGE, e.to_string());
                job_span.end(SpanStatus::Failed);
                return ReconcileOutcome::DispatchFailed {
                    release_id,
                    job_id: job.id,
                    error: e.to_string(),
                };
            }
        };
        info!(release_id = %release_id, job_id = %job.id, agent_type = %agent.agent_type, "Dispatched job");

        let metrics = &entities.deployment.verification;
        if !metrics.is_empty() {
            let verify = execution.action("Start verification");
            match self
                .verifications
                .create_for_release(&release, Some(job.id.clone()), metrics)
                .await
            {
                Ok(verification) => {
                    verify
                        .step("Create verification")
                        .finish(SpanStatus::Completed, verification.id.as_str());
                    verify.end(SpanStatus::Completed);
                }
                Err(e) => {
                    warn!(release_id = %release_id, error = %e, "Failed to start verification");
                    verify
                        .step("Create verification")
                        .finish(SpanStatus::Failed, &e.to_string());
                    verify.end(SpanStatus::Failed);
                }
            }
        }

        ReconcileOutcome::Dispatched {
            release_id,
            job_id: job.id,
        }
    }
}
