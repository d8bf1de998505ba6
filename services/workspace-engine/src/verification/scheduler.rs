//! Verification scheduler.
//!
//! One task per `(verification, metric)`. Tasks hold no state of their
//! own: each cycle re-reads the verification from the store, takes a
//! measurement, appends it through the [`VerificationRecorder`] and
//! sleeps on the [`Ticker`]. This is what lets [`restore`] resume after a
//! restart.
//!
//! [`restore`]: VerificationScheduler::restore

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use ctrlplane_id::{JobId, VerificationId};

use super::condition::{classify, validate_condition};
use super::error::VerificationError;
use super::executor::MeasurementExecutor;
use super::hooks::{HookResult, VerificationHooks};
use super::recorder::VerificationRecorder;
use super::ticker::Ticker;
use crate::model::{
    MeasurementStatus, MetricSpec, Release, ReleaseVerification, VerificationMeasurement,
    VerificationStatus,
};
use crate::store::Store;

/// Interval used when a metric sets none.
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub default_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_METRIC_INTERVAL,
        }
    }
}

/// Cancellation tokens of the verifications with live metric loops.
/// Removing an entry is what claims the right to fire completion.
#[derive(Default)]
struct SchedulerState {
    running: HashMap<VerificationId, CancellationToken>,
}

struct Inner {
    store: Arc<Store>,
    recorder: VerificationRecorder,
    executor: Arc<dyn MeasurementExecutor>,
    hooks: Arc<dyn VerificationHooks>,
    ticker: Arc<dyn Ticker>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    tracker: TaskTracker,
    root: CancellationToken,
}

/// Runs measurement loops for every non-terminal verification.
#[derive(Clone)]
pub struct VerificationScheduler {
    inner: Arc<Inner>,
}

impl VerificationScheduler {
    pub fn new(
        store: Arc<Store>,
        executor: Arc<dyn MeasurementExecutor>,
        hooks: Arc<dyn VerificationHooks>,
        ticker: Arc<dyn Ticker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                recorder: VerificationRecorder::new(Arc::clone(&store)),
                store,
                executor,
                hooks,
                ticker,
                config,
                state: Mutex::new(SchedulerState::default()),
                tracker: TaskTracker::new(),
                root: CancellationToken::new(),
            }),
        }
    }

    pub fn is_running(&self, id: &VerificationId) -> bool {
        self.inner.state.lock().running.contains_key(id)
    }

    /// Create and start a verification for `release`. A release that
    /// already has a verification gets that one back instead. With no
    /// metrics the verification passes at once.
    pub async fn create_for_release(
        &self,
        release: &Release,
        job_id: Option<JobId>,
        metrics: &[MetricSpec],
    ) -> Result<ReleaseVerification, VerificationError> {
        let release_id = release.id();
        if let Some(existing) = self.inner.store.verification_by_release(&release_id) {
            debug!(verification_id = %existing.id, release_id = %release_id, "Verification exists for release");
            return Ok(existing);
        }
        for metric in metrics {
            validate_condition(&metric.success_condition)?;
            if let Some(failure) = &metric.failure_condition {
                validate_condition(failure)?;
            }
        }
        let verification = ReleaseVerification::new(release_id, job_id, metrics);
        self.inner.store.verifications.upsert(verification.clone());
        if metrics.is_empty() {
            info!(verification_id = %verification.id, "No metrics, verification passes");
            self.inner.log_hook(
                "on_verification_started",
                &verification.id,
                self.inner.hooks.on_verification_started(&verification).await,
            );
            return Ok(self.inner.finish(verification).await);
        }
        self.start_verification(&verification.id).await?;
        Ok(verification)
    }

    /// Start the metric loops. No-op while already running or once the
    /// verification is terminal.
    #[instrument(skip(self), fields(verification_id = %id))]
    pub async fn start_verification(&self, id: &VerificationId) -> Result<(), VerificationError> {
        let verification = self
            .inner
            .store
            .verifications
            .get(id)
            .ok_or_else(|| VerificationError::NotFound(id.clone()))?;
        let status = verification.status();
        if status.is_terminal() {
            debug!(status = %status, "Verification is terminal, not starting");
            return Ok(());
        }

        let token = {
            let mut state = self.inner.state.lock();
            if state.running.contains_key(id) {
                debug!("Verification already running");
                return Ok(());
            }
            let token = self.inner.root.child_token();
            state.running.insert(id.clone(), token.clone());
            token
        };

        info!(metrics = verification.metrics.len(), "Starting verification");
        self.inner.log_hook(
            "on_verification_started",
            id,
            self.inner.hooks.on_verification_started(&verification).await,
        );

        for index in 0..verification.metrics.len() {
            let inner = Arc::clone(&self.inner);
            let id = id.clone();
            let token = token.clone();
            self.inner
                .tracker
                .spawn(async move { inner.run_metric(id, index, token).await });
        }
        Ok(())
    }

    /// Cancel the metric loops and fire `on_verification_stopped`. Returns
    /// false if nothing was running.
    pub async fn stop_verification(&self, id: &VerificationId) -> bool {
        let token = self.inner.state.lock().running.remove(id);
        let Some(token) = token else {
            return false;
        };
        token.cancel();
        info!(verification_id = %id, "Stopped verification");
        if let Some(verification) = self.inner.store.verifications.get(id) {
            self.inner.log_hook(
                "on_verification_stopped",
                id,
                self.inner.hooks.on_verification_stopped(&verification).await,
            );
        }
        true
    }

    /// Mark the verification cancelled, then stop it.
    pub async fn cancel_verification(
        &self,
        id: &VerificationId,
        reason: &str,
    ) -> Result<ReleaseVerification, VerificationError> {
        let verification = self.inner.recorder.mark_cancelled(id, reason)?;
        self.stop_verification(id).await;
        Ok(verification)
    }

    /// Restart every stored verification that is not terminal. Returns how
    /// many were started.
    pub async fn restore(&self) -> usize {
        let mut restored = 0;
        for verification in self.inner.store.verifications.items() {
            if verification.status().is_terminal() || self.is_running(&verification.id) {
                continue;
            }
            match self.start_verification(&verification.id).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!(verification_id = %verification.id, error = %e, "Failed to restore verification")
                }
            }
        }
        if restored > 0 {
            info!(restored, "Restored verifications");
        }
        restored
    }

    /// Stop every loop without touching stored records, and wait for them.
    pub async fn shutdown(&self) {
        self.inner.root.cancel();
        self.inner.state.lock().running.clear();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Inner {
    fn interval(&self, metric: &MetricSpec) -> Duration {
        if metric.interval_seconds <= 0 {
            self.config.default_interval
        } else {
            Duration::from_secs(metric.interval_seconds as u64)
        }
    }

    fn log_hook(&self, hook: &str, id: &VerificationId, result: HookResult) {
        if let Err(e) = result {
            warn!(verification_id = %id, hook, error = %e, "Verification hook failed");
        }
    }

    async fn run_metric(self: Arc<Self>, id: VerificationId, index: usize, token: CancellationToken) {
        debug!(verification_id = %id, metric_index = index, "Metric loop started");
        loop {
            if token.is_cancelled() {
                return;
            }
            let Some(verification) = self.store.verifications.get(&id) else {
                warn!(verification_id = %id, "Verification vanished, stopping metric");
                return;
            };
            let Some(metric) = verification.metrics.get(index) else {
                warn!(verification_id = %id, metric_index = index, "Metric index out of range");
                return;
            };
            if metric.is_complete() {
                self.complete_metric(&verification, index).await;
                return;
            }
            if verification.status().is_terminal() {
                return;
            }
            let spec = metric.spec.clone();

            let measurement = tokio::select! {
                _ = token.cancelled() => return,
                m = self.measure(&verification, &spec) => m,
            };

            match self
                .recorder
                .record_measurement(&id, index, measurement.clone())
            {
                Ok(updated) => {
                    debug!(
                        verification_id = %id,
                        metric = %spec.name,
                        status = ?measurement.status,
                        "Measurement recorded"
                    );
                    self.log_hook(
                        "on_measurement_taken",
                        &id,
                        self.hooks
                            .on_measurement_taken(&updated, index, &measurement)
                            .await,
                    );
                    if updated.metrics[index].is_complete() {
                        self.complete_metric(&updated, index).await;
                        return;
                    }
                }
                Err(e) => {
                    warn!(verification_id = %id, metric_index = index, error = %e, "Failed to record measurement");
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = self.ticker.wait(self.interval(&spec)) => {}
            }
        }
    }

    async fn complete_metric(&self, verification: &ReleaseVerification, index: usize) {
        self.log_hook(
            "on_metric_complete",
            &verification.id,
            self.hooks.on_metric_complete(verification, index).await,
        );
        self.check_completion(&verification.id).await;
    }

    async fn measure(
        &self,
        verification: &ReleaseVerification,
        spec: &MetricSpec,
    ) -> VerificationMeasurement {
        match self.executor.execute(verification, spec).await {
            Ok(result) => {
                let (status, message) = classify(spec, &result);
                VerificationMeasurement {
                    measured_at: Utc::now(),
                    status,
                    data: result,
                    message,
                }
            }
            Err(e) => VerificationMeasurement {
                measured_at: Utc::now(),
                status: MeasurementStatus::Failed,
                data: Value::Null,
                message: Some(format!("Measurement error: {e}")),
            },
        }
    }

    /// Finish the verification if it has passed or failed. Only the caller
    /// that takes it out of `running` fires the hook; the rest return.
    async fn check_completion(&self, id: &VerificationId) {
        let Some(verification) = self.store.verifications.get(id) else {
            return;
        };
        if !matches!(
            verification.status(),
            VerificationStatus::Passed | VerificationStatus::Failed
        ) {
            return;
        }
        let Some(token) = self.state.lock().running.remove(id) else {
            return;
        };
        // Stops sibling metrics of a failed verification.
        token.cancel();
        self.finish(verification).await;
    }

    /// Write the summary message and fire `on_verification_complete`.
    async fn finish(&self, verification: ReleaseVerification) -> ReleaseVerification {
        let id = verification.id.clone();
        let status = verification.status();
        let verification = match self
            .recorder
            .update_message(&id, verification.summary_message())
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(verification_id = %id, error = %e, "Failed to write verification summary");
                verification
            }
        };
        info!(verification_id = %id, status = %status, "Verification complete");
        self.log_hook(
            "on_verification_complete",
            &id,
            self.hooks.on_verification_complete(&verification).await,
        );
        verification
    }
}
