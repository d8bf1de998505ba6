//! Reconcile background worker.
//!
//! Drains the trigger queue as requests arrive and, on each interval,
//! re-runs the targets whose re-check deadline has passed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};

use ctrlplane_reconcile::ErrorKind;
use ctrlplane_trace::TriggerReason;

use super::reconciler::{ReconcileOutcome, ReleaseTargetReconciler};
use super::ReconcileRequest;
use crate::model::ReleaseTarget;

/// Counts for one batch of reconciliations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub reconciled: usize,
    pub dispatched: usize,
    pub blocked: usize,
    pub failed: usize,
}

impl ReconcileStats {
    fn record(&mut self, outcome: Option<&ReconcileOutcome>) {
        self.reconciled += 1;
        match outcome {
            Some(ReconcileOutcome::Dispatched { .. }) => self.dispatched += 1,
            Some(ReconcileOutcome::Blocked { .. }) => self.blocked += 1,
            Some(ReconcileOutcome::DispatchFailed { .. }) | None => self.failed += 1,
            Some(_) => {}
        }
    }
}

pub struct ReconcileWorker {
    reconciler: Arc<ReleaseTargetReconciler>,
    interval: Duration,
    deadlines: Mutex<HashMap<ReleaseTarget, DateTime<Utc>>>,
}

impl ReconcileWorker {
    pub fn new(reconciler: Arc<ReleaseTargetReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    /// When `target` is next due, if a denial asked for a re-check.
    pub fn deadline(&self, target: &ReleaseTarget) -> Option<DateTime<Utc>> {
        self.deadlines.lock().get(target).copied()
    }

    /// Remove and return every target due at `now`.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<ReleaseTarget> {
        let mut deadlines = self.deadlines.lock();
        let due: Vec<ReleaseTarget> = deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(target, _)| target.clone())
            .collect();
        for target in &due {
            deadlines.remove(target);
        }
        due
    }

    /// Reconcile one request and keep its deadline current. Returns the
    /// outcome, or `None` if the reconciliation failed.
    pub async fn handle(&self, request: &ReconcileRequest) -> Option<ReconcileOutcome> {
        match self
            .reconciler
            .reconcile(&request.target, request.trigger)
            .await
        {
            Ok(result) => {
                let mut deadlines = self.deadlines.lock();
                match &result.outcome {
                    ReconcileOutcome::Blocked {
                        next_evaluation_time: Some(at),
                    } => {
                        deadlines.insert(request.target.clone(), *at);
                    }
                    _ => {
                        deadlines.remove(&request.target);
                    }
                }
                Some(result.outcome)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(release_target = %request.target, error = %e, "Target gone, dropping");
                self.deadlines.lock().remove(&request.target);
                None
            }
            Err(e) => {
                error!(release_target = %request.target, error = %e, "Reconciliation failed");
                None
            }
        }
    }

    /// Reconcile every target whose deadline has passed.
    pub async fn run_due(&self, now: DateTime<Utc>) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for target in self.take_due(now) {
            let outcome = self
                .handle(&ReconcileRequest::new(target, TriggerReason::Scheduled))
                .await;
            stats.record(outcome.as_ref());
        }
        stats
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, requests, shutdown))]
    pub async fn run(
        &self,
        mut requests: mpsc::UnboundedReceiver<ReconcileRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting reconcile worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else {
                        info!("Reconcile queue closed");
                        break;
                    };
                    self.handle(&request).await;
                }
                _ = interval.tick() => {
                    let stats = self.run_due(Utc::now()).await;
                    if stats.reconciled > 0 {
                        info!(
                            reconciled = stats.reconciled,
                            dispatched = stats.dispatched,
                            blocked = stats.blocked,
                            failed = stats.failed,
                            "Scheduled reconciliation complete"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrlplane_id::{JobId, ReleaseId};

    #[test]
    fn test_stats_record() {
        let mut stats = ReconcileStats::default();
        stats.record(Some(&ReconcileOutcome::Dispatched {
            release_id: ReleaseId::from("r"),
            job_id: JobId::from("j"),
        }));
        stats.record(Some(&ReconcileOutcome::Blocked {
            next_evaluation_time: None,
        }));
        stats.record(Some(&ReconcileOutcome::UpToDate {
            release_id: ReleaseId::from("r"),
        }));
        stats.record(None);
        assert_eq!(
            stats,
            ReconcileStats {
                reconciled: 4,
                dispatched: 1,
                blocked: 1,
                failed: 1,
            }
        );
    }
}
