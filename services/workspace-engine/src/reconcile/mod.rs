//! Release-target reconciliation.

mod changes;
mod error;
mod hooks;
mod reconciler;
mod worker;

use ctrlplane_trace::TriggerReason;

use crate::model::ReleaseTarget;

pub use changes::{trigger_for, ChangeRouter};
pub use error::{ReconcileError, Result};
pub use hooks::ReconcileHooks;
pub use reconciler::{
    ReconcileOutcome, ReconcileResult, ReconcilerConfig, ReleaseTargetReconciler,
    TRACE_ID_METADATA_KEY, TRACE_TOKEN_METADATA_KEY,
};
pub use worker::{ReconcileStats, ReconcileWorker};

/// A release target to reconcile and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub target: ReleaseTarget,
    pub trigger: TriggerReason,
}

impl ReconcileRequest {
    pub fn new(target: ReleaseTarget, trigger: TriggerReason) -> Self {
        Self { target, trigger }
    }
}
