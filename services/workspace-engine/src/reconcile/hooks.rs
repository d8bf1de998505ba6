use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use ctrlplane_trace::TriggerReason;

use super::ReconcileRequest;
use crate::model::{ReleaseVerification, VerificationStatus};
use crate::store::Store;
use crate::verification::{HookResult, VerificationHooks};

/// Re-triggers the release target when its verification fails.
pub struct ReconcileHooks {
    store: Arc<Store>,
    requests: mpsc::UnboundedSender<ReconcileRequest>,
}

impl ReconcileHooks {
    pub fn new(store: Arc<Store>, requests: mpsc::UnboundedSender<ReconcileRequest>) -> Self {
        Self { store, requests }
    }
}

#[async_trait]
impl VerificationHooks for ReconcileHooks {
    async fn on_verification_complete(&self, verification: &ReleaseVerification) -> HookResult {
        if verification.status() != VerificationStatus::Failed {
            return Ok(());
        }
        let release = self
            .store
            .releases
            .get(&verification.release_id)
            .ok_or_else(|| format!("release {} not found", verification.release_id))?;
        info!(
            verification_id = %verification.id,
            release_target = %release.release_target,
            "Verification failed, reconciling target"
        );
        self.requests
            .send(ReconcileRequest::new(
                release.release_target,
                TriggerReason::VerificationFailure,
            ))
            .map_err(|_| "reconcile queue closed")?;
        Ok(())
    }
}
