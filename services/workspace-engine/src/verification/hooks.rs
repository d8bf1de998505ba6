//! Verification lifecycle hooks.
//!
//! ```text
//! started → (measurement taken)* → (metric complete per metric) → complete
//!                                                               ⊕ stopped
//! ```
//!
//! Hook errors are logged by the scheduler and never change the
//! verification.

use async_trait::async_trait;

use crate::model::{ReleaseVerification, VerificationMeasurement};

pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait VerificationHooks: Send + Sync {
    async fn on_verification_started(&self, _verification: &ReleaseVerification) -> HookResult {
        Ok(())
    }

    async fn on_measurement_taken(
        &self,
        _verification: &ReleaseVerification,
        _metric_index: usize,
        _measurement: &VerificationMeasurement,
    ) -> HookResult {
        Ok(())
    }

    async fn on_metric_complete(
        &self,
        _verification: &ReleaseVerification,
        _metric_index: usize,
    ) -> HookResult {
        Ok(())
    }

    /// Fires once per verification, when it passes or fails.
    async fn on_verification_complete(&self, _verification: &ReleaseVerification) -> HookResult {
        Ok(())
    }

    async fn on_verification_stopped(&self, _verification: &ReleaseVerification) -> HookResult {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

#[async_trait]
impl VerificationHooks for NoopHooks {}
