//! Serialized writes to verification records.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use ctrlplane_id::VerificationId;

use super::error::RecorderError;
use crate::model::{ReleaseVerification, VerificationMeasurement};
use crate::store::Store;

/// All measurement and status writes go through one mutex. Each write
/// copies the stored record, changes the copy and stores it back, so
/// metric tasks of the same verification never see a torn record.
pub struct VerificationRecorder {
    store: Arc<Store>,
    lock: Mutex<()>,
}

impl VerificationRecorder {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn load(&self, id: &VerificationId) -> Result<ReleaseVerification, RecorderError> {
        self.store
            .verifications
            .get(id)
            .ok_or_else(|| RecorderError::NotFound(id.clone()))
    }

    /// Append a measurement to metric `index`.
    ///
    /// A measurement stamped before the metric's last one is moved up to
    /// it, so `measured_at` never decreases.
    pub fn record_measurement(
        &self,
        id: &VerificationId,
        index: usize,
        mut measurement: VerificationMeasurement,
    ) -> Result<ReleaseVerification, RecorderError> {
        let _guard = self.lock.lock();
        let mut verification = self.load(id)?;
        let status = verification.status();
        if status.is_terminal() {
            return Err(RecorderError::Terminal {
                id: id.clone(),
                status,
            });
        }
        let len = verification.metrics.len();
        let metric = verification
            .metrics
            .get_mut(index)
            .ok_or_else(|| RecorderError::MetricIndexOutOfRange {
                id: id.clone(),
                index,
                len,
            })?;
        if let Some(last) = metric.measurements.last() {
            measurement.measured_at = measurement.measured_at.max(last.measured_at);
        }
        metric.measurements.push(measurement);
        self.store.verifications.upsert(verification.clone());
        Ok(verification)
    }

    /// Replace the summary message. Allowed in any state.
    pub fn update_message(
        &self,
        id: &VerificationId,
        message: String,
    ) -> Result<ReleaseVerification, RecorderError> {
        let _guard = self.lock.lock();
        let mut verification = self.load(id)?;
        verification.message = Some(message);
        self.store.verifications.upsert(verification.clone());
        Ok(verification)
    }

    /// Mark a running verification cancelled.
    pub fn mark_cancelled(
        &self,
        id: &VerificationId,
        reason: &str,
    ) -> Result<ReleaseVerification, RecorderError> {
        let _guard = self.lock.lock();
        let mut verification = self.load(id)?;
        let status = verification.status();
        if status.is_terminal() {
            return Err(RecorderError::Terminal {
                id: id.clone(),
                status,
            });
        }
        verification.cancelled_at = Some(Utc::now());
        verification.message = Some(format!("Verification cancelled: {reason}"));
        self.store.verifications.upsert(verification.clone());
        Ok(verification)
    }
}
