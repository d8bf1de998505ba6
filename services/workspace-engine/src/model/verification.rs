use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_id::{JobId, ReleaseId, VerificationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A post-deployment verification of one release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseVerification {
    pub id: VerificationId,
    pub release_id: ReleaseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub metrics: Vec<VerificationMetricStatus>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Running,
    Passed,
    Failed,
    Cancelled,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReleaseVerification {
    pub fn new(release_id: ReleaseId, job_id: Option<JobId>, specs: &[MetricSpec]) -> Self {
        Self {
            id: VerificationId::new(),
            release_id,
            job_id,
            metrics: specs
                .iter()
                .cloned()
                .map(VerificationMetricStatus::from)
                .collect(),
            created_at: Utc::now(),
            message: None,
            cancelled_at: None,
        }
    }

    /// Status derived from the metrics.
    ///
    /// `Failed` as soon as any metric completes failing; `Passed` once every
    /// metric completes passing.
    pub fn status(&self) -> VerificationStatus {
        if self.cancelled_at.is_some() {
            return VerificationStatus::Cancelled;
        }
        let mut all_passed = true;
        for metric in &self.metrics {
            match metric.outcome() {
                Some(MeasurementStatus::Failed) => return VerificationStatus::Failed,
                Some(_) => {}
                None => all_passed = false,
            }
        }
        if all_passed {
            VerificationStatus::Passed
        } else {
            VerificationStatus::Running
        }
    }

    /// `Verification <status>: <p> passed, <f> failed, <i> inconclusive
    /// (<total> total) across <N> metrics`.
    pub fn summary_message(&self) -> String {
        let (mut passed, mut failed, mut inconclusive) = (0, 0, 0);
        for m in self.metrics.iter().flat_map(|m| &m.measurements) {
            match m.status {
                MeasurementStatus::Passed => passed += 1,
                MeasurementStatus::Failed => failed += 1,
                MeasurementStatus::Inconclusive => inconclusive += 1,
            }
        }
        format!(
            "Verification {}: {} passed, {} failed, {} inconclusive ({} total) across {} metrics",
            self.status(),
            passed,
            failed,
            inconclusive,
            passed + failed + inconclusive,
            self.metrics.len()
        )
    }
}

/// Declarative metric definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub interval_seconds: i64,
    pub success_condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    pub provider: MetricProvider,
}

/// A metric with its measurements so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMetricStatus {
    #[serde(flatten)]
    pub spec: MetricSpec,
    #[serde(default)]
    pub measurements: Vec<VerificationMeasurement>,
}

impl From<MetricSpec> for VerificationMetricStatus {
    fn from(spec: MetricSpec) -> Self {
        Self {
            spec,
            measurements: Vec::new(),
        }
    }
}

impl VerificationMetricStatus {
    fn threshold(value: Option<u32>) -> Option<usize> {
        value.filter(|n| *n > 0).map(|n| n as usize)
    }

    fn count_of(&self, status: MeasurementStatus) -> usize {
        self.measurements
            .iter()
            .filter(|m| m.status == status)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.measurements.len() >= self.spec.count as usize
            || Self::threshold(self.spec.failure_threshold)
                .is_some_and(|t| self.count_of(MeasurementStatus::Failed) >= t)
            || Self::threshold(self.spec.success_threshold)
                .is_some_and(|t| self.count_of(MeasurementStatus::Passed) >= t)
    }

    /// `Some(Passed | Failed)` once complete, `None` while running.
    pub fn outcome(&self) -> Option<MeasurementStatus> {
        if !self.is_complete() {
            return None;
        }
        if Self::threshold(self.spec.failure_threshold)
            .is_some_and(|t| self.count_of(MeasurementStatus::Failed) >= t)
        {
            return Some(MeasurementStatus::Failed);
        }
        if Self::threshold(self.spec.success_threshold)
            .is_some_and(|t| self.count_of(MeasurementStatus::Passed) >= t)
        {
            return Some(MeasurementStatus::Passed);
        }
        match self.measurements.last() {
            Some(m) if m.status == MeasurementStatus::Passed => Some(MeasurementStatus::Passed),
            Some(_) => Some(MeasurementStatus::Failed),
            // count == 0: nothing to measure.
            None => Some(MeasurementStatus::Passed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementStatus {
    Passed,
    Failed,
    Inconclusive,
}

/// One datapoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMeasurement {
    pub measured_at: DateTime<Utc>,
    pub status: MeasurementStatus,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Where a metric reads its data from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MetricProvider {
    Http(HttpProvider),
    Sleep(SleepProvider),
    Datadog(DatadogProvider),
    TerraformCloudRun(TerraformCloudRunProvider),
}

impl MetricProvider {
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Sleep(_) => "sleep",
            Self::Datadog(_) => "datadog",
            Self::TerraformCloudRun(_) => "terraform-cloud-run",
        }
    }
}

/// HTTP probe. `url`, header values and `body` are templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProvider {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Go-style duration (`"30s"`, `"2m"`, `"500ms"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Waits, then returns `data`. For demos and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepProvider {
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub data: Value,
}

/// Datadog metric query over the last `window_seconds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatadogProvider {
    pub query: String,
    pub api_key: String,
    pub app_key: String,
    #[serde(default = "default_datadog_site")]
    pub site: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_window")]
    pub window_seconds: i64,
}

fn default_datadog_site() -> String {
    "datadoghq.com".to_string()
}

fn default_window() -> i64 {
    300
}

/// Status of a Terraform Cloud run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerraformCloudRunProvider {
    #[serde(default = "default_tfc_address")]
    pub address: String,
    pub token: String,
    pub run_id: String,
}

fn default_tfc_address() -> String {
    "https://app.terraform.io".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric(count: u32, success: Option<u32>, failure: Option<u32>) -> VerificationMetricStatus {
        VerificationMetricStatus::from(MetricSpec {
            name: "health".to_string(),
            count,
            interval_seconds: 10,
            success_condition: "result.ok".to_string(),
            failure_condition: None,
            success_threshold: success,
            failure_threshold: failure,
            provider: MetricProvider::Sleep(SleepProvider {
                duration_seconds: 0,
                data: json!({}),
            }),
        })
    }

    fn push(metric: &mut VerificationMetricStatus, status: MeasurementStatus) {
        metric.measurements.push(VerificationMeasurement {
            measured_at: Utc::now(),
            status,
            data: Value::Null,
            message: None,
        });
    }

    #[test]
    fn test_count_reached_with_final_pass() {
        let mut m = metric(2, None, None);
        push(&mut m, MeasurementStatus::Failed);
        assert!(!m.is_complete());
        push(&mut m, MeasurementStatus::Passed);
        assert_eq!(m.outcome(), Some(MeasurementStatus::Passed));
    }

    #[test]
    fn test_failure_threshold_stops_early() {
        let mut m = metric(5, None, Some(2));
        push(&mut m, MeasurementStatus::Failed);
        assert_eq!(m.outcome(), None);
        push(&mut m, MeasurementStatus::Failed);
        assert_eq!(m.outcome(), Some(MeasurementStatus::Failed));
    }

    #[test]
    fn test_zero_threshold_is_ignored() {
        let mut m = metric(2, Some(0), Some(0));
        push(&mut m, MeasurementStatus::Passed);
        assert!(!m.is_complete());
    }

    #[test]
    fn test_summary_and_status() {
        let mut v = ReleaseVerification::new(ReleaseId::from("rel"), None, &[]);
        v.metrics.push(metric(1, None, None));
        v.metrics.push(metric(3, None, Some(1)));
        assert_eq!(v.status(), VerificationStatus::Running);
        push(&mut v.metrics[0], MeasurementStatus::Passed);
        assert_eq!(v.status(), VerificationStatus::Running);
        push(&mut v.metrics[1], MeasurementStatus::Failed);
        assert_eq!(v.status(), VerificationStatus::Failed);
        assert_eq!(
            v.summary_message(),
            "Verification failed: 1 passed, 1 failed, 0 inconclusive (2 total) across 2 metrics"
        );
        v.cancelled_at = Some(Utc::now());
        assert_eq!(v.status(), VerificationStatus::Cancelled);
    }

    #[test]
    fn test_provider_wire_tag() {
        let p: MetricProvider = serde_json::from_value(json!({
            "type": "terraform-cloud-run", "token": "t", "runId": "run-1"
        }))
        .unwrap();
        assert_eq!(p.provider_type(), "terraform-cloud-run");
    }
}
