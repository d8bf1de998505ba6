//! Workspace entity model.
//!
//! Entities are plain serde structs with camelCase wire names. Identity is
//! carried by the typed ids from `ctrlplane-id`.

mod entities;
mod job;
mod policy;
mod release;
mod verification;
mod version;

pub use entities::{Deployment, DeploymentVariable, Environment, JobAgent, Resource};
pub use job::Job;
pub use policy::{
    ApprovalStatus, DeploymentWindowRule, Policy, PolicyRule, PolicySkip, PolicyTargetSelector,
    RoleBinding, RuleKind, UserApprovalRecord,
};
pub use release::{Release, ReleaseTarget};
pub use verification::{
    DatadogProvider, HttpProvider, MeasurementStatus, MetricProvider, MetricSpec,
    ReleaseVerification, SleepProvider, TerraformCloudRunProvider, VerificationMeasurement,
    VerificationMetricStatus, VerificationStatus,
};
pub use version::{DeploymentVersion, VersionStatus};

/// Opaque JSON object used for agent and entity configuration.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Deep-merge `overlay` into `base`. Objects merge recursively; any other
/// value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &mut JsonMap, overlay: &JsonMap) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge() {
        let mut base = json!({"server": {"url": "a", "insecure": false}, "name": "x"})
            .as_object()
            .cloned()
            .unwrap();
        let overlay = json!({"server": {"url": "b"}, "template": "t"})
            .as_object()
            .cloned()
            .unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(
            serde_json::Value::Object(base),
            json!({"server": {"url": "b", "insecure": false}, "name": "x", "template": "t"})
        );
    }
}
