//! Reasons a reconciliation starts.

use serde::{Deserialize, Serialize};

/// The signal that started a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    Scheduled,
    DeploymentCreated,
    DeploymentUpdated,
    EnvironmentCreated,
    EnvironmentUpdated,
    ResourceCreated,
    ResourceUpdated,
    VersionCreated,
    VersionUpdated,
    ApprovalCreated,
    ApprovalUpdated,
    PolicyUpdated,
    VariablesUpdated,
    JobAgentUpdated,
    JobSuccess,
    JobFailure,
    VerificationFailure,
    Manual,
    FirstBoot,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::DeploymentCreated => "deployment-created",
            Self::DeploymentUpdated => "deployment-updated",
            Self::EnvironmentCreated => "environment-created",
            Self::EnvironmentUpdated => "environment-updated",
            Self::ResourceCreated => "resource-created",
            Self::ResourceUpdated => "resource-updated",
            Self::VersionCreated => "version-created",
            Self::VersionUpdated => "version-updated",
            Self::ApprovalCreated => "approval-created",
            Self::ApprovalUpdated => "approval-updated",
            Self::PolicyUpdated => "policy-updated",
            Self::VariablesUpdated => "variables-updated",
            Self::JobAgentUpdated => "job-agent-updated",
            Self::JobSuccess => "job-success",
            Self::JobFailure => "job-failure",
            Self::VerificationFailure => "verification-failure",
            Self::Manual => "manual",
            Self::FirstBoot => "first-boot",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
