use chrono::{DateTime, Utc};
use ctrlplane_id::{EnvironmentId, PolicyId, ResourceId, RuleId, SkipId, UserId, VersionId};
use serde::{Deserialize, Serialize};

use super::{Deployment, Environment, Resource};
use crate::selector::Selector;

/// A group of rules and the targets they apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub selectors: Vec<PolicyTargetSelector>,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Policy {
    /// True if any target selector matches every component.
    pub fn applies_to(
        &self,
        deployment: &Deployment,
        environment: &Environment,
        resource: &Resource,
    ) -> bool {
        self.selectors
            .iter()
            .any(|s| s.matches(deployment, environment, resource))
    }
}

/// Optional selectors per release-target component. Absent components
/// match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Selector>,
}

impl PolicyTargetSelector {
    pub fn matches(
        &self,
        deployment: &Deployment,
        environment: &Environment,
        resource: &Resource,
    ) -> bool {
        self.deployment.as_ref().map_or(true, |s| s.matches(deployment))
            && self.environment.as_ref().map_or(true, |s| s.matches(environment))
            && self.resource.as_ref().map_or(true, |s| s.matches(resource))
    }
}

/// One rule of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: RuleId,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// Rule variants, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleKind {
    #[serde(rename_all = "camelCase")]
    AnyApproval { min_approvals: u32 },
    #[serde(rename_all = "camelCase")]
    UserApproval { user_ids: Vec<UserId> },
    #[serde(rename_all = "camelCase")]
    RoleApproval { role: String, min_approvals: u32 },
    DeploymentWindow(DeploymentWindowRule),
    /// Same fields as a deployment window; always a deny window.
    DenyWindow(DeploymentWindowRule),
    VersionSelector { selector: Selector },
}

impl RuleKind {
    pub fn rule_type(&self) -> &'static str {
        match self {
            Self::AnyApproval { .. } => "anyApproval",
            Self::UserApproval { .. } => "userApproval",
            Self::RoleApproval { .. } => "roleApproval",
            Self::DeploymentWindow(_) => "deploymentWindow",
            Self::DenyWindow(_) => "denyWindow",
            Self::VersionSelector { .. } => "versionSelector",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentWindowRule {
    pub rrule: String,
    pub duration_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_window: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    Pending,
}

/// A user's verdict on a version in an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserApprovalRecord {
    pub version_id: VersionId,
    pub environment_id: EnvironmentId,
    pub user_id: UserId,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Grants `role` to `user_id` for role-based approvals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub user_id: UserId,
    pub role: String,
}

/// Bypasses one rule for a scope. `None` scope fields match anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySkip {
    pub id: SkipId,
    pub rule_id: RuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<VersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<EnvironmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PolicySkip {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn matches(
        &self,
        version_id: Option<&VersionId>,
        environment_id: Option<&EnvironmentId>,
        resource_id: Option<&ResourceId>,
    ) -> bool {
        fn field<T: PartialEq>(skip: &Option<T>, actual: Option<&T>) -> bool {
            match (skip, actual) {
                (None, _) => true,
                (Some(s), Some(a)) => s == a,
                (Some(_), None) => false,
            }
        }
        field(&self.version_id, version_id)
            && field(&self.environment_id, environment_id)
            && field(&self.resource_id, resource_id)
    }
}
