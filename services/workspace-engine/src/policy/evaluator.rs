//! Evaluator contract.

use std::collections::BTreeMap;
use std::ops::BitOr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ctrlplane_id::RuleId;

use crate::model::{Deployment, DeploymentVersion, Environment, ReleaseTarget, Resource};

/// Set of scope entities an evaluator reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScopeFields(u8);

impl ScopeFields {
    pub const NONE: Self = Self(0);
    pub const ENVIRONMENT: Self = Self(1 << 0);
    pub const VERSION: Self = Self(1 << 1);
    pub const RESOURCE: Self = Self(1 << 2);
    pub const DEPLOYMENT: Self = Self(1 << 3);
    pub const RELEASE_TARGET: Self = Self(1 << 4);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ScopeFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// The entities available to one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorScope<'a> {
    pub environment: Option<&'a Environment>,
    pub version: Option<&'a DeploymentVersion>,
    pub resource: Option<&'a Resource>,
    pub deployment: Option<&'a Deployment>,
    pub release_target: Option<&'a ReleaseTarget>,
    pub at: DateTime<Utc>,
}

impl<'a> EvaluatorScope<'a> {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            environment: None,
            version: None,
            resource: None,
            deployment: None,
            release_target: None,
            at,
        }
    }

    pub fn with_environment(mut self, environment: &'a Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_version(mut self, version: &'a DeploymentVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_resource(mut self, resource: &'a Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_deployment(mut self, deployment: &'a Deployment) -> Self {
        self.deployment = Some(deployment);
        self
    }

    pub fn with_release_target(mut self, target: &'a ReleaseTarget) -> Self {
        self.release_target = Some(target);
        self
    }

    /// Fields present in this scope.
    pub fn fields(&self) -> ScopeFields {
        let mut fields = ScopeFields::NONE;
        if self.environment.is_some() {
            fields = fields | ScopeFields::ENVIRONMENT;
        }
        if self.version.is_some() {
            fields = fields | ScopeFields::VERSION;
        }
        if self.resource.is_some() {
            fields = fields | ScopeFields::RESOURCE;
        }
        if self.deployment.is_some() {
            fields = fields | ScopeFields::DEPLOYMENT;
        }
        if self.release_target.is_some() {
            fields = fields | ScopeFields::RELEASE_TARGET;
        }
        fields
    }

    pub fn satisfies(&self, required: ScopeFields) -> bool {
        self.fields().contains(required)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Wait,
    Approval,
}

/// Result of one evaluator run.
///
/// `allowed = false` with `action_required` is a pending action rather than
/// a hard denial: approvals surface a task, waits carry a
/// `next_evaluation_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluation {
    pub rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    pub allowed: bool,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_evaluation_time: Option<DateTime<Utc>>,
}

impl RuleEvaluation {
    fn base(allowed: bool, message: impl Into<String>) -> Self {
        Self {
            rule_type: String::new(),
            rule_id: None,
            allowed,
            message: message.into(),
            details: BTreeMap::new(),
            action_required: false,
            action_type: None,
            satisfied_at: None,
            next_evaluation_time: None,
        }
    }

    pub fn allow(message: impl Into<String>) -> Self {
        Self::base(true, message)
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self::base(false, message)
    }

    /// Blocks until the action is taken.
    pub fn pending(action: ActionType, message: impl Into<String>) -> Self {
        Self {
            action_required: true,
            action_type: Some(action),
            ..Self::base(false, message)
        }
    }

    pub fn for_rule(mut self, rule_type: &str, rule_id: Option<&RuleId>) -> Self {
        self.rule_type = rule_type.to_string();
        self.rule_id = rule_id.cloned();
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_satisfied_at(mut self, at: DateTime<Utc>) -> Self {
        self.satisfied_at = Some(at);
        self
    }

    pub fn with_next_evaluation_time(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.next_evaluation_time = at;
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.allowed && self.action_required
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed && !self.action_required
    }
}

/// One atomic policy check.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation;

    /// Entities [`evaluate`](Self::evaluate) reads. The framework never
    /// calls an evaluator whose fields the scope lacks.
    fn scope_fields(&self) -> ScopeFields;

    fn rule_type(&self) -> &str;

    /// `None` for synthetic evaluators.
    fn rule_id(&self) -> Option<&RuleId>;

    /// Relative cost; cheaper evaluators run first.
    fn complexity(&self) -> u32;
}

/// Human form of a duration: `1h2m3s`, `45s`, `0s`.
pub(crate) fn format_duration(d: chrono::Duration) -> String {
    let total = d.num_seconds().max(0);
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m{s}s"),
        _ => format!("{h}h{m}m{s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_fields() {
        let required = ScopeFields::VERSION | ScopeFields::ENVIRONMENT;
        assert!(required.contains(ScopeFields::VERSION));
        assert!(!required.contains(ScopeFields::RESOURCE));
        assert!(EvaluatorScope::new(Utc::now()).satisfies(ScopeFields::NONE));
        assert!(!EvaluatorScope::new(Utc::now()).satisfies(required));
    }

    #[test]
    fn test_pending_is_not_denied() {
        let eval = RuleEvaluation::pending(ActionType::Approval, "needs 2");
        assert!(eval.is_pending());
        assert!(!eval.is_denied());
        assert!(RuleEvaluation::deny("no").is_denied());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(45)), "45s");
        assert_eq!(format_duration(chrono::Duration::seconds(3723)), "1h2m3s");
        assert_eq!(format_duration(chrono::Duration::seconds(-5)), "0s");
    }
}
