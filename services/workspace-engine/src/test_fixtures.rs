//! Builders shared by unit tests.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, TimeZone, Utc};

use ctrlplane_id::{
    DeploymentId, EnvironmentId, PolicyId, ReleaseId, ResourceId, SystemId, UserId, VersionId,
    WorkspaceId,
};

use crate::model::{
    Deployment, DeploymentVersion, Environment, MetricProvider, MetricSpec, Policy, PolicyRule,
    PolicySkip, PolicyTargetSelector, ReleaseTarget, ReleaseVerification, Resource, RoleBinding,
    SleepProvider, UserApprovalRecord, VersionStatus,
};
use crate::policy::PolicyGetters;
use crate::selector::{Comparison, Selector};

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn deployment(id: &str) -> Deployment {
    Deployment {
        id: DeploymentId::from(id),
        name: id.to_string(),
        slug: id.to_string(),
        system_id: SystemId::from("sys"),
        description: None,
        job_agent_id: None,
        job_agent_config: Default::default(),
        resource_selector: None,
        version_selector: None,
        verification: Vec::new(),
    }
}

pub fn environment(id: &str) -> Environment {
    Environment {
        id: EnvironmentId::from(id),
        name: id.to_string(),
        system_id: SystemId::from("sys"),
        description: None,
        resource_selector: None,
        metadata: BTreeMap::new(),
        created_at: epoch(),
    }
}

/// An environment selecting every `kubernetes` resource.
pub fn selecting_environment(id: &str) -> Environment {
    Environment {
        resource_selector: Some(Selector::Kind(Comparison::equals("kubernetes"))),
        ..environment(id)
    }
}

pub fn resource(id: &str) -> Resource {
    Resource {
        id: ResourceId::from(id),
        workspace_id: WorkspaceId::from("ws"),
        name: id.to_string(),
        kind: "kubernetes".to_string(),
        identifier: id.to_string(),
        version: "v1".to_string(),
        config: Default::default(),
        metadata: BTreeMap::new(),
        variables: BTreeMap::new(),
        provider_id: None,
        created_at: epoch(),
        updated_at: None,
        locked_at: None,
        deleted_at: None,
    }
}

/// A ready version of deployment `api`, `age_rank` minutes after epoch.
pub fn version(id: &str, age_rank: i64) -> DeploymentVersion {
    DeploymentVersion {
        id: VersionId::from(id),
        deployment_id: DeploymentId::from("api"),
        tag: id.to_string(),
        name: id.to_string(),
        config: Default::default(),
        metadata: BTreeMap::new(),
        status: VersionStatus::Ready,
        created_at: epoch() + Duration::minutes(age_rank),
    }
}

/// An enabled policy matching every target.
pub fn policy(id: &str, rules: Vec<PolicyRule>) -> Policy {
    Policy {
        id: PolicyId::from(id),
        name: id.to_string(),
        enabled: true,
        priority: 0,
        selectors: vec![PolicyTargetSelector::default()],
        rules,
        created_at: epoch(),
    }
}

/// `result.statusCode == 200` over a sleep provider.
pub fn metric_spec(count: u32, failure_threshold: Option<u32>) -> MetricSpec {
    MetricSpec {
        name: "health".to_string(),
        count,
        interval_seconds: 1,
        success_condition: "result.statusCode == 200".to_string(),
        failure_condition: None,
        success_threshold: None,
        failure_threshold,
        provider: MetricProvider::Sleep(SleepProvider {
            duration_seconds: 0,
            data: serde_json::json!({"statusCode": 200}),
        }),
    }
}

/// A fresh single-metric verification of release `rel`.
pub fn verification(count: u32, failure_threshold: Option<u32>) -> ReleaseVerification {
    ReleaseVerification::new(
        ReleaseId::from("rel"),
        None,
        &[metric_spec(count, failure_threshold)],
    )
}

/// Getters backed by plain vectors.
#[derive(Debug, Default)]
pub struct StaticGetters {
    pub policies: Vec<Policy>,
    pub approvals: Vec<UserApprovalRecord>,
    pub roles: Vec<RoleBinding>,
    pub skips: Vec<PolicySkip>,
    pub has_release: bool,
}

impl PolicyGetters for StaticGetters {
    fn policies_for_release_target(&self, _target: &ReleaseTarget) -> Vec<Policy> {
        self.policies.clone()
    }

    fn approvals_for(
        &self,
        version_id: &VersionId,
        environment_id: &EnvironmentId,
    ) -> Vec<UserApprovalRecord> {
        self.approvals
            .iter()
            .filter(|a| &a.version_id == version_id && &a.environment_id == environment_id)
            .cloned()
            .collect()
    }

    fn users_with_role(&self, role: &str) -> HashSet<UserId> {
        self.roles
            .iter()
            .filter(|b| b.role == role)
            .map(|b| b.user_id.clone())
            .collect()
    }

    fn has_release(&self, _target: &ReleaseTarget) -> bool {
        self.has_release
    }

    fn active_skips(
        &self,
        version_id: Option<&VersionId>,
        environment_id: Option<&EnvironmentId>,
        resource_id: Option<&ResourceId>,
        now: DateTime<Utc>,
    ) -> Vec<PolicySkip> {
        self.skips
            .iter()
            .filter(|s| !s.is_expired(now) && s.matches(version_id, environment_id, resource_id))
            .cloned()
            .collect()
    }
}
