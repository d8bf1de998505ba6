//! In-memory workspace state.
//!
//! One [`EntityStore`] per entity type, all publishing [`StoreChange`]s to a
//! shared broadcast channel. [`Store`] adds the cross-entity queries the
//! policy, verification and reconcile layers consume.

mod entity;
mod error;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use ctrlplane_diff::ChangeSet;
use ctrlplane_events::JobStatus;
use ctrlplane_id::{
    DeploymentId, EnvironmentId, JobAgentId, JobId, PolicyId, ReleaseId, ResourceId, SkipId,
    UserId, VerificationId, VersionId, WorkspaceId,
};

use crate::model::{
    Deployment, DeploymentVariable, DeploymentVersion, Environment, Job, JobAgent, Policy,
    PolicySkip, Release, ReleaseTarget, ReleaseVerification, Resource, RoleBinding,
    UserApprovalRecord,
};

pub use entity::{Entity, EntityStore};
pub use error::{Result, StoreError};

/// Capacity of the change broadcast. Slow subscribers lag and skip.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Deployment,
    Environment,
    Resource,
    DeploymentVersion,
    DeploymentVariable,
    JobAgent,
    Policy,
    UserApprovalRecord,
    PolicySkip,
    RoleBinding,
    ReleaseTarget,
    Release,
    Job,
    ReleaseVerification,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::Environment => "environment",
            Self::Resource => "resource",
            Self::DeploymentVersion => "deployment-version",
            Self::DeploymentVariable => "deployment-variable",
            Self::JobAgent => "job-agent",
            Self::Policy => "policy",
            Self::UserApprovalRecord => "user-approval-record",
            Self::PolicySkip => "policy-skip",
            Self::RoleBinding => "role-binding",
            Self::ReleaseTarget => "release-target",
            Self::Release => "release",
            Self::Job => "job",
            Self::ReleaseVerification => "release-verification",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Created,
    Updated(ChangeSet),
    Removed,
}

/// One write to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub kind: EntityKind,
    /// Display form of the entity key.
    pub key: String,
    pub change: Change,
}

// =============================================================================
// Entity bindings
// =============================================================================

macro_rules! entity {
    ($ty:ty, $key:ty, $kind:ident, |$e:ident| $body:expr) => {
        impl Entity for $ty {
            type Key = $key;
            const KIND: EntityKind = EntityKind::$kind;

            fn key(&self) -> $key {
                let $e = self;
                $body
            }
        }
    };
}

entity!(Deployment, DeploymentId, Deployment, |e| e.id.clone());
entity!(Environment, EnvironmentId, Environment, |e| e.id.clone());
entity!(Resource, ResourceId, Resource, |e| e.id.clone());
entity!(DeploymentVersion, VersionId, DeploymentVersion, |e| e.id.clone());
entity!(JobAgent, JobAgentId, JobAgent, |e| e.id.clone());
entity!(Policy, PolicyId, Policy, |e| e.id.clone());
entity!(PolicySkip, SkipId, PolicySkip, |e| e.id.clone());
entity!(ReleaseTarget, ReleaseTarget, ReleaseTarget, |e| e.clone());
entity!(Release, ReleaseId, Release, |e| e.id());
entity!(Job, JobId, Job, |e| e.id.clone());
entity!(ReleaseVerification, VerificationId, ReleaseVerification, |e| e.id.clone());
entity!(DeploymentVariable, String, DeploymentVariable, |e| format!(
    "{}|{}",
    e.deployment_id, e.key
));
entity!(UserApprovalRecord, String, UserApprovalRecord, |e| format!(
    "{}|{}|{}",
    e.version_id, e.environment_id, e.user_id
));
entity!(RoleBinding, String, RoleBinding, |e| format!("{}|{}", e.user_id, e.role));

/// The three entities a release target names.
#[derive(Debug, Clone)]
pub struct TargetEntities {
    pub deployment: Deployment,
    pub environment: Environment,
    pub resource: Resource,
}

// =============================================================================
// Store
// =============================================================================

/// All state of one workspace.
pub struct Store {
    workspace_id: WorkspaceId,
    changes: broadcast::Sender<StoreChange>,
    pub deployments: EntityStore<Deployment>,
    pub environments: EntityStore<Environment>,
    pub resources: EntityStore<Resource>,
    pub versions: EntityStore<DeploymentVersion>,
    pub variables: EntityStore<DeploymentVariable>,
    pub job_agents: EntityStore<JobAgent>,
    pub policies: EntityStore<Policy>,
    pub approvals: EntityStore<UserApprovalRecord>,
    pub skips: EntityStore<PolicySkip>,
    pub role_bindings: EntityStore<RoleBinding>,
    pub release_targets: EntityStore<ReleaseTarget>,
    pub releases: EntityStore<Release>,
    pub jobs: EntityStore<Job>,
    pub verifications: EntityStore<ReleaseVerification>,
}

impl Store {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            workspace_id,
            deployments: EntityStore::new(changes.clone()),
            environments: EntityStore::new(changes.clone()),
            resources: EntityStore::new(changes.clone()),
            versions: EntityStore::new(changes.clone()),
            variables: EntityStore::new(changes.clone()),
            job_agents: EntityStore::new(changes.clone()),
            policies: EntityStore::new(changes.clone()),
            approvals: EntityStore::new(changes.clone()),
            skips: EntityStore::new(changes.clone()),
            role_bindings: EntityStore::new(changes.clone()),
            release_targets: EntityStore::new(changes.clone()),
            releases: EntityStore::new(changes.clone()),
            jobs: EntityStore::new(changes.clone()),
            verifications: EntityStore::new(changes.clone()),
            changes,
        }
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// Subscribe to every subsequent write.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn target_entities(&self, target: &ReleaseTarget) -> Result<TargetEntities> {
        Ok(TargetEntities {
            deployment: self
                .deployments
                .get(&target.deployment_id)
                .ok_or_else(|| StoreError::not_found(EntityKind::Deployment, &target.deployment_id))?,
            environment: self
                .environments
                .get(&target.environment_id)
                .ok_or_else(|| {
                    StoreError::not_found(EntityKind::Environment, &target.environment_id)
                })?,
            resource: self
                .resources
                .get(&target.resource_id)
                .ok_or_else(|| StoreError::not_found(EntityKind::Resource, &target.resource_id))?,
        })
    }

    /// Policies whose target selectors match the release target, highest
    /// priority first. Disabled policies are included.
    pub fn policies_for_release_target(&self, target: &ReleaseTarget) -> Vec<Policy> {
        let Ok(entities) = self.target_entities(target) else {
            return Vec::new();
        };
        let mut policies = self.policies.filter(|p| {
            p.applies_to(&entities.deployment, &entities.environment, &entities.resource)
        });
        policies.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        policies
    }

    /// Versions of a deployment, newest first.
    pub fn versions_for_deployment(&self, deployment_id: &DeploymentId) -> Vec<DeploymentVersion> {
        let mut versions = self.versions.filter(|v| &v.deployment_id == deployment_id);
        versions.sort_by(DeploymentVersion::newest_first);
        versions
    }

    pub fn approvals_for(
        &self,
        version_id: &VersionId,
        environment_id: &EnvironmentId,
    ) -> Vec<UserApprovalRecord> {
        let mut records = self
            .approvals
            .filter(|a| &a.version_id == version_id && &a.environment_id == environment_id);
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Skips that match the scope and have not expired at `now`.
    pub fn active_skips(
        &self,
        version_id: Option<&VersionId>,
        environment_id: Option<&EnvironmentId>,
        resource_id: Option<&ResourceId>,
        now: DateTime<Utc>,
    ) -> Vec<PolicySkip> {
        self.skips.filter(|s| {
            !s.is_expired(now) && s.matches(version_id, environment_id, resource_id)
        })
    }

    pub fn users_with_role(&self, role: &str) -> HashSet<UserId> {
        self.role_bindings
            .filter(|b| b.role == role)
            .into_iter()
            .map(|b| b.user_id)
            .collect()
    }

    /// Every release ever created for the target, newest first.
    pub fn releases_for_target(&self, target: &ReleaseTarget) -> Vec<Release> {
        let mut releases = self.releases.filter(|r| &r.release_target == target);
        releases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        releases
    }

    pub fn latest_release(&self, target: &ReleaseTarget) -> Option<Release> {
        self.releases_for_target(target).into_iter().next()
    }

    /// The newest release of the target with a successful job.
    pub fn current_release(&self, target: &ReleaseTarget) -> Option<Release> {
        self.releases_for_target(target).into_iter().find(|r| {
            let id = r.id();
            self.jobs
                .filter(|j| j.release_id == id)
                .iter()
                .any(|j| j.status == JobStatus::Successful)
        })
    }

    /// Jobs of a release, oldest first.
    pub fn jobs_for_release(&self, release_id: &ReleaseId) -> Vec<Job> {
        let mut jobs = self.jobs.filter(|j| &j.release_id == release_id);
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    pub fn job_with_release(&self, job_id: &JobId) -> Option<(Job, Release)> {
        let job = self.jobs.get(job_id)?;
        let release = self.releases.get(&job.release_id)?;
        Some((job, release))
    }

    pub fn verification_by_release(&self, release_id: &ReleaseId) -> Option<ReleaseVerification> {
        self.verifications
            .filter(|v| &v.release_id == release_id)
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
    }

    /// Deployment defaults overlaid by resource variables.
    pub fn resolve_variables(
        &self,
        deployment: &Deployment,
        resource: &Resource,
    ) -> BTreeMap<String, Value> {
        self.variables
            .filter(|v| v.deployment_id == deployment.id)
            .into_iter()
            .filter_map(|v| {
                let value = resource
                    .variables
                    .get(&v.key)
                    .cloned()
                    .or(v.default_value)?;
                Some((v.key, value))
            })
            .collect()
    }

    /// Every `(deployment, environment, resource)` triple the current
    /// selectors produce.
    pub fn compute_release_targets(&self) -> Vec<ReleaseTarget> {
        let deployments = self.deployments.items();
        let resources = self.resources.filter(|r| r.deleted_at.is_none());
        let mut targets = Vec::new();
        for environment in self.environments.items() {
            let Some(env_selector) = &environment.resource_selector else {
                continue;
            };
            for deployment in deployments.iter().filter(|d| d.system_id == environment.system_id) {
                for resource in &resources {
                    let in_deployment = deployment
                        .resource_selector
                        .as_ref()
                        .map_or(true, |s| s.matches(resource));
                    if in_deployment && env_selector.matches(resource) {
                        targets.push(ReleaseTarget::new(
                            deployment.id.clone(),
                            environment.id.clone(),
                            resource.id.clone(),
                        ));
                    }
                }
            }
        }
        targets.sort();
        targets
    }

    /// Bring the release-target set in line with the selectors. Returns the
    /// targets that were added.
    pub fn sync_release_targets(&self) -> Vec<ReleaseTarget> {
        let computed = self.compute_release_targets();
        let wanted: HashSet<&ReleaseTarget> = computed.iter().collect();
        for stale in self.release_targets.filter(|t| !wanted.contains(t)) {
            self.release_targets.remove(&stale);
        }
        computed
            .into_iter()
            .filter(|t| !self.release_targets.contains(t))
            .inspect(|t| {
                self.release_targets.upsert(t.clone());
            })
            .collect()
    }
}
