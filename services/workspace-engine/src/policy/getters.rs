use std::collections::HashSet;

use chrono::{DateTime, Utc};

use ctrlplane_id::{EnvironmentId, ResourceId, UserId, VersionId};

use crate::model::{Policy, PolicySkip, ReleaseTarget, UserApprovalRecord};
use crate::store::Store;

/// Reads the policy layer needs from workspace state.
pub trait PolicyGetters: Send + Sync {
    fn policies_for_release_target(&self, target: &ReleaseTarget) -> Vec<Policy>;

    fn approvals_for(
        &self,
        version_id: &VersionId,
        environment_id: &EnvironmentId,
    ) -> Vec<UserApprovalRecord>;

    fn users_with_role(&self, role: &str) -> HashSet<UserId>;

    /// True once the target has produced any release.
    fn has_release(&self, target: &ReleaseTarget) -> bool;

    fn active_skips(
        &self,
        version_id: Option<&VersionId>,
        environment_id: Option<&EnvironmentId>,
        resource_id: Option<&ResourceId>,
        now: DateTime<Utc>,
    ) -> Vec<PolicySkip>;
}

impl PolicyGetters for Store {
    fn policies_for_release_target(&self, target: &ReleaseTarget) -> Vec<Policy> {
        Store::policies_for_release_target(self, target)
    }

    fn approvals_for(
        &self,
        version_id: &VersionId,
        environment_id: &EnvironmentId,
    ) -> Vec<UserApprovalRecord> {
        Store::approvals_for(self, version_id, environment_id)
    }

    fn users_with_role(&self, role: &str) -> HashSet<UserId> {
        Store::users_with_role(self, role)
    }

    fn has_release(&self, target: &ReleaseTarget) -> bool {
        self.latest_release(target).is_some()
    }

    fn active_skips(
        &self,
        version_id: Option<&VersionId>,
        environment_id: Option<&EnvironmentId>,
        resource_id: Option<&ResourceId>,
        now: DateTime<Utc>,
    ) -> Vec<PolicySkip> {
        Store::active_skips(self, version_id, environment_id, resource_id, now)
    }
}
