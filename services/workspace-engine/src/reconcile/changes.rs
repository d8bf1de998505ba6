//! Maps store writes to the reconciliations they call for.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, instrument, warn};

use ctrlplane_id::{DeploymentId, EnvironmentId, JobAgentId, ResourceId, VersionId};
use ctrlplane_trace::TriggerReason;

use super::ReconcileRequest;
use crate::model::ReleaseTarget;
use crate::store::{Change, EntityKind, Store, StoreChange};

/// The trigger reason a change carries, or `None` when the change does not
/// affect desired state.
pub fn trigger_for(kind: EntityKind, change: &Change) -> Option<TriggerReason> {
    let created = matches!(change, Change::Created);
    let removed = matches!(change, Change::Removed);
    match kind {
        EntityKind::Deployment if created => Some(TriggerReason::DeploymentCreated),
        EntityKind::Deployment if !removed => Some(TriggerReason::DeploymentUpdated),
        EntityKind::Environment if created => Some(TriggerReason::EnvironmentCreated),
        EntityKind::Environment if !removed => Some(TriggerReason::EnvironmentUpdated),
        EntityKind::Resource if created => Some(TriggerReason::ResourceCreated),
        EntityKind::Resource if !removed => Some(TriggerReason::ResourceUpdated),
        EntityKind::DeploymentVersion if created => Some(TriggerReason::VersionCreated),
        EntityKind::DeploymentVersion if !removed => Some(TriggerReason::VersionUpdated),
        EntityKind::UserApprovalRecord if created => Some(TriggerReason::ApprovalCreated),
        EntityKind::UserApprovalRecord => Some(TriggerReason::ApprovalUpdated),
        EntityKind::Policy | EntityKind::PolicySkip | EntityKind::RoleBinding => {
            Some(TriggerReason::PolicyUpdated)
        }
        EntityKind::DeploymentVariable => Some(TriggerReason::VariablesUpdated),
        EntityKind::JobAgent => Some(TriggerReason::JobAgentUpdated),
        _ => None,
    }
}

/// Turns [`StoreChange`]s into [`ReconcileRequest`]s.
pub struct ChangeRouter {
    store: Arc<Store>,
    requests: mpsc::UnboundedSender<ReconcileRequest>,
}

impl ChangeRouter {
    pub fn new(store: Arc<Store>, requests: mpsc::UnboundedSender<ReconcileRequest>) -> Self {
        Self { store, requests }
    }

    /// The reconciliations one change calls for.
    pub fn route(&self, change: &StoreChange) -> Vec<ReconcileRequest> {
        let Some(trigger) = trigger_for(change.kind, &change.change) else {
            return Vec::new();
        };

        // Selector inputs may have moved: bring the target set up to date
        // before picking the affected targets.
        if matches!(
            change.kind,
            EntityKind::Deployment | EntityKind::Environment | EntityKind::Resource
        ) {
            let added = self.store.sync_release_targets();
            if !added.is_empty() {
                debug!(added = added.len(), "Release targets added");
            }
        }

        self.affected_targets(change)
            .into_iter()
            .map(|target| ReconcileRequest::new(target, trigger))
            .collect()
    }

    fn affected_targets(&self, change: &StoreChange) -> Vec<ReleaseTarget> {
        let key = change.key.as_str();
        let targets = &self.store.release_targets;
        match change.kind {
            EntityKind::Deployment => {
                let id = DeploymentId::from(key);
                targets.filter(|t| t.deployment_id == id)
            }
            EntityKind::Environment => {
                let id = EnvironmentId::from(key);
                targets.filter(|t| t.environment_id == id)
            }
            EntityKind::Resource => {
                let id = ResourceId::from(key);
                targets.filter(|t| t.resource_id == id)
            }
            EntityKind::DeploymentVersion => {
                match self.store.versions.get(&VersionId::from(key)) {
                    Some(version) => targets.filter(|t| t.deployment_id == version.deployment_id),
                    None => Vec::new(),
                }
            }
            // Keyed `deployment|key`.
            EntityKind::DeploymentVariable => match key.split_once('|') {
                Some((deployment, _)) => {
                    let id = DeploymentId::from(deployment);
                    targets.filter(|t| t.deployment_id == id)
                }
                None => Vec::new(),
            },
            // Keyed `version|environment|user`.
            EntityKind::UserApprovalRecord => {
                let mut parts = key.split('|');
                match (parts.next(), parts.next()) {
                    (Some(version), Some(environment)) => {
                        let environment = EnvironmentId::from(environment);
                        let deployment = self
                            .store
                            .versions
                            .get(&VersionId::from(version))
                            .map(|v| v.deployment_id);
                        targets.filter(|t| {
                            t.environment_id == environment
                                && deployment.as_ref().is_none_or(|d| &t.deployment_id == d)
                        })
                    }
                    _ => Vec::new(),
                }
            }
            EntityKind::JobAgent => {
                let id = JobAgentId::from(key);
                let deployments: Vec<DeploymentId> = self
                    .store
                    .deployments
                    .filter(|d| d.job_agent_id.as_ref() == Some(&id))
                    .into_iter()
                    .map(|d| d.id)
                    .collect();
                targets.filter(|t| deployments.contains(&t.deployment_id))
            }
            _ => targets.items(),
        }
    }

    fn send(&self, requests: Vec<ReconcileRequest>) {
        for request in requests {
            if self.requests.send(request).is_err() {
                warn!("Reconcile queue closed, dropping request");
                return;
            }
        }
    }

    /// Route changes until shutdown is signaled.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut changes: broadcast::Receiver<StoreChange>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Starting change router");
        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(change) => self.send(self.route(&change)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change router lagged, rescheduling every target");
                        self.store.sync_release_targets();
                        self.send(
                            self.store
                                .release_targets
                                .items()
                                .into_iter()
                                .map(|t| ReconcileRequest::new(t, TriggerReason::Scheduled))
                                .collect(),
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Store change channel closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Change router shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{deployment, resource, selecting_environment, version};
    use ctrlplane_diff::ChangeSet;
    use ctrlplane_id::{ReleaseTargetKey, WorkspaceId};
    use rstest::rstest;

    #[rstest]
    #[case(EntityKind::Deployment, Change::Created, Some(TriggerReason::DeploymentCreated))]
    #[case(EntityKind::Resource, Change::Updated(ChangeSet::new()), Some(TriggerReason::ResourceUpdated))]
    #[case(EntityKind::Resource, Change::Removed, None)]
    #[case(EntityKind::DeploymentVersion, Change::Created, Some(TriggerReason::VersionCreated))]
    #[case(EntityKind::UserApprovalRecord, Change::Created, Some(TriggerReason::ApprovalCreated))]
    #[case(EntityKind::PolicySkip, Change::Removed, Some(TriggerReason::PolicyUpdated))]
    #[case(EntityKind::Job, Change::Created, None)]
    #[case(EntityKind::ReleaseVerification, Change::Created, None)]
    fn test_trigger_for(
        #[case] kind: EntityKind,
        #[case] change: Change,
        #[case] expected: Option<TriggerReason>,
    ) {
        assert_eq!(trigger_for(kind, &change), expected);
    }

    #[test]
    fn test_version_routes_to_its_deployment() {
        let store = Arc::new(Store::new(WorkspaceId::from("ws")));
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = ChangeRouter::new(Arc::clone(&store), tx);
        store.release_targets.upsert(ReleaseTargetKey::new("api", "prod", "c1"));
        store.release_targets.upsert(ReleaseTargetKey::new("web", "prod", "c1"));
        store.versions.upsert(version("v1", 0));

        let requests = router.route(&StoreChange {
            kind: EntityKind::DeploymentVersion,
            key: "v1".to_string(),
            change: Change::Created,
        });
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target.deployment_id.as_str(), "api");
        assert_eq!(requests[0].trigger, TriggerReason::VersionCreated);
    }

    #[test]
    fn test_resource_change_syncs_targets() {
        let store = Arc::new(Store::new(WorkspaceId::from("ws")));
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = ChangeRouter::new(Arc::clone(&store), tx);
        store.deployments.upsert(deployment("api"));
        store.environments.upsert(selecting_environment("prod"));
        store.resources.upsert(resource("c1"));

        let requests = router.route(&StoreChange {
            kind: EntityKind::Resource,
            key: "c1".to_string(),
            change: Change::Created,
        });
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, ReleaseTargetKey::new("api", "prod", "c1"));
    }
}
