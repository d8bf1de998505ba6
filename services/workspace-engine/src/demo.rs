//! Demo workspace seeded at boot in dev mode.

use serde::Deserialize;

use ctrlplane_id::WorkspaceId;

use crate::model::{
    Deployment, DeploymentVariable, DeploymentVersion, Environment, JobAgent, Policy, Resource,
};
use crate::store::Store;

/// Entities to load into a store.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub job_agents: Vec<JobAgent>,
    pub deployments: Vec<Deployment>,
    pub variables: Vec<DeploymentVariable>,
    pub environments: Vec<Environment>,
    pub resources: Vec<Resource>,
    pub versions: Vec<DeploymentVersion>,
    pub policies: Vec<Policy>,
}

impl Snapshot {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Upsert everything. Resources are moved into the store's workspace.
    pub fn apply(self, store: &Store) {
        let workspace_id: WorkspaceId = store.workspace_id().clone();
        self.job_agents.into_iter().for_each(|e| {
            store.job_agents.upsert(e);
        });
        self.deployments.into_iter().for_each(|e| {
            store.deployments.upsert(e);
        });
        self.variables.into_iter().for_each(|e| {
            store.variables.upsert(e);
        });
        self.environments.into_iter().for_each(|e| {
            store.environments.upsert(e);
        });
        self.resources.into_iter().for_each(|mut e| {
            e.workspace_id = workspace_id.clone();
            store.resources.upsert(e);
        });
        self.versions.into_iter().for_each(|e| {
            store.versions.upsert(e);
        });
        self.policies.into_iter().for_each(|e| {
            store.policies.upsert(e);
        });
        store.sync_release_targets();
    }
}

const DEMO: &str = r#"
jobAgents:
  - id: test-runner
    name: Test runner
    type: test-runner
    config:
      delaySeconds: 5

deployments:
  - id: api
    name: API
    slug: api
    systemId: demo
    jobAgentId: test-runner
    jobAgentConfig:
      message: "Deployed {{version.tag}} to {{resource.name}}"
    verification:
      - name: health
        count: 3
        intervalSeconds: 10
        successCondition: result.statusCode == 200
        failureThreshold: 2
        provider:
          type: sleep
          durationSeconds: 1
          data:
            statusCode: 200

variables:
  - deploymentId: api
    key: replicas
    defaultValue: 2

environments:
  - id: production
    name: production
    systemId: demo
    createdAt: 2024-01-01T00:00:00Z
    resourceSelector:
      type: kind
      operator: equals
      value: kubernetes

resources:
  - id: cluster-1
    workspaceId: demo
    name: cluster-1
    kind: kubernetes
    identifier: cluster-1
    version: v1
    createdAt: 2024-01-01T00:00:00Z
    variables:
      replicas: 3

versions:
  - id: api-1.0.0
    deploymentId: api
    tag: 1.0.0
    name: api 1.0.0
    status: ready
    createdAt: 2024-01-01T00:00:00Z

policies:
  - id: business-hours
    name: Business hours
    createdAt: 2024-01-01T00:00:00Z
    selectors:
      - environment:
          type: name
          operator: equals
          value: production
    rules:
      - id: weekday-window
        type: deploymentWindow
        rrule: FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR;BYHOUR=9;BYMINUTE=0;BYSECOND=0
        durationMinutes: 480
        timezone: UTC
        allowWindow: true
"#;

/// Load the demo workspace into `store`.
pub fn seed(store: &Store) -> Result<(), serde_yaml::Error> {
    Snapshot::from_yaml(DEMO)?.apply(store);
    Ok(())
}
