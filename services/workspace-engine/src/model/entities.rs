use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_id::{DeploymentId, EnvironmentId, JobAgentId, ResourceId, SystemId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::verification::MetricSpec;
use super::JsonMap;
use crate::selector::Selector;

/// A deployable unit within a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: DeploymentId,
    pub name: String,
    pub slug: String,
    pub system_id: SystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_agent_id: Option<JobAgentId>,
    #[serde(default)]
    pub job_agent_config: JsonMap,
    /// Resources this deployment targets. `None` targets every resource
    /// its environments select.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<Selector>,
    /// Release channel: versions must match to be deployable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_selector: Option<Selector>,
    /// Metrics started after each dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification: Vec<MetricSpec>,
}

/// A stage such as staging or production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: EnvironmentId,
    pub name: String,
    pub system_id: SystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resources in this environment. `None` selects nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<Selector>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// A deployment destination: a cluster, a VM, a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub kind: String,
    pub identifier: String,
    pub version: String,
    #[serde(default)]
    pub config: JsonMap,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A deployment-level variable with its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentVariable {
    pub deployment_id: DeploymentId,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// An executor registration. `agent_type` selects the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAgent {
    pub id: JobAgentId,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub config: JsonMap,
}
