use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_id::{DeploymentId, VersionId};
use serde::{Deserialize, Serialize};

use super::JsonMap;

/// Build state of a version. Only `Ready` versions are deployable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    #[default]
    Ready,
    Building,
    Failed,
    Rejected,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Building => "building",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

/// A candidate artifact for a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentVersion {
    pub id: VersionId,
    pub deployment_id: DeploymentId,
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: JsonMap,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
}

impl DeploymentVersion {
    /// Newest-first ordering: `created_at` descending, then `id` descending.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}
