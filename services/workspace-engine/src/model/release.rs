use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_id::{ReleaseId, ReleaseTargetKey};
use ctrlplane_reconcile::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::DeploymentVersion;

/// The unit of reconciliation. Identity is the triple.
pub type ReleaseTarget = ReleaseTargetKey;

/// A decision to deploy a version to a target with resolved variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub release_target: ReleaseTarget,
    pub version: DeploymentVersion,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Release {
    pub fn new(
        release_target: ReleaseTarget,
        version: DeploymentVersion,
        variables: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            release_target,
            version,
            variables,
            created_at: Utc::now(),
        }
    }

    /// Content fingerprint of `(target, version, variables)`.
    pub fn id(&self) -> ReleaseId {
        let content = json!({
            "releaseTarget": self.release_target.to_string(),
            "versionId": self.version.id.as_str(),
            "variables": self.variables,
        });
        ReleaseId::from(Fingerprint::of_json(&content).into_string())
    }
}
