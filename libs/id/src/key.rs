//! Release target identity.
//!
//! A release target is the unit of reconciliation. Its identity is the
//! `(deployment, environment, resource)` triple; two records with the same
//! triple denote the same target across restarts.

use serde::{Deserialize, Serialize};

use crate::{DeploymentId, EnvironmentId, IdError, ResourceId};

/// Separator used by the canonical string form of a key.
const KEY_SEPARATOR: char = '|';

/// The identity triple of a release target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTargetKey {
    pub deployment_id: DeploymentId,
    pub environment_id: EnvironmentId,
    pub resource_id: ResourceId,
}

impl ReleaseTargetKey {
    /// Creates a key from its components.
    pub fn new(
        deployment_id: impl Into<DeploymentId>,
        environment_id: impl Into<EnvironmentId>,
        resource_id: impl Into<ResourceId>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            environment_id: environment_id.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Parses the canonical `deployment|environment|resource` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let parts: Vec<&str> = s.split(KEY_SEPARATOR).collect();
        let [deployment, environment, resource] = parts.as_slice() else {
            return Err(IdError::InvalidKey {
                message: format!("expected 3 components, got {}", parts.len()),
            });
        };
        Ok(Self {
            deployment_id: DeploymentId::parse(deployment)?,
            environment_id: EnvironmentId::parse(environment)?,
            resource_id: ResourceId::parse(resource)?,
        })
    }
}

impl std::fmt::Display for ReleaseTargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.deployment_id, self.environment_id, self.resource_id
        )
    }
}

impl std::str::FromStr for ReleaseTargetKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_display() {
        let key = ReleaseTargetKey::new("api", "prod", "cluster-1");
        assert_eq!(key.to_string(), "api|prod|cluster-1");
    }

    #[test]
    fn test_key_wrong_arity() {
        let err = ReleaseTargetKey::parse("api|prod").unwrap_err();
        assert!(matches!(err, IdError::InvalidKey { .. }));
    }

    proptest! {
        #[test]
        fn test_key_parse_display_identity(
            d in "[a-z0-9-]{1,12}",
            e in "[a-z0-9-]{1,12}",
            r in "[a-z0-9-]{1,12}",
        ) {
            let key = ReleaseTargetKey::new(d.as_str(), e.as_str(), r.as_str());
            let parsed = ReleaseTargetKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(key, parsed);
        }
    }
}
