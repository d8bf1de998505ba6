use async_trait::async_trait;

use ctrlplane_id::RuleId;

use crate::model::VersionStatus;
use crate::policy::evaluator::{Evaluator, EvaluatorScope, RuleEvaluation, ScopeFields};

/// Synthetic evaluator prepended to every evaluator list: the version must
/// be `ready` and pass the deployment's release channel.
#[derive(Debug, Default)]
pub struct DeployableVersionsEvaluator;

pub const DEPLOYABLE_VERSIONS: &str = "deployableVersions";

#[async_trait]
impl Evaluator for DeployableVersionsEvaluator {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let (Some(version), Some(deployment)) = (scope.version, scope.deployment) else {
            return RuleEvaluation::deny("No version in scope").for_rule(DEPLOYABLE_VERSIONS, None);
        };
        let result = if version.status != VersionStatus::Ready {
            RuleEvaluation::deny(format!(
                "Version {} is {}",
                version.tag,
                version.status.as_str()
            ))
        } else if deployment
            .version_selector
            .as_ref()
            .is_some_and(|channel| !channel.matches(version))
        {
            RuleEvaluation::deny(format!(
                "Version {} is not in the release channel of {}",
                version.tag, deployment.name
            ))
        } else {
            RuleEvaluation::allow(format!("Version {} is deployable", version.tag))
        };
        result
            .for_rule(DEPLOYABLE_VERSIONS, None)
            .with_detail("version_status", version.status.as_str())
    }

    fn scope_fields(&self) -> ScopeFields {
        ScopeFields::VERSION | ScopeFields::DEPLOYMENT
    }

    fn rule_type(&self) -> &str {
        DEPLOYABLE_VERSIONS
    }

    fn rule_id(&self) -> Option<&RuleId> {
        None
    }

    fn complexity(&self) -> u32 {
        0
    }
}
