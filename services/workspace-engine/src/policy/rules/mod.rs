//! Rule evaluators, one per [`RuleKind`].

mod approval;
mod deployable;
mod version_selector;
mod window;

use std::sync::Arc;

use ctrlplane_rrule::WindowKind;

pub use approval::{AnyApprovalEvaluator, RoleApprovalEvaluator, UserApprovalEvaluator};
pub use deployable::{DeployableVersionsEvaluator, DEPLOYABLE_VERSIONS};
pub use version_selector::VersionSelectorEvaluator;
pub use window::DeploymentWindowEvaluator;

use super::error::PolicyError;
use super::evaluator::Evaluator;
use super::getters::PolicyGetters;
use crate::model::{PolicyRule, RuleKind};

/// Build the evaluator for one rule.
pub fn build_evaluator(
    rule: &PolicyRule,
    getters: &Arc<dyn PolicyGetters>,
) -> Result<Arc<dyn Evaluator>, PolicyError> {
    let id = rule.id.clone();
    let evaluator: Arc<dyn Evaluator> = match &rule.kind {
        RuleKind::AnyApproval { min_approvals } => Arc::new(AnyApprovalEvaluator::new(
            id,
            *min_approvals,
            Arc::clone(getters),
        )),
        RuleKind::UserApproval { user_ids } => Arc::new(UserApprovalEvaluator::new(
            id,
            user_ids.clone(),
            Arc::clone(getters),
        )),
        RuleKind::RoleApproval {
            role,
            min_approvals,
        } => Arc::new(RoleApprovalEvaluator::new(
            id,
            role.clone(),
            *min_approvals,
            Arc::clone(getters),
        )),
        RuleKind::VersionSelector { selector } => {
            Arc::new(VersionSelectorEvaluator::new(id, selector.clone()))
        }
        RuleKind::DeploymentWindow(window) => Arc::new(
            DeploymentWindowEvaluator::new(
                id,
                "deploymentWindow",
                window.clone(),
                WindowKind::from_allow_flag(window.allow_window),
                Arc::clone(getters),
            )
            .map_err(|source| PolicyError::InvalidRule {
                rule_id: rule.id.clone(),
                source,
            })?,
        ),
        RuleKind::DenyWindow(window) => Arc::new(
            DeploymentWindowEvaluator::new(
                id,
                "denyWindow",
                window.clone(),
                WindowKind::Deny,
                Arc::clone(getters),
            )
            .map_err(|source| PolicyError::InvalidRule {
                rule_id: rule.id.clone(),
                source,
            })?,
        ),
    };
    Ok(evaluator)
}
