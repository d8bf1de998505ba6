use std::sync::Arc;

use tracing::warn;

use super::evaluator::Evaluator;
use super::getters::PolicyGetters;
use super::memo::Memoized;
use super::rules::{build_evaluator, DeployableVersionsEvaluator};
use crate::model::Policy;

/// Memoized evaluators for the rules of one policy. Rules that fail to
/// build are logged and dropped.
pub fn policy_evaluators(
    policy: &Policy,
    getters: &Arc<dyn PolicyGetters>,
) -> Vec<Arc<dyn Evaluator>> {
    policy
        .rules
        .iter()
        .filter_map(|rule| match build_evaluator(rule, getters) {
            Ok(evaluator) => Some(Arc::new(Memoized::new(evaluator)) as Arc<dyn Evaluator>),
            Err(e) => {
                warn!(
                    policy_id = %policy.id,
                    rule_id = %rule.id,
                    error = %e,
                    "Skipping misconfigured policy rule"
                );
                None
            }
        })
        .collect()
}

/// The synthetic deployable-versions evaluator, then every rule of every
/// enabled policy, ordered by complexity. Equal complexities keep their
/// input order.
pub fn collect_evaluators(
    policies: &[Policy],
    getters: &Arc<dyn PolicyGetters>,
) -> Vec<Arc<dyn Evaluator>> {
    let mut evaluators: Vec<Arc<dyn Evaluator>> = vec![Arc::new(Memoized::new(Arc::new(
        DeployableVersionsEvaluator,
    )))];
    for policy in policies.iter().filter(|p| p.enabled) {
        evaluators.extend(policy_evaluators(policy, getters));
    }
    evaluators.sort_by_key(|e| e.complexity());
    evaluators
}
