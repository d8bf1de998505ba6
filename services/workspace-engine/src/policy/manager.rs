//! Version selection.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use ctrlplane_id::RuleId;
use ctrlplane_trace::{PlanningPhase, SpanHandle};

use super::collect::{collect_evaluators, policy_evaluators};
use super::decision::{DeployDecision, PolicyResult};
use super::evaluator::{Evaluator, EvaluatorScope, RuleEvaluation};
use super::getters::PolicyGetters;
use super::rules::{DeployableVersionsEvaluator, DEPLOYABLE_VERSIONS};
use crate::model::{DeploymentVersion, Policy, ReleaseTarget};
use crate::store::TargetEntities;

/// Outcome of [`PolicyManager::find_deployable_version`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployableVersion {
    /// Newest version every evaluator allows.
    pub version: Option<DeploymentVersion>,
    /// When no version passes: the earliest time a denial asked to be
    /// re-evaluated.
    pub next_evaluation_time: Option<DateTime<Utc>>,
}

/// Runs policies against candidate versions.
pub struct PolicyManager {
    getters: Arc<dyn PolicyGetters>,
}

impl PolicyManager {
    pub fn new(getters: Arc<dyn PolicyGetters>) -> Self {
        Self { getters }
    }

    fn skipped_rules(&self, scope: &EvaluatorScope<'_>) -> HashSet<RuleId> {
        self.getters
            .active_skips(
                scope.version.map(|v| &v.id),
                scope.environment.map(|e| &e.id),
                scope.resource.map(|r| &r.id),
                scope.at,
            )
            .into_iter()
            .map(|s| s.rule_id)
            .collect()
    }

    /// The newest version of `versions` that passes every evaluator.
    ///
    /// Each version stops at its first denial. Skipped rules and
    /// evaluators whose scope fields are unavailable are bypassed.
    #[instrument(skip_all, fields(release_target = %target, versions = versions.len()))]
    pub async fn find_deployable_version(
        &self,
        target: &ReleaseTarget,
        entities: &TargetEntities,
        versions: &[DeploymentVersion],
        planning: Option<&PlanningPhase>,
        at: DateTime<Utc>,
    ) -> DeployableVersion {
        let policies = self.getters.policies_for_release_target(target);
        if policies.is_empty() {
            debug!("No policies apply, checking deployability only");
        }
        let evaluators = collect_evaluators(&policies, &self.getters);

        let mut candidates: Vec<&DeploymentVersion> = versions.iter().collect();
        candidates.sort_by(|a, b| DeploymentVersion::newest_first(a, b));

        let mut next_evaluation_time: Option<DateTime<Utc>> = None;
        for version in candidates {
            let scope = EvaluatorScope::new(at)
                .with_release_target(target)
                .with_deployment(&entities.deployment)
                .with_environment(&entities.environment)
                .with_resource(&entities.resource)
                .with_version(version);
            let skipped = self.skipped_rules(&scope);

            match first_denial(&evaluators, &scope, &skipped, planning).await {
                None => {
                    if let Some(planning) = planning {
                        planning.decision(true, &format!("Selected version {}", version.tag));
                    }
                    return DeployableVersion {
                        version: Some(version.clone()),
                        next_evaluation_time: None,
                    };
                }
                Some(denial) => {
                    debug!(
                        version = %version.id,
                        rule_type = %denial.rule_type,
                        message = %denial.message,
                        "Version denied"
                    );
                    if let Some(t) = denial.next_evaluation_time {
                        next_evaluation_time = Some(next_evaluation_time.map_or(t, |cur| cur.min(t)));
                    }
                }
            }
        }

        if let Some(planning) = planning {
            planning.decision(false, "No deployable version");
        }
        DeployableVersion {
            version: None,
            next_evaluation_time,
        }
    }

    /// Evaluate every rule of every enabled policy without stopping at
    /// denials. Evaluators whose scope fields are missing from `scope` are
    /// left out, so previews work without a resource.
    pub async fn evaluate_decision(
        &self,
        policies: &[Policy],
        scope: &EvaluatorScope<'_>,
    ) -> DeployDecision {
        let skipped = self.skipped_rules(scope);
        let mut results = Vec::new();

        let synthetic: Arc<dyn Evaluator> = Arc::new(DeployableVersionsEvaluator);
        results.push(PolicyResult {
            policy_id: None,
            policy_name: DEPLOYABLE_VERSIONS.to_string(),
            evaluations: evaluate_all(&[synthetic], scope, &skipped).await,
        });

        for policy in policies.iter().filter(|p| p.enabled) {
            let evaluators = policy_evaluators(policy, &self.getters);
            results.push(PolicyResult {
                policy_id: Some(policy.id.clone()),
                policy_name: policy.name.clone(),
                evaluations: evaluate_all(&evaluators, scope, &skipped).await,
            });
        }

        DeployDecision {
            version_id: scope.version.map(|v| v.id.clone()),
            policy_results: results,
            evaluated_at: scope.at,
        }
    }

    /// [`evaluate_decision`](Self::evaluate_decision) for a full release
    /// target.
    pub async fn evaluate_release_target(
        &self,
        target: &ReleaseTarget,
        entities: &TargetEntities,
        version: &DeploymentVersion,
        at: DateTime<Utc>,
    ) -> DeployDecision {
        let policies = self.getters.policies_for_release_target(target);
        let scope = EvaluatorScope::new(at)
            .with_release_target(target)
            .with_deployment(&entities.deployment)
            .with_environment(&entities.environment)
            .with_resource(&entities.resource)
            .with_version(version);
        self.evaluate_decision(&policies, &scope).await
    }
}

async fn first_denial(
    evaluators: &[Arc<dyn Evaluator>],
    scope: &EvaluatorScope<'_>,
    skipped: &HashSet<RuleId>,
    planning: Option<&PlanningPhase>,
) -> Option<RuleEvaluation> {
    for evaluator in evaluators {
        if !scope.satisfies(evaluator.scope_fields()) {
            continue;
        }
        let span = planning.map(|p| {
            let span = p.evaluation(evaluator.rule_type(), evaluator.rule_id().map(|id| id.as_str()));
            if let Some(version) = scope.version {
                span.set_attribute("ctrlplane.version_id", version.id.as_str());
            }
            span
        });
        if evaluator.rule_id().is_some_and(|id| skipped.contains(id)) {
            if let Some(span) = span {
                span.skip("Bypassed by policy skip");
            }
            continue;
        }
        let result = evaluator.evaluate(scope).await;
        if let Some(span) = &span {
            if let Some(t) = result.next_evaluation_time {
                span.set_attribute("ctrlplane.next_evaluation_time", t.to_rfc3339());
            }
            span.finish(result.allowed, &result.message);
        }
        if !result.allowed {
            return Some(result);
        }
    }
    None
}

async fn evaluate_all(
    evaluators: &[Arc<dyn Evaluator>],
    scope: &EvaluatorScope<'_>,
    skipped: &HashSet<RuleId>,
) -> Vec<RuleEvaluation> {
    let mut evaluations = Vec::new();
    for evaluator in evaluators {
        if !scope.satisfies(evaluator.scope_fields()) {
            continue;
        }
        if evaluator.rule_id().is_some_and(|id| skipped.contains(id)) {
            continue;
        }
        evaluations.push(evaluator.evaluate(scope).await);
    }
    evaluations
}
