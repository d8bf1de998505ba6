use async_trait::async_trait;

use ctrlplane_id::RuleId;

use crate::policy::evaluator::{Evaluator, EvaluatorScope, RuleEvaluation, ScopeFields};
use crate::selector::Selector;

/// Denies versions that fail the selector.
pub struct VersionSelectorEvaluator {
    rule_id: RuleId,
    selector: Selector,
}

impl VersionSelectorEvaluator {
    pub fn new(rule_id: RuleId, selector: Selector) -> Self {
        Self { rule_id, selector }
    }
}

#[async_trait]
impl Evaluator for VersionSelectorEvaluator {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let Some(version) = scope.version else {
            return RuleEvaluation::deny("No version in scope")
                .for_rule(self.rule_type(), Some(&self.rule_id));
        };
        let result = if self.selector.matches(version) {
            RuleEvaluation::allow(format!("Version {} matches selector", version.tag))
        } else {
            RuleEvaluation::deny(format!("Version {} does not match selector", version.tag))
        };
        result
            .for_rule(self.rule_type(), Some(&self.rule_id))
            .with_detail("version_tag", version.tag.as_str())
    }

    fn scope_fields(&self) -> ScopeFields {
        ScopeFields::VERSION
    }

    fn rule_type(&self) -> &str {
        "versionSelector"
    }

    fn rule_id(&self) -> Option<&RuleId> {
        Some(&self.rule_id)
    }

    fn complexity(&self) -> u32 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::selector::{Comparison, Operator};
    use crate::test_fixtures::{epoch, version};

    fn stable_only() -> VersionSelectorEvaluator {
        VersionSelectorEvaluator::new(
            RuleId::from("stable"),
            Selector::Not {
                condition: Box::new(Selector::Tag(Comparison {
                    operator: Operator::Contains,
                    value: "-rc".to_string(),
                })),
            },
        )
    }

    #[rstest]
    #[case("1.4.0", true)]
    #[case("1.5.0-rc.1", false)]
    #[tokio::test]
    async fn test_version_selector(#[case] tag: &str, #[case] allowed: bool) {
        let mut candidate = version("v1", 1);
        candidate.tag = tag.to_string();
        let result = stable_only()
            .evaluate(&EvaluatorScope::new(epoch()).with_version(&candidate))
            .await;
        assert_eq!(result.allowed, allowed, "{}", result.message);
        assert_eq!(result.rule_type, "versionSelector");
        assert_eq!(result.details["version_tag"], tag);
        // A mismatch is final, not something to wait on.
        assert!(!result.action_required);
    }

    #[tokio::test]
    async fn test_version_selector_without_version_denies() {
        let result = stable_only().evaluate(&EvaluatorScope::new(epoch())).await;
        assert!(!result.allowed);
        assert_eq!(result.rule_id, Some(RuleId::from("stable")));
    }
}
