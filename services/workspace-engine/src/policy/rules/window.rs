//! Deployment and deny windows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ctrlplane_id::RuleId;
use ctrlplane_rrule::{RRuleError, WindowKind, WindowSchedule};

use crate::model::DeploymentWindowRule;
use crate::policy::evaluator::{
    format_duration, ActionType, Evaluator, EvaluatorScope, RuleEvaluation, ScopeFields,
};
use crate::policy::getters::PolicyGetters;

/// Gates deployments on recurring windows.
///
/// | kind  | inside | verdict                                  |
/// |-------|--------|------------------------------------------|
/// | allow | yes    | allow, re-check at window end            |
/// | allow | no     | wait until the next window opens         |
/// | deny  | yes    | wait until the window ends               |
/// | deny  | no     | allow, re-check when the next one opens  |
///
/// A target that has never produced a release is always allowed.
pub struct DeploymentWindowEvaluator {
    rule_id: RuleId,
    rule_type: &'static str,
    rule: DeploymentWindowRule,
    schedule: WindowSchedule,
    getters: Arc<dyn PolicyGetters>,
}

impl DeploymentWindowEvaluator {
    /// Fails when the rule does not parse.
    pub fn new(
        rule_id: RuleId,
        rule_type: &'static str,
        rule: DeploymentWindowRule,
        kind: WindowKind,
        getters: Arc<dyn PolicyGetters>,
    ) -> Result<Self, RRuleError> {
        let schedule = WindowSchedule::new(
            &rule.rrule,
            rule.duration_minutes,
            rule.timezone.as_deref(),
            kind,
        )?;
        Ok(Self {
            rule_id,
            rule_type,
            rule,
            schedule,
            getters,
        })
    }

    fn timezone(&self) -> String {
        self.schedule.recurrence().timezone().name().to_string()
    }

    fn next_open(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.next_window(at).map(|w| w.start)
    }
}

#[async_trait]
impl Evaluator for DeploymentWindowEvaluator {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let at = scope.at;
        let kind = self.schedule.kind();
        let decorate = |r: RuleEvaluation| {
            r.for_rule(self.rule_type, Some(&self.rule_id))
                .with_detail("rrule", self.rule.rrule.as_str())
                .with_detail("timezone", self.timezone())
                .with_detail("window_type", kind.as_str())
                .with_detail("duration_minutes", self.rule.duration_minutes)
        };

        if let Some(target) = scope.release_target {
            if !self.getters.has_release(target) {
                return decorate(RuleEvaluation::allow(
                    "First deployment to this target; windows apply to later deployments",
                ));
            }
        }

        let current = self.schedule.current_window(at);
        let result = match (kind, current) {
            (WindowKind::Allow, Some(window)) => {
                RuleEvaluation::allow("Inside deployment window")
                    .with_next_evaluation_time(Some(window.end))
                    .with_detail("window_end", window.end.to_rfc3339())
            }
            (WindowKind::Allow, None) => {
                let next = self.next_open(at);
                let mut r = RuleEvaluation::pending(ActionType::Wait, "Outside deployment window")
                    .with_next_evaluation_time(next);
                if let Some(next) = next {
                    r = r
                        .with_detail("next_window_start", next.to_rfc3339())
                        .with_detail("time_until_window", format_duration(next - at));
                }
                r
            }
            (WindowKind::Deny, Some(window)) => {
                RuleEvaluation::pending(ActionType::Wait, "Inside deny window")
                    .with_next_evaluation_time(Some(window.end))
                    .with_detail("window_end", window.end.to_rfc3339())
                    .with_detail("time_until_clear", format_duration(window.end - at))
            }
            (WindowKind::Deny, None) => {
                RuleEvaluation::allow("Outside deny window").with_next_evaluation_time(self.next_open(at))
            }
        };
        decorate(result)
    }

    fn scope_fields(&self) -> ScopeFields {
        ScopeFields::RELEASE_TARGET
    }

    fn rule_type(&self) -> &str {
        self.rule_type
    }

    fn rule_id(&self) -> Option<&RuleId> {
        Some(&self.rule_id)
    }

    fn complexity(&self) -> u32 {
        30
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::StaticGetters;
    use crate::model::ReleaseTarget;

    fn evaluator(allow: bool, has_release: bool) -> DeploymentWindowEvaluator {
        let rule = DeploymentWindowRule {
            rrule: "FREQ=MINUTELY;INTERVAL=1".to_string(),
            duration_minutes: 60,
            timezone: None,
            allow_window: Some(allow),
        };
        let getters = Arc::new(StaticGetters {
            has_release,
            ..Default::default()
        });
        DeploymentWindowEvaluator::new(
            RuleId::from("window"),
            "deploymentWindow",
            rule.clone(),
            WindowKind::from_allow_flag(rule.allow_window),
            getters,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_inside_allow_window() {
        let target = ReleaseTarget::new("d", "e", "r");
        let at = Utc::now();
        let result = evaluator(true, true)
            .evaluate(&EvaluatorScope::new(at).with_release_target(&target))
            .await;
        assert!(result.allowed);
        assert_eq!(result.details["window_type"], "allow");
        let end = result.next_evaluation_time.unwrap();
        assert!(end > at && end <= at + chrono::Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_inside_deny_window_waits() {
        let target = ReleaseTarget::new("d", "e", "r");
        let at = Utc::now();
        let result = evaluator(false, true)
            .evaluate(&EvaluatorScope::new(at).with_release_target(&target))
            .await;
        assert!(!result.allowed);
        assert_eq!(result.action_type, Some(ActionType::Wait));
        assert_eq!(result.details["window_type"], "deny");
        assert!(result.details.contains_key("time_until_clear"));
        assert!(result.next_evaluation_time.unwrap() > at);
    }

    #[tokio::test]
    async fn test_first_deployment_ignores_window() {
        let target = ReleaseTarget::new("d", "e", "r");
        let result = evaluator(false, false)
            .evaluate(&EvaluatorScope::new(Utc::now()).with_release_target(&target))
            .await;
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn test_last_weekday_deny_window() {
        let rule = DeploymentWindowRule {
            rrule: "FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=-1;BYHOUR=12;BYMINUTE=0;BYSECOND=0"
                .to_string(),
            duration_minutes: 12 * 60,
            timezone: None,
            allow_window: Some(false),
        };
        let evaluator = DeploymentWindowEvaluator::new(
            RuleId::from("month-end-freeze"),
            "denyWindow",
            rule,
            WindowKind::Deny,
            Arc::new(StaticGetters {
                has_release: true,
                ..Default::default()
            }),
        )
        .unwrap();
        let target = ReleaseTarget::new("d", "e", "r");
        let at = |d, h| chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 5, d, h, 0, 0).unwrap();

        // Friday 2025-05-30 is the last weekday of May.
        let frozen = evaluator
            .evaluate(&EvaluatorScope::new(at(30, 15)).with_release_target(&target))
            .await;
        assert!(!frozen.allowed);
        assert_eq!(frozen.next_evaluation_time, Some(at(31, 0)));

        let open = evaluator
            .evaluate(&EvaluatorScope::new(at(29, 15)).with_release_target(&target))
            .await;
        assert!(open.allowed);
        assert_eq!(open.next_evaluation_time, Some(at(30, 12)));
    }

    #[test]
    fn test_invalid_rrule_fails_construction() {
        let rule = DeploymentWindowRule {
            rrule: "FREQ=FORTNIGHTLY".to_string(),
            duration_minutes: 60,
            timezone: None,
            allow_window: None,
        };
        let result = DeploymentWindowEvaluator::new(
            RuleId::from("w"),
            "deploymentWindow",
            rule,
            WindowKind::Allow,
            Arc::new(StaticGetters::default()),
        );
        assert!(result.is_err());
    }
}
