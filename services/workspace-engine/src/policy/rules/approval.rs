//! Approval rules.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ctrlplane_id::{RuleId, UserId};

use crate::model::{ApprovalStatus, UserApprovalRecord};
use crate::policy::evaluator::{ActionType, Evaluator, EvaluatorScope, RuleEvaluation, ScopeFields};
use crate::policy::getters::PolicyGetters;

const APPROVAL_SCOPE: ScopeFields = ScopeFields::VERSION.union(ScopeFields::ENVIRONMENT);

/// Approved records for the scope's version and environment, oldest first.
fn approved(getters: &dyn PolicyGetters, scope: &EvaluatorScope<'_>) -> Vec<UserApprovalRecord> {
    let (Some(version), Some(environment)) = (scope.version, scope.environment) else {
        return Vec::new();
    };
    getters
        .approvals_for(&version.id, &environment.id)
        .into_iter()
        .filter(|r| r.status == ApprovalStatus::Approved)
        .collect()
}

/// Requires `min_approvals` approvals from anyone.
pub struct AnyApprovalEvaluator {
    rule_id: RuleId,
    min_approvals: u32,
    getters: Arc<dyn PolicyGetters>,
}

impl AnyApprovalEvaluator {
    pub fn new(rule_id: RuleId, min_approvals: u32, getters: Arc<dyn PolicyGetters>) -> Self {
        Self {
            rule_id,
            min_approvals,
            getters,
        }
    }
}

#[async_trait]
impl Evaluator for AnyApprovalEvaluator {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let approvals = approved(self.getters.as_ref(), scope);
        let need = self.min_approvals as usize;
        let have = approvals.len();

        let result = if have >= need {
            let mut result = RuleEvaluation::allow(format!(
                "All approvals met ({have}/{need})"
            ));
            // Satisfied when the need-th approval arrived.
            if let Some(nth) = need.checked_sub(1).and_then(|i| approvals.get(i)) {
                result = result.with_satisfied_at(nth.created_at);
            }
            result
        } else {
            RuleEvaluation::pending(
                ActionType::Approval,
                format!("Requires {need} approvals, has {have}"),
            )
        };
        result
            .for_rule(self.rule_type(), Some(&self.rule_id))
            .with_detail("min_approvals", need)
            .with_detail("approvals", have)
            .with_detail(
                "approvers",
                json!(approvals.iter().map(|r| r.user_id.as_str()).collect::<Vec<_>>()),
            )
    }

    fn scope_fields(&self) -> ScopeFields {
        APPROVAL_SCOPE
    }

    fn rule_type(&self) -> &str {
        "anyApproval"
    }

    fn rule_id(&self) -> Option<&RuleId> {
        Some(&self.rule_id)
    }

    fn complexity(&self) -> u32 {
        10
    }
}

/// Requires an approval from every listed user.
pub struct UserApprovalEvaluator {
    rule_id: RuleId,
    user_ids: Vec<UserId>,
    getters: Arc<dyn PolicyGetters>,
}

impl UserApprovalEvaluator {
    pub fn new(rule_id: RuleId, user_ids: Vec<UserId>, getters: Arc<dyn PolicyGetters>) -> Self {
        Self {
            rule_id,
            user_ids,
            getters,
        }
    }
}

#[async_trait]
impl Evaluator for UserApprovalEvaluator {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let approvals = approved(self.getters.as_ref(), scope);
        let approvers: HashSet<&UserId> = approvals.iter().map(|r| &r.user_id).collect();
        let missing: Vec<&str> = self
            .user_ids
            .iter()
            .filter(|u| !approvers.contains(u))
            .map(|u| u.as_str())
            .collect();

        let result = if missing.is_empty() {
            let last = approvals
                .iter()
                .filter(|r| self.user_ids.contains(&r.user_id))
                .map(|r| r.created_at)
                .max();
            let result = RuleEvaluation::allow("All required users approved");
            match last {
                Some(at) => result.with_satisfied_at(at),
                None => result,
            }
        } else {
            RuleEvaluation::pending(
                ActionType::Approval,
                format!("Waiting for approval from {}", missing.join(", ")),
            )
        };
        result
            .for_rule(self.rule_type(), Some(&self.rule_id))
            .with_detail("missing_users", json!(missing))
    }

    fn scope_fields(&self) -> ScopeFields {
        APPROVAL_SCOPE
    }

    fn rule_type(&self) -> &str {
        "userApproval"
    }

    fn rule_id(&self) -> Option<&RuleId> {
        Some(&self.rule_id)
    }

    fn complexity(&self) -> u32 {
        10
    }
}

/// Requires `min_approvals` approvals from holders of `role`.
pub struct RoleApprovalEvaluator {
    rule_id: RuleId,
    role: String,
    min_approvals: u32,
    getters: Arc<dyn PolicyGetters>,
}

impl RoleApprovalEvaluator {
    pub fn new(
        rule_id: RuleId,
        role: String,
        min_approvals: u32,
        getters: Arc<dyn PolicyGetters>,
    ) -> Self {
        Self {
            rule_id,
            role,
            min_approvals,
            getters,
        }
    }
}

#[async_trait]
impl Evaluator for RoleApprovalEvaluator {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let holders = self.getters.users_with_role(&self.role);
        let approvals: Vec<_> = approved(self.getters.as_ref(), scope)
            .into_iter()
            .filter(|r| holders.contains(&r.user_id))
            .collect();
        let need = self.min_approvals as usize;
        let have = approvals.len();

        let result = if have >= need {
            RuleEvaluation::allow(format!("Role {} approvals met ({have}/{need})", self.role))
        } else {
            RuleEvaluation::pending(
                ActionType::Approval,
                format!(
                    "Requires {need} approvals from role {}, has {have}",
                    self.role
                ),
            )
        };
        result
            .for_rule(self.rule_type(), Some(&self.rule_id))
            .with_detail("role", self.role.as_str())
            .with_detail("min_approvals", need)
            .with_detail("approvals", have)
    }

    fn scope_fields(&self) -> ScopeFields {
        APPROVAL_SCOPE
    }

    fn rule_type(&self) -> &str {
        "roleApproval"
    }

    fn rule_id(&self) -> Option<&RuleId> {
        Some(&self.rule_id)
    }

    fn complexity(&self) -> u32 {
        20
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ctrlplane_id::{EnvironmentId, VersionId};
    use rstest::rstest;

    use crate::model::RoleBinding;
    use crate::test_fixtures::{environment, epoch, version, StaticGetters};

    fn record(user: &str, status: ApprovalStatus, minute: i64) -> UserApprovalRecord {
        UserApprovalRecord {
            version_id: VersionId::from("v1"),
            environment_id: EnvironmentId::from("prod"),
            user_id: UserId::from(user),
            status,
            reason: None,
            created_at: epoch() + Duration::minutes(minute),
        }
    }

    fn getters(approvals: Vec<UserApprovalRecord>, roles: &[(&str, &str)]) -> Arc<dyn PolicyGetters> {
        Arc::new(StaticGetters {
            approvals,
            roles: roles
                .iter()
                .map(|(user, role)| RoleBinding {
                    user_id: UserId::from(*user),
                    role: role.to_string(),
                })
                .collect(),
            ..Default::default()
        })
    }

    async fn evaluate(evaluator: &dyn Evaluator) -> RuleEvaluation {
        let version = version("v1", 1);
        let environment = environment("prod");
        evaluator
            .evaluate(
                &EvaluatorScope::new(epoch())
                    .with_version(&version)
                    .with_environment(&environment),
            )
            .await
    }

    fn users(ids: &[&str]) -> Vec<UserId> {
        ids.iter().map(|id| UserId::from(*id)).collect()
    }

    #[tokio::test]
    async fn test_any_approval_satisfied_at_nth_approval() {
        let evaluator = AnyApprovalEvaluator::new(
            RuleId::from("any"),
            2,
            getters(
                vec![
                    record("alice", ApprovalStatus::Approved, 1),
                    record("bob", ApprovalStatus::Rejected, 2),
                    record("carol", ApprovalStatus::Approved, 3),
                    record("dave", ApprovalStatus::Approved, 4),
                ],
                &[],
            ),
        );
        let result = evaluate(&evaluator).await;
        assert!(result.allowed);
        assert_eq!(result.satisfied_at, Some(epoch() + Duration::minutes(3)));
        assert_eq!(result.details["approvals"], 3);
    }

    #[tokio::test]
    async fn test_user_approval_waits_for_every_listed_user() {
        let records = vec![
            record("alice", ApprovalStatus::Approved, 1),
            record("bob", ApprovalStatus::Pending, 2),
        ];
        let evaluator = UserApprovalEvaluator::new(
            RuleId::from("users"),
            users(&["alice", "bob"]),
            getters(records, &[]),
        );
        let result = evaluate(&evaluator).await;
        assert!(!result.allowed);
        assert_eq!(result.action_type, Some(ActionType::Approval));
        assert_eq!(result.details["missing_users"], json!(["bob"]));
        assert_eq!(result.message, "Waiting for approval from bob");
    }

    #[tokio::test]
    async fn test_user_approval_satisfied_at_last_listed_approval() {
        let records = vec![
            record("bob", ApprovalStatus::Approved, 5),
            record("alice", ApprovalStatus::Approved, 2),
            // Not listed; does not move the satisfaction time.
            record("mallory", ApprovalStatus::Approved, 9),
        ];
        let evaluator = UserApprovalEvaluator::new(
            RuleId::from("users"),
            users(&["alice", "bob"]),
            getters(records, &[]),
        );
        let result = evaluate(&evaluator).await;
        assert!(result.allowed);
        assert_eq!(result.rule_type, "userApproval");
        assert_eq!(result.satisfied_at, Some(epoch() + Duration::minutes(5)));
        assert_eq!(result.details["missing_users"], json!([]));
    }

    #[rstest]
    #[case::role_holders_meet_minimum(&[("alice", "sre"), ("bob", "sre")], 2, true)]
    #[case::non_holders_do_not_count(&[("alice", "sre"), ("bob", "dev")], 2, false)]
    #[case::no_holders(&[], 1, false)]
    #[tokio::test]
    async fn test_role_approval(
        #[case] roles: &[(&str, &str)],
        #[case] min_approvals: u32,
        #[case] allowed: bool,
    ) {
        let records = vec![
            record("alice", ApprovalStatus::Approved, 1),
            record("bob", ApprovalStatus::Approved, 2),
        ];
        let evaluator = RoleApprovalEvaluator::new(
            RuleId::from("role"),
            "sre".to_string(),
            min_approvals,
            getters(records, roles),
        );
        let result = evaluate(&evaluator).await;
        assert_eq!(result.allowed, allowed, "{}", result.message);
        assert_eq!(result.details["role"], "sre");
        if !allowed {
            assert_eq!(result.action_type, Some(ActionType::Approval));
        }
    }

    #[tokio::test]
    async fn test_approvals_need_version_and_environment() {
        let evaluator = AnyApprovalEvaluator::new(
            RuleId::from("any"),
            1,
            getters(vec![record("alice", ApprovalStatus::Approved, 1)], &[]),
        );
        let result = evaluator.evaluate(&EvaluatorScope::new(epoch())).await;
        assert!(!result.allowed);
    }
}
