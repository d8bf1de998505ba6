use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ctrlplane_id::{PolicyId, VersionId};

use super::evaluator::{ActionType, RuleEvaluation};

/// Evaluations of one policy's rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    /// `None` for the synthetic deployable-versions check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    pub policy_name: String,
    pub evaluations: Vec<RuleEvaluation>,
}

impl PolicyResult {
    pub fn allowed(&self) -> bool {
        self.evaluations.iter().all(|e| e.allowed)
    }
}

/// Aggregate verdict for deploying one version to one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<VersionId>,
    pub policy_results: Vec<PolicyResult>,
    pub evaluated_at: DateTime<Utc>,
}

impl DeployDecision {
    fn evaluations(&self) -> impl Iterator<Item = &RuleEvaluation> {
        self.policy_results.iter().flat_map(|p| &p.evaluations)
    }

    fn pending_actions(&self) -> impl Iterator<Item = &RuleEvaluation> {
        self.evaluations().filter(|e| e.is_pending())
    }

    /// No pending actions and no denials.
    pub fn can_deploy(&self) -> bool {
        !self.is_blocked() && self.pending_actions().next().is_none()
    }

    /// At least one explicit denial.
    pub fn is_blocked(&self) -> bool {
        self.evaluations().any(RuleEvaluation::is_denied)
    }

    /// Waiting on actions, with nothing denying outright.
    pub fn is_pending(&self) -> bool {
        !self.is_blocked() && self.pending_actions().next().is_some()
    }

    pub fn needs_approval(&self) -> bool {
        self.pending_actions()
            .any(|e| e.action_type == Some(ActionType::Approval))
    }

    pub fn needs_wait(&self) -> bool {
        self.pending_actions()
            .any(|e| e.action_type == Some(ActionType::Wait))
    }

    pub fn approval_actions(&self) -> Vec<&RuleEvaluation> {
        self.pending_actions()
            .filter(|e| e.action_type == Some(ActionType::Approval))
            .collect()
    }

    pub fn wait_actions(&self) -> Vec<&RuleEvaluation> {
        self.pending_actions()
            .filter(|e| e.action_type == Some(ActionType::Wait))
            .collect()
    }

    /// Earliest time any pending wait asks to be re-evaluated.
    pub fn next_evaluation_time(&self) -> Option<DateTime<Utc>> {
        self.evaluations()
            .filter_map(|e| e.next_evaluation_time)
            .min()
    }
}
