//! Policy framework.
//!
//! A policy applies to a release target when one of its target selectors
//! matches. Each rule becomes an [`Evaluator`]; the [`PolicyManager`] walks
//! them cheapest first against candidate versions, newest first, and stops
//! a version at its first denial.
//!
//! Evaluations are not plain booleans. A denial with an [`ActionType`] is a
//! pending action (an approval to collect, a window to wait for) and
//! carries the time it should be re-evaluated.

mod collect;
mod decision;
mod error;
mod evaluator;
mod getters;
mod manager;
mod memo;
pub mod rules;

pub use collect::{collect_evaluators, policy_evaluators};
pub use decision::{DeployDecision, PolicyResult};
pub use error::{PolicyError, Result};
pub use evaluator::{ActionType, Evaluator, EvaluatorScope, RuleEvaluation, ScopeFields};
pub use getters::PolicyGetters;
pub use manager::{DeployableVersion, PolicyManager};
pub use memo::Memoized;
