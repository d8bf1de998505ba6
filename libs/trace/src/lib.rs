//! Reconciliation traces.
//!
//! Every reconciliation of a release target produces a tree of spans:
//!
//! ```text
//! ReconcileTarget (root, labelled with a TriggerReason)
//!   ├─ PlanningPhase    └─ Evaluation* → Decision
//!   ├─ EligibilityPhase └─ Check* → Decision
//!   └─ ExecutionPhase   ├─ Action* (with Steps)
//!                       └─ Job
//! ```
//!
//! The shape is enforced by the handle types in [`recorder`]: a phase can
//! only be opened from the root, an evaluation only from the planning
//! phase, and so on. Depth and sequence are assigned by the [`Recorder`]
//! in a single critical section, so opening spans never nests locks.
//!
//! When the reconciliation finishes the recorder is flushed to a
//! [`PersistenceStore`]. The store rejects any batch containing a span
//! without a workspace id.
//!
//! Job spans expose a signed [`token`](recorder::Job::token) which an
//! external agent presents to [`Recorder::attach_external`] to add its
//! own spans under the job.

pub mod error;
pub mod recorder;
pub mod span;
pub mod store;
pub mod token;
pub mod trigger;

pub use error::{TokenError, TraceError};
pub use recorder::{
    Action, Check, Decision, EligibilityPhase, Evaluation, ExecutionPhase, ExternalSpan, Job,
    PlanningPhase, ReconcileTarget, Recorder, RecorderBuilder, SpanHandle, Step,
};
pub use span::{attr, NodeType, Phase, Span, SpanEvent, SpanStatus};
pub use store::{validate_batch, InMemoryStore, PersistenceStore};
pub use token::{TokenSigner, TraceToken, DEFAULT_TOKEN_TTL};
pub use trigger::TriggerReason;
