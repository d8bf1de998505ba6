//! In-memory trace recorder with typed span handles.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctrlplane_id::{JobId, ReleaseTargetKey, SpanId, TraceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::TraceError;
use crate::span::{attr, NodeType, Phase, Span, SpanEvent, SpanStatus};
use crate::store::PersistenceStore;
use crate::token::TokenSigner;
use crate::trigger::TriggerReason;

// =============================================================================
// Recorder
// =============================================================================

/// Records the span tree for one reconciliation.
///
/// Cheap to clone; every handle holds a clone.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

struct Inner {
    trace_id: TraceId,
    workspace_id: String,
    release_target_key: String,
    trigger: TriggerReason,
    parent_trace_id: Option<TraceId>,
    signer: Option<Arc<TokenSigner>>,
    root: SpanId,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    spans: Vec<Span>,
    index: HashMap<SpanId, usize>,
    next_sequence: u64,
}

impl State {
    /// Assign depth and sequence for a child of `parent` and store it.
    ///
    /// The parent's depth is read and the new span inserted within the
    /// same critical section.
    fn open(&mut self, mut span: Span, parent: Option<&SpanId>) -> SpanId {
        span.depth = parent
            .and_then(|p| self.index.get(p))
            .map_or(0, |&i| self.spans[i].depth + 1);
        span.sequence = self.next_sequence;
        self.next_sequence += 1;
        span.attributes
            .insert(attr::DEPTH.to_string(), json!(span.depth));
        span.attributes
            .insert(attr::SEQUENCE.to_string(), json!(span.sequence));

        let id = span.span_id.clone();
        self.index.insert(id.clone(), self.spans.len());
        self.spans.push(span);
        id
    }

    fn get_mut(&mut self, id: &SpanId) -> Option<&mut Span> {
        let i = *self.index.get(id)?;
        self.spans.get_mut(i)
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("trace_id", &self.inner.trace_id)
            .field("workspace_id", &self.inner.workspace_id)
            .field("release_target_key", &self.inner.release_target_key)
            .field("trigger", &self.inner.trigger)
            .finish()
    }
}

/// Builder for a [`Recorder`].
#[derive(Debug)]
pub struct RecorderBuilder {
    workspace_id: String,
    release_target_key: String,
    trigger: TriggerReason,
    parent_trace_id: Option<TraceId>,
    signer: Option<Arc<TokenSigner>>,
}

impl RecorderBuilder {
    pub fn parent_trace(mut self, parent: TraceId) -> Self {
        self.parent_trace_id = Some(parent);
        self
    }

    pub fn token_signer(mut self, signer: Arc<TokenSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Create the recorder and open its root span.
    pub fn start(self) -> Recorder {
        let trace_id = TraceId::new_hex();
        let root_id = SpanId::new_hex();
        let inner = Inner {
            trace_id,
            workspace_id: self.workspace_id,
            release_target_key: self.release_target_key,
            trigger: self.trigger,
            parent_trace_id: self.parent_trace_id,
            signer: self.signer,
            root: root_id.clone(),
            state: Mutex::new(State::default()),
        };
        let recorder = Recorder {
            inner: Arc::new(inner),
        };
        let span = recorder.new_span(
            root_id,
            "Reconciliation".to_string(),
            Phase::Reconciliation,
            NodeType::ReconcileTarget,
        );
        recorder.inner.state.lock().open(span, None);
        recorder
    }
}

impl Recorder {
    pub fn builder(
        workspace_id: impl Into<String>,
        target: &ReleaseTargetKey,
        trigger: TriggerReason,
    ) -> RecorderBuilder {
        RecorderBuilder {
            workspace_id: workspace_id.into(),
            release_target_key: target.to_string(),
            trigger,
            parent_trace_id: None,
            signer: None,
        }
    }

    /// Shorthand for `builder(..).start()`.
    pub fn new(
        workspace_id: impl Into<String>,
        target: &ReleaseTargetKey,
        trigger: TriggerReason,
    ) -> Self {
        Self::builder(workspace_id, target, trigger).start()
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.inner.trace_id
    }

    pub fn trigger(&self) -> TriggerReason {
        self.inner.trigger
    }

    /// Handle on the root span.
    pub fn root(&self) -> ReconcileTarget {
        ReconcileTarget(SpanCtx {
            recorder: self.clone(),
            span_id: self.inner.root.clone(),
        })
    }

    /// Snapshot of every span, ordered by `(depth, sequence)`.
    pub fn spans(&self) -> Vec<Span> {
        let mut spans = self.inner.state.lock().spans.clone();
        spans.sort_by_key(|s| (s.depth, s.sequence));
        spans
    }

    /// Write every span to `store`.
    ///
    /// Spans still running are written as they are.
    pub async fn flush(&self, store: &dyn PersistenceStore) -> Result<usize, TraceError> {
        let spans = self.spans();
        store.write_spans(&spans).await?;
        Ok(spans.len())
    }

    /// Adopt spans produced by an external agent under the job span the
    /// token was issued for.
    pub fn attach_external(
        &self,
        token: &str,
        spans: Vec<ExternalSpan>,
    ) -> Result<usize, TraceError> {
        let signer = self.inner.signer.as_ref().ok_or(TraceError::TokensDisabled)?;
        let token = signer.validate(token)?;
        if token.trace_id != self.inner.trace_id {
            return Err(TraceError::TraceMismatch {
                token: token.trace_id.to_string(),
                recorder: self.inner.trace_id.to_string(),
            });
        }

        let job_span = {
            let state = self.inner.state.lock();
            state
                .spans
                .iter()
                .find(|s| {
                    s.node_type == NodeType::Job
                        && s.attribute_str(attr::JOB_ID) == Some(token.job_id.as_str())
                })
                .map(|s| s.span_id.clone())
        }
        .ok_or_else(|| TraceError::JobSpanNotFound(token.job_id.to_string()))?;

        // External ids are remapped so parents declared by the agent resolve
        // to the adopted spans.
        let mut remap: HashMap<String, SpanId> = HashMap::new();
        let count = spans.len();
        for external in spans {
            let span_id = SpanId::new_hex();
            let parent = external
                .parent_span_id
                .as_ref()
                .and_then(|p| remap.get(p))
                .cloned()
                .unwrap_or_else(|| job_span.clone());

            let mut span = self.new_span(
                span_id.clone(),
                external.name,
                Phase::External,
                NodeType::External,
            );
            span.parent_span_id = Some(parent.clone());
            span.status = external.status;
            span.start_time = external.start_time;
            span.end_time = external.end_time;
            for (k, v) in external.attributes {
                span.attributes.entry(k).or_insert(v);
            }
            span.attributes
                .insert(attr::JOB_ID.to_string(), json!(token.job_id.as_str()));
            span.attributes
                .insert(attr::EXTERNAL.to_string(), json!(true));

            self.inner.state.lock().open(span, Some(&parent));
            if let Some(id) = external.span_id {
                remap.insert(id, span_id);
            }
        }
        Ok(count)
    }

    fn new_span(&self, span_id: SpanId, name: String, phase: Phase, node_type: NodeType) -> Span {
        let inner = &self.inner;
        let mut attributes = BTreeMap::new();
        attributes.insert(attr::WORKSPACE_ID.to_string(), json!(inner.workspace_id));
        attributes.insert(
            attr::RELEASE_TARGET_KEY.to_string(),
            json!(inner.release_target_key),
        );
        attributes.insert(attr::TRIGGER.to_string(), json!(inner.trigger.as_str()));
        attributes.insert(attr::PHASE.to_string(), json!(phase.as_str()));
        attributes.insert(attr::NODE_TYPE.to_string(), json!(node_type.as_str()));
        if let Some(parent) = &inner.parent_trace_id {
            attributes.insert(attr::PARENT_TRACE_ID.to_string(), json!(parent.as_str()));
        }
        Span {
            trace_id: inner.trace_id.clone(),
            span_id,
            parent_span_id: None,
            name,
            phase,
            node_type,
            status: SpanStatus::Running,
            depth: 0,
            sequence: 0,
            start_time: Utc::now(),
            end_time: None,
            attributes,
            events: Vec::new(),
        }
    }

    fn open_child(
        &self,
        parent: &SpanId,
        name: impl Into<String>,
        phase: Phase,
        node_type: NodeType,
    ) -> SpanCtx {
        let mut span = self.new_span(SpanId::new_hex(), name.into(), phase, node_type);
        span.parent_span_id = Some(parent.clone());
        let span_id = self.inner.state.lock().open(span, Some(parent));
        SpanCtx {
            recorder: self.clone(),
            span_id,
        }
    }

    fn update(&self, span_id: &SpanId, f: impl FnOnce(&mut Span)) {
        let mut state = self.inner.state.lock();
        match state.get_mut(span_id) {
            Some(span) => f(span),
            None => warn!(span_id = %span_id, "trace span not found"),
        }
    }
}

// =============================================================================
// Handles
// =============================================================================

/// A span owned by a handle.
#[derive(Debug, Clone)]
pub struct SpanCtx {
    recorder: Recorder,
    span_id: SpanId,
}

/// Operations shared by every span handle.
pub trait SpanHandle {
    #[doc(hidden)]
    fn ctx(&self) -> &SpanCtx;

    fn span_id(&self) -> &SpanId {
        &self.ctx().span_id
    }

    fn set_attribute(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        self.ctx()
            .recorder
            .update(&self.ctx().span_id, |s| {
                s.attributes.insert(key.to_string(), value);
            });
    }

    fn add_event(&self, name: &str, attributes: BTreeMap<String, Value>) {
        let event = SpanEvent {
            name: name.to_string(),
            at: Utc::now(),
            attributes,
        };
        self.ctx()
            .recorder
            .update(&self.ctx().span_id, |s| s.events.push(event));
    }

    /// Close the span with `status`.
    fn end(&self, status: SpanStatus) {
        self.ctx().recorder.update(&self.ctx().span_id, |s| {
            s.status = status;
            s.end_time = Some(Utc::now());
            s.attributes
                .insert(attr::STATUS.to_string(), json!(status.as_str()));
        });
    }
}

macro_rules! span_handle {
    ($($name:ident),* $(,)?) => {
        $(
            impl SpanHandle for $name {
                fn ctx(&self) -> &SpanCtx {
                    &self.0
                }
            }
        )*
    };
}

/// Root span of a reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileTarget(SpanCtx);

/// Planning phase: policy evaluations for candidate versions.
#[derive(Debug, Clone)]
pub struct PlanningPhase(SpanCtx);

/// One evaluator run.
#[derive(Debug, Clone)]
pub struct Evaluation(SpanCtx);

/// Eligibility phase: checks that gate job creation.
#[derive(Debug, Clone)]
pub struct EligibilityPhase(SpanCtx);

/// One eligibility check.
#[derive(Debug, Clone)]
pub struct Check(SpanCtx);

/// Outcome of a planning or eligibility phase.
#[derive(Debug, Clone)]
pub struct Decision(SpanCtx);

/// Execution phase: release persistence and dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionPhase(SpanCtx);

/// A unit of work in the execution phase.
#[derive(Debug, Clone)]
pub struct Action(SpanCtx);

/// A sub-step of an [`Action`].
#[derive(Debug, Clone)]
pub struct Step(SpanCtx);

/// The dispatched job.
#[derive(Debug, Clone)]
pub struct Job {
    ctx: SpanCtx,
    job_id: JobId,
}

span_handle!(
    ReconcileTarget,
    PlanningPhase,
    Evaluation,
    EligibilityPhase,
    Check,
    Decision,
    ExecutionPhase,
    Action,
    Step,
);

impl SpanHandle for Job {
    fn ctx(&self) -> &SpanCtx {
        &self.ctx
    }
}

impl ReconcileTarget {
    pub fn planning(&self) -> PlanningPhase {
        PlanningPhase(self.0.recorder.open_child(
            &self.0.span_id,
            "Planning",
            Phase::Planning,
            NodeType::Phase,
        ))
    }

    pub fn eligibility(&self) -> EligibilityPhase {
        EligibilityPhase(self.0.recorder.open_child(
            &self.0.span_id,
            "Eligibility",
            Phase::Eligibility,
            NodeType::Phase,
        ))
    }

    pub fn execution(&self) -> ExecutionPhase {
        ExecutionPhase(self.0.recorder.open_child(
            &self.0.span_id,
            "Execution",
            Phase::Execution,
            NodeType::Phase,
        ))
    }

    pub fn set_release_id(&self, release_id: &str) {
        self.set_attribute(attr::RELEASE_ID, release_id);
    }
}

impl PlanningPhase {
    /// Open an evaluation span for one rule.
    pub fn evaluation(&self, rule_type: &str, rule_id: Option<&str>) -> Evaluation {
        let eval = Evaluation(self.0.recorder.open_child(
            &self.0.span_id,
            format!("Evaluate {rule_type}"),
            Phase::Planning,
            NodeType::Evaluation,
        ));
        eval.set_attribute(attr::RULE_TYPE, rule_type);
        if let Some(id) = rule_id {
            eval.set_attribute(attr::RULE_ID, id);
        }
        eval
    }

    pub fn decision(&self, approved: bool, message: &str) -> Decision {
        Decision::open(&self.0, Phase::Planning, approved, message)
    }
}

impl Evaluation {
    /// Record the evaluator's verdict and close the span.
    pub fn finish(&self, allowed: bool, message: &str) {
        self.set_attribute("ctrlplane.allowed", allowed);
        self.set_attribute(attr::MESSAGE, message);
        self.end(SpanStatus::Completed);
    }

    /// Close the span as skipped (rule bypassed or scope unsatisfied).
    pub fn skip(&self, reason: &str) {
        self.set_attribute(attr::MESSAGE, reason);
        self.end(SpanStatus::Skipped);
    }
}

impl EligibilityPhase {
    pub fn check(&self, name: &str) -> Check {
        Check(self.0.recorder.open_child(
            &self.0.span_id,
            name,
            Phase::Eligibility,
            NodeType::Check,
        ))
    }

    pub fn decision(&self, eligible: bool, message: &str) -> Decision {
        Decision::open(&self.0, Phase::Eligibility, eligible, message)
    }
}

impl Check {
    pub fn pass(&self, message: &str) {
        self.set_attribute("ctrlplane.passed", true);
        self.set_attribute(attr::MESSAGE, message);
        self.end(SpanStatus::Completed);
    }

    pub fn fail(&self, message: &str) {
        self.set_attribute("ctrlplane.passed", false);
        self.set_attribute(attr::MESSAGE, message);
        self.end(SpanStatus::Completed);
    }
}

impl Decision {
    fn open(parent: &SpanCtx, phase: Phase, approved: bool, message: &str) -> Self {
        let decision = Decision(parent.recorder.open_child(
            &parent.span_id,
            "Decision",
            phase,
            NodeType::Decision,
        ));
        decision.set_attribute(
            attr::DECISION,
            if approved { "approved" } else { "rejected" },
        );
        decision.set_attribute(attr::MESSAGE, message);
        decision.end(SpanStatus::Completed);
        decision
    }
}

impl ExecutionPhase {
    pub fn action(&self, name: &str) -> Action {
        Action(self.0.recorder.open_child(
            &self.0.span_id,
            name,
            Phase::Execution,
            NodeType::Action,
        ))
    }

    pub fn job(&self, job_id: &JobId) -> Job {
        let job = Job {
            ctx: self.0.recorder.open_child(
                &self.0.span_id,
                "Job",
                Phase::Execution,
                NodeType::Job,
            ),
            job_id: job_id.clone(),
        };
        job.set_attribute(attr::JOB_ID, job_id.as_str());
        job
    }
}

impl Action {
    pub fn step(&self, name: &str) -> Step {
        Step(self.0.recorder.open_child(
            &self.0.span_id,
            name,
            Phase::Execution,
            NodeType::Step,
        ))
    }
}

impl Step {
    pub fn finish(&self, status: SpanStatus, message: &str) {
        self.set_attribute(attr::MESSAGE, message);
        self.end(status);
    }
}

impl Job {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Signed token for external agents, or `None` when the recorder has
    /// no signer or signing fails.
    pub fn token(&self) -> Option<String> {
        let signer = self.ctx.recorder.inner.signer.as_ref()?;
        match signer.generate_default(&self.ctx.recorder.inner.trace_id, &self.job_id) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "failed to sign trace token");
                None
            }
        }
    }
}

// =============================================================================
// External spans
// =============================================================================

/// A span reported by an external agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSpan {
    /// The agent's own id, used only to resolve `parent_span_id` within
    /// the same batch.
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: SpanStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

// =============================================================================
// Tests
// =============================================================================
