//! Span model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ctrlplane_id::{SpanId, TraceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute keys carried by every recorded span.
pub mod attr {
    pub const WORKSPACE_ID: &str = "ctrlplane.workspace_id";
    pub const RELEASE_TARGET_KEY: &str = "ctrlplane.release_target_key";
    pub const RELEASE_ID: &str = "ctrlplane.release_id";
    pub const JOB_ID: &str = "ctrlplane.job_id";
    pub const PARENT_TRACE_ID: &str = "ctrlplane.parent_trace_id";
    pub const TRIGGER: &str = "ctrlplane.trigger";
    pub const PHASE: &str = "ctrlplane.phase";
    pub const NODE_TYPE: &str = "ctrlplane.node_type";
    pub const STATUS: &str = "ctrlplane.status";
    pub const DEPTH: &str = "ctrlplane.depth";
    pub const SEQUENCE: &str = "ctrlplane.sequence";
    pub const RULE_ID: &str = "ctrlplane.rule_id";
    pub const RULE_TYPE: &str = "ctrlplane.rule_type";
    pub const DECISION: &str = "ctrlplane.decision";
    pub const MESSAGE: &str = "ctrlplane.message";
    pub const EXTERNAL: &str = "ctrlplane.external";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Reconciliation,
    Planning,
    Eligibility,
    Execution,
    External,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reconciliation => "reconciliation",
            Self::Planning => "planning",
            Self::Eligibility => "eligibility",
            Self::Execution => "execution",
            Self::External => "external",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    ReconcileTarget,
    Phase,
    Evaluation,
    Check,
    Decision,
    Action,
    Step,
    Job,
    External,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReconcileTarget => "reconcile_target",
            Self::Phase => "phase",
            Self::Evaluation => "evaluation",
            Self::Check => "check",
            Self::Decision => "decision",
            Self::Action => "action",
            Self::Step => "step",
            Self::Job => "job",
            Self::External => "external",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Skipped,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// A point-in-time annotation on a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

/// One node of a reconciliation trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub phase: Phase,
    pub node_type: NodeType,
    pub status: SpanStatus,
    pub depth: u32,
    pub sequence: u64,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SpanEvent>,
}

impl Span {
    /// String attribute by key.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Workspace id, if set and non-empty.
    pub fn workspace_id(&self) -> Option<&str> {
        self.attribute_str(attr::WORKSPACE_ID).filter(|s| !s.is_empty())
    }
}
