//! Span persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::TraceError;
use crate::span::{attr, Span};

/// Destination for finished traces.
///
/// Implementations must reject a batch whole when [`validate_batch`] fails
/// and should be idempotent on `(trace_id, span_id)`.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn write_spans(&self, spans: &[Span]) -> Result<(), TraceError>;
}

/// Check every span carries a non-empty workspace id.
pub fn validate_batch(spans: &[Span]) -> Result<(), TraceError> {
    match spans.iter().find(|s| s.workspace_id().is_none()) {
        Some(span) => Err(TraceError::MissingAttribute {
            attribute: attr::WORKSPACE_ID,
            span_name: span.name.clone(),
            trace_id: span.trace_id.to_string(),
            span_id: span.span_id.to_string(),
        }),
        None => Ok(()),
    }
}

/// In-process store keyed by `(trace_id, span_id)`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    spans: RwLock<HashMap<(String, String), Span>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.read().is_empty()
    }

    /// Spans of one trace, ordered by `(depth, sequence)`.
    pub fn trace(&self, trace_id: &str) -> Vec<Span> {
        let mut spans: Vec<Span> = self
            .spans
            .read()
            .values()
            .filter(|s| s.trace_id.as_str() == trace_id)
            .cloned()
            .collect();
        spans.sort_by_key(|s| (s.depth, s.sequence));
        spans
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn write_spans(&self, spans: &[Span]) -> Result<(), TraceError> {
        validate_batch(spans)?;
        let mut stored = self.spans.write();
        for span in spans {
            stored.insert(
                (span.trace_id.to_string(), span.span_id.to_string()),
                span.clone(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{NodeType, Phase, SpanStatus};
    use chrono::Utc;
    use ctrlplane_id::{SpanId, TraceId};
    use serde_json::json;

    fn span(name: &str, workspace: &str) -> Span {
        Span {
            trace_id: TraceId::from("trace-1"),
            span_id: SpanId::new_hex(),
            parent_span_id: None,
            name: name.to_string(),
            phase: Phase::Planning,
            node_type: NodeType::Evaluation,
            status: SpanStatus::Completed,
            depth: 1,
            sequence: 0,
            start_time: Utc::now(),
            end_time: None,
            attributes: [(attr::WORKSPACE_ID.to_string(), json!(workspace))].into(),
            events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_batch_with_empty_workspace_is_rejected_whole() {
        let store = InMemoryStore::new();
        let bad = span("bad-span", "");
        let bad_id = bad.span_id.to_string();
        let err = store
            .write_spans(&[span("ok", "ws-1"), bad])
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing required attribute"));
        assert!(message.contains("ctrlplane.workspace_id"));
        assert!(message.contains("bad-span"));
        assert!(message.contains(&bad_id));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = InMemoryStore::new();
        let s = span("ok", "ws-1");
        store.write_spans(&[s.clone()]).await.unwrap();
        store.write_spans(&[s]).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
