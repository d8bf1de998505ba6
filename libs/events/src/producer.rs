//! Message producers.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::envelope::EventEnvelope;
use crate::error::EventError;

/// A published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Message bus producer.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publish one message.
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), EventError>;

    /// Flush and release the transport. Later publishes fail with
    /// [`EventError::Closed`].
    async fn close(&self);
}

/// Encode and publish an envelope.
pub async fn publish_envelope<P: Serialize + Sync>(
    producer: &dyn Producer,
    envelope: &EventEnvelope<P>,
) -> Result<(), EventError> {
    let (key, value) = envelope.encode()?;
    debug!(event_type = %envelope.event_type, workspace_id = %envelope.workspace_id, "Publishing event");
    producer.publish(&key, &value).await
}

/// In-process producer.
///
/// Keeps a copy of every message and forwards it to an optional consumer
/// channel.
pub struct InMemoryProducer {
    tx: Option<mpsc::UnboundedSender<Message>>,
    history: Mutex<Vec<Message>>,
    closed: AtomicBool,
}

impl InMemoryProducer {
    /// Create a producer that only records messages.
    pub fn new() -> Self {
        Self {
            tx: None,
            history: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a producer wired to a consumer channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let producer = Self {
            tx: Some(tx),
            history: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };
        (producer, rx)
    }

    /// Messages published so far.
    pub async fn published(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }
}

impl Default for InMemoryProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), EventError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EventError::Closed);
        }
        let message = Message {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        self.history.lock().await.push(message.clone());
        if let Some(tx) = &self.tx {
            tx.send(message)
                .map_err(|_| EventError::Publish("consumer channel closed".to_string()))?;
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
