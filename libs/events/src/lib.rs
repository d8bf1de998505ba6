//! # ctrlplane-events
//!
//! Messaging types for the ctrlplane workspace engine.
//!
//! ## Design Principles
//!
//! - Events are immutable records published after a state change
//! - Every event is scoped to exactly one workspace
//! - The receiver applies only the fields an event names in
//!   `fieldsToUpdate`; everything else on the entity is left untouched
//!
//! ## Event Envelope
//!
//! All events share the wire shape
//! `{eventType, workspaceId, data, timestamp}` where `timestamp` is in
//! unix seconds.
//!
//! ## Producers
//!
//! Publishing goes through the [`Producer`] trait so the transport
//! (Kafka in production) is a plug-in. [`InMemoryProducer`] backs tests
//! and single-process deployments.

mod envelope;
mod error;
mod producer;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use producer::*;
pub use types::*;
