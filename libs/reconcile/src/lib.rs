//! Reconciliation primitives.
//!
//! This library provides the pieces every reconciliation of a release
//! target leans on:
//!
//! - **Fingerprints**: deterministic content hashes used as release ids.
//! - **Error kinds**: the shared taxonomy every engine error maps onto.
//! - **Retry**: a pure classifier deciding whether a vendor error is worth
//!   retrying, and the exponential backoff applied at the dispatch call site.
//!
//! # Invariants
//!
//! - Fingerprints are independent of JSON object key order
//! - The classifier is a pure function of the error text
//! - Backoff delays never exceed the configured ceiling

mod fingerprint;
mod kind;
mod retry;

pub use fingerprint::Fingerprint;
pub use kind::ErrorKind;
pub use retry::{is_retryable_error, is_retryable_message, RetryPolicy};

use std::time::Duration;

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Default dispatch attempts (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default first backoff delay.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
