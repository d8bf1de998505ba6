//! Retry classification and backoff.

use std::time::Duration;

/// Client-error status codes. Matched as whole words only.
const NON_RETRYABLE_STATUS: &[&str] = &["400", "401", "403"];

/// Structural and authorization failures. Matching any of these wins over
/// the transient categories below.
const NON_RETRYABLE: &[&str] = &[
    "bad request",
    "unauthorized",
    "forbidden",
    // auth / permission
    "authentication",
    "permission denied",
    "access denied",
    "invalid token",
    // structural
    "namespace not found",
    "invalid spec",
];

/// Transient server-error status codes. Matched as whole words only.
const RETRYABLE_STATUS: &[&str] = &["502", "503", "504"];

/// Transient infrastructure failures.
const RETRYABLE: &[&str] = &[
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    // connection
    "connection refused",
    "connection reset",
    // timeout
    "timeout",
    "timed out",
    "deadline exceeded",
    // availability
    "temporarily unavailable",
];

/// Targets a vendor may not have finished provisioning yet.
const PROVISIONING_SUBJECTS: &[&str] = &["cluster", "destination", "server"];
const PROVISIONING_MISSING: &[&str] = &["not found", "does not exist"];

/// Decide whether an error is worth retrying.
///
/// `None` is never retryable.
pub fn is_retryable_error<E>(err: Option<&E>) -> bool
where
    E: std::fmt::Display + ?Sized,
{
    match err {
        Some(err) => is_retryable_message(&err.to_string()),
        None => false,
    }
}

/// Classify an error message. Phrases match case-insensitively anywhere in
/// the message; status codes only as a whole word, so ports, durations and
/// ids that contain the digits are ignored.
pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();

    if has_status(&message, NON_RETRYABLE_STATUS)
        || NON_RETRYABLE.iter().any(|needle| message.contains(needle))
    {
        return false;
    }

    if has_status(&message, RETRYABLE_STATUS)
        || RETRYABLE.iter().any(|needle| message.contains(needle))
    {
        return true;
    }

    // Race with provisioning: "cluster not found", "destination server does not exist".
    PROVISIONING_SUBJECTS.iter().any(|s| message.contains(s))
        && PROVISIONING_MISSING.iter().any(|m| message.contains(m))
}

/// Whether any whitespace-separated word, stripped of surrounding
/// punctuation, is one of `codes`. `"10.0.0.5:401"` stays a single word.
fn has_status(message: &str, codes: &[&str]) -> bool {
    message
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .any(|word| codes.contains(&word))
}

/// Exponential backoff applied around a retryable operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            initial_backoff: crate::DEFAULT_INITIAL_BACKOFF,
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Returns true if another attempt is allowed after `attempt` failed
    /// with `message`.
    pub fn should_retry(&self, attempt: u32, message: &str) -> bool {
        attempt < self.max_attempts && is_retryable_message(message)
    }
}
