use std::time::Duration;

use anyhow::{Context, Result};

use ctrlplane_id::WorkspaceId;
use ctrlplane_reconcile::{
    RetryPolicy, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_RECONCILE_INTERVAL,
};
use ctrlplane_trace::{TokenSigner, DEFAULT_TOKEN_TTL};

use crate::jobdispatch::DEFAULT_AUTO_RESOLVE_DELAY;
use crate::reconcile::ReconcilerConfig;
use crate::verification::SchedulerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_id: WorkspaceId,
    pub log_level: String,
    pub reconcile_interval: Duration,
    /// HMAC key for trace tokens. `None` signs with a random key.
    pub trace_token_secret: Option<String>,
    pub trace_token_ttl: Duration,
    pub dispatch_max_attempts: u32,
    pub dispatch_initial_backoff: Duration,
    pub auto_resolve_delay: Duration,
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_id: WorkspaceId::new(),
            log_level: "info".to_string(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            trace_token_secret: None,
            trace_token_ttl: DEFAULT_TOKEN_TTL,
            dispatch_max_attempts: DEFAULT_MAX_ATTEMPTS,
            dispatch_initial_backoff: DEFAULT_INITIAL_BACKOFF,
            auto_resolve_delay: DEFAULT_AUTO_RESOLVE_DELAY,
            dev_mode: false,
        }
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a non-negative integer, got {value:?}")),
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let workspace_id = match std::env::var("CTRLPLANE_WORKSPACE_ID") {
            Ok(id) => WorkspaceId::parse(&id)
                .with_context(|| format!("invalid CTRLPLANE_WORKSPACE_ID {id:?}"))?,
            Err(_) => defaults.workspace_id,
        };

        let log_level =
            std::env::var("CTRLPLANE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let reconcile_interval = env_u64("CTRLPLANE_RECONCILE_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.reconcile_interval);
        anyhow::ensure!(
            !reconcile_interval.is_zero(),
            "CTRLPLANE_RECONCILE_INTERVAL_SECS must be positive"
        );

        let trace_token_secret = std::env::var("CTRLPLANE_TRACE_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let trace_token_ttl = env_u64("CTRLPLANE_TRACE_TOKEN_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.trace_token_ttl);

        let dispatch_max_attempts = env_u64("CTRLPLANE_DISPATCH_MAX_ATTEMPTS")?
            .map(|n| n.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(defaults.dispatch_max_attempts);

        let dispatch_initial_backoff = env_u64("CTRLPLANE_DISPATCH_INITIAL_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.dispatch_initial_backoff);

        let auto_resolve_delay = env_u64("CTRLPLANE_AUTO_RESOLVE_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.auto_resolve_delay);

        let dev_mode = std::env::var("CTRLPLANE_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            workspace_id,
            log_level,
            reconcile_interval,
            trace_token_secret,
            trace_token_ttl,
            dispatch_max_attempts,
            dispatch_initial_backoff,
            auto_resolve_delay,
            dev_mode,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.dispatch_max_attempts,
            initial_backoff: self.dispatch_initial_backoff,
            ..RetryPolicy::default()
        }
    }

    pub fn token_signer(&self) -> TokenSigner {
        let signer = match &self.trace_token_secret {
            Some(secret) => TokenSigner::new(secret.as_bytes().to_vec()),
            None => TokenSigner::random(),
        };
        signer.with_default_ttl(self.trace_token_ttl)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_job_attempts: self.dispatch_max_attempts,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
    }
}
