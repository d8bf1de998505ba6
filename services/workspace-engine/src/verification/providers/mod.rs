//! Metric providers.
//!
//! A provider takes one reading and returns it as JSON; conditions decide
//! what the reading means. Provider fields that accept templates are
//! rendered against the [`ProviderContext`] first.

mod datadog;
mod http;
mod sleep;
mod terraform;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::error::ProviderError;
use crate::model::{
    Deployment, DeploymentVersion, Environment, MetricProvider, Release, ReleaseTarget, Resource,
};

pub use datadog::measure_datadog;
pub use http::measure_http;
pub use sleep::measure_sleep;
pub use terraform::measure_terraform_run;

/// Timeout when a provider sets none.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// What provider templates can reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderContext {
    pub release: Release,
    pub resource: Resource,
    pub environment: Environment,
    pub version: DeploymentVersion,
    pub target: ReleaseTarget,
    pub deployment: Deployment,
    pub variables: std::collections::BTreeMap<String, Value>,
}

impl ProviderContext {
    pub fn to_value(&self) -> Result<Value, ProviderError> {
        serde_json::to_value(self).map_err(|e| ProviderError::MissingContext(e.to_string()))
    }
}

/// Runs whichever provider a metric names.
#[derive(Debug, Clone, Default)]
pub struct ProviderExecutor {
    client: reqwest::Client,
}

impl ProviderExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn measure(
        &self,
        provider: &MetricProvider,
        context: &Value,
    ) -> Result<Value, ProviderError> {
        match provider {
            MetricProvider::Http(p) => measure_http(&self.client, p, context).await,
            MetricProvider::Sleep(p) => measure_sleep(p).await,
            MetricProvider::Datadog(p) => measure_datadog(&self.client, p, context).await,
            MetricProvider::TerraformCloudRun(p) => {
                measure_terraform_run(&self.client, p, context).await
            }
        }
    }
}

/// Parse a Go-style duration: `300ms`, `30s`, `5m`, `1h30m`.
pub fn parse_duration(input: &str) -> Result<Duration, ProviderError> {
    let invalid = || ProviderError::InvalidConfig(format!("invalid duration {input:?}"));
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(digits);
        let value: f64 = number.parse().map_err(|_| invalid())?;
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        total += Duration::from_secs_f64(value * scale);
        rest = next;
    }
    Ok(total)
}

/// Map a reqwest failure to a provider error.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Body as JSON when it parses, else as a string.
pub(crate) fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("30", Duration::from_secs(30))]
    #[case("30s", Duration::from_secs(30))]
    #[case("500ms", Duration::from_millis(500))]
    #[case("1m30s", Duration::from_secs(90))]
    #[case("1h", Duration::from_secs(3600))]
    fn test_parse_duration(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("10x")]
    #[case("s")]
    fn test_parse_duration_rejects(#[case] input: &str) {
        assert!(parse_duration(input).is_err());
    }
}
