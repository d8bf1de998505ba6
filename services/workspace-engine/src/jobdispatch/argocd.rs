//! Argo CD dispatcher: renders an Application manifest and upserts it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::dispatcher::{check_response, decode_config, transport, DispatchJob, DispatchOutcome, Dispatcher};
use super::error::DispatchError;

pub const ARGO_CD: &str = "argo-cd";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArgoCdConfig {
    server_url: String,
    api_key: String,
    /// YAML (or JSON) Application manifest.
    template: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArgoCdDispatcher {
    client: reqwest::Client,
}

impl ArgoCdDispatcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Parse the rendered manifest and pull out `metadata.name`.
fn parse_application(yaml: &str) -> Result<(Value, String), DispatchError> {
    let invalid = |message: String| DispatchError::InvalidConfig {
        agent: ARGO_CD,
        message,
    };
    let manifest: Value =
        serde_yaml::from_str(yaml).map_err(|e| invalid(format!("application template: {e}")))?;
    let name = manifest
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("application template has no metadata.name".to_string()))?
        .to_string();
    Ok((manifest, name))
}

#[async_trait]
impl Dispatcher for ArgoCdDispatcher {
    fn agent_type(&self) -> &'static str {
        ARGO_CD
    }

    async fn dispatch_job(&self, job: &DispatchJob) -> Result<DispatchOutcome, DispatchError> {
        let config: ArgoCdConfig = decode_config(ARGO_CD, &job.config)?;
        let (manifest, name) = parse_application(&config.template)?;
        let server = config.server_url.trim_end_matches('/');
        let server = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("https://{server}")
        };

        let response = self
            .client
            .post(format!("{server}/api/v1/applications"))
            .query(&[("upsert", "true")])
            .bearer_auth(&config.api_key)
            .json(&manifest)
            .send()
            .await
            .map_err(transport(ARGO_CD))?;
        check_response(ARGO_CD, response).await?;

        info!(job_id = %job.job.id, application = %name, "Upserted Argo CD application");
        Ok(DispatchOutcome::external(name.clone())
            .with_message("Argo CD application upserted")
            .with_metadata("ctrlplane/links", format!("{server}/applications/{name}")))
    }
}
