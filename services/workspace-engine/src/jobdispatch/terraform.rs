//! Terraform Cloud dispatcher.
//!
//! The agent config carries a YAML `template` whose top level is a
//! `workspaceTemplate`. Dispatch upserts the workspace and its variables,
//! then queues a run.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::dispatcher::{check_response, decode_config, transport, DispatchJob, DispatchOutcome, Dispatcher};
use super::error::DispatchError;

pub const TERRAFORM_CLOUD: &str = "terraform-cloud";

const DEFAULT_ADDRESS: &str = "https://app.terraform.io";
const JSON_API: &str = "application/vnd.api+json";

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerraformCloudConfig {
    #[serde(default = "default_address")]
    address: String,
    organization: String,
    token: String,
    /// YAML document with a `workspaceTemplate` key.
    template: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateDocument {
    workspace_template: WorkspaceTemplate,
}

/// Desired workspace state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplate {
    pub name: String,
    pub description: Option<String>,
    pub project: Option<String>,
    pub execution_mode: Option<String>,
    pub auto_apply: Option<bool>,
    pub allow_destroy_plan: Option<bool>,
    pub file_triggers_enabled: Option<bool>,
    pub global_remote_state: Option<bool>,
    pub queue_all_runs: Option<bool>,
    pub speculative_enabled: Option<bool>,
    pub terraform_version: Option<String>,
    pub trigger_prefixes: Option<Vec<String>>,
    pub trigger_patterns: Option<Vec<String>>,
    pub working_directory: Option<String>,
    pub agent_pool_id: Option<String>,
    pub vcs_repo: Option<VcsRepo>,
    #[serde(default)]
    pub variables: Vec<WorkspaceVariable>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcsRepo {
    pub identifier: String,
    pub branch: Option<String>,
    pub oauth_token_id: Option<String>,
    pub tags_regex: Option<String>,
    pub ingress_submodules: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableCategory {
    Terraform,
    Env,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceVariable {
    pub key: String,
    pub value: Option<String>,
    pub description: Option<String>,
    pub category: VariableCategory,
    #[serde(default)]
    pub hcl: bool,
    #[serde(default)]
    pub sensitive: bool,
}

impl WorkspaceTemplate {
    /// Parse the rendered YAML template.
    pub fn parse(yaml: &str) -> Result<Self, DispatchError> {
        let doc: TemplateDocument =
            serde_yaml::from_str(yaml).map_err(|e| DispatchError::InvalidConfig {
                agent: TERRAFORM_CLOUD,
                message: format!("workspaceTemplate: {e}"),
            })?;
        let template = doc.workspace_template;
        if template.name.trim().is_empty() {
            return Err(DispatchError::InvalidConfig {
                agent: TERRAFORM_CLOUD,
                message: "workspaceTemplate.name is required".to_string(),
            });
        }
        Ok(template)
    }

    /// JSON:API attributes for workspace create/update.
    fn attributes(&self) -> Value {
        let mut attrs = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                attrs.insert(key.to_string(), value);
            }
        };
        put("name", Some(json!(self.name)));
        put("description", self.description.as_ref().map(|v| json!(v)));
        put("execution-mode", self.execution_mode.as_ref().map(|v| json!(v)));
        put("auto-apply", self.auto_apply.map(Value::Bool));
        put("allow-destroy-plan", self.allow_destroy_plan.map(Value::Bool));
        put("file-triggers-enabled", self.file_triggers_enabled.map(Value::Bool));
        put("global-remote-state", self.global_remote_state.map(Value::Bool));
        put("queue-all-runs", self.queue_all_runs.map(Value::Bool));
        put("speculative-enabled", self.speculative_enabled.map(Value::Bool));
        put("terraform-version", self.terraform_version.as_ref().map(|v| json!(v)));
        put("trigger-prefixes", self.trigger_prefixes.as_ref().map(|v| json!(v)));
        put("trigger-patterns", self.trigger_patterns.as_ref().map(|v| json!(v)));
        put("working-directory", self.working_directory.as_ref().map(|v| json!(v)));
        put("agent-pool-id", self.agent_pool_id.as_ref().map(|v| json!(v)));
        put(
            "vcs-repo",
            self.vcs_repo.as_ref().map(|repo| {
                json!({
                    "identifier": repo.identifier,
                    "branch": repo.branch,
                    "oauth-token-id": repo.oauth_token_id,
                    "tags-regex": repo.tags_regex,
                    "ingress-submodules": repo.ingress_submodules,
                })
            }),
        );
        Value::Object(attrs)
    }

    fn payload(&self) -> Value {
        let mut data = json!({
            "type": "workspaces",
            "attributes": self.attributes(),
        });
        if let Some(project) = &self.project {
            data["relationships"] = json!({
                "project": {"data": {"type": "projects", "id": project}}
            });
        }
        json!({ "data": data })
    }
}

impl WorkspaceVariable {
    fn payload(&self) -> Value {
        json!({
            "data": {
                "type": "vars",
                "attributes": {
                    "key": self.key,
                    "value": self.value.clone().unwrap_or_default(),
                    "description": self.description.clone().unwrap_or_default(),
                    "category": self.category,
                    "hcl": self.hcl,
                    "sensitive": self.sensitive,
                }
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TerraformCloudDispatcher {
    client: reqwest::Client,
}

impl TerraformCloudDispatcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

struct Session<'a> {
    client: &'a reqwest::Client,
    address: String,
    token: &'a str,
}

impl Session<'_> {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.address, path))
            .bearer_auth(self.token)
            .header(reqwest::header::CONTENT_TYPE, JSON_API)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, DispatchError> {
        let response = request.send().await.map_err(transport(TERRAFORM_CLOUD))?;
        let response = check_response(TERRAFORM_CLOUD, response).await?;
        response.json().await.map_err(transport(TERRAFORM_CLOUD))
    }

    /// Create the workspace, or update it if one with the same name exists.
    async fn upsert_workspace(
        &self,
        organization: &str,
        template: &WorkspaceTemplate,
    ) -> Result<String, DispatchError> {
        let lookup = self
            .request(
                reqwest::Method::GET,
                &format!("/api/v2/organizations/{organization}/workspaces/{}", template.name),
            )
            .send()
            .await
            .map_err(transport(TERRAFORM_CLOUD))?;

        let body = if lookup.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(workspace = %template.name, "Creating Terraform Cloud workspace");
            self.send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/api/v2/organizations/{organization}/workspaces"),
                )
                .json(&template.payload()),
            )
            .await?
        } else {
            let existing: Value = check_response(TERRAFORM_CLOUD, lookup)
                .await?
                .json()
                .await
                .map_err(transport(TERRAFORM_CLOUD))?;
            let id = data_id(&existing)?;
            debug!(workspace = %template.name, workspace_id = %id, "Updating Terraform Cloud workspace");
            self.send(
                self.request(reqwest::Method::PATCH, &format!("/api/v2/workspaces/{id}"))
                    .json(&template.payload()),
            )
            .await?
        };
        data_id(&body)
    }

    async fn sync_variables(
        &self,
        workspace_id: &str,
        variables: &[WorkspaceVariable],
    ) -> Result<(), DispatchError> {
        if variables.is_empty() {
            return Ok(());
        }
        let path = format!("/api/v2/workspaces/{workspace_id}/vars");
        let listed = self
            .send(self.request(reqwest::Method::GET, &path))
            .await?;
        let existing: HashMap<String, String> = listed
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|var| {
                let key = var.pointer("/attributes/key")?.as_str()?;
                let id = var.get("id")?.as_str()?;
                Some((key.to_string(), id.to_string()))
            })
            .collect();

        for variable in variables {
            let request = match existing.get(&variable.key) {
                Some(var_id) => self.request(reqwest::Method::PATCH, &format!("{path}/{var_id}")),
                None => self.request(reqwest::Method::POST, &path),
            };
            self.send(request.json(&variable.payload())).await?;
        }
        Ok(())
    }

    async fn queue_run(&self, workspace_id: &str, message: &str) -> Result<String, DispatchError> {
        let payload = json!({
            "data": {
                "type": "runs",
                "attributes": {"message": message},
                "relationships": {
                    "workspace": {"data": {"type": "workspaces", "id": workspace_id}}
                }
            }
        });
        let body = self
            .send(self.request(reqwest::Method::POST, "/api/v2/runs").json(&payload))
            .await?;
        data_id(&body)
    }
}

fn data_id(body: &Value) -> Result<String, DispatchError> {
    body.pointer("/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DispatchError::Transport {
            vendor: TERRAFORM_CLOUD,
            message: "response has no data.id".to_string(),
            transient: false,
        })
}

#[async_trait]
impl Dispatcher for TerraformCloudDispatcher {
    fn agent_type(&self) -> &'static str {
        TERRAFORM_CLOUD
    }

    async fn dispatch_job(&self, job: &DispatchJob) -> Result<DispatchOutcome, DispatchError> {
        let config: TerraformCloudConfig = decode_config(TERRAFORM_CLOUD, &job.config)?;
        let template = WorkspaceTemplate::parse(&config.template)?;
        let session = Session {
            client: &self.client,
            address: config.address.trim_end_matches('/').to_string(),
            token: &config.token,
        };

        let workspace_id = session
            .upsert_workspace(&config.organization, &template)
            .await?;
        session
            .sync_variables(&workspace_id, &template.variables)
            .await?;
        let run_id = session
            .queue_run(&workspace_id, &format!("Triggered by ctrlplane job {}", job.job.id))
            .await?;

        info!(job_id = %job.job.id, workspace_id = %workspace_id, run_id = %run_id, "Queued Terraform Cloud run");
        let link = format!(
            "{}/app/{}/workspaces/{}/runs/{}",
            session.address, config.organization, template.name, run_id
        );
        Ok(DispatchOutcome::external(run_id)
            .with_message("Terraform Cloud run queued")
            .with_metadata("terraformCloud.workspaceId", workspace_id)
            .with_metadata("ctrlplane/links", link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
workspaceTemplate:
  name: api-prod
  project: prj-1
  autoApply: true
  vcsRepo:
    identifier: acme/infra
    branch: main
  variables:
    - key: image_tag
      value: "1.2.3"
      category: terraform
    - key: TF_LOG
      value: debug
      category: env
"#;

    #[test]
    fn test_parse_workspace_template() {
        let template = WorkspaceTemplate::parse(TEMPLATE).unwrap();
        assert_eq!(template.name, "api-prod");
        assert_eq!(template.auto_apply, Some(true));
        assert_eq!(template.vcs_repo.as_ref().unwrap().identifier, "acme/infra");
        assert_eq!(template.variables.len(), 2);
        assert_eq!(template.variables[1].category, VariableCategory::Env);
    }

    #[test]
    fn test_payload_uses_json_api_names() {
        let payload = WorkspaceTemplate::parse(TEMPLATE).unwrap().payload();
        assert_eq!(payload["data"]["attributes"]["auto-apply"], json!(true));
        assert_eq!(payload["data"]["attributes"]["vcs-repo"]["identifier"], json!("acme/infra"));
        assert_eq!(payload["data"]["relationships"]["project"]["data"]["id"], json!("prj-1"));
        assert!(payload["data"]["attributes"].get("description").is_none());
    }

    #[test]
    fn test_template_requires_name_and_category() {
        assert!(WorkspaceTemplate::parse("workspaceTemplate:\n  name: \"\"\n").is_err());
        let bad = "workspaceTemplate:\n  name: x\n  variables:\n    - key: a\n      category: secret\n";
        assert!(WorkspaceTemplate::parse(bad).is_err());
    }
}
