use serde_json::{json, Value};

use super::{parse_body, transport_error, DEFAULT_PROVIDER_TIMEOUT};
use crate::model::TerraformCloudRunProvider;
use crate::template::render_str;
use crate::verification::error::ProviderError;

/// Read a run. Reports `{ok, statusCode, status, run}` where `status` is the
/// run status (`applied`, `errored`, ...).
pub async fn measure_terraform_run(
    client: &reqwest::Client,
    provider: &TerraformCloudRunProvider,
    context: &Value,
) -> Result<Value, ProviderError> {
    let run_id = render_str(&provider.run_id, context)?;
    let url = format!(
        "{}/api/v2/runs/{}",
        provider.address.trim_end_matches('/'),
        run_id
    );
    let response = client
        .get(&url)
        .bearer_auth(render_str(&provider.token, context)?)
        .header("Content-Type", "application/vnd.api+json")
        .timeout(DEFAULT_PROVIDER_TIMEOUT)
        .send()
        .await
        .map_err(|e| transport_error(e, DEFAULT_PROVIDER_TIMEOUT))?;
    let status = response.status();
    let body = parse_body(
        response
            .text()
            .await
            .map_err(|e| transport_error(e, DEFAULT_PROVIDER_TIMEOUT))?,
    );
    let run_status = body
        .pointer("/data/attributes/status")
        .cloned()
        .unwrap_or(Value::Null);

    Ok(json!({
        "ok": status.is_success(),
        "statusCode": status.as_u16(),
        "status": run_status,
        "run": body.get("data").cloned().unwrap_or(Value::Null),
    }))
}
