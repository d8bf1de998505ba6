use chrono::Utc;
use serde_json::{json, Value};

use super::{parse_body, transport_error, DEFAULT_PROVIDER_TIMEOUT};
use crate::model::DatadogProvider;
use crate::template::render_str;
use crate::verification::error::ProviderError;

/// Query the metrics API over the trailing window.
///
/// Reports `{ok, statusCode, body, value}` where `value` is the last point
/// of the first series, or null.
pub async fn measure_datadog(
    client: &reqwest::Client,
    provider: &DatadogProvider,
    context: &Value,
) -> Result<Value, ProviderError> {
    let query = render_str(&provider.query, context)?;
    let base = match &provider.base_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("https://api.{}", provider.site),
    };
    let to = Utc::now().timestamp();
    let from = to - provider.window_seconds.max(1);

    let response = client
        .get(format!("{base}/api/v1/query"))
        .query(&[
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("query", query),
        ])
        .header("DD-API-KEY", render_str(&provider.api_key, context)?)
        .header("DD-APPLICATION-KEY", render_str(&provider.app_key, context)?)
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
    let value = body
        .pointer("/series/0/pointlist")
        .and_then(Value::as_array)
        .and_then(|points| points.last())
        .and_then(|point| point.get(1))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(json!({
        "ok": status.is_success(),
        "statusCode": status.as_u16(),
        "body": body,
        "value": value,
    }))
}
