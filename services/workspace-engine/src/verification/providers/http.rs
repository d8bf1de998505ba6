use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{parse_body, parse_duration, transport_error, DEFAULT_PROVIDER_TIMEOUT};
use crate::model::HttpProvider;
use crate::template::render_str;
use crate::verification::error::ProviderError;

/// Issue the request and report `{ok, statusCode, body, headers, durationMs}`.
/// Non-2xx responses are readings, not errors.
pub async fn measure_http(
    client: &reqwest::Client,
    provider: &HttpProvider,
    context: &Value,
) -> Result<Value, ProviderError> {
    let url = render_str(&provider.url, context)?;
    let method = Method::from_bytes(provider.method.to_uppercase().as_bytes())
        .map_err(|_| ProviderError::InvalidConfig(format!("invalid method {}", provider.method)))?;
    let timeout = match &provider.timeout {
        Some(t) => parse_duration(t)?,
        None => DEFAULT_PROVIDER_TIMEOUT,
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &provider.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ProviderError::InvalidConfig(format!("invalid header name {name}")))?;
        let value = HeaderValue::from_str(&render_str(value, context)?)
            .map_err(|_| ProviderError::InvalidConfig(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }

    let mut request = client.request(method, &url).headers(headers).timeout(timeout);
    if let Some(body) = &provider.body {
        request = request.body(render_str(body, context)?);
    }

    debug!(url = %url, "HTTP metric request");
    let started = Instant::now();
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;
    let status = response.status();
    let response_headers: Map<String, Value> = response
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.to_string(), Value::from(v.to_str().ok()?))))
        .collect();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    Ok(json!({
        "ok": status.is_success(),
        "statusCode": status.as_u16(),
        "body": parse_body(text),
        "headers": response_headers,
        "durationMs": started.elapsed().as_millis() as u64,
    }))
}
