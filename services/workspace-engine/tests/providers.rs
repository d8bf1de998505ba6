//! Metric providers against a mock HTTP server.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ctrlplane_workspace_engine::model::{
    DatadogProvider, HttpProvider, MetricProvider, TerraformCloudRunProvider,
};
use ctrlplane_workspace_engine::verification::{ProviderError, ProviderExecutor};

fn context() -> Value {
    json!({
        "resource": {"name": "cluster-1", "identifier": "cluster-1"},
        "environment": {"name": "production"},
        "version": {"tag": "1.4.0"},
        "variables": {"token": "s3cret"},
    })
}

fn http(url: String) -> HttpProvider {
    HttpProvider {
        url,
        method: "GET".to_string(),
        headers: BTreeMap::new(),
        body: None,
        timeout: None,
    }
}

#[tokio::test]
async fn test_http_provider_renders_templates_and_reports_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health/cluster-1"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-version", "1.4.0")
                .set_body_json(json!({"status": "ok"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut provider = http(format!("{}/health/{{{{resource.name}}}}", server.uri()));
    provider
        .headers
        .insert("Authorization".to_string(), "Bearer {{variables.token}}".to_string());

    let result = ProviderExecutor::new(reqwest::Client::new())
        .measure(&MetricProvider::Http(provider), &context())
        .await
        .unwrap();

    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["statusCode"], json!(200));
    assert_eq!(result["body"]["status"], json!("ok"));
    assert_eq!(result["headers"]["x-version"], json!("1.4.0"));
    assert!(result["durationMs"].is_u64());
}

#[tokio::test]
async fn test_http_provider_treats_server_errors_as_readings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(&server)
        .await;

    let mut provider = http(format!("{}/probe", server.uri()));
    provider.method = "post".to_string();
    provider.body = Some(r#"{"env":"{{environment.name}}"}"#.to_string());

    let result = ProviderExecutor::new(reqwest::Client::new())
        .measure(&MetricProvider::Http(provider), &context())
        .await
        .unwrap();

    assert_eq!(result["ok"], json!(false));
    assert_eq!(result["statusCode"], json!(503));
    assert_eq!(result["body"], json!("down for maintenance"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        serde_json::from_slice::<Value>(&requests[0].body).unwrap(),
        json!({"env": "production"})
    );
}

#[tokio::test]
async fn test_http_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut provider = http(server.uri());
    provider.timeout = Some("50ms".to_string());

    let err = ProviderExecutor::new(reqwest::Client::new())
        .measure(&MetricProvider::Http(provider), &context())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test]
async fn test_http_provider_rejects_bad_timeout() {
    let mut provider = http("http://127.0.0.1:9/".to_string());
    provider.timeout = Some("soon".to_string());

    let err = ProviderExecutor::new(reqwest::Client::new())
        .measure(&MetricProvider::Http(provider), &context())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_datadog_provider_reads_last_point() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", "sum:http.errors.production{*}"))
        .and(header("DD-API-KEY", "api"))
        .and(header("DD-APPLICATION-KEY", "app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "series": [{"pointlist": [[1700000000000.0, 3.0], [1700000060000.0, 0.5]]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = DatadogProvider {
        query: "sum:http.errors.{{environment.name}}{*}".to_string(),
        api_key: "api".to_string(),
        app_key: "app".to_string(),
        site: "datadoghq.com".to_string(),
        base_url: Some(server.uri()),
        window_seconds: 300,
    };

    let result = ProviderExecutor::new(reqwest::Client::new())
        .measure(&MetricProvider::Datadog(provider), &context())
        .await
        .unwrap();
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["value"], json!(0.5));
}

#[tokio::test]
async fn test_terraform_run_provider_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/runs/run-42"))
        .and(header("Authorization", "Bearer tfc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "run-42", "attributes": {"status": "applied"}}
        })))
        .mount(&server)
        .await;

    let provider = TerraformCloudRunProvider {
        address: server.uri(),
        token: "tfc-token".to_string(),
        run_id: "run-42".to_string(),
    };

    let result = ProviderExecutor::new(reqwest::Client::new())
        .measure(&MetricProvider::TerraformCloudRun(provider), &context())
        .await
        .unwrap();
    assert_eq!(result["status"], json!("applied"));
    assert_eq!(result["run"]["id"], json!("run-42"));
}
