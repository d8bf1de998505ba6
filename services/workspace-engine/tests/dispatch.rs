//! Job dispatchers and the dispatch service against mock vendors.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ctrlplane_events::{EventEnvelope, InMemoryProducer, JobStatus};
use ctrlplane_id::{JobAgentId, VersionId};
use ctrlplane_reconcile::{ErrorKind, RetryPolicy};
use ctrlplane_workspace_engine::jobdispatch::{
    ArgoCdDispatcher, DispatchError, DispatchJob, Dispatcher, DispatcherRegistry,
    JobDispatchService, TerraformCloudDispatcher,
};
use ctrlplane_workspace_engine::model::{Job, JsonMap, Release};
use ctrlplane_workspace_engine::store::Store;

const WORKSPACE_TEMPLATE: &str = r#"
workspaceTemplate:
  name: api-production
  autoApply: true
  variables:
    - key: image_tag
      value: "2.0.0"
      category: terraform
    - key: TF_LOG
      value: info
      category: env
"#;

fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn terraform_job(address: &str, template: &str) -> DispatchJob {
    let config = object(json!({
        "address": address,
        "organization": "acme",
        "token": "tfc-token",
        "template": template,
    }));
    DispatchJob {
        job: Job::new("rel".into(), Some(JobAgentId::from("tfc")), config.clone()),
        config,
        context: Value::Null,
    }
}

fn json_api(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"data": {"id": id}}))
}

#[tokio::test]
async fn test_terraform_creates_workspace_syncs_variables_and_queues_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/organizations/acme/workspaces/api-production"))
        .and(header("Authorization", "Bearer tfc-token"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/organizations/acme/workspaces"))
        .and(body_partial_json(json!({
            "data": {"type": "workspaces", "attributes": {"name": "api-production", "auto-apply": true}}
        })))
        .respond_with(json_api("ws-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/workspaces/ws-1/vars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "var-1", "attributes": {"key": "image_tag"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-1"))
        .and(body_partial_json(json!({"data": {"attributes": {"value": "2.0.0"}}})))
        .respond_with(json_api("var-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/workspaces/ws-1/vars"))
        .and(body_partial_json(json!({"data": {"attributes": {"key": "TF_LOG", "category": "env"}}})))
        .respond_with(json_api("var-2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/runs"))
        .and(body_partial_json(json!({
            "data": {"relationships": {"workspace": {"data": {"id": "ws-1"}}}}
        })))
        .respond_with(json_api("run-1"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = TerraformCloudDispatcher::new(reqwest::Client::new())
        .dispatch_job(&terraform_job(&server.uri(), WORKSPACE_TEMPLATE))
        .await
        .unwrap();

    assert_eq!(outcome.external_id.as_deref(), Some("run-1"));
    assert_eq!(outcome.metadata["terraformCloud.workspaceId"], "ws-1");
    assert_eq!(
        outcome.metadata["ctrlplane/links"],
        format!("{}/app/acme/workspaces/api-production/runs/run-1", server.uri())
    );
}

#[tokio::test]
async fn test_terraform_updates_existing_workspace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/organizations/acme/workspaces/api-production"))
        .respond_with(json_api("ws-9"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/workspaces/ws-9"))
        .respond_with(json_api("ws-9"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/runs"))
        .respond_with(json_api("run-2"))
        .mount(&server)
        .await;

    let outcome = TerraformCloudDispatcher::new(reqwest::Client::new())
        .dispatch_job(&terraform_job(
            &server.uri(),
            "workspaceTemplate:\n  name: api-production\n",
        ))
        .await
        .unwrap();
    assert_eq!(outcome.external_id.as_deref(), Some("run-2"));
    assert_eq!(outcome.metadata["terraformCloud.workspaceId"], "ws-9");
}

#[tokio::test]
async fn test_terraform_unauthorized_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let err = TerraformCloudDispatcher::new(reqwest::Client::new())
        .dispatch_job(&terraform_job(&server.uri(), WORKSPACE_TEMPLATE))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Vendor { status: 401, .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

/// An address nothing listens on.
fn closed_port() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn test_terraform_connection_refused_is_transient() {
    let err = TerraformCloudDispatcher::new(reqwest::Client::new())
        .dispatch_job(&terraform_job(&closed_port(), WORKSPACE_TEMPLATE))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DispatchError::Transport { transient: true, .. }),
        "{err:?}"
    );
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.to_string().to_lowercase().contains("refused"), "{err}");
}

#[tokio::test]
async fn test_terraform_missing_organization_is_a_config_error() {
    let mut job = terraform_job("http://127.0.0.1:9", WORKSPACE_TEMPLATE);
    job.config.remove("organization");

    let err = TerraformCloudDispatcher::new(reqwest::Client::new())
        .dispatch_job(&job)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConfig { .. }));
    assert!(err.to_string().contains("organization"));
}

/// A store holding release `v1` of the base target and an argo-cd agent
/// pointed at `server_url`.
fn argo_workspace(server_url: &str) -> (Arc<Store>, Job) {
    let store = common::store_with(&format!(
        r#"
jobAgents:
  - id: argo
    name: Argo
    type: argo-cd
    config:
      serverUrl: {server_url}
      apiKey: argo-key
"#
    ));
    let version = store.versions.get(&VersionId::from("v1")).unwrap();
    let release = Release::new(common::target(), version, Default::default());
    store.releases.upsert(release.clone());

    let config = object(json!({
        "serverUrl": server_url,
        "apiKey": "argo-key",
        "template": "metadata:\n  name: \"{{deployment.slug}}-{{environment.name}}\"\nspec:\n  source:\n    targetRevision: \"{{version.tag}}\"\n",
    }));
    let job = Job::new(release.id(), Some(JobAgentId::from("argo")), config);
    store.jobs.upsert(job.clone());
    (store, job)
}

fn service(store: &Arc<Store>, producer: Arc<InMemoryProducer>) -> JobDispatchService {
    let mut registry = DispatcherRegistry::new();
    registry.register(Arc::new(ArgoCdDispatcher::new(reqwest::Client::new())));
    JobDispatchService::new(
        Arc::clone(store),
        registry,
        producer,
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
    )
}

#[tokio::test]
async fn test_service_retries_transient_vendor_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications"))
        .and(query_param("upsert", "true"))
        .and(header("Authorization", "Bearer argo-key"))
        .and(body_partial_json(json!({
            "metadata": {"name": "api-production"},
            "spec": {"source": {"targetRevision": "1.0.0"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (store, job) = argo_workspace(&server.uri());
    let producer = Arc::new(InMemoryProducer::new());
    let dispatched = service(&store, producer.clone()).dispatch(&job).await.unwrap();

    assert_eq!(dispatched.status, JobStatus::InProgress);
    assert_eq!(dispatched.external_id.as_deref(), Some("api-production"));
    assert_eq!(
        dispatched.metadata["ctrlplane/links"],
        format!("{}/applications/api-production", server.uri())
    );
    assert_eq!(store.jobs.get(&job.id).unwrap().status, JobStatus::InProgress);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert!(producer.published().await.is_empty());
}

#[tokio::test]
async fn test_service_marks_job_failed_on_fatal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/applications"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .expect(1)
        .mount(&server)
        .await;

    let (store, job) = argo_workspace(&server.uri());
    let producer = Arc::new(InMemoryProducer::new());
    let err = service(&store, producer.clone())
        .dispatch(&job)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);

    let stored = store.jobs.get(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Failure);
    assert!(stored.completed_at.is_some());
    assert!(stored.message.unwrap().contains("permission denied"));

    let published = producer.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, b"ws");
    let envelope = EventEnvelope::<Value>::decode(&published[0].value).unwrap();
    assert_eq!(envelope.event_type, "job.updated");
}

#[tokio::test]
async fn test_service_rejects_unknown_agent_type() {
    let (store, _) = argo_workspace("http://127.0.0.1:9");
    let mut registry = DispatcherRegistry::new();
    registry.register(Arc::new(TerraformCloudDispatcher::new(reqwest::Client::new())));
    let service = JobDispatchService::new(
        Arc::clone(&store),
        registry,
        Arc::new(InMemoryProducer::new()),
        RetryPolicy::none(),
    );

    let job = store.jobs.items().into_iter().next().unwrap();
    let err = service.dispatch(&job).await.unwrap_err();
    assert!(matches!(err, DispatchError::UnknownAgentType(ref t) if t == "argo-cd"));
    assert_eq!(store.jobs.get(&job.id).unwrap().status, JobStatus::Failure);
}
