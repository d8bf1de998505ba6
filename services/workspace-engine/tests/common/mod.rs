//! Shared helpers for the workspace engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ctrlplane_id::{VerificationId, WorkspaceId};
use ctrlplane_workspace_engine::demo::Snapshot;
use ctrlplane_workspace_engine::model::{
    MetricProvider, MetricSpec, ReleaseTarget, ReleaseVerification, SleepProvider,
    VerificationMeasurement, VerificationStatus,
};
use ctrlplane_workspace_engine::store::Store;
use ctrlplane_workspace_engine::verification::{
    HookResult, MeasurementExecutor, ProviderError, Ticker, VerificationHooks,
};

/// One deployment, one environment, one kubernetes resource. No job agent
/// and no policies; tests add what they need.
pub const BASE_WORKSPACE: &str = r#"
deployments:
  - id: api
    name: API
    slug: api
    systemId: sys
environments:
  - id: production
    name: production
    systemId: sys
    createdAt: 2024-01-01T00:00:00Z
    resourceSelector:
      type: kind
      operator: equals
      value: kubernetes
resources:
  - id: cluster-1
    workspaceId: ws
    name: cluster-1
    kind: kubernetes
    identifier: cluster-1
    version: v1
    createdAt: 2024-01-01T00:00:00Z
versions:
  - id: v1
    deploymentId: api
    tag: 1.0.0
    name: api 1.0.0
    status: ready
    createdAt: 2024-01-01T00:00:00Z
  - id: v2
    deploymentId: api
    tag: 2.0.0
    name: api 2.0.0
    status: ready
    createdAt: 2024-02-01T00:00:00Z
"#;

pub fn workspace_id() -> WorkspaceId {
    WorkspaceId::from("ws")
}

/// A store loaded with [`BASE_WORKSPACE`] and then `extra`.
pub fn store_with(extra: &str) -> Arc<Store> {
    let store = Arc::new(Store::new(workspace_id()));
    load(&store, extra);
    store
}

/// Load [`BASE_WORKSPACE`] and `extra` into an existing store.
pub fn load(store: &Store, extra: &str) {
    apply(store, BASE_WORKSPACE);
    if !extra.trim().is_empty() {
        apply(store, extra);
    }
}

/// Upsert the entities of one YAML snapshot.
pub fn apply(store: &Store, yaml: &str) {
    Snapshot::from_yaml(yaml).unwrap().apply(store);
}

pub fn target() -> ReleaseTarget {
    ReleaseTarget::new("api", "production", "cluster-1")
}

/// `result.statusCode == 200` over a sleep provider.
pub fn status_metric(count: u32, failure_threshold: Option<u32>) -> MetricSpec {
    MetricSpec {
        name: "health".to_string(),
        count,
        interval_seconds: 1,
        success_condition: "result.statusCode == 200".to_string(),
        failure_condition: None,
        success_threshold: None,
        failure_threshold,
        provider: MetricProvider::Sleep(SleepProvider {
            duration_seconds: 0,
            data: json!({"statusCode": 200}),
        }),
    }
}

/// Answers each measurement with the next scripted status code, then 200.
#[derive(Default)]
pub struct ScriptedExecutor {
    codes: Mutex<VecDeque<u16>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Arc<Self> {
        Arc::new(Self {
            codes: Mutex::new(codes.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeasurementExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _verification: &ReleaseVerification,
        _metric: &MetricSpec,
    ) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = self.codes.lock().pop_front().unwrap_or(200);
        Ok(json!({"statusCode": code}))
    }
}

/// `status_metric` under another name.
pub fn named_metric(name: &str, count: u32, failure_threshold: Option<u32>) -> MetricSpec {
    MetricSpec {
        name: name.to_string(),
        ..status_metric(count, failure_threshold)
    }
}

/// Like [`ScriptedExecutor`], with a separate script per metric name.
#[derive(Default)]
pub struct MetricScripts {
    codes: Mutex<HashMap<String, VecDeque<u16>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MetricScripts {
    pub fn new<'a>(scripts: impl IntoIterator<Item = (&'a str, Vec<u16>)>) -> Arc<Self> {
        Arc::new(Self {
            codes: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(name, codes)| (name.to_string(), codes.into()))
                    .collect(),
            ),
            calls: Mutex::default(),
        })
    }

    pub fn calls(&self, metric: &str) -> usize {
        self.calls.lock().get(metric).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MeasurementExecutor for MetricScripts {
    async fn execute(
        &self,
        _verification: &ReleaseVerification,
        metric: &MetricSpec,
    ) -> Result<Value, ProviderError> {
        *self.calls.lock().entry(metric.name.clone()).or_default() += 1;
        let code = self
            .codes
            .lock()
            .get_mut(&metric.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(200);
        Ok(json!({"statusCode": code}))
    }
}

/// Records every hook call as a short string.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn push(&self, event: String) -> HookResult {
        self.events.lock().push(event);
        Ok(())
    }
}

#[async_trait]
impl VerificationHooks for RecordingHooks {
    async fn on_verification_started(&self, _verification: &ReleaseVerification) -> HookResult {
        self.push("started".to_string())
    }

    async fn on_measurement_taken(
        &self,
        _verification: &ReleaseVerification,
        metric_index: usize,
        _measurement: &VerificationMeasurement,
    ) -> HookResult {
        self.push(format!("measurement:{metric_index}"))
    }

    async fn on_metric_complete(
        &self,
        _verification: &ReleaseVerification,
        metric_index: usize,
    ) -> HookResult {
        self.push(format!("metric_complete:{metric_index}"))
    }

    async fn on_verification_complete(&self, verification: &ReleaseVerification) -> HookResult {
        self.push(format!("complete:{}", verification.status()))
    }

    async fn on_verification_stopped(&self, _verification: &ReleaseVerification) -> HookResult {
        self.push("stopped".to_string())
    }
}

/// Never fires; metric loops take one measurement and park.
pub struct ParkedTicker;

#[async_trait]
impl Ticker for ParkedTicker {
    async fn wait(&self, _interval: Duration) {
        std::future::pending::<()>().await;
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached in time");
}

pub async fn wait_for_status(store: &Store, id: &VerificationId, status: VerificationStatus) {
    wait_until(|| {
        store
            .verifications
            .get(id)
            .is_some_and(|v| v.status() == status)
    })
    .await;
}

/// Run `future` with a deadline so a hung task fails instead of blocking.
pub async fn bounded<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
