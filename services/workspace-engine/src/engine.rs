//! Wires the store, policy, dispatch, verification and reconcile layers
//! into one workspace engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use ctrlplane_events::{InMemoryProducer, Message, Producer};
use ctrlplane_id::VersionId;
use ctrlplane_trace::{InMemoryStore, TokenSigner, TriggerReason};

use crate::config::Config;
use crate::jobdispatch::{
    builtin_registry, DispatcherRegistry, JobDispatchService, JobUpdateConsumer,
};
use crate::model::ReleaseTarget;
use crate::policy::{DeployDecision, PolicyManager};
use crate::reconcile::{
    ChangeRouter, ReconcileError, ReconcileHooks, ReconcileRequest, ReconcileResult,
    ReconcileWorker, ReleaseTargetReconciler,
};
use crate::store::{EntityKind, Store, StoreError};
use crate::verification::{
    MeasurementExecutor, ProviderExecutor, StoreExecutor, Ticker, TokioTicker,
    VerificationScheduler,
};

/// Receivers handed to the background tasks on [`WorkspaceEngine::spawn`].
struct Channels {
    requests: mpsc::UnboundedReceiver<ReconcileRequest>,
    messages: mpsc::UnboundedReceiver<Message>,
}

/// Overrides for the engine's pluggable parts.
#[derive(Default)]
pub struct EngineParts {
    pub registry: Option<DispatcherRegistry>,
    pub executor: Option<Arc<dyn MeasurementExecutor>>,
    pub ticker: Option<Arc<dyn Ticker>>,
}

pub struct WorkspaceEngine {
    config: Config,
    store: Arc<Store>,
    producer: Arc<InMemoryProducer>,
    traces: Arc<InMemoryStore>,
    signer: Arc<TokenSigner>,
    verifications: VerificationScheduler,
    reconciler: Arc<ReleaseTargetReconciler>,
    requests: mpsc::UnboundedSender<ReconcileRequest>,
    channels: Mutex<Option<Channels>>,
    /// Self-resolving dispatches still waiting out their delay.
    dispatch_tasks: TaskTracker,
}

impl WorkspaceEngine {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_parts(config, EngineParts::default())
    }

    pub fn with_parts(config: Config, parts: EngineParts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let store = Arc::new(Store::new(config.workspace_id.clone()));
        let (producer, messages) = InMemoryProducer::channel();
        let producer = Arc::new(producer);
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let dispatch_tasks = TaskTracker::new();

        let registry = parts.registry.unwrap_or_else(|| {
            builtin_registry(
                Arc::clone(&store),
                producer.clone(),
                client.clone(),
                config.auto_resolve_delay,
                dispatch_tasks.clone(),
            )
        });
        let dispatch = Arc::new(JobDispatchService::new(
            Arc::clone(&store),
            registry,
            producer.clone(),
            config.retry_policy(),
        ));

        let executor = parts.executor.unwrap_or_else(|| {
            Arc::new(StoreExecutor::new(
                Arc::clone(&store),
                ProviderExecutor::new(client),
            ))
        });
        let verifications = VerificationScheduler::new(
            Arc::clone(&store),
            executor,
            Arc::new(ReconcileHooks::new(Arc::clone(&store), requests.clone())),
            parts.ticker.unwrap_or_else(|| Arc::new(TokioTicker)),
            config.scheduler_config(),
        );

        let traces = Arc::new(InMemoryStore::new());
        let signer = Arc::new(config.token_signer());
        let reconciler = Arc::new(ReleaseTargetReconciler::new(
            Arc::clone(&store),
            dispatch,
            verifications.clone(),
            traces.clone(),
            Arc::clone(&signer),
            config.reconciler_config(),
        ));

        Ok(Self {
            config,
            store,
            producer,
            traces,
            signer,
            verifications,
            reconciler,
            requests,
            channels: Mutex::new(Some(Channels {
                requests: requests_rx,
                messages,
            })),
            dispatch_tasks,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn traces(&self) -> &Arc<InMemoryStore> {
        &self.traces
    }

    pub fn token_signer(&self) -> &Arc<TokenSigner> {
        &self.signer
    }

    pub fn verifications(&self) -> &VerificationScheduler {
        &self.verifications
    }

    pub fn reconciler(&self) -> &Arc<ReleaseTargetReconciler> {
        &self.reconciler
    }

    pub fn policy_manager(&self) -> PolicyManager {
        PolicyManager::new(self.store.clone())
    }

    /// Queue a reconciliation for the worker.
    pub fn enqueue(&self, target: ReleaseTarget, trigger: TriggerReason) {
        if self
            .requests
            .send(ReconcileRequest::new(target, trigger))
            .is_err()
        {
            warn!("Reconcile queue closed, dropping request");
        }
    }

    /// Reconcile `target` right away, outside the worker.
    pub async fn reconcile_now(
        &self,
        target: &ReleaseTarget,
    ) -> Result<ReconcileResult, ReconcileError> {
        self.reconciler
            .reconcile(target, TriggerReason::Manual)
            .await
    }

    /// Every policy's verdict on deploying `version_id` to `target`.
    pub async fn preview(
        &self,
        target: &ReleaseTarget,
        version_id: &VersionId,
    ) -> Result<DeployDecision, ReconcileError> {
        let entities = self.store.target_entities(target)?;
        let version = self
            .store
            .versions
            .get(version_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::DeploymentVersion, version_id))?;
        Ok(self
            .policy_manager()
            .evaluate_release_target(target, &entities, &version, Utc::now())
            .await)
    }

    /// Sync release targets, resume unfinished verifications and queue a
    /// first-boot reconciliation for every target. Returns the number of
    /// targets queued.
    pub async fn boot(&self) -> usize {
        self.store.sync_release_targets();
        let restored = self.verifications.restore().await;
        let targets = self.store.release_targets.items();
        for target in &targets {
            self.enqueue(target.clone(), TriggerReason::FirstBoot);
        }
        info!(targets = targets.len(), restored, "Engine booted");
        targets.len()
    }

    /// Start the reconcile worker, the job update consumer and the change
    /// router. Fails if called twice.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let Channels { requests, messages } = self
            .channels
            .lock()
            .take()
            .context("Engine tasks already spawned")?;

        let worker = ReconcileWorker::new(
            Arc::clone(&self.reconciler),
            self.config.reconcile_interval,
        );
        let worker_handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                worker.run(requests, shutdown).await;
            }
        });

        let consumer = JobUpdateConsumer::new(Arc::clone(&self.store), self.requests.clone());
        let consumer_handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                consumer.run(messages, shutdown).await;
            }
        });

        let router = ChangeRouter::new(Arc::clone(&self.store), self.requests.clone());
        let changes = self.store.subscribe();
        let router_handle = tokio::spawn(async move {
            router.run(changes, shutdown).await;
        });

        Ok(vec![worker_handle, consumer_handle, router_handle])
    }

    /// Stop verification loops, let pending test-runner resolutions finish,
    /// then close the producer. Stored state is left as is so a restart can
    /// resume it.
    pub async fn shutdown(&self) {
        self.verifications.shutdown().await;
        self.dispatch_tasks.close();
        self.dispatch_tasks.wait().await;
        self.producer.close().await;
        info!("Workspace engine stopped");
    }
}
