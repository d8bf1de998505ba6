//! Job dispatch.
//!
//! A [`Dispatcher`] per executor vendor, a [`DispatcherRegistry`] keyed by
//! job agent type, the [`JobDispatchService`] call site that owns retry,
//! and the [`JobUpdateConsumer`] that folds agent updates back into the
//! job store.

mod argocd;
mod consumer;
mod dispatcher;
mod error;
mod service;
mod terraform;
mod test_runner;

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use ctrlplane_events::Producer;

pub use argocd::{ArgoCdDispatcher, ARGO_CD};
pub use consumer::JobUpdateConsumer;
pub use dispatcher::{decode_config, DispatchJob, DispatchOutcome, Dispatcher, DispatcherRegistry};
pub use error::DispatchError;
pub use service::JobDispatchService;
pub use terraform::{
    TerraformCloudDispatcher, VariableCategory, VcsRepo, WorkspaceTemplate, WorkspaceVariable,
    TERRAFORM_CLOUD,
};
pub use test_runner::{TestRunnerDispatcher, DEFAULT_AUTO_RESOLVE_DELAY, TEST_RUNNER};

use crate::store::Store;

/// A registry with every built-in dispatcher. Test-runner resolutions are
/// spawned on `tasks`.
pub fn builtin_registry(
    store: Arc<Store>,
    producer: Arc<dyn Producer>,
    client: reqwest::Client,
    auto_resolve_delay: std::time::Duration,
    tasks: TaskTracker,
) -> DispatcherRegistry {
    let mut registry = DispatcherRegistry::new();
    registry
        .register(Arc::new(
            TestRunnerDispatcher::new(store, producer)
                .with_default_delay(auto_resolve_delay)
                .with_tracker(tasks),
        ))
        .register(Arc::new(TerraformCloudDispatcher::new(client.clone())))
        .register(Arc::new(ArgoCdDispatcher::new(client)));
    registry
}
