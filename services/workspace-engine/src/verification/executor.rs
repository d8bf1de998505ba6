use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::ProviderError;
use super::providers::{ProviderContext, ProviderExecutor};
use crate::model::{MetricSpec, ReleaseVerification};
use crate::store::Store;

/// Takes one raw reading for a metric.
#[async_trait]
pub trait MeasurementExecutor: Send + Sync {
    async fn execute(
        &self,
        verification: &ReleaseVerification,
        metric: &MetricSpec,
    ) -> Result<Value, ProviderError>;
}

/// Resolves the provider context from the store, then runs the provider.
pub struct StoreExecutor {
    store: Arc<Store>,
    providers: ProviderExecutor,
}

impl StoreExecutor {
    pub fn new(store: Arc<Store>, providers: ProviderExecutor) -> Self {
        Self { store, providers }
    }

    fn context(&self, verification: &ReleaseVerification) -> Result<ProviderContext, ProviderError> {
        let release = self
            .store
            .releases
            .get(&verification.release_id)
            .ok_or_else(|| {
                ProviderError::MissingContext(format!("release {}", verification.release_id))
            })?;
        let entities = self
            .store
            .target_entities(&release.release_target)
            .map_err(|e| ProviderError::MissingContext(e.to_string()))?;
        Ok(ProviderContext {
            version: release.version.clone(),
            target: release.release_target.clone(),
            variables: release.variables.clone(),
            release,
            resource: entities.resource,
            environment: entities.environment,
            deployment: entities.deployment,
        })
    }
}

#[async_trait]
impl MeasurementExecutor for StoreExecutor {
    async fn execute(
        &self,
        verification: &ReleaseVerification,
        metric: &MetricSpec,
    ) -> Result<Value, ProviderError> {
        let context = self.context(verification)?.to_value()?;
        self.providers.measure(&metric.provider, &context).await
    }
}
