//! Scope-keyed result cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ctrlplane_id::{DeploymentId, EnvironmentId, ResourceId, RuleId, VersionId};

use super::evaluator::{Evaluator, EvaluatorScope, RuleEvaluation, ScopeFields};
use crate::model::ReleaseTarget;

/// Ids of the declared scope fields. Undeclared fields are always `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopeKey {
    environment: Option<EnvironmentId>,
    version: Option<VersionId>,
    resource: Option<ResourceId>,
    deployment: Option<DeploymentId>,
    release_target: Option<ReleaseTarget>,
}

impl ScopeKey {
    fn new(fields: ScopeFields, scope: &EvaluatorScope<'_>) -> Self {
        let pick = |f: ScopeFields| fields.contains(f);
        Self {
            environment: scope
                .environment
                .filter(|_| pick(ScopeFields::ENVIRONMENT))
                .map(|e| e.id.clone()),
            version: scope
                .version
                .filter(|_| pick(ScopeFields::VERSION))
                .map(|v| v.id.clone()),
            resource: scope
                .resource
                .filter(|_| pick(ScopeFields::RESOURCE))
                .map(|r| r.id.clone()),
            deployment: scope
                .deployment
                .filter(|_| pick(ScopeFields::DEPLOYMENT))
                .map(|d| d.id.clone()),
            release_target: scope
                .release_target
                .filter(|_| pick(ScopeFields::RELEASE_TARGET))
                .cloned(),
        }
    }
}

/// Wraps an evaluator so repeated calls with the same scope identity
/// return the first result. Lives for one reconciliation.
pub struct Memoized {
    inner: Arc<dyn Evaluator>,
    cache: Mutex<HashMap<ScopeKey, RuleEvaluation>>,
}

impl Memoized {
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Evaluator for Memoized {
    async fn evaluate(&self, scope: &EvaluatorScope<'_>) -> RuleEvaluation {
        let key = ScopeKey::new(self.inner.scope_fields(), scope);
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }
        let result = self.inner.evaluate(scope).await;
        self.cache.lock().insert(key, result.clone());
        result
    }

    fn scope_fields(&self) -> ScopeFields {
        self.inner.scope_fields()
    }

    fn rule_type(&self) -> &str {
        self.inner.rule_type()
    }

    fn rule_id(&self) -> Option<&RuleId> {
        self.inner.rule_id()
    }

    fn complexity(&self) -> u32 {
        self.inner.complexity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{environment, version};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting(AtomicU32);

    #[async_trait]
    impl Evaluator for Counting {
        async fn evaluate(&self, _scope: &EvaluatorScope<'_>) -> RuleEvaluation {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            RuleEvaluation::allow(format!("call {n}"))
        }

        fn scope_fields(&self) -> ScopeFields {
            ScopeFields::VERSION
        }

        fn rule_type(&self) -> &str {
            "counting"
        }

        fn rule_id(&self) -> Option<&RuleId> {
            None
        }

        fn complexity(&self) -> u32 {
            0
        }
    }

    #[tokio::test]
    async fn test_cache_keyed_by_declared_fields_only() {
        let inner = Arc::new(Counting(AtomicU32::new(0)));
        let memo = Memoized::new(inner.clone());
        let (v1, v2) = (version("v1", 0), version("v2", 1));
        let (staging, prod) = (environment("staging"), environment("prod"));
        let now = Utc::now();

        let a = EvaluatorScope::new(now).with_version(&v1).with_environment(&staging);
        let b = EvaluatorScope::new(now).with_version(&v1).with_environment(&prod);
        let c = EvaluatorScope::new(now).with_version(&v2);

        assert_eq!(memo.evaluate(&a).await.message, "call 0");
        // Environment is not declared, so this is a hit.
        assert_eq!(memo.evaluate(&b).await.message, "call 0");
        assert_eq!(memo.evaluate(&c).await.message, "call 1");
        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
    }
}
