//! The dispatcher contract and registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::DispatchError;
use crate::model::{Job, JsonMap};

/// A job ready to hand to a vendor.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub job: Job,
    /// Agent config with every template rendered.
    pub config: JsonMap,
    /// The templatable job, for dispatchers that render more templates
    /// after decoding their config.
    pub context: Value,
}

/// What the vendor handed back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Vendor-side handle: run id, application name.
    pub external_id: Option<String>,
    pub message: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl DispatchOutcome {
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            external_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One executor vendor.
///
/// Dispatchers make a single attempt. Retries happen at the call site.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// The job agent `type` this dispatcher serves.
    fn agent_type(&self) -> &'static str;

    async fn dispatch_job(&self, job: &DispatchJob) -> Result<DispatchOutcome, DispatchError>;
}

/// Dispatchers keyed by job agent type.
#[derive(Default, Clone)]
pub struct DispatcherRegistry {
    dispatchers: HashMap<&'static str, Arc<dyn Dispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher, replacing any other for the same type.
    pub fn register(&mut self, dispatcher: Arc<dyn Dispatcher>) -> &mut Self {
        self.dispatchers.insert(dispatcher.agent_type(), dispatcher);
        self
    }

    pub fn get(&self, agent_type: &str) -> Result<Arc<dyn Dispatcher>, DispatchError> {
        self.dispatchers
            .get(agent_type)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAgentType(agent_type.to_string()))
    }

    pub fn agent_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.dispatchers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

/// Decode an agent config into a vendor schema. Serde names the missing
/// or mistyped field in the message.
pub fn decode_config<T: DeserializeOwned>(
    agent: &'static str,
    config: &JsonMap,
) -> Result<T, DispatchError> {
    serde_json::from_value(Value::Object(config.clone())).map_err(|e| {
        DispatchError::InvalidConfig {
            agent,
            message: e.to_string(),
        }
    })
}

/// Turn a non-success response into [`DispatchError::Vendor`].
pub(crate) async fn check_response(
    vendor: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(DispatchError::Vendor {
        vendor,
        status: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            message
        },
    })
}

/// Wrap a client error. The message carries the whole source chain, since
/// the top-level reqwest message omits the OS-level cause.
pub(crate) fn transport(vendor: &'static str) -> impl Fn(reqwest::Error) -> DispatchError {
    move |e| DispatchError::Transport {
        vendor,
        transient: e.is_connect() || e.is_timeout(),
        message: error_chain(&e),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct Vendor {
        server_url: String,
    }

    struct Fake;

    #[async_trait]
    impl Dispatcher for Fake {
        fn agent_type(&self) -> &'static str {
            "fake"
        }

        async fn dispatch_job(&self, _job: &DispatchJob) -> Result<DispatchOutcome, DispatchError> {
            Ok(DispatchOutcome::default())
        }
    }

    #[test]
    fn test_decode_config_names_missing_field() {
        let config = json!({"apiKey": "k"}).as_object().cloned().unwrap();
        let err = decode_config::<Vendor>("fake", &config).unwrap_err();
        assert!(err.to_string().contains("serverUrl"), "{err}");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("error sending request")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_error_chain_includes_causes() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(error_chain(&err), "error sending request: connection refused");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = DispatcherRegistry::new();
        registry.register(Arc::new(Fake));
        assert!(registry.get("fake").is_ok());
        assert!(matches!(
            registry.get("jenkins"),
            Err(DispatchError::UnknownAgentType(t)) if t == "jenkins"
        ));
        assert_eq!(registry.agent_types(), vec!["fake"]);
    }
}
