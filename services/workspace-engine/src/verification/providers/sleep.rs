use std::time::Duration;

use serde_json::{json, Value};

use crate::model::SleepProvider;
use crate::verification::error::ProviderError;

/// Wait, then report `{ok: true, ...data}`.
pub async fn measure_sleep(provider: &SleepProvider) -> Result<Value, ProviderError> {
    if provider.duration_seconds > 0 {
        tokio::time::sleep(Duration::from_secs(provider.duration_seconds)).await;
    }
    let mut result = json!({"ok": true, "durationSeconds": provider.duration_seconds});
    if let (Value::Object(out), Value::Object(data)) = (&mut result, &provider.data) {
        out.extend(data.clone());
    }
    Ok(result)
}
