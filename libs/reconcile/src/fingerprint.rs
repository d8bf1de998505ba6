//! Content fingerprints.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical form of a JSON value, hex encoded.
///
/// Object keys are visited in sorted order, so two values that differ only
/// in key insertion order share a fingerprint. Array order is significant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_json(value: &Value) -> Self {
        let mut hasher = Sha256::new();
        feed(&mut hasher, value);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn of<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::of_json(&serde_json::to_value(value)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Streams the compact, key-sorted JSON encoding of `value` into `hasher`.
fn feed(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                feed_str(hasher, key);
                hasher.update(b":");
                feed(hasher, &map[key]);
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                feed(hasher, item);
            }
            hasher.update(b"]");
        }
        Value::String(s) => feed_str(hasher, s),
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}

fn feed_str(hasher: &mut Sha256, s: &str) {
    // Display on a string Value yields its quoted, escaped JSON form.
    hasher.update(Value::from(s).to_string().as_bytes());
}
