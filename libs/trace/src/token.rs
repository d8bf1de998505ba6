//! Signed trace tokens.
//!
//! Format: `base64url(payload) "." base64url(HMAC-SHA256(payload))` where
//! `payload = "{traceId}:{jobId}:{expiresAtUnix}"`.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ctrlplane_id::{JobId, TraceId};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceToken {
    pub trace_id: TraceId,
    pub job_id: JobId,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates trace tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    default_ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[redacted]")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            default_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Signer with a random 32-byte secret. Tokens do not survive restarts.
    pub fn random() -> Self {
        Self::new(rand::random::<[u8; 32]>().to_vec())
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token expiring `ttl` from now.
    pub fn generate(
        &self,
        trace_id: &TraceId,
        job_id: &JobId,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| TokenError::InvalidFormat)?;
        self.generate_at(trace_id, job_id, Utc::now() + ttl)
    }

    /// Issue a token with the signer's default TTL.
    pub fn generate_default(&self, trace_id: &TraceId, job_id: &JobId) -> Result<String, TokenError> {
        self.generate(trace_id, job_id, self.default_ttl)
    }

    fn generate_at(
        &self,
        trace_id: &TraceId,
        job_id: &JobId,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let payload = format!("{}:{}:{}", trace_id, job_id, expires_at.timestamp());
        let signature = self.sign(payload.as_bytes())?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Validate a token against the current time.
    pub fn validate(&self, token: &str) -> Result<TraceToken, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token against `now`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<TraceToken, TokenError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(TokenError::InvalidFormat)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::InvalidFormat)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidFormat)?;

        let expected = self.sign(&payload)?;
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            return Err(TokenError::InvalidSignature);
        }

        let payload = String::from_utf8(payload).map_err(|_| TokenError::InvalidFormat)?;
        let (ids, expires) = payload.rsplit_once(':').ok_or(TokenError::InvalidFormat)?;
        let (trace_id, job_id) = ids.split_once(':').ok_or(TokenError::InvalidFormat)?;
        let expires: i64 = expires.parse().map_err(|_| TokenError::InvalidFormat)?;
        let expires_at = DateTime::from_timestamp(expires, 0).ok_or(TokenError::InvalidFormat)?;

        if now > expires_at {
            return Err(TokenError::Expired);
        }

        Ok(TraceToken {
            trace_id: TraceId::parse(trace_id).map_err(|_| TokenError::InvalidFormat)?,
            job_id: JobId::parse(job_id).map_err(|_| TokenError::InvalidFormat)?,
            expires_at,
        })
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
