//! Waits between measurements.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Ticker: Send + Sync {
    /// Resolve after `interval`.
    async fn wait(&self, interval: Duration);
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTicker;

#[async_trait]
impl Ticker for TokioTicker {
    async fn wait(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// Returns at once. Makes metric loops run back to back in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateTicker;

#[async_trait]
impl Ticker for ImmediateTicker {
    async fn wait(&self, _interval: Duration) {
        tokio::task::yield_now().await;
    }
}
