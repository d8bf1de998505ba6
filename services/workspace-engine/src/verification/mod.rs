//! Post-deployment verification.

mod condition;
mod error;
mod executor;
mod hooks;
pub mod providers;
mod recorder;
mod scheduler;
mod ticker;

pub use condition::{classify, evaluate_condition, validate_condition};
pub use error::{ProviderError, RecorderError, VerificationError};
pub use executor::{MeasurementExecutor, StoreExecutor};
pub use hooks::{HookResult, NoopHooks, VerificationHooks};
pub use providers::{ProviderContext, ProviderExecutor};
pub use recorder::VerificationRecorder;
pub use scheduler::{SchedulerConfig, VerificationScheduler, DEFAULT_METRIC_INTERVAL};
pub use ticker::{ImmediateTicker, Ticker, TokioTicker};
