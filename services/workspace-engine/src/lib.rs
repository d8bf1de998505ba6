//! ctrlplane workspace engine.
//!
//! The release-management core of one workspace: entity stores, the policy
//! framework, verification, job dispatch and release-target
//! reconciliation. The crate ships a `workspace-engine` binary and exposes
//! its internals as a library for integration testing and reuse.

pub mod config;
pub mod demo;
pub mod engine;
pub mod jobdispatch;
pub mod model;
pub mod policy;
pub mod reconcile;
pub mod selector;
pub mod store;
pub mod template;
pub mod verification;

#[cfg(test)]
mod test_fixtures;

pub use config::Config;
pub use engine::{EngineParts, WorkspaceEngine};
