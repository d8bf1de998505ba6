//! # ctrlplane-id
//!
//! Typed identifiers for the entities the workspace engine reconciles.
//!
//! ## Design Principles
//!
//! - IDs are opaque strings; the engine never interprets their content
//! - Each entity kind has its own newtype so a `ResourceId` can never be
//!   passed where an `EnvironmentId` is expected
//! - Freshly minted IDs are UUIDv4 strings
//! - A release target is identified by its `(deployment, environment,
//!   resource)` triple, see [`ReleaseTargetKey`]

mod error;
mod key;
mod macros;
mod types;

pub use error::IdError;
pub use key::ReleaseTargetKey;
pub use types::*;

#[doc(hidden)]
pub use uuid as __uuid;

/// Validates the shape of an externally supplied ID.
#[doc(hidden)]
pub fn validate_id(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if let Some((position, character)) = s
        .chars()
        .enumerate()
        .find(|(_, c)| c.is_whitespace() || c.is_control())
    {
        return Err(IdError::InvalidCharacter {
            character,
            position,
        });
    }
    Ok(())
}
