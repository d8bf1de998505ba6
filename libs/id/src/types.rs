//! Typed ID definitions for every entity the engine touches.

use crate::define_id;

// =============================================================================
// Topology
// =============================================================================

define_id!(WorkspaceId);
define_id!(SystemId);
define_id!(DeploymentId);
define_id!(EnvironmentId);
define_id!(ResourceId);

// =============================================================================
// Release Model
// =============================================================================

define_id!(VersionId);
define_id!(ReleaseId);
define_id!(JobId);
define_id!(JobAgentId);

// =============================================================================
// Policy
// =============================================================================

define_id!(PolicyId);
define_id!(RuleId);
define_id!(UserId);
define_id!(SkipId);

// =============================================================================
// Verification and Tracing
// =============================================================================

define_id!(VerificationId);
define_id!(TraceId);
define_id!(SpanId);

impl TraceId {
    /// Creates a W3C-style trace id: 32 lowercase hex characters.
    #[must_use]
    pub fn new_hex() -> Self {
        Self::from(crate::__uuid::Uuid::new_v4().simple().to_string())
    }
}

impl SpanId {
    /// Creates a W3C-style span id: 16 lowercase hex characters.
    #[must_use]
    pub fn new_hex() -> Self {
        let full = crate::__uuid::Uuid::new_v4().simple().to_string();
        Self::from(full[..16].to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
