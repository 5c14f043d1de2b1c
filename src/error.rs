//! DRMAA2 error types.
//!
//! Every failure is reported synchronously at the call site that triggered
//! it. Nothing in this crate retries on its own.
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Transient** | `TryLater`, `DrmCommunicationFailure`, `Timeout` | Caller may retry or re-wait |
//! | **Caller** | `InvalidArgument`, `InvalidSession`, `InvalidState` | Fix the call |
//! | **Backend** | `DeniedByDrms`, `UnsupportedAttribute`, `UnsupportedOperation`, `ImplementationSpecific` | Check `supports()` / policy |
//! | **Local** | `Internal`, `OutOfResource` | Abort |
//! | **Group** | `Partial` | Inspect per-member failures |

use thiserror::Error;

use crate::job::JobId;

/// Errors that can occur in DRMAA2 operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DrmaaError {
    // ── Backend policy and availability ──────────────────────────────
    /// The DRM system rejected the operation for security reasons.
    #[error("Denied by DRMS: {0}")]
    DeniedByDrms(String),

    /// The DRM system could not be contacted. Transience is unknown.
    #[error("DRM communication failure: {0}")]
    DrmCommunicationFailure(String),

    /// Transient overload; the caller is advised to retry.
    #[error("Try later: {0}")]
    TryLater(String),

    /// A wait primitive's deadline elapsed without its condition being met.
    #[error("Timeout: {0}")]
    Timeout(String),

    // ── Local failures ───────────────────────────────────────────────
    /// Unexpected library-internal failure.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Local resource exhaustion.
    #[error("Out of resource: {0}")]
    OutOfResource(String),

    // ── Caller errors ────────────────────────────────────────────────
    /// A parameter violates a documented precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session handle was closed or its session destroyed.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The requested verb is not valid in the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ── Capability gaps ──────────────────────────────────────────────
    /// An optional attribute is not supported by the active backend.
    #[error("Unsupported attribute: {0}")]
    UnsupportedAttribute(String),

    /// The operation is not implemented by the active backend.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Backend-defined condition with no portable mapping.
    #[error("Implementation specific: {0}")]
    ImplementationSpecific(String),

    // ── Group verbs ──────────────────────────────────────────────────
    /// One or more members of a job array group verb failed. The remaining
    /// members were still attempted.
    #[error("{} of {attempted} job array members failed", failures.len())]
    Partial {
        /// Number of members the verb was applied to.
        attempted: usize,
        /// Per-member failures, in member index order.
        failures: Vec<(JobId, DrmaaError)>,
    },
}

impl DrmaaError {
    /// Returns `true` if the same call may succeed later without changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TryLater(_) | Self::DrmCommunicationFailure(_) | Self::Timeout(_)
        )
    }

    /// Returns `true` for [`DrmaaError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for DRMAA2 operations.
pub type DrmaaResult<T> = Result<T, DrmaaError>;
