//! Kernel error types

use crate::syscalls::{errno, SysResult, Subsystem};
use core_types::{ContextId, HandleId, ThreadId};
use thiserror::Error;

/// Errors returned by handle and security-context operations
///
/// Every mutating operation leaves state unchanged when it returns one of
/// these. Only [`KernelError::BufferTooSmall`] is meant to be retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    /// Handle unknown, closed, owned by another process, or of the wrong type
    #[error("Invalid handle: {0}")]
    InvalidHandle(HandleId),

    /// Caller lacks the right or permission, or the request would escalate
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Shared handle was already consumed by an upgrade
    #[error("Shared handle already upgraded: {0}")]
    AlreadyUpgraded(HandleId),

    /// Handle is a full handle, not a shared one
    #[error("Handle is not shared: {0}")]
    NotShared(HandleId),

    /// Context has no primary principal
    #[error("No primary principal set on {0}")]
    NoPrincipal(ContextId),

    /// Named limit is unset
    #[error("No such resource limit: {0}")]
    NoSuchLimit(String),

    /// Output buffer too small; retry with `required` bytes
    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    /// Configured cap on principals, permissions, limits or handles reached
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Calling thread is not bound to a live security context
    #[error("No security context bound to {0}")]
    NoSecurityContext(ThreadId),

    /// Malformed argument (unknown flag bits, invalid string)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl KernelError {
    /// Subsystem-local error code (always negative)
    pub fn errno(&self) -> i64 {
        match self {
            KernelError::PermissionDenied(_) => errno::PERMISSION,
            KernelError::InvalidHandle(_) | KernelError::NoSecurityContext(_) => {
                errno::INVALID_HANDLE
            }
            KernelError::InvalidArgument(_) => errno::INVALID_ARGUMENT,
            KernelError::BufferTooSmall { .. } => errno::BUFFER_TOO_SMALL,
            KernelError::AlreadyUpgraded(_) => errno::ALREADY_UPGRADED,
            KernelError::NotShared(_) => errno::NOT_SHARED,
            KernelError::NoPrincipal(_) => errno::NO_PRINCIPAL,
            KernelError::NoSuchLimit(_) => errno::NO_SUCH_LIMIT,
            KernelError::ResourceExhausted(_) => errno::RESOURCE_EXHAUSTED,
        }
    }

    /// Raw negative status as returned across the syscall boundary
    pub fn to_sys_result(&self) -> SysResult {
        Subsystem::BASE.error(self.errno())
    }

    /// Whether the caller should retry with a larger buffer
    pub fn is_retryable(&self) -> bool {
        matches!(self, KernelError::BufferTooSmall { .. })
    }
}
