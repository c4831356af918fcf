//! Ownership and initiator references

use crate::ids::{HandleId, Principal, ProcessId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A handle qualified by the process whose table it lives in
///
/// Handle identifiers are process-scoped; the pair is unique kernel-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WideHandle {
    pub process: ProcessId,
    pub handle: HandleId,
}

impl WideHandle {
    pub fn new(process: ProcessId, handle: HandleId) -> Self {
        Self { process, handle }
    }
}

impl fmt::Display for WideHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.process, self.handle)
    }
}

/// Who owns or initiated something
///
/// Either an owning reference to a live thread/process handle, or a bare
/// principal identity. The principal form lets callers name an initiator
/// without forcing a live handle to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadOwner {
    HandleRef(WideHandle),
    PrincipalRef(Principal),
}

impl ThreadOwner {
    /// Returns true if this reference keeps an object alive
    pub fn is_owning(&self) -> bool {
        matches!(self, ThreadOwner::HandleRef(_))
    }

    pub fn principal(&self) -> Option<Principal> {
        match self {
            ThreadOwner::PrincipalRef(principal) => Some(*principal),
            ThreadOwner::HandleRef(_) => None,
        }
    }

    pub fn handle(&self) -> Option<WideHandle> {
        match self {
            ThreadOwner::HandleRef(handle) => Some(*handle),
            ThreadOwner::PrincipalRef(_) => None,
        }
    }
}

impl fmt::Display for ThreadOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadOwner::HandleRef(handle) => write!(f, "{}", handle),
            ThreadOwner::PrincipalRef(principal) => write!(f, "{}", principal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_ref_is_owning() {
        let owner = ThreadOwner::HandleRef(WideHandle::new(ProcessId::new(), HandleId::from_raw(3)));
        assert!(owner.is_owning());
        assert!(owner.principal().is_none());
        assert_eq!(owner.handle().map(|h| h.handle), Some(HandleId::from_raw(3)));
    }

    #[test]
    fn test_principal_ref_is_identity_only() {
        let principal = Principal::new();
        let owner = ThreadOwner::PrincipalRef(principal);
        assert!(!owner.is_owning());
        assert_eq!(owner.principal(), Some(principal));
        assert!(owner.handle().is_none());
    }

    #[test]
    fn test_serde_roundtrip_keeps_variant() {
        let owner = ThreadOwner::PrincipalRef(Principal::new());
        let json = serde_json::to_string(&owner).unwrap();
        assert!(json.contains("PrincipalRef"));
        let back: ThreadOwner = serde_json::from_str(&json).unwrap();
        assert_eq!(back, owner);
    }
}
