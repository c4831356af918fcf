//! Unique identifiers for kernel objects and security subjects

use crate::uuid_tools::fresh_uuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new unique identifier
            pub fn new() -> Self {
                Self(fresh_uuid())
            }

            /// Creates an identifier from a UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identity of a process object.
    ///
    /// Processes are owned by the process subsystem; this subsystem only
    /// refers to them (handle ownership, process-scoped permissions).
    ProcessId,
    "process"
);

uuid_id!(
    /// Identity of a thread object.
    ThreadId,
    "thread"
);

uuid_id!(
    /// Identity of an opaque kernel object (I/O endpoint, namespace,
    /// environment map, debug object).
    ObjectId,
    "object"
);

uuid_id!(
    /// Identity of a security context.
    ContextId,
    "context"
);

uuid_id!(
    /// A security subject.
    ///
    /// Principals are what permission grants are made against. A security
    /// context holds one primary principal and any number of secondary ones.
    Principal,
    "principal"
);

/// Opaque, process-scoped handle identifier
///
/// Handle identifiers are never reused within a kernel instance. The value
/// `0` is reserved and never names a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(u64);

impl HandleId {
    /// The reserved null handle
    pub const NULL: HandleId = HandleId(0);

    /// Creates a handle ID from its raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns true for the reserved null handle
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hdl:{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique() {
        assert_ne!(ProcessId::new(), ProcessId::new());
        assert_ne!(ThreadId::new(), ThreadId::new());
        assert_ne!(ContextId::new(), ContextId::new());
        assert_ne!(Principal::new(), Principal::new());
    }

    #[test]
    fn test_principal_from_uuid() {
        let uuid = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        let principal = Principal::from_uuid(uuid);
        assert_eq!(principal.as_uuid(), uuid);
        assert_eq!(principal, Principal::from_uuid(uuid));
    }

    #[test]
    fn test_id_display() {
        assert!(ThreadId::new().to_string().starts_with("thread:"));
        assert!(ContextId::new().to_string().starts_with("context:"));
        assert!(Principal::new().to_string().starts_with("principal:"));
        assert_eq!(HandleId::from_raw(16).to_string(), "hdl:0x10");
    }

    #[test]
    fn test_null_handle() {
        assert!(HandleId::NULL.is_null());
        assert!(!HandleId::from_raw(1).is_null());
    }
}
