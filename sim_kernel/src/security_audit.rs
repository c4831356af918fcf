//! Security Audit Trail
//!
//! Records every security-relevant mutation and every denial performed by
//! the kernel, for verification in tests.
//!
//! ## Philosophy
//!
//! - Deterministic: events are numbered in the order they were recorded
//! - Attributed: every event names the acting [`ThreadOwner`]
//! - Queryable: tests assert on the trail to verify security properties
//!
//! ## Example
//!
//! ```
//! use sim_kernel::security_audit::{SecurityAuditLog, SecurityEvent};
//! use core_types::{ContextId, Principal, ThreadOwner};
//!
//! let mut log = SecurityAuditLog::new();
//! let actor = ThreadOwner::PrincipalRef(Principal::new());
//! log.record(actor, SecurityEvent::ContextCreated { context: ContextId::new() });
//!
//! assert_eq!(log.len(), 1);
//! assert!(log.has_event(|e| matches!(e, SecurityEvent::ContextCreated { .. })));
//! ```

use core_types::{ContextId, HandleId, ObjectRef, Principal, ThreadOwner};
use policy::{Scope, Status};

/// A security-relevant kernel event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    HandleInstalled {
        handle: HandleId,
        object: ObjectRef,
    },
    HandleClosed {
        handle: HandleId,
    },
    HandleShared {
        source: HandleId,
        shared: HandleId,
    },
    HandleUnshared {
        handle: HandleId,
        revoked: usize,
    },
    HandleUpgraded {
        shared: HandleId,
        handle: HandleId,
    },
    RightDropped {
        handle: HandleId,
        right: Option<String>,
    },
    RightGranted {
        handle: HandleId,
        right: String,
    },
    ContextCreated {
        context: ContextId,
    },
    ContextCopied {
        source: ContextId,
        copy: ContextId,
    },
    /// Destroy was requested while other handles still name the context
    ContextDestroyDeferred {
        context: ContextId,
        remaining_handles: usize,
    },
    ContextDestroyed {
        context: ContextId,
        invalidated_handles: usize,
    },
    PrimaryPrincipalSet {
        context: ContextId,
        principal: Principal,
    },
    SecondaryPrincipalAdded {
        context: ContextId,
        principal: Principal,
    },
    PermissionGranted {
        context: ContextId,
        scope: Scope,
        name: String,
        status: Status,
    },
    PermissionDropped {
        context: ContextId,
        scope: Scope,
        name: String,
        status: Status,
    },
    PermissionRevoked {
        context: ContextId,
        scope: Scope,
        name: String,
    },
    LimitSet {
        context: ContextId,
        name: String,
        value: u64,
    },
    /// An operation refused with `PermissionDenied`
    Denied {
        operation: &'static str,
        handle: HandleId,
        reason: String,
    },
}

/// A recorded event with its sequence number and actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityAuditRecord {
    pub sequence: u64,
    pub actor: ThreadOwner,
    pub event: SecurityEvent,
}

/// Chronological audit log for security operations
#[derive(Debug, Default)]
pub struct SecurityAuditLog {
    next_sequence: u64,
    records: Vec<SecurityAuditRecord>,
}

impl SecurityAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, actor: ThreadOwner, event: SecurityEvent) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(SecurityAuditRecord {
            sequence,
            actor,
            event,
        });
    }

    pub fn records(&self) -> &[SecurityAuditRecord] {
        &self.records
    }

    /// Events touching one security context
    pub fn events_for_context(&self, context: ContextId) -> Vec<&SecurityAuditRecord> {
        self.records
            .iter()
            .filter(|record| match &record.event {
                SecurityEvent::ContextCreated { context: id }
                | SecurityEvent::ContextDestroyDeferred { context: id, .. }
                | SecurityEvent::ContextDestroyed { context: id, .. }
                | SecurityEvent::PrimaryPrincipalSet { context: id, .. }
                | SecurityEvent::SecondaryPrincipalAdded { context: id, .. }
                | SecurityEvent::PermissionGranted { context: id, .. }
                | SecurityEvent::PermissionDropped { context: id, .. }
                | SecurityEvent::PermissionRevoked { context: id, .. }
                | SecurityEvent::LimitSet { context: id, .. } => *id == context,
                SecurityEvent::ContextCopied { source, copy } => {
                    *source == context || *copy == context
                }
                _ => false,
            })
            .collect()
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SecurityEvent) -> bool,
    {
        self.records.iter().filter(|r| predicate(&r.event)).count()
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SecurityEvent) -> bool,
    {
        self.records.iter().any(|r| predicate(&r.event))
    }

    /// Clears all records; sequence numbers keep increasing
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
