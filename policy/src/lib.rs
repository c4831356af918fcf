//! # Permission Store
//!
//! This crate provides the per-context permission store and the
//! effective-status resolution algorithm.
//!
//! ## Philosophy
//!
//! - **Default deny**: a name with no applicable record is not permitted
//! - **Explicit deny is data**: denials are persisted with their status code
//!   so that a specific deny can override a broader allow
//! - **Most specific scope wins**: a thread- or process-scoped record
//!   shadows the kernel-scoped record for the same name
//!
//! ## Core Concepts
//!
//! - [`Scope`]: Kernel-wide, or one thread, or one process
//! - [`Status`]: Signed code; `>= 0` allows, `< 0` denies
//! - [`PermissionStore`]: `(scope, name) -> status` with grant / drop / revoke
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - An authorization check on who may mutate the store (the kernel does that)
//! - A wildcard or pattern matcher; names are compared byte-for-byte

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core_types::{ProcessId, ThreadId};
use serde::{Deserialize, Serialize};

/// Breadth of a permission record
///
/// Thread and process scopes refer to objects the store does not own. When
/// such an object dies its records become unreachable: the kernel never
/// resolves a query for a dead identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Kernel,
    Thread(ThreadId),
    Process(ProcessId),
}

impl Scope {
    pub fn is_kernel(&self) -> bool {
        matches!(self, Scope::Kernel)
    }

    /// The scope a query falls back to when this one has no record
    pub fn fallback(&self) -> Option<Scope> {
        match self {
            Scope::Kernel => None,
            Scope::Thread(_) | Scope::Process(_) => Some(Scope::Kernel),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Kernel => write!(f, "kernel"),
            Scope::Thread(id) => write!(f, "{}", id),
            Scope::Process(id) => write!(f, "{}", id),
        }
    }
}

/// Signed permission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Status(pub i64);

impl Status {
    /// Plain allow
    pub const ALLOW: Status = Status(0);
    /// Plain deny; also the marker written by `drop`
    pub const DENY: Status = Status(-1);

    pub const fn new(code: i64) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> i64 {
        self.0
    }

    pub const fn is_allowed(&self) -> bool {
        self.0 >= 0
    }

    pub const fn is_denied(&self) -> bool {
        self.0 < 0
    }

    /// Whether a holder of `self` may hand out `requested`
    ///
    /// Denials can always be handed out. An allow can only be handed out by
    /// a holder whose own status is an allow at least as large.
    pub fn permits(&self, requested: Status) -> bool {
        requested.is_denied() || (self.is_allowed() && self.0 >= requested.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_allowed() {
            write!(f, "allow({})", self.0)
        } else {
            write!(f, "deny({})", self.0)
        }
    }
}

/// One stored record, as reported by iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub scope: Scope,
    pub name: String,
    pub status: Status,
}

/// Permission store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    CapacityExceeded { limit: usize },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::CapacityExceeded { limit } => {
                write!(f, "Permission entry capacity exceeded (limit {})", limit)
            }
        }
    }
}

/// Per-context `(scope, name) -> status` map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionStore {
    scopes: BTreeMap<Scope, BTreeMap<String, Status>>,
    len: usize,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a record, creating it if needed
    ///
    /// Returns the previous status. `capacity` bounds the total number of
    /// records; overwriting an existing record never fails.
    pub fn grant(
        &mut self,
        scope: Scope,
        name: &str,
        status: Status,
        capacity: Option<usize>,
    ) -> Result<Option<Status>, PolicyError> {
        if self.status(&scope, name).is_none() {
            if let Some(limit) = capacity {
                if self.len >= limit {
                    return Err(PolicyError::CapacityExceeded { limit });
                }
            }
        }

        let previous = self
            .scopes
            .entry(scope)
            .or_default()
            .insert(name.to_string(), status);
        if previous.is_none() {
            self.len += 1;
        }
        Ok(previous)
    }

    /// Marks a record as denied without removing it
    ///
    /// The supplied status is kept if it is a denial; anything else is
    /// replaced by [`Status::DENY`].
    pub fn drop(
        &mut self,
        scope: Scope,
        name: &str,
        status: Status,
        capacity: Option<usize>,
    ) -> Result<Status, PolicyError> {
        let marker = if status.is_denied() { status } else { Status::DENY };
        self.grant(scope, name, marker, capacity)?;
        Ok(marker)
    }

    /// Removes a record entirely, returning its status
    pub fn revoke(&mut self, scope: &Scope, name: &str) -> Option<Status> {
        let names = self.scopes.get_mut(scope)?;
        let removed = names.remove(name);
        if names.is_empty() {
            self.scopes.remove(scope);
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// The raw record for exactly this scope, without fallback
    pub fn status(&self, scope: &Scope, name: &str) -> Option<Status> {
        self.scopes.get(scope)?.get(name).copied()
    }

    pub fn exists(&self, scope: &Scope, name: &str) -> bool {
        self.status(scope, name).is_some()
    }

    /// Effective status for a query
    ///
    /// The record at `query` wins if present; otherwise the query falls
    /// back to the kernel scope; otherwise there is no applicable record.
    pub fn resolve(&self, query: &Scope, name: &str) -> Option<Status> {
        self.status(query, name)
            .or_else(|| query.fallback().and_then(|scope| self.status(&scope, name)))
    }

    /// Whether the effective status for a query is an allow
    pub fn is_permitted(&self, query: &Scope, name: &str) -> bool {
        self.resolve(query, name)
            .map(|status| status.is_allowed())
            .unwrap_or(false)
    }

    /// Drops every record held for one scope
    pub fn purge_scope(&mut self, scope: &Scope) -> usize {
        let removed = self.scopes.remove(scope).map(|names| names.len()).unwrap_or(0);
        self.len -= removed;
        removed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All records, ordered by scope then name
    pub fn records(&self) -> Vec<PermissionRecord> {
        self.scopes
            .iter()
            .flat_map(|(scope, names)| {
                names.iter().map(move |(name, status)| PermissionRecord {
                    scope: *scope,
                    name: name.clone(),
                    status: *status,
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
        self.len = 0;
    }
}
