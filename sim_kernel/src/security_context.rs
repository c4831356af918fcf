//! Security context objects
//!
//! A context owns its principal set, permission store and resource limits
//! behind a single lock. Every method here is one logical operation: the
//! lock is taken once and released before returning, so concurrent readers
//! observe either the state before a mutation or the state after it.
//!
//! Authorization (handle rights, escalation) is decided by the kernel.
//! Escalation checks need the caller's held status, which may come from
//! this same context, so the kernel resolves it first and passes it in.

use crate::config::KernelConfig;
use crate::encoding::ContextSnapshot;
use core_types::{ContextId, HandleId, Principal};
use identity::{IdentityError, PrincipalSet};
use kernel_api::KernelError;
use log::trace;
use policy::{PermissionStore, PolicyError, Scope, Status};
use resources::{names, tighter_cap, ResourceError, ResourceLimitTable};
use core::sync::atomic::{AtomicBool, Ordering};
use spin::RwLock;
use thiserror::Error;

/// Kernel-wide caps applied to every context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextCaps {
    pub secondary_principals: Option<usize>,
    pub permission_entries: Option<usize>,
    pub resource_limits: Option<usize>,
}

impl From<&KernelConfig> for ContextCaps {
    fn from(config: &KernelConfig) -> Self {
        Self {
            secondary_principals: config.max_secondary_principals,
            permission_entries: config.max_permission_entries,
            resource_limits: config.max_resource_limits,
        }
    }
}

/// Context-level errors, converted to [`KernelError`] by the kernel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Security context {0} was destroyed")]
    Destroyed(ContextId),

    #[error("No primary principal set on {0}")]
    NoPrincipal(ContextId),

    #[error("No such resource limit: {0}")]
    NoSuchLimit(String),

    #[error("{what} capacity exceeded (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("Escalation denied: {0}")]
    Escalation(String),
}

impl ContextError {
    /// Converts to a kernel error, naming the handle the caller acted through
    pub fn into_kernel_error(self, handle: HandleId) -> KernelError {
        match self {
            ContextError::Destroyed(_) => KernelError::InvalidHandle(handle),
            ContextError::NoPrincipal(id) => KernelError::NoPrincipal(id),
            ContextError::NoSuchLimit(name) => KernelError::NoSuchLimit(name),
            err @ ContextError::CapacityExceeded { .. } => {
                KernelError::ResourceExhausted(err.to_string())
            }
            ContextError::Escalation(reason) => KernelError::PermissionDenied(reason),
        }
    }
}

impl From<IdentityError> for ContextError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::CapacityExceeded { limit } => ContextError::CapacityExceeded {
                what: "Secondary principal",
                limit,
            },
        }
    }
}

impl From<PolicyError> for ContextError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::CapacityExceeded { limit } => ContextError::CapacityExceeded {
                what: "Permission entry",
                limit,
            },
        }
    }
}

impl From<ResourceError> for ContextError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::CapacityExceeded { limit } => ContextError::CapacityExceeded {
                what: "Resource limit",
                limit,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ContextState {
    destroyed: bool,
    principals: PrincipalSet,
    permissions: PermissionStore,
    limits: ResourceLimitTable,
}

impl ContextState {
    fn secondary_cap(&self, caps: &ContextCaps) -> Option<usize> {
        tighter_cap(
            caps.secondary_principals,
            self.limits.get_cap(names::MAX_SECONDARY_PRINCIPALS),
        )
    }

    fn permission_cap(&self, caps: &ContextCaps) -> Option<usize> {
        tighter_cap(
            caps.permission_entries,
            self.limits.get_cap(names::MAX_PERMISSION_ENTRIES),
        )
    }
}

/// A security context kernel object
#[derive(Debug)]
pub struct SecurityContext {
    id: ContextId,
    /// Set once destroy is requested; the context is released when its
    /// last handle closes
    destroy_requested: AtomicBool,
    state: RwLock<ContextState>,
}

impl SecurityContext {
    /// Creates an empty context: no principals, permissions or limits
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            destroy_requested: AtomicBool::new(false),
            state: RwLock::new(ContextState::default()),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }

    /// Requests destruction once no handle names the context
    ///
    /// Returns false if the context is already destroyed.
    pub fn request_destroy(&self) -> bool {
        let state = self.state.read();
        if state.destroyed {
            return false;
        }
        self.destroy_requested.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_destroy_requested(&self) -> bool {
        self.destroy_requested.load(Ordering::SeqCst)
    }

    fn with_state<R>(
        &self,
        f: impl FnOnce(&ContextState) -> Result<R, ContextError>,
    ) -> Result<R, ContextError> {
        let state = self.state.read();
        if state.destroyed {
            return Err(ContextError::Destroyed(self.id));
        }
        f(&state)
    }

    fn with_state_mut<R>(
        &self,
        f: impl FnOnce(&mut ContextState) -> Result<R, ContextError>,
    ) -> Result<R, ContextError> {
        let mut state = self.state.write();
        if state.destroyed {
            return Err(ContextError::Destroyed(self.id));
        }
        f(&mut state)
    }

    /// Deep-clones this context's state into a new, independent context
    pub fn duplicate(&self, id: ContextId) -> Result<SecurityContext, ContextError> {
        let state = self.with_state(|state| Ok(state.clone()))?;
        Ok(SecurityContext {
            id,
            destroy_requested: AtomicBool::new(false),
            state: RwLock::new(state),
        })
    }

    /// Marks the context destroyed and releases its state
    ///
    /// Returns false if it was already destroyed.
    pub fn destroy(&self) -> bool {
        let mut state = self.state.write();
        if state.destroyed {
            return false;
        }
        state.principals.clear();
        state.permissions.clear();
        state.limits.clear();
        state.destroyed = true;
        true
    }

    // Principals

    pub fn set_primary(&self, principal: Principal) -> Result<Option<Principal>, ContextError> {
        self.with_state_mut(|state| Ok(state.principals.set_primary(principal)))
    }

    pub fn primary(&self) -> Result<Principal, ContextError> {
        self.with_state(|state| {
            state
                .principals
                .primary()
                .ok_or(ContextError::NoPrincipal(self.id))
        })
    }

    /// Adds a secondary principal; `Ok(false)` if it was already present
    pub fn add_secondary(&self, principal: Principal, caps: &ContextCaps) -> Result<bool, ContextError> {
        self.with_state_mut(|state| {
            let cap = state.secondary_cap(caps);
            Ok(state.principals.add_secondary(principal, cap)?)
        })
    }

    pub fn remove_secondary(&self, principal: &Principal) -> Result<bool, ContextError> {
        self.with_state_mut(|state| Ok(state.principals.remove_secondary(principal)))
    }

    pub fn secondary(&self) -> Result<Vec<Principal>, ContextError> {
        self.with_state(|state| Ok(state.principals.secondary()))
    }

    // Permissions

    /// Evaluates effective-status resolution for `query`
    ///
    /// A context without a primary principal permits nothing.
    pub fn has(&self, query: &Scope, name: &str) -> Result<bool, ContextError> {
        self.with_state(|state| {
            let permitted =
                state.principals.has_primary() && state.permissions.is_permitted(query, name);
            trace!("{} has {:?} at {}: {}", self.id, name, query, permitted);
            Ok(permitted)
        })
    }

    /// The status a holder of this context can hand out for `name`
    pub fn held_status(&self, query: &Scope, name: &str) -> Result<Option<Status>, ContextError> {
        self.with_state(|state| {
            if !state.principals.has_primary() {
                return Ok(None);
            }
            Ok(state.permissions.resolve(query, name))
        })
    }

    /// Writes a permission record
    ///
    /// `held` is the caller's own effective status for `name`; an allow can
    /// only be granted by a holder of an equal or stronger allow.
    pub fn grant(
        &self,
        scope: Scope,
        name: &str,
        status: Status,
        held: Option<Status>,
        caps: &ContextCaps,
    ) -> Result<Option<Status>, ContextError> {
        if !permits(held, status) {
            return Err(ContextError::Escalation(format!(
                "granting {} for {:?} requires holding it",
                status, name
            )));
        }
        self.with_state_mut(|state| {
            let cap = state.permission_cap(caps);
            Ok(state.permissions.grant(scope, name, status, cap)?)
        })
    }

    /// Resets a record to a deny marker, creating it if absent
    pub fn drop_permission(
        &self,
        scope: Scope,
        name: &str,
        status: Status,
        caps: &ContextCaps,
    ) -> Result<Status, ContextError> {
        self.with_state_mut(|state| {
            let cap = state.permission_cap(caps);
            Ok(state.permissions.drop(scope, name, status, cap)?)
        })
    }

    /// Deletes a record, reverting `scope` to fallback resolution
    ///
    /// Removing a thread or process record exposes the kernel record; if
    /// that is an allow, the caller must hold it.
    pub fn revoke(
        &self,
        scope: Scope,
        name: &str,
        held: Option<Status>,
    ) -> Result<Option<Status>, ContextError> {
        self.with_state_mut(|state| {
            let exposed = scope
                .fallback()
                .and_then(|fallback| state.permissions.status(&fallback, name));
            if let Some(exposed) = exposed {
                if state.permissions.exists(&scope, name) && !permits(held, exposed) {
                    return Err(ContextError::Escalation(format!(
                        "revoking {:?} at {} would expose {}",
                        name, scope, exposed
                    )));
                }
            }
            Ok(state.permissions.revoke(&scope, name))
        })
    }

    /// The raw record at exactly `scope`
    pub fn status(&self, scope: &Scope, name: &str) -> Result<Option<Status>, ContextError> {
        self.with_state(|state| Ok(state.permissions.status(scope, name)))
    }

    pub fn permission_count(&self) -> Result<usize, ContextError> {
        self.with_state(|state| Ok(state.permissions.len()))
    }

    /// Drops every record held for a thread or process that has died
    pub fn purge_scope(&self, scope: &Scope) -> Result<usize, ContextError> {
        self.with_state_mut(|state| Ok(state.permissions.purge_scope(scope)))
    }

    // Resource limits

    pub fn set_limit(&self, name: &str, value: u64, caps: &ContextCaps) -> Result<Option<u64>, ContextError> {
        self.with_state_mut(|state| Ok(state.limits.set(name, value, caps.resource_limits)?))
    }

    pub fn limit(&self, name: &str) -> Result<u64, ContextError> {
        self.with_state(|state| {
            state
                .limits
                .get(name)
                .ok_or_else(|| ContextError::NoSuchLimit(name.to_string()))
        })
    }

    pub fn remove_limit(&self, name: &str) -> Result<Option<u64>, ContextError> {
        self.with_state_mut(|state| Ok(state.limits.remove(name)))
    }

    /// Consistent image of the whole context, taken under one lock
    pub fn snapshot(&self) -> Result<ContextSnapshot, ContextError> {
        self.with_state(|state| {
            Ok(ContextSnapshot::new(
                state.principals.primary(),
                state.principals.secondary(),
                state.permissions.records(),
                state.limits.entries(),
            ))
        })
    }
}

fn permits(held: Option<Status>, requested: Status) -> bool {
    requested.is_denied() || held.map(|held| held.permits(requested)).unwrap_or(false)
}
