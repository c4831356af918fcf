//! # Simulated Kernel
//!
//! This crate provides the in-process implementation of the handle table
//! and security-context engine behind the kernel API.
//!
//! ## Purpose
//!
//! The simulated kernel lets the capability model be exercised without
//! hardware:
//! - Runs under `cargo test`
//! - Real concurrency: every call takes `&self` and may race with others
//! - Inspectable (audit trail, registry and handle counts are accessible)
//!
//! ## Locking
//!
//! The handle table, the context registry and each context have their own
//! lock. No call ever holds two of them at once: a handle is resolved to an
//! object and the guard dropped, the context is looked up and its `Arc`
//! cloned, and only then is the context itself locked. Escalation checks
//! resolve the caller's own status first, under the caller's context lock,
//! and pass the result into the target operation.
//!
//! ## Destroy
//!
//! Handles are the context's reference count. Destroy closes the caller's
//! handle and marks the context for destruction; the context is released
//! when the last full handle naming it is closed, which may be right away.
//! Until then other holders keep working, while `current_security_context`
//! stops handing out new handles to it. Once released, threads still bound
//! to it see `NoSecurityContext` from `current_security_context` and hold
//! no status in escalation checks. Calls that already hold the context's
//! `Arc` either complete before the release or fail with `InvalidHandle`;
//! the destroyed flag is read under the context lock.

pub mod config;
pub mod encoding;
pub mod handle_table;
pub mod objects;
pub mod security_audit;
pub mod security_context;
pub mod syscall_gate;
pub mod test_utils;

use config::KernelConfig;
use core_types::rights::{MANAGE, READ, WRITE};
use core_types::{
    ContextId, HandleId, ObjectRef, Principal, ProcessId, RightSet, ShareFlags, ThreadOwner,
    WideHandle,
};
use handle_table::HandleTable;
use kernel_api::{Caller, HandleIdent, KernelApi, KernelError, ScopeTarget};
use log::{debug, trace, warn};
use objects::ObjectDirectory;
use policy::{Scope, Status};
use security_audit::{SecurityAuditLog, SecurityEvent};
use security_context::{ContextCaps, ContextError, SecurityContext};
use spin::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Simulated kernel state
pub struct SimulatedKernel {
    config: KernelConfig,
    caps: ContextCaps,
    /// Liveness and thread bindings owned by the process/thread/I-O subsystems
    objects: Arc<dyn ObjectDirectory>,
    handles: RwLock<HandleTable>,
    /// Live security contexts
    contexts: RwLock<BTreeMap<ContextId, Arc<SecurityContext>>>,
    audit: Mutex<SecurityAuditLog>,
}

impl SimulatedKernel {
    /// Creates a kernel with every cap unbounded
    pub fn new(objects: Arc<dyn ObjectDirectory>) -> Self {
        Self::with_config(KernelConfig::default(), objects)
    }

    pub fn with_config(config: KernelConfig, objects: Arc<dyn ObjectDirectory>) -> Self {
        Self {
            caps: ContextCaps::from(&config),
            handles: RwLock::new(HandleTable::new(config.max_handles_per_process)),
            config,
            objects,
            contexts: RwLock::new(BTreeMap::new()),
            audit: Mutex::new(SecurityAuditLog::new()),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Mints a handle on behalf of the subsystem that owns `object`
    pub fn install_handle(
        &self,
        process: ProcessId,
        object: ObjectRef,
        rights: RightSet,
    ) -> Result<HandleId, KernelError> {
        let handle = self.handles.write().insert(process, object, rights)?;
        debug!("installed {} for {} in {}", handle, object, process);
        self.audit.lock().record(
            ThreadOwner::HandleRef(WideHandle::new(process, handle)),
            SecurityEvent::HandleInstalled { handle, object },
        );
        Ok(handle)
    }

    /// Closes a handle in the caller's table
    pub fn close_handle(&self, caller: Caller, handle: HandleId) -> Result<(), KernelError> {
        let entry = self.handles.write().close(caller.process, handle)?;
        debug!("closed {} in {}", handle, caller.process);
        self.record(caller, handle, SecurityEvent::HandleClosed { handle });
        if let Some(context) = entry.object.as_context().and_then(|id| self.context(id)) {
            self.release_if_unreferenced(caller, handle, &context);
        }
        Ok(())
    }

    /// Creates and registers a context with kernel authority
    ///
    /// Used by the thread subsystem to set up root contexts before any
    /// thread can call in.
    pub fn bootstrap_context(&self, primary: Option<Principal>) -> Result<ContextId, KernelError> {
        let id = ContextId::new();
        let ctx = SecurityContext::new(id);
        if let Some(principal) = primary {
            ctx.set_primary(principal)
                .map_err(|e| e.into_kernel_error(HandleId::NULL))?;
        }
        self.contexts.write().insert(id, Arc::new(ctx));
        debug!("bootstrapped {}", id);
        Ok(id)
    }

    /// Writes a permission record with kernel authority
    pub fn seed_permission(
        &self,
        ctx: ContextId,
        scope: Scope,
        name: &str,
        status: Status,
    ) -> Result<(), KernelError> {
        let context = self
            .context(ctx)
            .ok_or(KernelError::InvalidHandle(HandleId::NULL))?;
        context
            .grant(scope, name, status, Some(status), &self.caps)
            .map_err(|e| e.into_kernel_error(HandleId::NULL))?;
        Ok(())
    }

    /// Drops every record scoped to a dead thread or process, in every context
    pub fn purge_scope(&self, scope: &Scope) -> usize {
        let contexts: Vec<Arc<SecurityContext>> = self.contexts.read().values().cloned().collect();
        contexts
            .iter()
            .filter_map(|ctx| ctx.purge_scope(scope).ok())
            .sum()
    }

    /// Looks up a live context by identity
    pub fn context(&self, id: ContextId) -> Option<Arc<SecurityContext>> {
        self.contexts.read().get(&id).cloned()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn handle_count(&self, process: ProcessId) -> usize {
        self.handles.read().handle_count(process)
    }

    /// Runs `f` against the security audit trail
    pub fn with_audit_log<R>(&self, f: impl FnOnce(&SecurityAuditLog) -> R) -> R {
        f(&self.audit.lock())
    }

    // Lookups

    fn is_live(&self, object: &ObjectRef) -> bool {
        match object.as_context() {
            Some(id) => self.contexts.read().contains_key(&id),
            None => self.objects.is_live(object),
        }
    }

    /// Resolves a handle in the caller's table to a live object
    fn lookup(&self, caller: Caller, handle: HandleId) -> Result<(ObjectRef, RightSet), KernelError> {
        let (object, rights) = {
            let table = self.handles.read();
            let entry = table.get(caller.process, handle)?;
            (entry.object, entry.rights.clone())
        };
        if !self.is_live(&object) {
            return Err(KernelError::InvalidHandle(handle));
        }
        Ok((object, rights))
    }

    /// Resolves a security-context handle, requiring `right` on it
    fn context_via(
        &self,
        caller: Caller,
        handle: HandleId,
        right: &str,
        operation: &'static str,
    ) -> Result<Arc<SecurityContext>, KernelError> {
        let (object, rights) = self.lookup(caller, handle)?;
        let id = object
            .as_context()
            .ok_or(KernelError::InvalidHandle(handle))?;
        if !rights.contains(right) {
            return Err(self.deny(
                caller,
                operation,
                handle,
                format!("{} lacks right {:?}", handle, right),
            ));
        }
        self.context(id).ok_or(KernelError::InvalidHandle(handle))
    }

    /// The context bound to the calling thread
    fn bound_context(&self, caller: Caller) -> Result<Arc<SecurityContext>, KernelError> {
        self.objects
            .bound_context(caller.thread)
            .and_then(|id| self.context(id))
            .ok_or(KernelError::NoSecurityContext(caller.thread))
    }

    /// The caller's own effective status for `name`, if any
    fn held_status(&self, caller: Caller, name: &str) -> Option<Status> {
        self.bound_context(caller)
            .ok()?
            .held_status(&Scope::Thread(caller.thread), name)
            .ok()
            .flatten()
    }

    /// Resolves a scope target; the flag reports whether its object is alive
    fn scope(&self, caller: Caller, target: ScopeTarget) -> Result<(Scope, bool), KernelError> {
        let (handle, object) = match target {
            ScopeTarget::Kernel => return Ok((Scope::Kernel, true)),
            ScopeTarget::Thread(handle) | ScopeTarget::Process(handle) => {
                (handle, self.handles.read().get(caller.process, handle)?.object)
            }
        };
        let scope = match (target, object) {
            (ScopeTarget::Thread(_), ObjectRef::Thread(thread)) => Scope::Thread(thread),
            (ScopeTarget::Process(_), ObjectRef::Process(process)) => Scope::Process(process),
            _ => return Err(KernelError::InvalidHandle(handle)),
        };
        Ok((scope, self.objects.is_live(&object)))
    }

    /// Resolves a scope target that must name a live object
    fn live_scope(&self, caller: Caller, target: ScopeTarget) -> Result<Scope, KernelError> {
        let (scope, live) = self.scope(caller, target)?;
        match target {
            ScopeTarget::Thread(handle) | ScopeTarget::Process(handle) if !live => {
                Err(KernelError::InvalidHandle(handle))
            }
            _ => Ok(scope),
        }
    }

    // Audit

    fn actor(&self, caller: Caller, via: HandleId) -> ThreadOwner {
        self.bound_context(caller)
            .ok()
            .and_then(|ctx| ctx.primary().ok())
            .map(ThreadOwner::PrincipalRef)
            .unwrap_or(ThreadOwner::HandleRef(WideHandle::new(caller.process, via)))
    }

    fn record(&self, caller: Caller, via: HandleId, event: SecurityEvent) {
        let actor = self.actor(caller, via);
        self.audit.lock().record(actor, event);
    }

    fn deny(&self, caller: Caller, operation: &'static str, handle: HandleId, reason: String) -> KernelError {
        warn!("{} on {} denied: {}", operation, handle, reason);
        self.record(
            caller,
            handle,
            SecurityEvent::Denied {
                operation,
                handle,
                reason: reason.clone(),
            },
        );
        KernelError::PermissionDenied(reason)
    }

    /// Records a denial if `result` is one
    fn audited<T>(
        &self,
        caller: Caller,
        operation: &'static str,
        handle: HandleId,
        result: Result<T, KernelError>,
    ) -> Result<T, KernelError> {
        match result {
            Err(KernelError::PermissionDenied(reason)) => {
                Err(self.deny(caller, operation, handle, reason))
            }
            other => other,
        }
    }

    fn context_result<T>(
        &self,
        caller: Caller,
        operation: &'static str,
        handle: HandleId,
        result: Result<T, ContextError>,
    ) -> Result<T, KernelError> {
        result.map_err(|err| match err {
            ContextError::Escalation(reason) => self.deny(caller, operation, handle, reason),
            other => other.into_kernel_error(handle),
        })
    }

    /// Releases a context whose destroy was requested once no handle names it
    fn release_if_unreferenced(&self, caller: Caller, via: HandleId, context: &SecurityContext) {
        if !context.is_destroy_requested() {
            return;
        }
        let object = ObjectRef::Security(context.id());
        if self.handles.read().object_handle_count(&object) > 0 {
            return;
        }
        if !context.destroy() {
            return;
        }
        let id = context.id();
        self.contexts.write().remove(&id);
        let invalidated = self.handles.write().invalidate_object(&object);
        debug!("destroyed {}: {} late handles invalidated", id, invalidated);
        self.record(
            caller,
            via,
            SecurityEvent::ContextDestroyed {
                context: id,
                invalidated_handles: invalidated,
            },
        );
    }

    /// Registers a context and mints a handle to it in the caller's table
    fn register_context(
        &self,
        caller: Caller,
        ctx: SecurityContext,
    ) -> Result<(ContextId, HandleId), KernelError> {
        let id = ctx.id();
        let object = ObjectRef::Security(id);
        self.contexts.write().insert(id, Arc::new(ctx));
        let inserted = self
            .handles
            .write()
            .insert(caller.process, object, object.default_rights());
        match inserted {
            Ok(handle) => Ok((id, handle)),
            Err(err) => {
                self.contexts.write().remove(&id);
                Err(err)
            }
        }
    }
}

impl KernelApi for SimulatedKernel {
    fn share_handle(
        &self,
        caller: Caller,
        handle: HandleId,
        flags: ShareFlags,
    ) -> Result<HandleId, KernelError> {
        self.lookup(caller, handle)?;
        let result = self.handles.write().share(caller.process, handle, flags);
        let shared = self.audited(caller, "share_handle", handle, result)?;
        debug!("shared {} as {} ({:?})", handle, shared, flags);
        self.record(
            caller,
            handle,
            SecurityEvent::HandleShared {
                source: handle,
                shared,
            },
        );
        Ok(shared)
    }

    fn unshare_handle(&self, caller: Caller, handle: HandleId) -> Result<(), KernelError> {
        let revoked = self.handles.write().unshare(caller.process, handle)?;
        debug!("unshared {}: {} pending shares revoked", handle, revoked);
        self.record(caller, handle, SecurityEvent::HandleUnshared { handle, revoked });
        Ok(())
    }

    fn upgrade_shared_handle(&self, caller: Caller, shared: HandleId) -> Result<HandleId, KernelError> {
        let object = self.handles.read().shared(shared).map(|entry| entry.object);
        if let Some(object) = object {
            if !self.is_live(&object) {
                return Err(KernelError::InvalidHandle(shared));
            }
        }
        let handle = self.handles.write().upgrade(caller.process, shared)?;
        debug!("upgraded {} to {} in {}", shared, handle, caller.process);
        self.record(caller, handle, SecurityEvent::HandleUpgraded { shared, handle });
        Ok(handle)
    }

    fn identify_handle(&self, caller: Caller, handle: HandleId) -> Result<HandleIdent, KernelError> {
        let (object, _) = self.lookup(caller, handle)?;
        Ok(HandleIdent {
            handle_type: object.handle_type(),
            io_subtype: object.io_subtype(),
        })
    }

    fn check_handle_right(
        &self,
        caller: Caller,
        handle: HandleId,
        right: &str,
    ) -> Result<bool, KernelError> {
        let (_, rights) = self.lookup(caller, handle)?;
        let held = rights.contains(right);
        trace!("{} holds {:?}: {}", handle, right, held);
        Ok(held)
    }

    fn drop_handle_right(&self, caller: Caller, handle: HandleId, right: &str) -> Result<(), KernelError> {
        self.lookup(caller, handle)?;
        self.handles.write().drop_right(caller.process, handle, right)?;
        self.record(
            caller,
            handle,
            SecurityEvent::RightDropped {
                handle,
                right: Some(right.to_string()),
            },
        );
        Ok(())
    }

    fn drop_all_handle_rights(&self, caller: Caller, handle: HandleId) -> Result<(), KernelError> {
        self.lookup(caller, handle)?;
        self.handles.write().drop_all_rights(caller.process, handle)?;
        self.record(caller, handle, SecurityEvent::RightDropped { handle, right: None });
        Ok(())
    }

    fn grant_handle_right(&self, caller: Caller, handle: HandleId, right: &str) -> Result<(), KernelError> {
        self.lookup(caller, handle)?;
        let result = self.handles.write().grant_right(caller.process, handle, right);
        self.audited(caller, "grant_handle_right", handle, result)?;
        debug!("granted {:?} on {}", right, handle);
        self.record(
            caller,
            handle,
            SecurityEvent::RightGranted {
                handle,
                right: right.to_string(),
            },
        );
        Ok(())
    }

    fn create_security_context(&self, caller: Caller) -> Result<HandleId, KernelError> {
        let (id, handle) = self.register_context(caller, SecurityContext::new(ContextId::new()))?;
        debug!("created {} as {} in {}", id, handle, caller.process);
        self.record(caller, handle, SecurityEvent::ContextCreated { context: id });
        Ok(handle)
    }

    fn copy_security_context(&self, caller: Caller, ctx: HandleId) -> Result<HandleId, KernelError> {
        let source = self.context_via(caller, ctx, READ, "copy_security_context")?;
        let copy = self.context_result(
            caller,
            "copy_security_context",
            ctx,
            source.duplicate(ContextId::new()),
        )?;
        let (id, handle) = self.register_context(caller, copy)?;
        debug!("copied {} into {}", source.id(), id);
        self.record(
            caller,
            handle,
            SecurityEvent::ContextCopied {
                source: source.id(),
                copy: id,
            },
        );
        Ok(handle)
    }

    fn destroy_security_context(&self, caller: Caller, ctx: HandleId) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, MANAGE, "destroy_security_context")?;
        if !context.request_destroy() {
            return Err(KernelError::InvalidHandle(ctx));
        }
        let id = context.id();
        let (closed, remaining) = {
            let mut table = self.handles.write();
            let closed = table.close(caller.process, ctx).map(|_| ());
            (closed, table.object_handle_count(&ObjectRef::Security(id)))
        };
        // Runs even if the close failed; a concurrent close may have missed the request
        self.release_if_unreferenced(caller, ctx, &context);
        closed?;

        if remaining > 0 {
            debug!("destroy of {} deferred: {} handles remain", id, remaining);
            self.record(
                caller,
                ctx,
                SecurityEvent::ContextDestroyDeferred {
                    context: id,
                    remaining_handles: remaining,
                },
            );
        }
        Ok(())
    }

    fn current_security_context(&self, caller: Caller) -> Result<HandleId, KernelError> {
        let context = self.bound_context(caller)?;
        if context.is_destroyed() || context.is_destroy_requested() {
            return Err(KernelError::NoSecurityContext(caller.thread));
        }
        let id = context.id();
        let handle = self.install_handle(
            caller.process,
            ObjectRef::Security(id),
            RightSet::from_names([READ, WRITE]),
        )?;
        // Destroy may have run between the check and the install
        if context.is_destroy_requested() || !self.contexts.read().contains_key(&id) {
            if self.handles.write().close(caller.process, handle).is_ok() {
                self.release_if_unreferenced(caller, handle, &context);
            }
            return Err(KernelError::NoSecurityContext(caller.thread));
        }
        Ok(handle)
    }

    fn encode_security_context(
        &self,
        caller: Caller,
        ctx: HandleId,
        buffer: &mut [u8],
    ) -> Result<usize, KernelError> {
        let context = self.context_via(caller, ctx, READ, "encode_security_context")?;
        let snapshot = self.context_result(caller, "encode_security_context", ctx, context.snapshot())?;
        let encoded = snapshot.encode()?;
        trace!("encoding {} needs {} bytes", context.id(), encoded.len());
        encoding::fill_buffer(&encoded, buffer)
    }

    fn set_primary_principal(
        &self,
        caller: Caller,
        ctx: HandleId,
        principal: Principal,
    ) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, WRITE, "set_primary_principal")?;
        self.context_result(caller, "set_primary_principal", ctx, context.set_primary(principal))?;
        debug!("{} primary is now {}", context.id(), principal);
        self.record(
            caller,
            ctx,
            SecurityEvent::PrimaryPrincipalSet {
                context: context.id(),
                principal,
            },
        );
        Ok(())
    }

    fn add_secondary_principal(
        &self,
        caller: Caller,
        ctx: HandleId,
        principal: Principal,
    ) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, WRITE, "add_secondary_principal")?;
        let added = self.context_result(
            caller,
            "add_secondary_principal",
            ctx,
            context.add_secondary(principal, &self.caps),
        )?;
        if added {
            debug!("{} gained secondary {}", context.id(), principal);
            self.record(
                caller,
                ctx,
                SecurityEvent::SecondaryPrincipalAdded {
                    context: context.id(),
                    principal,
                },
            );
        }
        Ok(())
    }

    fn get_primary_principal(&self, caller: Caller, ctx: HandleId) -> Result<Principal, KernelError> {
        let context = self.context_via(caller, ctx, READ, "get_primary_principal")?;
        self.context_result(caller, "get_primary_principal", ctx, context.primary())
    }

    fn get_secondary_principals(
        &self,
        caller: Caller,
        ctx: HandleId,
    ) -> Result<Vec<Principal>, KernelError> {
        let context = self.context_via(caller, ctx, READ, "get_secondary_principals")?;
        self.context_result(caller, "get_secondary_principals", ctx, context.secondary())
    }

    fn has_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
    ) -> Result<bool, KernelError> {
        let context = self.context_via(caller, ctx, READ, "has_permission")?;
        let (scope, live) = self.scope(caller, scope)?;
        if !live {
            trace!("{} is dead; {:?} not permitted", scope, name);
            return Ok(false);
        }
        self.context_result(caller, "has_permission", ctx, context.has(&scope, name))
    }

    fn grant_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
        status: Status,
    ) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, WRITE, "grant_permission")?;
        let scope = self.live_scope(caller, scope)?;
        let held = self.held_status(caller, name);
        self.context_result(
            caller,
            "grant_permission",
            ctx,
            context.grant(scope, name, status, held, &self.caps),
        )?;
        debug!("{} granted {:?} at {}: {}", context.id(), name, scope, status);
        self.record(
            caller,
            ctx,
            SecurityEvent::PermissionGranted {
                context: context.id(),
                scope,
                name: name.to_string(),
                status,
            },
        );
        Ok(())
    }

    fn drop_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
        status: Status,
    ) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, WRITE, "drop_permission")?;
        let scope = self.live_scope(caller, scope)?;
        let marker = self.context_result(
            caller,
            "drop_permission",
            ctx,
            context.drop_permission(scope, name, status, &self.caps),
        )?;
        debug!("{} dropped {:?} at {}: {}", context.id(), name, scope, marker);
        self.record(
            caller,
            ctx,
            SecurityEvent::PermissionDropped {
                context: context.id(),
                scope,
                name: name.to_string(),
                status: marker,
            },
        );
        Ok(())
    }

    fn revoke_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
    ) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, WRITE, "revoke_permission")?;
        let scope = self.live_scope(caller, scope)?;
        let held = self.held_status(caller, name);
        let removed = self.context_result(
            caller,
            "revoke_permission",
            ctx,
            context.revoke(scope, name, held),
        )?;
        if removed.is_some() {
            debug!("{} revoked {:?} at {}", context.id(), name, scope);
            self.record(
                caller,
                ctx,
                SecurityEvent::PermissionRevoked {
                    context: context.id(),
                    scope,
                    name: name.to_string(),
                },
            );
        }
        Ok(())
    }

    fn permission_status(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
    ) -> Result<Option<Status>, KernelError> {
        let context = self.context_via(caller, ctx, READ, "permission_status")?;
        let (scope, live) = self.scope(caller, scope)?;
        if !live {
            return Ok(None);
        }
        self.context_result(caller, "permission_status", ctx, context.status(&scope, name))
    }

    fn set_resource_limit(
        &self,
        caller: Caller,
        ctx: HandleId,
        name: &str,
        value: u64,
    ) -> Result<(), KernelError> {
        let context = self.context_via(caller, ctx, WRITE, "set_resource_limit")?;
        self.context_result(
            caller,
            "set_resource_limit",
            ctx,
            context.set_limit(name, value, &self.caps),
        )?;
        debug!("{} limit {:?} = {}", context.id(), name, value);
        self.record(
            caller,
            ctx,
            SecurityEvent::LimitSet {
                context: context.id(),
                name: name.to_string(),
                value,
            },
        );
        Ok(())
    }

    fn get_resource_limit(&self, caller: Caller, ctx: HandleId, name: &str) -> Result<u64, KernelError> {
        let context = self.context_via(caller, ctx, READ, "get_resource_limit")?;
        self.context_result(caller, "get_resource_limit", ctx, context.limit(name))
    }
}
