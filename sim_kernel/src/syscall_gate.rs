//! Syscall gate for the handle and security-context calls.
//!
//! Turns a numbered call with raw arguments (flag words, byte strings,
//! signed status codes, buffer capacities) into a typed [`KernelApi`] call,
//! and its outcome back into a typed result or a raw [`SysResult`]. Every
//! call passing through the gate is recorded in its audit log.

use core_types::{HandleId, Principal, ShareFlags};
use kernel_api::{Caller, HandleIdent, KernelApi, KernelError, ScopeTarget, SysResult, SyscallNumber};
use log::trace;
use policy::Status;
use serde::{Deserialize, Serialize};

/// Every call the gate accepts
///
/// Names and rights arrive as pointer+length byte strings; they may contain
/// any byte, but must be valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Syscall {
    // Handle table
    ShareHandle { handle: HandleId, flags: u32 },
    UnshareHandle { handle: HandleId },
    UpgradeSharedHandle { shared: HandleId },
    IdentHandle { handle: HandleId },
    CheckHandleRight { handle: HandleId, right: Vec<u8> },
    DropHandleRight { handle: HandleId, right: Vec<u8> },
    DropAllHandleRights { handle: HandleId },
    GrantHandleRight { handle: HandleId, right: Vec<u8> },

    // Security contexts
    CreateSecurityContext,
    CopySecurityContext { ctx: HandleId },
    DestroySecurityContext { ctx: HandleId },
    GetCurrentSecurityContext,
    HasPermission { ctx: HandleId, scope: ScopeTarget, name: Vec<u8> },
    SetPrimaryPrincipal { ctx: HandleId, principal: Principal },
    AddSecondaryPrincipal { ctx: HandleId, principal: Principal },
    GrantPermission { ctx: HandleId, scope: ScopeTarget, name: Vec<u8>, status: i64 },
    DropPermission { ctx: HandleId, scope: ScopeTarget, name: Vec<u8>, status: i64 },
    RevokePermission { ctx: HandleId, scope: ScopeTarget, name: Vec<u8> },
    SetResourceLimit { ctx: HandleId, name: Vec<u8>, value: u64 },
    GetResourceLimit { ctx: HandleId, name: Vec<u8> },
    /// Encodes into a buffer of `capacity` bytes
    EncodeSecurityContext { ctx: HandleId, capacity: usize },
    GetPrimaryPrincipal { ctx: HandleId },
    GetSecondaryPrincipals { ctx: HandleId },
}

impl Syscall {
    /// The stable number this call is dispatched under
    pub fn number(&self) -> SyscallNumber {
        use SyscallNumber as N;
        let scoped = |scope: &ScopeTarget, kernel, thread, process| match scope {
            ScopeTarget::Kernel => kernel,
            ScopeTarget::Thread(_) => thread,
            ScopeTarget::Process(_) => process,
        };
        match self {
            Syscall::ShareHandle { .. } => N::ShareHandle,
            Syscall::UnshareHandle { .. } => N::UnshareHandle,
            Syscall::UpgradeSharedHandle { .. } => N::UpgradeSharedHandle,
            Syscall::IdentHandle { .. } => N::IdentHandle,
            Syscall::CheckHandleRight { .. } => N::CheckHandleRight,
            Syscall::DropHandleRight { .. } => N::DropHandleRight,
            Syscall::DropAllHandleRights { .. } => N::DropAllHandleRights,
            Syscall::GrantHandleRight { .. } => N::GrantHandleRight,
            Syscall::CreateSecurityContext => N::CreateSecurityContext,
            Syscall::CopySecurityContext { .. } => N::CopySecurityContext,
            Syscall::DestroySecurityContext { .. } => N::DestroySecurityContext,
            Syscall::GetCurrentSecurityContext => N::GetCurrentSecurityContext,
            Syscall::HasPermission { scope, .. } => scoped(
                scope,
                N::HasKernelPermission,
                N::HasThreadPermission,
                N::HasProcessPermission,
            ),
            Syscall::SetPrimaryPrincipal { .. } => N::SetPrimaryPrincipal,
            Syscall::AddSecondaryPrincipal { .. } => N::AddSecondaryPrincipal,
            Syscall::GrantPermission { scope, .. } => scoped(
                scope,
                N::GrantKernelPermission,
                N::GrantThreadPermission,
                N::GrantProcessPermission,
            ),
            Syscall::DropPermission { scope, .. } => scoped(
                scope,
                N::DropKernelPermission,
                N::DropThreadPermission,
                N::DropProcessPermission,
            ),
            Syscall::RevokePermission { scope, .. } => scoped(
                scope,
                N::RevokeKernelPermission,
                N::RevokeThreadPermission,
                N::RevokeProcessPermission,
            ),
            Syscall::SetResourceLimit { .. } => N::SetKernelResourceLimit,
            Syscall::GetResourceLimit { .. } => N::GetKernelResourceLimit,
            Syscall::EncodeSecurityContext { .. } => N::EncodeSecurityContext,
            Syscall::GetPrimaryPrincipal { .. } => N::GetPrimaryPrincipal,
            Syscall::GetSecondaryPrincipals { .. } => N::GetSecondaryPrincipals,
        }
    }
}

/// Typed syscall result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyscallResult {
    Ok,
    Handle(HandleId),
    Bool(bool),
    Ident(HandleIdent),
    Bytes(Vec<u8>),
    Principal(Principal),
    Principals(Vec<Principal>),
    Limit(u64),
}

impl SyscallResult {
    /// The value returned in the result register
    ///
    /// Principals, principal lists and limits travel through out-parameters
    /// and report 0 here. A handle that does not fit the register reports
    /// `InvalidHandle` rather than a value that could read as an error.
    pub fn to_sys_result(&self) -> SysResult {
        match self {
            SyscallResult::Handle(handle) => SysResult::try_from(handle.as_raw())
                .unwrap_or_else(|_| KernelError::InvalidHandle(*handle).to_sys_result()),
            SyscallResult::Bool(value) => SysResult::from(*value),
            SyscallResult::Ident(ident) => {
                SysResult::try_from(ident.code()).unwrap_or(SysResult::MAX)
            }
            SyscallResult::Bytes(bytes) => {
                SysResult::try_from(bytes.len()).unwrap_or(SysResult::MAX)
            }
            SyscallResult::Ok
            | SyscallResult::Principal(_)
            | SyscallResult::Principals(_)
            | SyscallResult::Limit(_) => 0,
        }
    }
}

/// Converts a gate outcome to the raw value seen by the caller
pub fn to_sys_result(result: &Result<SyscallResult, KernelError>) -> SysResult {
    match result {
        Ok(value) => value.to_sys_result(),
        Err(err) => err.to_sys_result(),
    }
}

/// Syscall audit event (for testing and verification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyscallEvent {
    /// Syscall was invoked
    Invoked {
        caller: Caller,
        syscall: SyscallNumber,
    },
    /// Syscall completed successfully
    Completed {
        caller: Caller,
        syscall: SyscallNumber,
    },
    /// Syscall was rejected
    Rejected {
        caller: Caller,
        syscall: SyscallNumber,
        reason: String,
    },
}

/// Audit log for syscall operations.
#[derive(Debug, Clone, Default)]
pub struct SyscallAuditLog {
    events: Vec<SyscallEvent>,
}

impl SyscallAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: SyscallEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SyscallEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SyscallEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SyscallEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

/// Syscall gate in front of a [`KernelApi`] implementation.
#[derive(Debug, Default)]
pub struct SyscallGate {
    audit_log: SyscallAuditLog,
}

impl SyscallGate {
    pub fn new() -> Self {
        Self {
            audit_log: SyscallAuditLog::new(),
        }
    }

    /// Returns the audit log (test-only)
    pub fn audit_log(&self) -> &SyscallAuditLog {
        &self.audit_log
    }

    /// Clears the audit log (test-only)
    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    /// Executes a syscall on behalf of `caller`.
    pub fn execute(
        &mut self,
        kernel: &dyn KernelApi,
        caller: Caller,
        syscall: Syscall,
    ) -> Result<SyscallResult, KernelError> {
        let number = syscall.number();
        trace!("{} from {}", number, caller.thread);

        self.audit_log.record(SyscallEvent::Invoked {
            caller,
            syscall: number,
        });

        let result = dispatch(kernel, caller, syscall);

        match &result {
            Ok(_) => {
                self.audit_log.record(SyscallEvent::Completed {
                    caller,
                    syscall: number,
                });
            }
            Err(err) => {
                self.audit_log.record(SyscallEvent::Rejected {
                    caller,
                    syscall: number,
                    reason: err.to_string(),
                });
            }
        }

        result
    }

    /// Executes a syscall and returns the raw result register value
    pub fn execute_raw(&mut self, kernel: &dyn KernelApi, caller: Caller, syscall: Syscall) -> SysResult {
        to_sys_result(&self.execute(kernel, caller, syscall))
    }
}

fn text(bytes: &[u8]) -> Result<&str, KernelError> {
    std::str::from_utf8(bytes)
        .map_err(|e| KernelError::InvalidArgument(format!("name is not valid UTF-8: {}", e)))
}

fn dispatch(kernel: &dyn KernelApi, caller: Caller, syscall: Syscall) -> Result<SyscallResult, KernelError> {
    match syscall {
        Syscall::ShareHandle { handle, flags } => {
            let flags = ShareFlags::from_bits(flags).ok_or_else(|| {
                KernelError::InvalidArgument(format!("unknown share flags {:#x}", flags))
            })?;
            kernel
                .share_handle(caller, handle, flags)
                .map(SyscallResult::Handle)
        }
        Syscall::UnshareHandle { handle } => {
            kernel.unshare_handle(caller, handle).map(|_| SyscallResult::Ok)
        }
        Syscall::UpgradeSharedHandle { shared } => kernel
            .upgrade_shared_handle(caller, shared)
            .map(SyscallResult::Handle),
        Syscall::IdentHandle { handle } => {
            kernel.identify_handle(caller, handle).map(SyscallResult::Ident)
        }
        Syscall::CheckHandleRight { handle, right } => kernel
            .check_handle_right(caller, handle, text(&right)?)
            .map(SyscallResult::Bool),
        Syscall::DropHandleRight { handle, right } => kernel
            .drop_handle_right(caller, handle, text(&right)?)
            .map(|_| SyscallResult::Ok),
        Syscall::DropAllHandleRights { handle } => kernel
            .drop_all_handle_rights(caller, handle)
            .map(|_| SyscallResult::Ok),
        Syscall::GrantHandleRight { handle, right } => kernel
            .grant_handle_right(caller, handle, text(&right)?)
            .map(|_| SyscallResult::Ok),
        Syscall::CreateSecurityContext => kernel
            .create_security_context(caller)
            .map(SyscallResult::Handle),
        Syscall::CopySecurityContext { ctx } => kernel
            .copy_security_context(caller, ctx)
            .map(SyscallResult::Handle),
        Syscall::DestroySecurityContext { ctx } => kernel
            .destroy_security_context(caller, ctx)
            .map(|_| SyscallResult::Ok),
        Syscall::GetCurrentSecurityContext => kernel
            .current_security_context(caller)
            .map(SyscallResult::Handle),
        Syscall::HasPermission { ctx, scope, name } => kernel
            .has_permission(caller, ctx, scope, text(&name)?)
            .map(SyscallResult::Bool),
        Syscall::SetPrimaryPrincipal { ctx, principal } => kernel
            .set_primary_principal(caller, ctx, principal)
            .map(|_| SyscallResult::Ok),
        Syscall::AddSecondaryPrincipal { ctx, principal } => kernel
            .add_secondary_principal(caller, ctx, principal)
            .map(|_| SyscallResult::Ok),
        Syscall::GrantPermission {
            ctx,
            scope,
            name,
            status,
        } => kernel
            .grant_permission(caller, ctx, scope, text(&name)?, Status::new(status))
            .map(|_| SyscallResult::Ok),
        Syscall::DropPermission {
            ctx,
            scope,
            name,
            status,
        } => kernel
            .drop_permission(caller, ctx, scope, text(&name)?, Status::new(status))
            .map(|_| SyscallResult::Ok),
        Syscall::RevokePermission { ctx, scope, name } => kernel
            .revoke_permission(caller, ctx, scope, text(&name)?)
            .map(|_| SyscallResult::Ok),
        Syscall::SetResourceLimit { ctx, name, value } => kernel
            .set_resource_limit(caller, ctx, text(&name)?, value)
            .map(|_| SyscallResult::Ok),
        Syscall::GetResourceLimit { ctx, name } => kernel
            .get_resource_limit(caller, ctx, text(&name)?)
            .map(SyscallResult::Limit),
        Syscall::EncodeSecurityContext { ctx, capacity } => {
            // Size the buffer from the image, never from the caller's capacity
            let required = match kernel.encode_security_context(caller, ctx, &mut [0u8; 0]) {
                Ok(written) => written,
                Err(KernelError::BufferTooSmall { required }) => required,
                Err(err) => return Err(err),
            };
            if capacity < required {
                return Err(KernelError::BufferTooSmall { required });
            }
            let mut buffer = vec![0u8; required];
            let written = kernel.encode_security_context(caller, ctx, &mut buffer)?;
            buffer.truncate(written);
            Ok(SyscallResult::Bytes(buffer))
        }
        Syscall::GetPrimaryPrincipal { ctx } => kernel
            .get_primary_principal(caller, ctx)
            .map(SyscallResult::Principal),
        Syscall::GetSecondaryPrincipals { ctx } => kernel
            .get_secondary_principals(caller, ctx)
            .map(SyscallResult::Principals),
    }
}
