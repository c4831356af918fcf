//! Kernel API trait and call-site types

use crate::KernelError;
use core_types::{HandleId, HandleType, IoSubtype, Principal, ProcessId, ShareFlags, ThreadId};
use policy::Status;
use serde::{Deserialize, Serialize};

/// The thread performing a call, and the process whose handle table it uses
///
/// The thread-to-context binding is owned by the thread subsystem; the
/// kernel looks it up from `thread` whenever it needs the caller's own
/// security context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub process: ProcessId,
    pub thread: ThreadId,
}

impl Caller {
    pub fn new(process: ProcessId, thread: ThreadId) -> Self {
        Self { process, thread }
    }
}

/// Scope of a permission operation, as named through the caller's handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeTarget {
    Kernel,
    /// A thread handle in the caller's table
    Thread(HandleId),
    /// A process handle in the caller's table
    Process(HandleId),
}

/// Result of handle identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleIdent {
    pub handle_type: HandleType,
    pub io_subtype: Option<IoSubtype>,
}

impl HandleIdent {
    /// The single code reported across the syscall boundary
    pub fn code(&self) -> u64 {
        match self.io_subtype {
            Some(subtype) => subtype.code(),
            None => self.handle_type.code(),
        }
    }
}

/// The handle-table and security-context kernel API
///
/// Every call is synchronous and completes in bounded time; there is no
/// cancellation. Every call names the acting [`Caller`] explicitly: there
/// is no ambient "current thread".
///
/// # Example
///
/// ```ignore
/// let ctx = kernel.create_security_context(caller)?;
/// kernel.set_primary_principal(caller, ctx, Principal::new())?;
/// kernel.grant_permission(caller, ctx, ScopeTarget::Kernel, "net.connect", Status::ALLOW)?;
/// assert!(kernel.has_permission(caller, ctx, ScopeTarget::Kernel, "net.connect")?);
/// ```
pub trait KernelApi {
    // Handle table

    /// Creates a transferable, rights-reduced shared handle
    fn share_handle(
        &self,
        caller: Caller,
        handle: HandleId,
        flags: ShareFlags,
    ) -> Result<HandleId, KernelError>;

    /// Revokes every not-yet-upgraded shared handle derived from `handle`
    fn unshare_handle(&self, caller: Caller, handle: HandleId) -> Result<(), KernelError>;

    /// Consumes a shared handle, producing a full handle in the caller's table
    fn upgrade_shared_handle(
        &self,
        caller: Caller,
        shared: HandleId,
    ) -> Result<HandleId, KernelError>;

    fn identify_handle(&self, caller: Caller, handle: HandleId)
        -> Result<HandleIdent, KernelError>;

    fn check_handle_right(
        &self,
        caller: Caller,
        handle: HandleId,
        right: &str,
    ) -> Result<bool, KernelError>;

    fn drop_handle_right(
        &self,
        caller: Caller,
        handle: HandleId,
        right: &str,
    ) -> Result<(), KernelError>;

    fn drop_all_handle_rights(&self, caller: Caller, handle: HandleId)
        -> Result<(), KernelError>;

    fn grant_handle_right(
        &self,
        caller: Caller,
        handle: HandleId,
        right: &str,
    ) -> Result<(), KernelError>;

    // Security context lifecycle

    fn create_security_context(&self, caller: Caller) -> Result<HandleId, KernelError>;

    fn copy_security_context(&self, caller: Caller, ctx: HandleId)
        -> Result<HandleId, KernelError>;

    /// Closes `ctx` and destroys the context once no other handle names it
    fn destroy_security_context(&self, caller: Caller, ctx: HandleId) -> Result<(), KernelError>;

    /// Mints a handle to the context bound to the calling thread
    fn current_security_context(&self, caller: Caller) -> Result<HandleId, KernelError>;

    /// Serializes the context into `buffer`, returning the bytes written
    ///
    /// Fails with [`KernelError::BufferTooSmall`] carrying the exact
    /// required size when `buffer` is too short.
    fn encode_security_context(
        &self,
        caller: Caller,
        ctx: HandleId,
        buffer: &mut [u8],
    ) -> Result<usize, KernelError>;

    // Principals

    fn set_primary_principal(
        &self,
        caller: Caller,
        ctx: HandleId,
        principal: Principal,
    ) -> Result<(), KernelError>;

    fn add_secondary_principal(
        &self,
        caller: Caller,
        ctx: HandleId,
        principal: Principal,
    ) -> Result<(), KernelError>;

    fn get_primary_principal(&self, caller: Caller, ctx: HandleId)
        -> Result<Principal, KernelError>;

    fn get_secondary_principals(
        &self,
        caller: Caller,
        ctx: HandleId,
    ) -> Result<Vec<Principal>, KernelError>;

    // Permissions

    fn has_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
    ) -> Result<bool, KernelError>;

    fn grant_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
        status: Status,
    ) -> Result<(), KernelError>;

    fn drop_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
        status: Status,
    ) -> Result<(), KernelError>;

    fn revoke_permission(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
    ) -> Result<(), KernelError>;

    /// The raw record at exactly `scope`, without fallback
    fn permission_status(
        &self,
        caller: Caller,
        ctx: HandleId,
        scope: ScopeTarget,
        name: &str,
    ) -> Result<Option<Status>, KernelError>;

    // Resource limits

    fn set_resource_limit(
        &self,
        caller: Caller,
        ctx: HandleId,
        name: &str,
        value: u64,
    ) -> Result<(), KernelError>;

    fn get_resource_limit(
        &self,
        caller: Caller,
        ctx: HandleId,
        name: &str,
    ) -> Result<u64, KernelError>;
}
