//! Syscall numbering and result encoding.
//!
//! Every operation of the handle and security-context subsystems has a
//! stable number. A call returns a single signed `SysResult`: non-negative
//! values carry the output, negative values carry an error composed of the
//! subsystem tag and a subsystem-local code, so two subsystems can never
//! collide on a raw error value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw signed syscall result
pub type SysResult = i64;

/// Subsystem-local error codes of the base subsystem
pub mod errno {
    pub const PERMISSION: i64 = -1;
    pub const INVALID_HANDLE: i64 = -2;
    pub const INVALID_ARGUMENT: i64 = -3;
    pub const BUFFER_TOO_SMALL: i64 = -4;
    pub const ALREADY_UPGRADED: i64 = -5;
    pub const NOT_SHARED: i64 = -6;
    pub const NO_PRINCIPAL: i64 = -7;
    pub const NO_SUCH_LIMIT: i64 = -8;
    pub const RESOURCE_EXHAUSTED: i64 = -9;
}

/// Subsystem tag partitioning syscall numbers and error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subsystem(pub u16);

impl Subsystem {
    /// Handles and security contexts
    pub const BASE: Subsystem = Subsystem(0);

    /// Full syscall number for a subsystem-local number
    pub const fn sysno(self, number: u64) -> u64 {
        ((self.0 as u64) << 12) | number
    }

    /// Raw error value for a subsystem-local (negative) code
    pub const fn error(self, code: i64) -> SysResult {
        -(((self.0 as i64) << 8) | -code)
    }

    /// Splits a raw error value into subsystem and local code
    ///
    /// Returns `None` for non-negative (success) values and for values
    /// whose subsystem does not fit in 16 bits.
    pub fn split_error(raw: SysResult) -> Option<(Subsystem, i64)> {
        if raw >= 0 {
            return None;
        }
        let magnitude = raw.unsigned_abs();
        let subsystem = u16::try_from(magnitude >> 8).ok()?;
        Some((Subsystem(subsystem), -((magnitude & 0xff) as i64)))
    }
}

/// Stable syscall numbers
///
/// Numbers 0..=7 belong to the handle table, 16..=38 to security contexts;
/// 8..=15 are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyscallNumber {
    ShareHandle,
    UnshareHandle,
    UpgradeSharedHandle,
    IdentHandle,
    CheckHandleRight,
    DropHandleRight,
    DropAllHandleRights,
    GrantHandleRight,
    CreateSecurityContext,
    CopySecurityContext,
    DestroySecurityContext,
    GetCurrentSecurityContext,
    HasKernelPermission,
    HasThreadPermission,
    HasProcessPermission,
    SetPrimaryPrincipal,
    AddSecondaryPrincipal,
    GrantKernelPermission,
    GrantThreadPermission,
    GrantProcessPermission,
    DropKernelPermission,
    DropThreadPermission,
    DropProcessPermission,
    RevokeKernelPermission,
    RevokeThreadPermission,
    RevokeProcessPermission,
    SetKernelResourceLimit,
    GetKernelResourceLimit,
    EncodeSecurityContext,
    GetPrimaryPrincipal,
    GetSecondaryPrincipals,
}

impl SyscallNumber {
    pub const ALL: [SyscallNumber; 31] = [
        SyscallNumber::ShareHandle,
        SyscallNumber::UnshareHandle,
        SyscallNumber::UpgradeSharedHandle,
        SyscallNumber::IdentHandle,
        SyscallNumber::CheckHandleRight,
        SyscallNumber::DropHandleRight,
        SyscallNumber::DropAllHandleRights,
        SyscallNumber::GrantHandleRight,
        SyscallNumber::CreateSecurityContext,
        SyscallNumber::CopySecurityContext,
        SyscallNumber::DestroySecurityContext,
        SyscallNumber::GetCurrentSecurityContext,
        SyscallNumber::HasKernelPermission,
        SyscallNumber::HasThreadPermission,
        SyscallNumber::HasProcessPermission,
        SyscallNumber::SetPrimaryPrincipal,
        SyscallNumber::AddSecondaryPrincipal,
        SyscallNumber::GrantKernelPermission,
        SyscallNumber::GrantThreadPermission,
        SyscallNumber::GrantProcessPermission,
        SyscallNumber::DropKernelPermission,
        SyscallNumber::DropThreadPermission,
        SyscallNumber::DropProcessPermission,
        SyscallNumber::RevokeKernelPermission,
        SyscallNumber::RevokeThreadPermission,
        SyscallNumber::RevokeProcessPermission,
        SyscallNumber::SetKernelResourceLimit,
        SyscallNumber::GetKernelResourceLimit,
        SyscallNumber::EncodeSecurityContext,
        SyscallNumber::GetPrimaryPrincipal,
        SyscallNumber::GetSecondaryPrincipals,
    ];

    /// Subsystem-local number
    pub const fn number(self) -> u64 {
        match self {
            SyscallNumber::ShareHandle => 0,
            SyscallNumber::UnshareHandle => 1,
            SyscallNumber::UpgradeSharedHandle => 2,
            SyscallNumber::IdentHandle => 3,
            SyscallNumber::CheckHandleRight => 4,
            SyscallNumber::DropHandleRight => 5,
            SyscallNumber::DropAllHandleRights => 6,
            SyscallNumber::GrantHandleRight => 7,
            SyscallNumber::CreateSecurityContext => 16,
            SyscallNumber::CopySecurityContext => 17,
            SyscallNumber::DestroySecurityContext => 18,
            SyscallNumber::GetCurrentSecurityContext => 19,
            SyscallNumber::HasKernelPermission => 20,
            SyscallNumber::HasThreadPermission => 21,
            SyscallNumber::HasProcessPermission => 22,
            SyscallNumber::SetPrimaryPrincipal => 23,
            SyscallNumber::AddSecondaryPrincipal => 24,
            SyscallNumber::GrantKernelPermission => 25,
            SyscallNumber::GrantThreadPermission => 26,
            SyscallNumber::GrantProcessPermission => 27,
            SyscallNumber::DropKernelPermission => 28,
            SyscallNumber::DropThreadPermission => 29,
            SyscallNumber::DropProcessPermission => 30,
            SyscallNumber::RevokeKernelPermission => 31,
            SyscallNumber::RevokeThreadPermission => 32,
            SyscallNumber::RevokeProcessPermission => 33,
            SyscallNumber::SetKernelResourceLimit => 34,
            SyscallNumber::GetKernelResourceLimit => 35,
            SyscallNumber::EncodeSecurityContext => 36,
            SyscallNumber::GetPrimaryPrincipal => 37,
            SyscallNumber::GetSecondaryPrincipals => 38,
        }
    }

    /// Full syscall number including the subsystem tag
    pub const fn sysno(self) -> u64 {
        Subsystem::BASE.sysno(self.number())
    }

    pub fn from_number(number: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|sys| sys.number() == number)
    }

    /// Whether this call belongs to the handle table
    pub const fn is_handle_call(self) -> bool {
        self.number() < 8
    }
}

impl fmt::Display for SyscallNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.number())
    }
}
