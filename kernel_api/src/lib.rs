//! # Kernel API
//!
//! This crate defines the boundary between callers and the handle table /
//! security-context engine.
//!
//! ## Philosophy
//!
//! The kernel provides **mechanisms**, not policies:
//! - Handles with named rights (not ambient file descriptors)
//! - Explicit rights reduction on share (not implicit inheritance)
//! - Security contexts as capability-checked objects
//! - Scoped, signed permission statuses (not boolean ACLs)
//!
//! ## Design Goals
//!
//! 1. **Testability**: The entire API can be driven from `cargo test`
//! 2. **Explicitness**: The acting caller is always an argument
//! 3. **Stable numbering**: Every call has a fixed syscall number
//! 4. **Partitioned errors**: Error codes carry their subsystem tag
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A register-level ABI or trap mechanism
//! - Process, thread or I/O lifecycle management

pub mod error;
pub mod kernel;
pub mod syscalls;

pub use error::KernelError;
pub use kernel::{Caller, HandleIdent, KernelApi, ScopeTarget};
pub use syscalls::{errno, Subsystem, SysResult, SyscallNumber};
