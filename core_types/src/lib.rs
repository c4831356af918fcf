//! # Core Types
//!
//! This crate defines the fundamental types shared by the handle table and
//! the security-context engine.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: Object kinds and rights are typed and cannot be confused.
//! - **Type safety first**: A thread identity is never mistaken for a process identity.
//! - **No ambient authority**: Every operation names the handle it acts through.
//!
//! ## Key Types
//!
//! - [`HandleId`]: Opaque, process-scoped handle identifier
//! - [`ObjectRef`]: The kernel object behind a handle (closed set of kinds)
//! - [`HandleType`] / [`IoSubtype`]: Stable numeric type tags
//! - [`RightSet`] / [`ShareFlags`]: Per-handle rights and share masks
//! - [`Principal`]: UUID-identified security subject
//! - [`ThreadOwner`]: Owning handle reference or bare principal identity

pub mod ids;
pub mod object;
pub mod owner;
pub mod rights;
pub mod uuid_tools;

pub use ids::{ContextId, HandleId, ObjectId, Principal, ProcessId, ThreadId};
pub use object::{HandleType, IoSubtype, ObjectRef, HANDLE_TYPE_MASK, IO_SUBTYPE_SHIFT};
pub use owner::{ThreadOwner, WideHandle};
pub use rights::{RightSet, ShareFlags};
