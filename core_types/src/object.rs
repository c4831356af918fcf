//! Kernel object kinds and handle type tags
//!
//! Every handle names exactly one kernel object. The object's kind fixes the
//! handle's *type* tag for the handle's whole lifetime; I/O objects further
//! carry a *subtype* tag.
//!
//! ## Encoding
//!
//! Type and subtype are fixed 64-bit constants. The type occupies the low
//! bits; an I/O subtype is `(n << 28) | HANDLE_TYPE_IO`, so masking a subtype
//! code with [`HANDLE_TYPE_MASK`] always yields the I/O type code.

use crate::ids::{ContextId, ObjectId, ProcessId, ThreadId};
use crate::rights::{self, RightSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit position of the I/O subtype discriminator
pub const IO_SUBTYPE_SHIFT: u32 = 28;

/// Mask selecting the type bits of a type or subtype code
pub const HANDLE_TYPE_MASK: u64 = (1 << IO_SUBTYPE_SHIFT) - 1;

/// Handle type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HandleType {
    Process,
    Thread,
    Io,
    Debug,
    Security,
    Namespace,
    EnvMap,
}

impl HandleType {
    pub const ALL: [HandleType; 7] = [
        HandleType::Process,
        HandleType::Thread,
        HandleType::Io,
        HandleType::Debug,
        HandleType::Security,
        HandleType::Namespace,
        HandleType::EnvMap,
    ];

    /// Returns the stable numeric type code
    pub const fn code(self) -> u64 {
        match self {
            HandleType::Process => 1,
            HandleType::Thread => 2,
            HandleType::Io => 3,
            HandleType::Debug => 4,
            HandleType::Security => 5,
            HandleType::Namespace => 6,
            HandleType::EnvMap => 7,
        }
    }

    /// Decodes a type code, ignoring any subtype bits
    pub fn from_code(code: u64) -> Option<Self> {
        let base = code & HANDLE_TYPE_MASK;
        Self::ALL.into_iter().find(|ty| ty.code() == base)
    }
}

impl fmt::Display for HandleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleType::Process => "process",
            HandleType::Thread => "thread",
            HandleType::Io => "io",
            HandleType::Debug => "debug",
            HandleType::Security => "security",
            HandleType::Namespace => "namespace",
            HandleType::EnvMap => "envmap",
        };
        f.write_str(name)
    }
}

/// I/O handle subtype tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IoSubtype {
    File,
    Device,
    PipeRead,
    PipeWrite,
    Socket,
    Server,
    MemBuf,
    IpcConnection,
    IpcServer,
}

impl IoSubtype {
    pub const ALL: [IoSubtype; 9] = [
        IoSubtype::File,
        IoSubtype::Device,
        IoSubtype::PipeRead,
        IoSubtype::PipeWrite,
        IoSubtype::Socket,
        IoSubtype::Server,
        IoSubtype::MemBuf,
        IoSubtype::IpcConnection,
        IoSubtype::IpcServer,
    ];

    const fn discriminator(self) -> u64 {
        match self {
            IoSubtype::File => 1,
            IoSubtype::Device => 2,
            IoSubtype::PipeRead => 3,
            IoSubtype::PipeWrite => 4,
            IoSubtype::Socket => 5,
            IoSubtype::Server => 6,
            IoSubtype::MemBuf => 7,
            IoSubtype::IpcConnection => 8,
            IoSubtype::IpcServer => 9,
        }
    }

    /// Returns the stable numeric subtype code
    pub const fn code(self) -> u64 {
        (self.discriminator() << IO_SUBTYPE_SHIFT) | HandleType::Io.code()
    }

    /// Decodes a subtype code
    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|sub| sub.code() == code)
    }
}

/// Reference to the kernel object a handle names
///
/// This is a closed set: behavior that depends on the object kind is a
/// `match` here rather than a trait object, so adding a kind is a compile
/// error everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectRef {
    Process(ProcessId),
    Thread(ThreadId),
    Io(IoSubtype, ObjectId),
    Debug(ObjectId),
    Security(ContextId),
    Namespace(ObjectId),
    EnvMap(ObjectId),
}

impl ObjectRef {
    /// Returns the handle type tag for this object
    pub fn handle_type(&self) -> HandleType {
        match self {
            ObjectRef::Process(_) => HandleType::Process,
            ObjectRef::Thread(_) => HandleType::Thread,
            ObjectRef::Io(..) => HandleType::Io,
            ObjectRef::Debug(_) => HandleType::Debug,
            ObjectRef::Security(_) => HandleType::Security,
            ObjectRef::Namespace(_) => HandleType::Namespace,
            ObjectRef::EnvMap(_) => HandleType::EnvMap,
        }
    }

    /// Returns the I/O subtype; `None` for every non-I/O object
    pub fn io_subtype(&self) -> Option<IoSubtype> {
        match self {
            ObjectRef::Io(subtype, _) => Some(*subtype),
            _ => None,
        }
    }

    /// The single code reported by handle identification: the subtype code
    /// for I/O objects, the type code otherwise.
    pub fn ident_code(&self) -> u64 {
        match self.io_subtype() {
            Some(subtype) => subtype.code(),
            None => self.handle_type().code(),
        }
    }

    /// Rights a freshly minted handle to this kind of object carries
    pub fn default_rights(&self) -> RightSet {
        match self {
            ObjectRef::Process(_) | ObjectRef::Thread(_) => {
                RightSet::from_names([rights::READ, rights::MANAGE])
            }
            ObjectRef::Io(IoSubtype::PipeRead, _) => RightSet::from_names([rights::READ]),
            ObjectRef::Io(IoSubtype::PipeWrite, _) => RightSet::from_names([rights::WRITE]),
            ObjectRef::Io(..) => RightSet::from_names([rights::READ, rights::WRITE]),
            ObjectRef::Debug(_) => RightSet::from_names([rights::READ, rights::MANAGE]),
            ObjectRef::Security(_) => {
                RightSet::from_names([rights::READ, rights::WRITE, rights::MANAGE])
            }
            ObjectRef::Namespace(_) | ObjectRef::EnvMap(_) => {
                RightSet::from_names([rights::READ, rights::WRITE])
            }
        }
    }

    pub fn as_thread(&self) -> Option<ThreadId> {
        match self {
            ObjectRef::Thread(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_process(&self) -> Option<ProcessId> {
        match self {
            ObjectRef::Process(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<ContextId> {
        match self {
            ObjectRef::Security(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::Process(id) => write!(f, "{}", id),
            ObjectRef::Thread(id) => write!(f, "{}", id),
            ObjectRef::Io(subtype, id) => write!(f, "io({:?}):{}", subtype, id.as_uuid()),
            ObjectRef::Debug(id) => write!(f, "debug:{}", id.as_uuid()),
            ObjectRef::Security(id) => write!(f, "{}", id),
            ObjectRef::Namespace(id) => write!(f, "namespace:{}", id.as_uuid()),
            ObjectRef::EnvMap(id) => write!(f, "envmap:{}", id.as_uuid()),
        }
    }
}
