//! Per-handle rights
//!
//! A right is a case-sensitive, opaque name attached to one handle instance.
//! Holding the right allows the holder to perform a class of operations on
//! the object behind the handle. A handful of names are well known to the
//! kernel; every other name is carried verbatim and only ever compared.
//!
//! Unknown names are simply "not held": checking for them is never an error.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Observe object state
pub const READ: &str = "read";
/// Mutate object state
pub const WRITE: &str = "write";
/// Execute or invoke the object
pub const EXECUTE: &str = "execute";
/// Administrative control (destroy, reconfigure)
pub const MANAGE: &str = "manage";

/// Set of rights held by one handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightSet {
    names: BTreeSet<String>,
}

impl RightSet {
    /// Creates an empty right set
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a right set from names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, right: &str) -> bool {
        self.names.contains(right)
    }

    /// Adds a right; returns false if it was already held
    pub fn insert(&mut self, right: impl Into<String>) -> bool {
        self.names.insert(right.into())
    }

    /// Removes a right; returns false if it was not held
    pub fn remove(&mut self, right: &str) -> bool {
        self.names.remove(right)
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn is_subset_of(&self, other: &RightSet) -> bool {
        self.names.is_subset(&other.names)
    }

    pub fn intersection(&self, other: &RightSet) -> RightSet {
        RightSet {
            names: self.names.intersection(&other.names).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates rights in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl fmt::Display for RightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, name) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", name)?;
        }
        write!(f, "}}")
    }
}

bitflags! {
    /// Rights to carry over when sharing a handle
    ///
    /// Each bit names one well-known right. `SAME_RIGHTS` carries every right
    /// of the source handle, including non-well-known names.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShareFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const MANAGE = 1 << 3;
        const SAME_RIGHTS = 1 << 31;

        const READ_ONLY = Self::READ.bits();
    }
}

impl ShareFlags {
    /// Returns the well-known rights these flags name
    pub fn named_rights(self) -> RightSet {
        let mut set = RightSet::new();
        for (flag, name) in [
            (ShareFlags::READ, READ),
            (ShareFlags::WRITE, WRITE),
            (ShareFlags::EXECUTE, EXECUTE),
            (ShareFlags::MANAGE, MANAGE),
        ] {
            if self.contains(flag) {
                set.insert(name);
            }
        }
        set
    }
}
