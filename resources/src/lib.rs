//! # Resources
//!
//! This crate provides the resource limit table held by every security context.
//!
//! ## Philosophy
//!
//! - **Limits are explicit**: a name with no limit has no value, not a default
//! - **Callers own defaults**: the table never invents a quota
//! - **Last write wins**: setting a limit overwrites any previous value
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - Accounting of current usage
//! - Enforcement of the quotas it stores (consumers read and enforce)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Well-known limit names consumed by the security-context engine itself
pub mod names {
    /// Caps the number of secondary principals of the context
    pub const MAX_SECONDARY_PRINCIPALS: &str = "security.max_secondary_principals";
    /// Caps the number of permission records of the context
    pub const MAX_PERMISSION_ENTRIES: &str = "security.max_permission_entries";
}

/// Resource limit errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource limit table capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },
}

/// Named u64 quotas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimitTable {
    limits: BTreeMap<String, u64>,
}

impl ResourceLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a limit, returning the previous value
    ///
    /// `capacity` bounds the number of distinct names; overwriting an
    /// existing name never fails.
    pub fn set(
        &mut self,
        name: &str,
        value: u64,
        capacity: Option<usize>,
    ) -> Result<Option<u64>, ResourceError> {
        if !self.limits.contains_key(name) {
            if let Some(limit) = capacity {
                if self.limits.len() >= limit {
                    return Err(ResourceError::CapacityExceeded { limit });
                }
            }
        }
        Ok(self.limits.insert(name.to_string(), value))
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.limits.get(name).copied()
    }

    /// Reads a limit as a count cap
    ///
    /// Values that do not fit in `usize` saturate.
    pub fn get_cap(&self, name: &str) -> Option<usize> {
        self.get(name)
            .map(|value| usize::try_from(value).unwrap_or(usize::MAX))
    }

    pub fn remove(&mut self, name: &str) -> Option<u64> {
        self.limits.remove(name)
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Sorted snapshot of all limits
    pub fn entries(&self) -> BTreeMap<String, u64> {
        self.limits.clone()
    }

    pub fn clear(&mut self) {
        self.limits.clear();
    }
}

/// Combines two optional caps, keeping the tighter one
pub fn tighter_cap(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
