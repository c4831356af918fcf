//! # Identity
//!
//! This crate provides the principal registry held by every security context.
//!
//! ## Philosophy
//!
//! - **Identity is explicit and contextual, not global**
//! - **Authority comes from permission grants, not names**
//! - **A context without a primary principal is inert**: every privilege
//!   check against it fails until a primary is set
//!
//! ## Core Concepts
//!
//! - Primary principal: exactly one per context once set, replaceable
//! - Secondary principals: a set (no duplicates, order irrelevant)
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - Authentication or cryptography
//! - POSIX users and groups
//! - A directory of known principals

use core_types::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Principal-related errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Secondary principal capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },
}

/// Primary and secondary principals of one security context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalSet {
    primary: Option<Principal>,
    secondary: BTreeSet<Principal>,
}

impl PrincipalSet {
    /// Creates an empty principal set (no primary)
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the primary principal, returning the previous one
    pub fn set_primary(&mut self, principal: Principal) -> Option<Principal> {
        self.primary.replace(principal)
    }

    pub fn primary(&self) -> Option<Principal> {
        self.primary
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Adds a secondary principal
    ///
    /// Returns `Ok(false)` if the principal was already present. The
    /// capacity is only checked for principals that would be new, so
    /// re-adding a member never fails.
    pub fn add_secondary(
        &mut self,
        principal: Principal,
        capacity: Option<usize>,
    ) -> Result<bool, IdentityError> {
        if self.secondary.contains(&principal) {
            return Ok(false);
        }
        if let Some(limit) = capacity {
            if self.secondary.len() >= limit {
                return Err(IdentityError::CapacityExceeded { limit });
            }
        }
        Ok(self.secondary.insert(principal))
    }

    pub fn remove_secondary(&mut self, principal: &Principal) -> bool {
        self.secondary.remove(principal)
    }

    /// Snapshot of the secondary principals, sorted
    pub fn secondary(&self) -> Vec<Principal> {
        self.secondary.iter().copied().collect()
    }

    pub fn secondary_count(&self) -> usize {
        self.secondary.len()
    }

    /// Checks whether the principal is the primary or one of the secondaries
    pub fn contains(&self, principal: &Principal) -> bool {
        self.primary.as_ref() == Some(principal) || self.secondary.contains(principal)
    }

    /// Drops every principal
    pub fn clear(&mut self) {
        self.primary = None;
        self.secondary.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_new_set_has_no_primary() {
        let set = PrincipalSet::new();
        assert!(!set.has_primary());
        assert_eq!(set.primary(), None);
        assert!(set.secondary().is_empty());
    }

    #[test]
    fn test_set_primary_replaces() {
        let mut set = PrincipalSet::new();
        let u1 = Principal::new();
        let u2 = Principal::new();

        assert_eq!(set.set_primary(u1), None);
        assert_eq!(set.set_primary(u2), Some(u1));
        assert_eq!(set.primary(), Some(u2));
        assert!(!set.contains(&u1));
    }

    #[test]
    fn test_add_secondary_is_set_semantics() {
        let mut set = PrincipalSet::new();
        let p = Principal::new();

        assert_eq!(set.add_secondary(p, None), Ok(true));
        assert_eq!(set.add_secondary(p, None), Ok(false));
        assert_eq!(set.secondary_count(), 1);
    }

    #[test]
    fn test_secondary_capacity() {
        let mut set = PrincipalSet::new();
        let first = Principal::new();
        set.add_secondary(first, Some(1)).unwrap();

        assert_eq!(
            set.add_secondary(Principal::new(), Some(1)),
            Err(IdentityError::CapacityExceeded { limit: 1 })
        );
        // Re-adding an existing member does not count against the cap
        assert_eq!(set.add_secondary(first, Some(1)), Ok(false));
        assert_eq!(set.secondary_count(), 1);
    }

    #[test]
    fn test_secondary_snapshot_is_not_live() {
        let mut set = PrincipalSet::new();
        set.add_secondary(Principal::new(), None).unwrap();
        let snapshot = set.secondary();

        set.add_secondary(Principal::new(), None).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(set.secondary().len(), 2);
    }

    #[test]
    fn test_secondary_snapshot_sorted() {
        let mut set = PrincipalSet::new();
        let high = Principal::from_uuid(Uuid::from_u128(9));
        let low = Principal::from_uuid(Uuid::from_u128(1));
        set.add_secondary(high, None).unwrap();
        set.add_secondary(low, None).unwrap();
        assert_eq!(set.secondary(), vec![low, high]);
    }

    #[test]
    fn test_contains_and_remove() {
        let mut set = PrincipalSet::new();
        let primary = Principal::new();
        let secondary = Principal::new();
        set.set_primary(primary);
        set.add_secondary(secondary, None).unwrap();

        assert!(set.contains(&primary));
        assert!(set.contains(&secondary));
        assert!(set.remove_secondary(&secondary));
        assert!(!set.contains(&secondary));

        set.clear();
        assert!(!set.has_primary());
    }
}
