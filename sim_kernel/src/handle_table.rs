//! Handle table
//!
//! Maps opaque handle identifiers to kernel objects and per-handle rights.
//! Full handles live in exactly one process's table; a handle owned by a
//! different process is indistinguishable from an unknown one.
//!
//! Shared handles are transferable tokens derived from a full handle. They
//! belong to no process until upgraded, carry a subset of the source's
//! rights, and can be upgraded exactly once. The source can revoke its
//! outstanding shares with `unshare`.
//!
//! Every share record, pending or consumed, is charged to the process that
//! owns the source handle and counts toward its handle capacity. Records are
//! released when the source handle is closed or unshared.
//!
//! The table itself does no locking and knows nothing about object
//! liveness; the kernel wraps it in a lock and checks liveness around it.

use core_types::{HandleId, ObjectRef, ProcessId, RightSet, ShareFlags, WideHandle};
use kernel_api::KernelError;
use std::collections::{BTreeMap, BTreeSet};

/// Largest raw identifier the table hands out; keeps ids representable as
/// non-negative syscall results
const MAX_RAW_ID: u64 = i64::MAX as u64;

/// A full handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEntry {
    pub owner: ProcessId,
    pub object: ObjectRef,
    pub rights: RightSet,
    /// Share records derived from this handle, pending or consumed
    shares: BTreeSet<HandleId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShareState {
    Pending,
    Upgraded,
}

/// A shared handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedEntry {
    pub object: ObjectRef,
    pub rights: RightSet,
    pub source: WideHandle,
    state: ShareState,
}

impl SharedEntry {
    pub fn is_upgraded(&self) -> bool {
        self.state == ShareState::Upgraded
    }
}

/// Kernel-wide handle table
#[derive(Debug)]
pub struct HandleTable {
    next_id: u64,
    handles: BTreeMap<HandleId, HandleEntry>,
    shared: BTreeMap<HandleId, SharedEntry>,
    per_process: BTreeMap<ProcessId, usize>,
    shares_per_process: BTreeMap<ProcessId, usize>,
    max_per_process: Option<usize>,
}

fn release_slot(counts: &mut BTreeMap<ProcessId, usize>, owner: ProcessId, by: usize) {
    if let Some(count) = counts.get_mut(&owner) {
        *count = count.saturating_sub(by);
        if *count == 0 {
            counts.remove(&owner);
        }
    }
}

impl HandleTable {
    pub fn new(max_per_process: Option<usize>) -> Self {
        Self {
            next_id: 1,
            handles: BTreeMap::new(),
            shared: BTreeMap::new(),
            per_process: BTreeMap::new(),
            shares_per_process: BTreeMap::new(),
            max_per_process,
        }
    }

    #[cfg(test)]
    fn with_next_id(mut self, next_id: u64) -> Self {
        self.next_id = next_id;
        self
    }

    fn allocate_id(&mut self) -> Result<HandleId, KernelError> {
        if self.next_id > MAX_RAW_ID {
            return Err(KernelError::ResourceExhausted(
                "handle identifier space exhausted".into(),
            ));
        }
        let id = HandleId::from_raw(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    fn ensure_capacity(&self, owner: ProcessId) -> Result<(), KernelError> {
        if let Some(limit) = self.max_per_process {
            let held = self.handle_count(owner) + self.share_count(owner);
            if held >= limit {
                return Err(KernelError::ResourceExhausted(format!(
                    "{} already holds {} handles and shares",
                    owner, limit
                )));
            }
        }
        Ok(())
    }

    /// Mints a full handle in `owner`'s table
    pub fn insert(
        &mut self,
        owner: ProcessId,
        object: ObjectRef,
        rights: RightSet,
    ) -> Result<HandleId, KernelError> {
        self.ensure_capacity(owner)?;
        let id = self.allocate_id()?;
        self.handles.insert(
            id,
            HandleEntry {
                owner,
                object,
                rights,
                shares: BTreeSet::new(),
            },
        );
        *self.per_process.entry(owner).or_insert(0) += 1;
        Ok(id)
    }

    pub fn get(&self, owner: ProcessId, id: HandleId) -> Result<&HandleEntry, KernelError> {
        self.handles
            .get(&id)
            .filter(|entry| entry.owner == owner)
            .ok_or(KernelError::InvalidHandle(id))
    }

    fn get_mut(&mut self, owner: ProcessId, id: HandleId) -> Result<&mut HandleEntry, KernelError> {
        self.handles
            .get_mut(&id)
            .filter(|entry| entry.owner == owner)
            .ok_or(KernelError::InvalidHandle(id))
    }

    /// Drops share records; returns how many were still pending
    fn forget_shares(&mut self, owner: ProcessId, records: BTreeSet<HandleId>) -> usize {
        let mut pending = 0;
        for shared_id in &records {
            if let Some(entry) = self.shared.remove(shared_id) {
                if !entry.is_upgraded() {
                    pending += 1;
                }
            }
        }
        release_slot(&mut self.shares_per_process, owner, records.len());
        pending
    }

    fn remove_entry(&mut self, id: HandleId) -> Option<HandleEntry> {
        let mut entry = self.handles.remove(&id)?;
        release_slot(&mut self.per_process, entry.owner, 1);
        let records = std::mem::take(&mut entry.shares);
        self.forget_shares(entry.owner, records);
        Some(entry)
    }

    /// Closes a full handle
    ///
    /// Pending shares derived from it are revoked along with it.
    pub fn close(&mut self, owner: ProcessId, id: HandleId) -> Result<HandleEntry, KernelError> {
        self.get(owner, id)?;
        self.remove_entry(id).ok_or(KernelError::InvalidHandle(id))
    }

    /// Derives a shared handle carrying the rights named by `flags`
    pub fn share(
        &mut self,
        owner: ProcessId,
        id: HandleId,
        flags: ShareFlags,
    ) -> Result<HandleId, KernelError> {
        let entry = self.get(owner, id)?;
        let rights = if flags.contains(ShareFlags::SAME_RIGHTS) {
            entry.rights.clone()
        } else {
            let requested = flags.named_rights();
            if !requested.is_subset_of(&entry.rights) {
                return Err(KernelError::PermissionDenied(format!(
                    "share of {} requests {} but handle holds {}",
                    id, requested, entry.rights
                )));
            }
            requested.intersection(&entry.rights)
        };
        let object = entry.object;
        self.ensure_capacity(owner)?;

        let shared_id = self.allocate_id()?;
        self.shared.insert(
            shared_id,
            SharedEntry {
                object,
                rights,
                source: WideHandle::new(owner, id),
                state: ShareState::Pending,
            },
        );
        self.get_mut(owner, id)?.shares.insert(shared_id);
        *self.shares_per_process.entry(owner).or_insert(0) += 1;
        Ok(shared_id)
    }

    /// Revokes every pending share of `id` and releases its consumed share
    /// records; returns how many pending shares were revoked
    pub fn unshare(&mut self, owner: ProcessId, id: HandleId) -> Result<usize, KernelError> {
        let records = std::mem::take(&mut self.get_mut(owner, id)?.shares);
        Ok(self.forget_shares(owner, records))
    }

    /// Consumes a shared handle, minting a full handle for `owner`
    pub fn upgrade(&mut self, owner: ProcessId, shared_id: HandleId) -> Result<HandleId, KernelError> {
        if self.handles.contains_key(&shared_id) {
            return Err(KernelError::NotShared(shared_id));
        }
        let entry = self
            .shared
            .get(&shared_id)
            .ok_or(KernelError::InvalidHandle(shared_id))?;
        if entry.is_upgraded() {
            return Err(KernelError::AlreadyUpgraded(shared_id));
        }
        let object = entry.object;
        let rights = entry.rights.clone();

        let id = self.insert(owner, object, rights)?;
        if let Some(entry) = self.shared.get_mut(&shared_id) {
            entry.state = ShareState::Upgraded;
        }
        Ok(id)
    }

    pub fn shared(&self, shared_id: HandleId) -> Option<&SharedEntry> {
        self.shared.get(&shared_id)
    }

    pub fn check_right(&self, owner: ProcessId, id: HandleId, right: &str) -> Result<bool, KernelError> {
        Ok(self.get(owner, id)?.rights.contains(right))
    }

    pub fn drop_right(&mut self, owner: ProcessId, id: HandleId, right: &str) -> Result<(), KernelError> {
        self.get_mut(owner, id)?.rights.remove(right);
        Ok(())
    }

    pub fn drop_all_rights(&mut self, owner: ProcessId, id: HandleId) -> Result<(), KernelError> {
        self.get_mut(owner, id)?.rights.clear();
        Ok(())
    }

    /// Adds a right to a handle without escalating privilege
    ///
    /// Succeeds if the handle already holds the right, or if another handle
    /// in the same process to the same object holds the right together with
    /// every right the target handle holds.
    pub fn grant_right(&mut self, owner: ProcessId, id: HandleId, right: &str) -> Result<(), KernelError> {
        let target = self.get(owner, id)?;
        if target.rights.contains(right) {
            return Ok(());
        }

        let authorized = self.handles.iter().any(|(other_id, other)| {
            *other_id != id
                && other.owner == owner
                && other.object == target.object
                && other.rights.contains(right)
                && target.rights.is_subset_of(&other.rights)
        });
        if !authorized {
            return Err(KernelError::PermissionDenied(format!(
                "no handle to {} in {} holds right {:?}",
                target.object, owner, right
            )));
        }

        self.get_mut(owner, id)?.rights.insert(right);
        Ok(())
    }

    /// Removes every handle naming `object` along with its share records
    pub fn invalidate_object(&mut self, object: &ObjectRef) -> usize {
        let doomed: Vec<HandleId> = self
            .handles
            .iter()
            .filter(|(_, entry)| entry.object == *object)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.remove_entry(*id);
        }
        doomed.len()
    }

    /// Number of full handles, in any process, naming `object`
    pub fn object_handle_count(&self, object: &ObjectRef) -> usize {
        self.handles
            .values()
            .filter(|entry| entry.object == *object)
            .count()
    }

    pub fn handle_count(&self, owner: ProcessId) -> usize {
        self.per_process.get(&owner).copied().unwrap_or(0)
    }

    /// Share records charged to `owner`
    pub fn share_count(&self, owner: ProcessId) -> usize {
        self.shares_per_process.get(&owner).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
