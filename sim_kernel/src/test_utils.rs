//! Test utilities
//!
//! Helpers for standing up a kernel with a simulated object directory,
//! spawning callers and giving them root contexts.

use crate::config::KernelConfig;
use crate::objects::{ObjectDirectory, SimObjectDirectory};
use crate::SimulatedKernel;
use core_types::{ContextId, HandleId, IoSubtype, ObjectRef, Principal, RightSet};
use kernel_api::{Caller, KernelError};
use policy::{Scope, Status};
use std::sync::Arc;

/// A kernel together with the directory standing in for the
/// process, thread and I/O subsystems
pub struct TestWorld {
    pub kernel: SimulatedKernel,
    pub objects: Arc<SimObjectDirectory>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let objects = Arc::new(SimObjectDirectory::new());
        let directory: Arc<dyn ObjectDirectory> = objects.clone();
        Self {
            kernel: SimulatedKernel::with_config(config, directory),
            objects,
        }
    }

    /// Spawns a fresh process with one thread
    pub fn spawn_caller(&self) -> Caller {
        let (process, thread) = self.objects.spawn_process_with_thread();
        Caller::new(process, thread)
    }

    /// Spawns another thread in the caller's process
    pub fn spawn_thread(&self, caller: Caller) -> Option<Caller> {
        self.objects
            .spawn_thread(caller.process)
            .map(|thread| Caller::new(caller.process, thread))
    }

    /// Binds the caller's thread to a new root context
    ///
    /// The context gets a fresh primary principal and a kernel-scope record
    /// for each `(name, status)` pair.
    pub fn bind_root(&self, caller: Caller, grants: &[(&str, Status)]) -> Result<ContextId, KernelError> {
        let ctx = self.kernel.bootstrap_context(Some(Principal::new()))?;
        for (name, status) in grants {
            self.kernel.seed_permission(ctx, Scope::Kernel, name, *status)?;
        }
        if !self.objects.bind_context(caller.thread, ctx) {
            return Err(KernelError::InvalidArgument(format!(
                "{} is not a live thread",
                caller.thread
            )));
        }
        Ok(ctx)
    }

    /// Registers an I/O object and mints a handle to it
    pub fn install_io(
        &self,
        caller: Caller,
        subtype: IoSubtype,
        rights: RightSet,
    ) -> Result<HandleId, KernelError> {
        let object = self.objects.register_object();
        self.kernel
            .install_handle(caller.process, ObjectRef::Io(subtype, object), rights)
    }

    /// Mints a handle to `target`'s thread in `holder`'s table
    pub fn thread_handle(&self, holder: Caller, target: Caller) -> Result<HandleId, KernelError> {
        let object = ObjectRef::Thread(target.thread);
        self.kernel
            .install_handle(holder.process, object, object.default_rights())
    }

    /// Mints a handle to `target`'s process in `holder`'s table
    pub fn process_handle(&self, holder: Caller, target: Caller) -> Result<HandleId, KernelError> {
        let object = ObjectRef::Process(target.process);
        self.kernel
            .install_handle(holder.process, object, object.default_rights())
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
