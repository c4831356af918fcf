//! Object directory: the seam to the process, thread and I/O subsystems.
//!
//! Those subsystems own object lifetimes and the thread-to-context binding.
//! The kernel only asks two questions of them: is this object still alive,
//! and which security context is this thread bound to.

use core_types::{ContextId, ObjectId, ObjectRef, ProcessId, ThreadId};
use spin::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// Liveness and binding lookups answered by the excluded subsystems
pub trait ObjectDirectory: Send + Sync {
    /// Whether a non-security object is still alive
    ///
    /// Security contexts are owned by the kernel itself and never asked about.
    fn is_live(&self, object: &ObjectRef) -> bool;

    /// The context the thread is currently bound to
    fn bound_context(&self, thread: ThreadId) -> Option<ContextId>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    processes: BTreeSet<ProcessId>,
    threads: BTreeMap<ThreadId, ProcessId>,
    objects: BTreeSet<ObjectId>,
    bindings: BTreeMap<ThreadId, ContextId>,
}

/// In-memory object directory
///
/// Stands in for the process/thread/I/O subsystems under simulation.
#[derive(Debug, Default)]
pub struct SimObjectDirectory {
    state: RwLock<DirectoryState>,
}

impl SimObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_process(&self) -> ProcessId {
        let process = ProcessId::new();
        self.state.write().processes.insert(process);
        process
    }

    /// Spawns a process together with its first thread
    pub fn spawn_process_with_thread(&self) -> (ProcessId, ThreadId) {
        let process = ProcessId::new();
        let thread = ThreadId::new();
        let mut state = self.state.write();
        state.processes.insert(process);
        state.threads.insert(thread, process);
        (process, thread)
    }

    /// Spawns a thread inside a live process
    pub fn spawn_thread(&self, process: ProcessId) -> Option<ThreadId> {
        let mut state = self.state.write();
        if !state.processes.contains(&process) {
            return None;
        }
        let thread = ThreadId::new();
        state.threads.insert(thread, process);
        Some(thread)
    }

    pub fn terminate_thread(&self, thread: ThreadId) -> bool {
        let mut state = self.state.write();
        state.bindings.remove(&thread);
        state.threads.remove(&thread).is_some()
    }

    /// Terminates a process and every thread inside it
    pub fn terminate_process(&self, process: ProcessId) -> bool {
        let mut state = self.state.write();
        let doomed: Vec<ThreadId> = state
            .threads
            .iter()
            .filter(|(_, owner)| **owner == process)
            .map(|(thread, _)| *thread)
            .collect();
        for thread in doomed {
            state.threads.remove(&thread);
            state.bindings.remove(&thread);
        }
        state.processes.remove(&process)
    }

    /// Registers an I/O, debug, namespace or environment-map object
    pub fn register_object(&self) -> ObjectId {
        let object = ObjectId::new();
        self.state.write().objects.insert(object);
        object
    }

    pub fn release_object(&self, object: ObjectId) -> bool {
        self.state.write().objects.remove(&object)
    }

    /// Binds a live thread to a context, replacing any previous binding
    pub fn bind_context(&self, thread: ThreadId, context: ContextId) -> bool {
        let mut state = self.state.write();
        if !state.threads.contains_key(&thread) {
            return false;
        }
        state.bindings.insert(thread, context);
        true
    }

    pub fn unbind_context(&self, thread: ThreadId) -> Option<ContextId> {
        self.state.write().bindings.remove(&thread)
    }

    pub fn thread_process(&self, thread: ThreadId) -> Option<ProcessId> {
        self.state.read().threads.get(&thread).copied()
    }
}

impl ObjectDirectory for SimObjectDirectory {
    fn is_live(&self, object: &ObjectRef) -> bool {
        let state = self.state.read();
        match object {
            ObjectRef::Process(id) => state.processes.contains(id),
            ObjectRef::Thread(id) => state.threads.contains_key(id),
            ObjectRef::Io(_, id)
            | ObjectRef::Debug(id)
            | ObjectRef::Namespace(id)
            | ObjectRef::EnvMap(id) => state.objects.contains(id),
            // Contexts are tracked by the kernel's own registry
            ObjectRef::Security(_) => true,
        }
    }

    fn bound_context(&self, thread: ThreadId) -> Option<ContextId> {
        self.state.read().bindings.get(&thread).copied()
    }
}
