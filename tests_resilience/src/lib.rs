//! Resilience Test Utilities
//!
//! This crate provides shared utilities for the handle-table and
//! security-context integration tests.
//!
//! ## Test Philosophy
//!
//! - **No escalation**: rights and permission statuses only ever flow downward
//! - **No partial mutation**: a failed call leaves every table unchanged
//! - **No dangling authority**: destroyed contexts and dead threads grant nothing
//! - **Consistency under concurrency**: readers see pre- or post-state, never a mix

use core_types::RightSet;
use core_types::rights::{READ, WRITE};
use kernel_api::{Caller, KernelApi, KernelError};
use policy::Status;
use sim_kernel::test_utils::TestWorld;
use sim_kernel::SimulatedKernel;

pub use core_types::HandleId;

/// Bootstrap helper for tests
///
/// Creates a kernel and one caller whose thread is bound to a root context
/// holding an unbounded allow (`i64::MAX`) for every name in `grants`.
pub fn test_bootstrap(grants: &[&str]) -> (TestWorld, Caller) {
    let world = TestWorld::new();
    let caller = world.spawn_caller();
    let seeded: Vec<(&str, Status)> = grants
        .iter()
        .map(|name| (*name, Status::new(i64::MAX)))
        .collect();
    if let Err(err) = world.bind_root(caller, &seeded) {
        panic!("Failed to bind root context: {}", err);
    }
    (world, caller)
}

/// Creates a context through the API and sets a fresh primary principal
pub fn new_context_with_primary(
    kernel: &SimulatedKernel,
    caller: Caller,
) -> Result<HandleId, KernelError> {
    let ctx = kernel.create_security_context(caller)?;
    kernel.set_primary_principal(caller, ctx, core_types::Principal::new())?;
    Ok(ctx)
}

/// Read + write, the usual rights of an I/O handle
pub fn read_write() -> RightSet {
    RightSet::from_names([READ, WRITE])
}
