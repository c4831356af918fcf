//! Concurrency Tests
//!
//! Drives one kernel from several OS threads at once. Readers must observe
//! either the state before or after a concurrent mutation, never an error
//! or a mix.

use core_types::{HandleId, IoSubtype, ShareFlags};
use kernel_api::{Caller, KernelApi, KernelError, ScopeTarget};
use policy::Status;
use std::collections::BTreeSet;
use std::thread;
use tests_resilience::{new_context_with_primary, read_write, test_bootstrap};

const NET: &str = "net.connect";
const WORKERS: usize = 8;

/// Test: readers racing a grant/drop writer only ever see allow or deny
#[test]
fn test_readers_see_pre_or_post_state() {
    let (world, caller) = test_bootstrap(&[NET]);
    let kernel = &world.kernel;
    let ctx = new_context_with_primary(kernel, caller).unwrap();
    kernel
        .grant_permission(caller, ctx, ScopeTarget::Kernel, NET, Status::ALLOW)
        .unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for round in 0..500 {
                if round % 2 == 0 {
                    kernel
                        .drop_permission(caller, ctx, ScopeTarget::Kernel, NET, Status::DENY)
                        .expect("Failed to drop");
                } else {
                    kernel
                        .grant_permission(caller, ctx, ScopeTarget::Kernel, NET, Status::ALLOW)
                        .expect("Failed to grant");
                }
            }
        });

        for _ in 0..WORKERS / 2 {
            s.spawn(|| {
                for _ in 0..500 {
                    let status = kernel
                        .permission_status(caller, ctx, ScopeTarget::Kernel, NET)
                        .expect("Failed to read status");
                    assert!(matches!(status, Some(Status::ALLOW) | Some(Status::DENY)));
                    kernel
                        .has_permission(caller, ctx, ScopeTarget::Kernel, NET)
                        .expect("Failed to query");
                }
            });
        }
    });

    // 500 rounds end on a grant
    assert!(kernel.has_permission(caller, ctx, ScopeTarget::Kernel, NET).unwrap());
}

/// Test: racing upgrades of one shared handle succeed exactly once
#[test]
fn test_concurrent_upgrade_succeeds_once() {
    let (world, owner) = test_bootstrap(&[]);
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();
    let shared = world
        .kernel
        .share_handle(owner, file, ShareFlags::READ)
        .unwrap();
    let receivers: Vec<Caller> = (0..WORKERS).map(|_| world.spawn_caller()).collect();

    let results: Vec<Result<HandleId, KernelError>> = thread::scope(|s| {
        let workers: Vec<_> = receivers
            .iter()
            .map(|receiver| {
                let kernel = &world.kernel;
                s.spawn(move || kernel.upgrade_shared_handle(*receiver, shared))
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("Failed to join worker"))
            .collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| *err == KernelError::AlreadyUpgraded(shared)));
    let installed: usize = receivers
        .iter()
        .map(|receiver| world.kernel.handle_count(receiver.process))
        .sum();
    assert_eq!(installed, 1);
}

/// Test: once a reader sees a destroyed context it never sees it alive again
#[test]
fn test_destroy_races_readers() {
    let (world, owner) = test_bootstrap(&[]);
    let kernel = &world.kernel;
    let ctx = new_context_with_primary(kernel, owner).unwrap();
    let primary = kernel.get_primary_principal(owner, ctx).unwrap();

    thread::scope(|s| {
        for _ in 0..WORKERS {
            s.spawn(|| {
                let mut destroyed = false;
                for _ in 0..1_000 {
                    match kernel.get_primary_principal(owner, ctx) {
                        Ok(seen) => {
                            assert!(!destroyed, "context came back after destroy");
                            assert_eq!(seen, primary);
                        }
                        Err(KernelError::InvalidHandle(handle)) => {
                            assert_eq!(handle, ctx);
                            destroyed = true;
                        }
                        Err(other) => panic!("unexpected error: {}", other),
                    }
                }
            });
        }
        s.spawn(|| {
            kernel
                .destroy_security_context(owner, ctx)
                .expect("Failed to destroy");
        });
    });

    assert_eq!(
        kernel.get_primary_principal(owner, ctx),
        Err(KernelError::InvalidHandle(ctx))
    );
}

/// Test: contexts created from many threads get distinct handles
#[test]
fn test_concurrent_creation() {
    let (world, caller) = test_bootstrap(&[]);
    let before = world.kernel.context_count();

    let handles: Vec<HandleId> = thread::scope(|s| {
        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let kernel = &world.kernel;
                s.spawn(move || {
                    (0..16)
                        .map(|_| {
                            kernel
                                .create_security_context(caller)
                                .expect("Failed to create context")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().expect("Failed to join worker"))
            .collect()
    });

    let distinct: BTreeSet<HandleId> = handles.iter().copied().collect();
    assert_eq!(distinct.len(), WORKERS * 16);
    assert_eq!(world.kernel.context_count(), before + WORKERS * 16);
}

/// Test: secondary principals added from several threads all land
#[test]
fn test_concurrent_secondary_principals() {
    let (world, caller) = test_bootstrap(&[]);
    let kernel = &world.kernel;
    let ctx = kernel.create_security_context(caller).unwrap();

    thread::scope(|s| {
        for _ in 0..WORKERS {
            s.spawn(|| {
                for _ in 0..10 {
                    kernel
                        .add_secondary_principal(caller, ctx, core_types::Principal::new())
                        .expect("Failed to add principal");
                    let snapshot = kernel
                        .get_secondary_principals(caller, ctx)
                        .expect("Failed to read principals");
                    assert!(!snapshot.is_empty());
                }
            });
        }
    });

    assert_eq!(
        kernel.get_secondary_principals(caller, ctx).unwrap().len(),
        WORKERS * 10
    );
}
