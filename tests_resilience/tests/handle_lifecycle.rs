//! Handle Lifecycle Tests
//!
//! Validates sharing, upgrading, identification and right management of
//! handles across process boundaries.

use core_types::rights::{EXECUTE, MANAGE, READ, WRITE};
use core_types::{HandleType, IoSubtype, ObjectRef, RightSet, ShareFlags};
use kernel_api::{KernelApi, KernelError};
use sim_kernel::config::KernelConfig;
use sim_kernel::security_audit::SecurityEvent;
use sim_kernel::test_utils::TestWorld;
use tests_resilience::{read_write, test_bootstrap};

/// Test: READ_ONLY share of a {read, write} handle carries exactly {read}
#[test]
fn test_read_only_share_reduces_rights() {
    let (world, owner) = test_bootstrap(&[]);
    let receiver = world.spawn_caller();
    let file = world
        .install_io(owner, IoSubtype::File, read_write())
        .expect("Failed to install file");

    let shared = world
        .kernel
        .share_handle(owner, file, ShareFlags::READ_ONLY)
        .expect("Failed to share");
    let upgraded = world
        .kernel
        .upgrade_shared_handle(receiver, shared)
        .expect("Failed to upgrade");

    assert!(world.kernel.check_handle_right(receiver, upgraded, READ).unwrap());
    assert!(!world.kernel.check_handle_right(receiver, upgraded, WRITE).unwrap());

    // The source keeps its full rights
    assert!(world.kernel.check_handle_right(owner, file, WRITE).unwrap());
}

/// Test: identification survives share + upgrade for every object kind
#[test]
fn test_ident_preserved_across_share_and_upgrade() {
    let (world, owner) = test_bootstrap(&[]);
    let receiver = world.spawn_caller();

    let mut handles = Vec::new();
    for subtype in IoSubtype::ALL {
        handles.push(
            world
                .install_io(owner, subtype, read_write())
                .expect("Failed to install I/O handle"),
        );
    }
    handles.push(world.thread_handle(owner, receiver).unwrap());
    handles.push(world.process_handle(owner, receiver).unwrap());
    handles.push(world.kernel.create_security_context(owner).unwrap());

    for handle in handles {
        let before = world.kernel.identify_handle(owner, handle).unwrap();
        let shared = world
            .kernel
            .share_handle(owner, handle, ShareFlags::SAME_RIGHTS)
            .unwrap();
        let upgraded = world.kernel.upgrade_shared_handle(receiver, shared).unwrap();
        let after = world.kernel.identify_handle(receiver, upgraded).unwrap();

        assert_eq!(before, after);
        assert_eq!(before.code(), after.code());
    }
}

/// Test: sharing more rights than the source holds is denied
#[test]
fn test_share_cannot_widen_rights() {
    let (world, owner) = test_bootstrap(&[]);
    let pipe = world
        .install_io(owner, IoSubtype::PipeRead, RightSet::from_names([READ]))
        .unwrap();

    let result = world
        .kernel
        .share_handle(owner, pipe, ShareFlags::READ | ShareFlags::WRITE);
    assert!(matches!(result, Err(KernelError::PermissionDenied(_))));
    assert!(world.kernel.with_audit_log(|log| {
        log.has_event(|e| matches!(e, SecurityEvent::Denied { operation: "share_handle", .. }))
    }));
}

/// Test: a shared handle upgrades exactly once
#[test]
fn test_upgrade_consumes_share() {
    let (world, owner) = test_bootstrap(&[]);
    let first = world.spawn_caller();
    let second = world.spawn_caller();
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();
    let shared = world
        .kernel
        .share_handle(owner, file, ShareFlags::READ)
        .unwrap();

    world.kernel.upgrade_shared_handle(first, shared).unwrap();
    assert_eq!(
        world.kernel.upgrade_shared_handle(second, shared),
        Err(KernelError::AlreadyUpgraded(shared))
    );
    assert_eq!(
        world.kernel.upgrade_shared_handle(owner, file),
        Err(KernelError::NotShared(file))
    );
}

/// Test: unshare revokes pending shares and is idempotent
#[test]
fn test_unshare_revokes_pending_shares() {
    let (world, owner) = test_bootstrap(&[]);
    let receiver = world.spawn_caller();
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();
    let shared = world
        .kernel
        .share_handle(owner, file, ShareFlags::READ)
        .unwrap();

    world.kernel.unshare_handle(owner, file).unwrap();
    world.kernel.unshare_handle(owner, file).unwrap();

    assert_eq!(
        world.kernel.upgrade_shared_handle(receiver, shared),
        Err(KernelError::InvalidHandle(shared))
    );
}

/// Test: outstanding shares count toward the sharing process's handle cap
#[test]
fn test_shares_count_toward_handle_cap() {
    let world = TestWorld::with_config(KernelConfig::default().with_max_handles_per_process(1));
    let owner = world.spawn_caller();
    let file = world
        .install_io(owner, IoSubtype::File, read_write())
        .expect("Failed to install file");

    for _ in 0..16 {
        assert!(matches!(
            world.kernel.share_handle(owner, file, ShareFlags::READ),
            Err(KernelError::ResourceExhausted(_))
        ));
    }
    assert_eq!(world.kernel.handle_count(owner.process), 1);
}

/// Test: closing the source handle revokes its pending shares
#[test]
fn test_close_revokes_pending_shares() {
    let world = TestWorld::with_config(KernelConfig::default().with_max_handles_per_process(2));
    let owner = world.spawn_caller();
    let receiver = world.spawn_caller();
    let file = world
        .install_io(owner, IoSubtype::File, read_write())
        .expect("Failed to install file");
    let shared = world
        .kernel
        .share_handle(owner, file, ShareFlags::READ)
        .expect("Failed to share");

    world.kernel.close_handle(owner, file).expect("Failed to close");
    assert_eq!(
        world.kernel.upgrade_shared_handle(receiver, shared),
        Err(KernelError::InvalidHandle(shared))
    );

    // Both slots are free again
    world
        .install_io(owner, IoSubtype::File, read_write())
        .expect("Failed to install first file");
    world
        .install_io(owner, IoSubtype::File, read_write())
        .expect("Failed to install second file");
}

/// Test: granting a right without a stronger sibling handle always fails
#[test]
fn test_no_escalation_through_grant() {
    let (world, owner) = test_bootstrap(&[]);
    let file = world
        .install_io(owner, IoSubtype::File, RightSet::from_names([READ]))
        .unwrap();

    for right in [WRITE, EXECUTE, MANAGE, "custom.right", ""] {
        assert!(matches!(
            world.kernel.grant_handle_right(owner, file, right),
            Err(KernelError::PermissionDenied(_))
        ));
        assert!(!world.kernel.check_handle_right(owner, file, right).unwrap());
    }

    // Already-held rights are a no-op
    world.kernel.grant_handle_right(owner, file, READ).unwrap();
}

/// Test: a weaker handle can be raised to match a stronger one to the same object
#[test]
fn test_grant_from_stronger_handle() {
    let (world, owner) = test_bootstrap(&[]);
    let object = world.objects.register_object();
    let io = ObjectRef::Io(IoSubtype::Socket, object);
    world.kernel.install_handle(owner.process, io, read_write()).unwrap();
    let weak = world
        .kernel
        .install_handle(owner.process, io, RightSet::from_names([READ]))
        .unwrap();

    world.kernel.grant_handle_right(owner, weak, WRITE).unwrap();
    assert!(world.kernel.check_handle_right(owner, weak, WRITE).unwrap());
}

/// Test: dropped rights are gone, and dropping is always allowed
#[test]
fn test_drop_rights() {
    let (world, owner) = test_bootstrap(&[]);
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();

    world.kernel.drop_handle_right(owner, file, WRITE).unwrap();
    world.kernel.drop_handle_right(owner, file, "never.held").unwrap();
    assert!(!world.kernel.check_handle_right(owner, file, WRITE).unwrap());

    world.kernel.drop_all_handle_rights(owner, file).unwrap();
    assert!(!world.kernel.check_handle_right(owner, file, READ).unwrap());
    assert_eq!(
        world.kernel.identify_handle(owner, file).unwrap().handle_type,
        HandleType::Io
    );
}

/// Test: closed handles and handles to released objects are invalid
#[test]
fn test_operations_on_dead_handles() {
    let (world, owner) = test_bootstrap(&[]);
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();
    world.kernel.close_handle(owner, file).unwrap();

    assert_eq!(
        world.kernel.check_handle_right(owner, file, READ),
        Err(KernelError::InvalidHandle(file))
    );
    assert_eq!(
        world.kernel.drop_all_handle_rights(owner, file),
        Err(KernelError::InvalidHandle(file))
    );
    assert_eq!(
        world.kernel.unshare_handle(owner, file),
        Err(KernelError::InvalidHandle(file))
    );

    let object = world.objects.register_object();
    let socket = world
        .kernel
        .install_handle(owner.process, ObjectRef::Io(IoSubtype::Socket, object), read_write())
        .unwrap();
    world.objects.release_object(object);
    assert_eq!(
        world.kernel.identify_handle(owner, socket),
        Err(KernelError::InvalidHandle(socket))
    );
}

/// Test: handles do not leak across process tables
#[test]
fn test_foreign_handle_is_invalid() {
    let (world, owner) = test_bootstrap(&[]);
    let stranger = world.spawn_caller();
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();

    assert_eq!(
        world.kernel.identify_handle(stranger, file),
        Err(KernelError::InvalidHandle(file))
    );
    assert_eq!(
        world.kernel.share_handle(stranger, file, ShareFlags::READ),
        Err(KernelError::InvalidHandle(file))
    );
}
