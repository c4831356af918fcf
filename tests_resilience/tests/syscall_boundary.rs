//! Syscall Boundary Tests
//!
//! Drives the kernel through the numbered syscall gate: raw flag words,
//! byte-string names, signed statuses and raw result values.

use core_types::{HandleId, IoSubtype, ShareFlags};
use kernel_api::{errno, KernelError, ScopeTarget, Subsystem, SysResult, SyscallNumber};
use sim_kernel::syscall_gate::{Syscall, SyscallEvent, SyscallGate, SyscallResult};
use tests_resilience::{read_write, test_bootstrap};

const NET: &[u8] = b"net.connect";

fn handle_of(result: Result<SyscallResult, KernelError>) -> HandleId {
    match result {
        Ok(SyscallResult::Handle(handle)) => handle,
        other => panic!("expected a handle, got {:?}", other),
    }
}

/// Test: READ_ONLY share through the gate yields a read-only handle
#[test]
fn test_read_only_share_through_gate() {
    let (world, owner) = test_bootstrap(&[]);
    let receiver = world.spawn_caller();
    let file = world
        .install_io(owner, IoSubtype::File, read_write())
        .expect("Failed to install file");
    let mut gate = SyscallGate::new();

    let shared = handle_of(gate.execute(
        &world.kernel,
        owner,
        Syscall::ShareHandle {
            handle: file,
            flags: ShareFlags::READ_ONLY.bits(),
        },
    ));
    let upgraded = handle_of(gate.execute(
        &world.kernel,
        receiver,
        Syscall::UpgradeSharedHandle { shared },
    ));

    let check = |gate: &mut SyscallGate, right: &[u8]| {
        gate.execute_raw(
            &world.kernel,
            receiver,
            Syscall::CheckHandleRight {
                handle: upgraded,
                right: right.to_vec(),
            },
        )
    };
    assert_eq!(check(&mut gate, b"read"), 1);
    assert_eq!(check(&mut gate, b"write"), 0);

    let ident = gate.execute_raw(
        &world.kernel,
        receiver,
        Syscall::IdentHandle { handle: upgraded },
    );
    assert_eq!(ident, IoSubtype::File.code() as SysResult);
}

/// Test: errors cross the boundary as negative, subsystem-tagged values
#[test]
fn test_raw_error_values() {
    let (world, owner) = test_bootstrap(&[]);
    let file = world.install_io(owner, IoSubtype::File, read_write()).unwrap();
    let mut gate = SyscallGate::new();

    let shared = handle_of(gate.execute(
        &world.kernel,
        owner,
        Syscall::ShareHandle {
            handle: file,
            flags: ShareFlags::SAME_RIGHTS.bits(),
        },
    ));
    gate.execute(&world.kernel, owner, Syscall::UpgradeSharedHandle { shared })
        .expect("Failed to upgrade");

    let again = gate.execute_raw(&world.kernel, owner, Syscall::UpgradeSharedHandle { shared });
    assert_eq!(again, Subsystem::BASE.error(errno::ALREADY_UPGRADED));
    assert_eq!(
        Subsystem::split_error(again),
        Some((Subsystem::BASE, errno::ALREADY_UPGRADED))
    );

    let not_shared = gate.execute_raw(
        &world.kernel,
        owner,
        Syscall::UpgradeSharedHandle { shared: file },
    );
    assert_eq!(not_shared, errno::NOT_SHARED);

    let missing = gate.execute_raw(
        &world.kernel,
        owner,
        Syscall::IdentHandle {
            handle: HandleId::from_raw(0xdead),
        },
    );
    assert_eq!(missing, errno::INVALID_HANDLE);
}

/// Test: permission calls are numbered by scope and carry signed statuses
#[test]
fn test_permission_calls_through_gate() {
    let (world, caller) = test_bootstrap(&["net.connect"]);
    let peer = world.spawn_thread(caller).unwrap();
    let peer_handle = world.thread_handle(caller, peer).unwrap();
    let mut gate = SyscallGate::new();
    let kernel = &world.kernel;

    let ctx = handle_of(gate.execute(kernel, caller, Syscall::CreateSecurityContext));
    gate.execute(
        kernel,
        caller,
        Syscall::SetPrimaryPrincipal {
            ctx,
            principal: core_types::Principal::new(),
        },
    )
    .expect("Failed to set primary");

    let grant = Syscall::GrantPermission {
        ctx,
        scope: ScopeTarget::Kernel,
        name: NET.to_vec(),
        status: 5,
    };
    assert_eq!(grant.number(), SyscallNumber::GrantKernelPermission);
    assert_eq!(gate.execute_raw(kernel, caller, grant), 0);

    let drop = Syscall::DropPermission {
        ctx,
        scope: ScopeTarget::Thread(peer_handle),
        name: NET.to_vec(),
        status: -22,
    };
    assert_eq!(drop.number().number(), 29);
    assert_eq!(gate.execute_raw(kernel, caller, drop), 0);

    let has = |gate: &mut SyscallGate, scope| {
        gate.execute_raw(
            kernel,
            caller,
            Syscall::HasPermission {
                ctx,
                scope,
                name: NET.to_vec(),
            },
        )
    };
    assert_eq!(has(&mut gate, ScopeTarget::Kernel), 1);
    assert_eq!(has(&mut gate, ScopeTarget::Thread(peer_handle)), 0);

    assert!(gate.audit_log().has_event(|e| matches!(
        e,
        SyscallEvent::Completed {
            syscall: SyscallNumber::DropThreadPermission,
            ..
        }
    )));
}

/// Test: escalation attempts are rejected at the boundary and audited
#[test]
fn test_escalation_rejected_through_gate() {
    let (world, caller) = test_bootstrap(&[]);
    let mut gate = SyscallGate::new();
    let kernel = &world.kernel;
    let ctx = handle_of(gate.execute(kernel, caller, Syscall::CreateSecurityContext));

    let raw = gate.execute_raw(
        kernel,
        caller,
        Syscall::GrantPermission {
            ctx,
            scope: ScopeTarget::Kernel,
            name: b"fs.write".to_vec(),
            status: 0,
        },
    );
    assert_eq!(raw, errno::PERMISSION);
    assert_eq!(
        gate.audit_log().count_events(|e| matches!(e, SyscallEvent::Rejected { .. })),
        1
    );
}

/// Test: malformed arguments are rejected before reaching the kernel
#[test]
fn test_malformed_arguments() {
    let (world, caller) = test_bootstrap(&[]);
    let file = world.install_io(caller, IoSubtype::File, read_write()).unwrap();
    let mut gate = SyscallGate::new();
    let kernel = &world.kernel;

    let bad_flags = gate.execute_raw(
        kernel,
        caller,
        Syscall::ShareHandle {
            handle: file,
            flags: ShareFlags::READ.bits() | (1 << 9),
        },
    );
    assert_eq!(bad_flags, errno::INVALID_ARGUMENT);
    assert_eq!(world.kernel.handle_count(caller.process), 1);

    let bad_name = gate.execute_raw(
        kernel,
        caller,
        Syscall::GrantHandleRight {
            handle: file,
            right: vec![b'r', 0xc3, 0x28],
        },
    );
    assert_eq!(bad_name, errno::INVALID_ARGUMENT);
}

/// Test: an empty buffer reports the size, a filled one returns the byte count
#[test]
fn test_encode_through_gate() {
    let (world, caller) = test_bootstrap(&[]);
    let mut gate = SyscallGate::new();
    let kernel = &world.kernel;
    let ctx = handle_of(gate.execute(kernel, caller, Syscall::GetCurrentSecurityContext));

    let sizing = gate.execute(kernel, caller, Syscall::EncodeSecurityContext { ctx, capacity: 0 });
    let required = match sizing {
        Err(KernelError::BufferTooSmall { required }) => required,
        other => panic!("expected BufferTooSmall, got {:?}", other),
    };
    assert_eq!(
        gate.execute_raw(kernel, caller, Syscall::EncodeSecurityContext { ctx, capacity: 0 }),
        errno::BUFFER_TOO_SMALL
    );

    match gate.execute(
        kernel,
        caller,
        Syscall::EncodeSecurityContext {
            ctx,
            capacity: required,
        },
    ) {
        Ok(SyscallResult::Bytes(bytes)) => assert_eq!(bytes.len(), required),
        other => panic!("expected bytes, got {:?}", other),
    }
}

/// Test: a caller-claimed capacity far beyond the image is served with the image size
#[test]
fn test_encode_with_unbounded_capacity() {
    let (world, caller) = test_bootstrap(&[]);
    let mut gate = SyscallGate::new();
    let kernel = &world.kernel;
    let ctx = handle_of(gate.execute(kernel, caller, Syscall::GetCurrentSecurityContext));

    let sizing = gate.execute(kernel, caller, Syscall::EncodeSecurityContext { ctx, capacity: 0 });
    let required = match sizing {
        Err(KernelError::BufferTooSmall { required }) => required,
        other => panic!("expected BufferTooSmall, got {:?}", other),
    };
    let encoded = gate
        .execute(
            kernel,
            caller,
            Syscall::EncodeSecurityContext {
                ctx,
                capacity: usize::MAX,
            },
        )
        .expect("Failed to encode with an unbounded capacity");
    match &encoded {
        SyscallResult::Bytes(bytes) => assert_eq!(bytes.len(), required),
        other => panic!("expected bytes, got {:?}", other),
    }
    assert_eq!(encoded.to_sys_result(), required as SysResult);
}

/// Test: limit and principal reads travel through out-parameters
#[test]
fn test_out_parameter_results() {
    let (world, caller) = test_bootstrap(&[]);
    let mut gate = SyscallGate::new();
    let kernel = &world.kernel;
    let ctx = handle_of(gate.execute(kernel, caller, Syscall::CreateSecurityContext));

    gate.execute(
        kernel,
        caller,
        Syscall::SetResourceLimit {
            ctx,
            name: b"mem.pages".to_vec(),
            value: 4096,
        },
    )
    .expect("Failed to set limit");

    let limit = gate.execute(
        kernel,
        caller,
        Syscall::GetResourceLimit {
            ctx,
            name: b"mem.pages".to_vec(),
        },
    );
    assert_eq!(limit, Ok(SyscallResult::Limit(4096)));
    assert_eq!(limit.as_ref().map(SyscallResult::to_sys_result), Ok(0));

    assert_eq!(
        gate.execute_raw(kernel, caller, Syscall::GetPrimaryPrincipal { ctx }),
        errno::NO_PRINCIPAL
    );
    assert_eq!(
        gate.execute_raw(
            kernel,
            caller,
            Syscall::GetResourceLimit {
                ctx,
                name: b"cpu.shares".to_vec(),
            },
        ),
        errno::NO_SUCH_LIMIT
    );
}
