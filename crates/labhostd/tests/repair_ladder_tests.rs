//! Repair ladder behavior against scripted machines
//!
//! Every test drives a `FakeMachine` whose verify outcomes are fixed up
//! front, then asserts on the hook events it recorded. The ladder must
//! terminate on its own for every script here.

use labhost_common::{HostError, HostSettings, ProtectionLevel};
use labhostd::{FakeEvent, FakeMachine, Host, RepairProcedure};

fn host(machine: FakeMachine) -> Host<FakeMachine> {
    Host::new(machine, HostSettings::default())
}

fn disk_full(path: &str) -> HostError {
    HostError::disk_full(path, 5.0, 1.0)
}

fn ssh_ping() -> HostError {
    HostError::SshPing("no route to host".into())
}

fn hardware_required() -> HostError {
    HostError::HardwareRepairRequired("ecc errors".into())
}

fn hardware_fault() -> HostError {
    HostError::HardwareFault("dimm 3 failed".into())
}

/// Position of the `n`th (1-based) occurrence of `event`
fn nth_position(events: &[FakeEvent], event: FakeEvent, n: usize) -> Option<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == event)
        .nth(n - 1)
        .map(|(i, _)| i)
}

// ============================================================================
// Filesystem level
// ============================================================================

#[test]
fn test_full_tmp_is_cleared_then_rebooted() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/tmp"])
            .verify_results([Err(disk_full("/tmp/x"))]),
    );

    host.repair_filesystem_only().unwrap();

    let machine = host.machine();
    assert!(machine.ran("find \"/tmp\" -mindepth 1 -maxdepth 1"));
    assert!(!machine.ran("find \"/var/tmp\""));
    assert_eq!(
        machine.events(),
        vec![
            FakeEvent::Verify,
            FakeEvent::Verify,
            FakeEvent::RebootSetup,
            FakeEvent::Reboot,
            FakeEvent::WaitDown,
            FakeEvent::WaitUp,
            FakeEvent::RebootFollowup,
        ]
    );
    assert_eq!(
        host.memo().attempted(),
        &[RepairProcedure::RepairFullDisk {
            mountpoint: "/tmp".to_string()
        }]
    );
    // cleared by the reboot that released the inodes
    assert!(!host.files_removed());
}

#[test]
fn test_full_root_clears_both_tmp_dirs() {
    let mut host = host(FakeMachine::new("rig1").verify_results([Err(disk_full("/usr/local/x"))]));

    host.repair_filesystem_only().unwrap();

    assert!(host.machine().ran("find \"/tmp\""));
    assert!(host.machine().ran("find \"/var/tmp\""));
    assert_eq!(host.machine().count(FakeEvent::Reboot), 1);
}

#[test]
fn test_disk_full_elsewhere_propagates_untouched() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/data"])
            .verify_always(Err(disk_full("/data/results"))),
    );

    let err = host.repair_filesystem_only().unwrap_err();

    assert_eq!(err, disk_full("/data/results"));
    assert!(!host.files_removed());
    assert!(!host.machine().ran("find"));
    assert_eq!(host.machine().count(FakeEvent::Verify), 1);
    assert!(host.memo().is_empty());
}

#[test]
fn test_unresolvable_mountpoint_erases_nothing() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/data"])
            .respond_status("mountpoint", 127)
            .verify_always(Err(disk_full("/data/x"))),
    );

    let err = host.repair_filesystem_only().unwrap_err();

    assert_eq!(err, disk_full("/data/x"));
    assert!(!host.files_removed());
    assert!(!host.machine().ran("find"));
    assert_eq!(host.machine().count(FakeEvent::Reboot), 0);
    assert!(host.memo().is_empty());
}

#[test]
fn test_persistent_full_tmp_cleared_once() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/tmp"])
            .verify_always(Err(disk_full("/tmp/x"))),
    );

    let err = host.repair_filesystem_only().unwrap_err();

    assert_eq!(err, disk_full("/tmp/x"));
    assert_eq!(host.machine().count(FakeEvent::Verify), 2);
    assert_eq!(host.machine().count(FakeEvent::Reboot), 0);
    assert!(host.files_removed());
}

#[test]
fn test_one_cleanup_per_distinct_mountpoint() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/tmp"])
            .verify_results([
                Err(disk_full("/tmp/a")),
                Err(disk_full("/var/tmp/b")),
                Err(disk_full("/tmp/c")),
            ]),
    );

    let err = host.repair_filesystem_only().unwrap_err();

    assert_eq!(err, disk_full("/tmp/c"));
    assert_eq!(
        host.memo().attempted(),
        &[
            RepairProcedure::RepairFullDisk {
                mountpoint: "/tmp".to_string()
            },
            RepairProcedure::RepairFullDisk {
                mountpoint: "/".to_string()
            },
        ]
    );
}

#[test]
fn test_shutdown_waited_out_once() {
    let mut host = host(
        FakeMachine::new("rig1")
            .verify_always(Err(HostError::HostIsShuttingDown("runlevel 6".into()))),
    );

    let err = host.repair_filesystem_only().unwrap_err();

    assert!(matches!(err, HostError::HostIsShuttingDown(_)));
    assert_eq!(host.machine().count(FakeEvent::Verify), 2);
    assert_eq!(host.machine().count(FakeEvent::WaitUp), 1);
}

#[test]
fn test_failed_wait_is_absorbed_and_verify_decides() {
    let mut host = host(
        FakeMachine::new("rig1")
            .wait_up_returns(false)
            .verify_results([Err(HostError::HostIsShuttingDown("runlevel 0".into()))]),
    );

    host.repair_filesystem_only().unwrap();
    assert_eq!(host.machine().count(FakeEvent::Verify), 2);
}

#[test]
fn test_filesystem_repair_leaves_connectivity_to_caller() {
    let mut host = host(FakeMachine::new("rig1").verify_always(Err(ssh_ping())));
    assert_eq!(host.repair_filesystem_only(), Err(ssh_ping()));
    assert_eq!(host.machine().count(FakeEvent::MachineInstall), 0);
}

// ============================================================================
// Software level
// ============================================================================

#[test]
fn test_unreachable_machine_reinstalled_once() {
    let mut host = host(FakeMachine::new("rig1").verify_always(Err(ssh_ping())));

    assert_eq!(host.repair_software_only(), Err(ssh_ping()));
    assert_eq!(
        host.machine().events(),
        vec![FakeEvent::Verify, FakeEvent::MachineInstall, FakeEvent::Verify]
    );
}

#[test]
fn test_reinstall_fixes_unrecoverable_disk_full() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/data"])
            .verify_results([Err(disk_full("/data/x"))]),
    );

    host.repair_software_only().unwrap();
    assert_eq!(host.machine().count(FakeEvent::MachineInstall), 1);
    assert_eq!(host.memo().attempted(), &[RepairProcedure::MachineInstall]);
}

#[test]
fn test_every_connectivity_error_triggers_reinstall() {
    for err in [
        ssh_ping(),
        HostError::SshTimeout("timed out".into()),
        HostError::SshPermissionDenied("publickey".into()),
    ] {
        let mut host = host(FakeMachine::new("rig1").verify_results([Err(err)]));
        host.repair_software_only().unwrap();
        assert_eq!(host.machine().count(FakeEvent::MachineInstall), 1);
    }
}

#[test]
fn test_failed_reinstall_is_absorbed() {
    let mut host = host(
        FakeMachine::new("rig1")
            .install_returns(Err(HostError::Orchestration("pxe boot failed".into())))
            .verify_results([Err(ssh_ping())]),
    );

    host.repair_software_only().unwrap();
    assert_eq!(host.machine().count(FakeEvent::Verify), 2);
}

#[test]
fn test_software_repair_never_touches_hardware() {
    let mut host = host(FakeMachine::new("rig1").verify_always(Err(hardware_fault())));

    assert_eq!(host.repair_software_only(), Err(hardware_fault()));
    assert_eq!(host.machine().count(FakeEvent::MachineInstall), 0);
    assert_eq!(host.machine().count(FakeEvent::RequestHardwareRepair), 0);
}

// ============================================================================
// Full repair
// ============================================================================

#[test]
fn test_hardware_request_fires_on_fourth_encounter() {
    let mut host = host(FakeMachine::new("rig1").verify_always(Err(hardware_required())));

    let err = host.repair_full().unwrap_err();

    assert_eq!(err, hardware_required());
    let events = host.machine().events();
    assert_eq!(host.machine().count(FakeEvent::RequestHardwareRepair), 1);
    assert_eq!(host.machine().count(FakeEvent::Verify), 5);

    let request = nth_position(&events, FakeEvent::RequestHardwareRepair, 1).unwrap();
    assert!(request > nth_position(&events, FakeEvent::Verify, 4).unwrap());
    assert!(request < nth_position(&events, FakeEvent::Verify, 5).unwrap());
}

#[test]
fn test_transient_hardware_hint_below_threshold() {
    let mut host = host(FakeMachine::new("rig1").verify_results([
        Err(hardware_required()),
        Err(hardware_required()),
        Err(hardware_required()),
    ]));

    host.repair_full().unwrap();
    assert_eq!(host.machine().count(FakeEvent::RequestHardwareRepair), 0);
    assert_eq!(host.machine().count(FakeEvent::Verify), 4);
}

#[test]
fn test_threshold_comes_from_settings() {
    let settings = HostSettings {
        hardware_repair_request_threshold: 2,
        ..Default::default()
    };
    let mut host = Host::new(
        FakeMachine::new("rig1").verify_always(Err(hardware_required())),
        settings,
    );

    host.repair_full().unwrap_err();

    let events = host.machine().events();
    let request = nth_position(&events, FakeEvent::RequestHardwareRepair, 1).unwrap();
    assert!(request > nth_position(&events, FakeEvent::Verify, 2).unwrap());
    assert!(request < nth_position(&events, FakeEvent::Verify, 3).unwrap());
}

#[test]
fn test_hardware_fault_requests_repair_immediately() {
    let mut host = host(FakeMachine::new("rig1").verify_always(Err(hardware_fault())));

    assert_eq!(host.repair_full(), Err(hardware_fault()));
    assert_eq!(
        host.machine().events(),
        vec![
            FakeEvent::Verify,
            FakeEvent::RequestHardwareRepair,
            FakeEvent::Verify,
        ]
    );
}

#[test]
fn test_hardware_fault_fixed_by_repair() {
    let mut host = host(FakeMachine::new("rig1").verify_results([Err(hardware_fault())]));
    host.repair_full().unwrap();
    assert_eq!(host.machine().count(FakeEvent::RequestHardwareRepair), 1);
}

#[test]
fn test_requested_repair_ends_session() {
    let requested = HostError::HardwareRepairRequested("ticket filed".into());
    let mut host = host(
        FakeMachine::new("rig1")
            .hardware_repair_returns(Err(requested.clone()))
            .verify_always(Err(hardware_fault())),
    );

    assert_eq!(host.repair_full(), Err(requested));
    assert_eq!(host.machine().count(FakeEvent::Verify), 1);
    assert_eq!(
        host.memo().attempted(),
        &[RepairProcedure::RequestHardwareRepair]
    );
}

#[test]
fn test_reinstall_always_preceded_by_filesystem_attempt() {
    let scripts: Vec<Vec<Result<(), HostError>>> = vec![
        vec![Err(ssh_ping())],
        vec![Err(HostError::HostIsShuttingDown("6".into())), Err(ssh_ping())],
        vec![Err(disk_full("/tmp/x")), Err(disk_full("/tmp/x"))],
        vec![Err(hardware_required()), Err(HostError::SshTimeout("t".into()))],
    ];

    for script in scripts {
        let mut host = host(FakeMachine::new("rig1").mounts(&["/", "/tmp"]).verify_results(script));
        host.repair_full().unwrap();

        let events = host.machine().events();
        let install = nth_position(&events, FakeEvent::MachineInstall, 1).unwrap();
        assert!(nth_position(&events, FakeEvent::Verify, 1).unwrap() < install);
    }
}

#[test]
fn test_escalation_is_strictly_ordered() {
    let mut host = host(FakeMachine::new("rig1").verify_results([
        Err(HostError::HostIsShuttingDown("runlevel 6".into())),
        Err(ssh_ping()),
        Err(hardware_fault()),
    ]));

    host.repair_full().unwrap();

    assert_eq!(
        host.memo().attempted(),
        &[
            RepairProcedure::WaitForReboot,
            RepairProcedure::MachineInstall,
            RepairProcedure::RequestHardwareRepair,
        ]
    );
}

#[test]
fn test_unhandled_errors_propagate_from_every_level() {
    let reboot = HostError::Reboot("stuck in bios".into());
    let mut host = host(FakeMachine::new("rig1").verify_always(Err(reboot.clone())));
    assert_eq!(host.repair_full(), Err(reboot));
    assert!(host.memo().is_empty());
}

// ============================================================================
// Protection dispatch
// ============================================================================

#[test]
fn test_protection_caps_repair() {
    let cases = [
        (ProtectionLevel::DoNotRepair, 0, 0),
        (ProtectionLevel::RepairFilesystemOnly, 0, 0),
        (ProtectionLevel::RepairSoftwareOnly, 1, 0),
        (ProtectionLevel::NoProtection, 1, 1),
    ];

    for (level, installs, hardware_requests) in cases {
        let mut host = host(FakeMachine::new("rig1").verify_results([
            Err(ssh_ping()),
            Err(hardware_fault()),
        ]));
        let _ = host.repair_with_protection(level);

        assert_eq!(
            host.machine().count(FakeEvent::MachineInstall),
            installs,
            "installs at {}",
            level
        );
        assert_eq!(
            host.machine().count(FakeEvent::RequestHardwareRepair),
            hardware_requests,
            "hardware requests at {}",
            level
        );
    }
}

#[test]
fn test_do_not_repair_is_a_single_verify() {
    let mut host = host(
        FakeMachine::new("rig1")
            .mounts(&["/", "/tmp"])
            .verify_always(Err(disk_full("/tmp/x"))),
    );

    assert_eq!(
        host.repair_with_protection(ProtectionLevel::DoNotRepair),
        Err(disk_full("/tmp/x"))
    );
    assert_eq!(host.machine().events(), vec![FakeEvent::Verify]);
}
