//! labhostd - host lifecycle manager for test-lab machines
//!
//! Verifies machines before they are trusted with work and repairs them
//! when verification fails, escalating from filesystem cleanup through OS
//! reinstall to hardware repair requests, never beyond a machine's
//! protection level.

pub mod boot;
pub mod host;
pub mod info;
pub mod machine;
pub mod mountpoint;
pub mod process;
pub mod reboot;
pub mod repair;
pub mod session;

pub use boot::BootId;
pub use host::Host;
pub use info::HostInfo;
pub use machine::{FakeEvent, FakeMachine, LocalMachine, Machine, SshMachine};
pub use repair::{RepairMemo, RepairProcedure};
pub use session::{
    run_fleet, run_session, run_sessions, SessionAction, SessionOutcome, SessionReport,
};
