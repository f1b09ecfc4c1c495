//! Machine kinds
//!
//! A `Machine` is one way of reaching and manipulating a machine under test.
//! Only `hostname` and `run` are required; every other hook has a default
//! that is either a no-op (verify stages, reboot setup/followup), a generic
//! implementation built on `run` (waits, boot id, shutdown detection), or an
//! `Unsupported` error for operations only a concrete kind can perform.
//!
//! ## Kinds
//!
//! - `SshMachine`: remote machines reached over ssh (production)
//! - `LocalMachine`: the machine labhostd runs on
//! - `FakeMachine`: scripted responses for deterministic tests

pub mod fake;
pub mod local;
pub mod ssh;

pub use fake::{FakeEvent, FakeMachine};
pub use local::LocalMachine;
pub use ssh::SshMachine;

use crate::boot::{self, BootId};
use crate::info::HostInfo;
use labhost_common::{CmdResult, HostError, HostResult, RunOptions};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub trait Machine: Send {
    fn hostname(&self) -> &str;

    /// Run a shell command on the machine.
    ///
    /// Fails with `HostError::Command` on non-zero exit unless
    /// `opts.ignore_status` is set.
    fn run(&self, command: &str, opts: RunOptions) -> HostResult<CmdResult>;

    /// Interval between polls in the wait loops
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Processes that must be running before the machine counts as up
    fn wait_up_processes(&self) -> &[String] {
        &[]
    }

    fn verify_hardware(&self) -> HostResult<()> {
        Ok(())
    }

    fn verify_connectivity(&self) -> HostResult<()> {
        Ok(())
    }

    fn verify_software(&self) -> HostResult<()> {
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.run("true", RunOptions::default().with_timeout(Duration::from_secs(60)))
            .is_ok()
    }

    /// Whether the init runlevel says the machine is halting or rebooting.
    /// Best effort: any failure reads as "not shutting down".
    fn is_shutting_down(&self) -> bool {
        boot::is_shutting_down(self)
    }

    /// Boot token of the running kernel, `None` when the machine has none
    fn get_boot_id(&self, timeout: Duration) -> HostResult<Option<BootId>> {
        boot::read_boot_id(self, timeout)
    }

    /// Block until the machine is reachable and its wait-up processes run.
    fn wait_up(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);

        while deadline.map_or(true, |d| Instant::now() < d) {
            if self.is_up() {
                match self.processes_running(self.wait_up_processes()) {
                    Ok(true) => {
                        debug!("Host {} is now up", self.hostname());
                        return true;
                    }
                    Ok(false) => {}
                    Err(e) => debug!("Host {} process check failed: {}", self.hostname(), e),
                }
            }
            thread::sleep(self.poll_interval());
        }

        debug!(
            "Host {} is still down after waiting {} seconds",
            self.hostname(),
            timeout.as_secs()
        );
        false
    }

    /// Block until the machine is unreachable, or until its boot id differs
    /// from `old_boot_id` (it already went down and came back).
    ///
    /// `on_slow_shutdown` is called once with the warning limit when going
    /// down takes longer than `warning`.
    fn wait_down(
        &self,
        timeout: Duration,
        warning: Option<Duration>,
        old_boot_id: Option<&BootId>,
        on_slow_shutdown: &dyn Fn(Duration),
    ) -> bool {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let mut warning = warning;

        if let Some(old) = old_boot_id {
            debug!("Host {} pre-shutdown boot_id is {}", self.hostname(), old);
        }

        while deadline.map_or(true, |d| Instant::now() < d) {
            match self.get_boot_id(boot::BOOT_ID_TIMEOUT) {
                Err(_) => {
                    debug!("Host {} is now unreachable, is down", self.hostname());
                    return true;
                }
                Ok(new_boot_id) => {
                    if let Some(old) = old_boot_id {
                        if new_boot_id.as_ref() != Some(old) {
                            debug!(
                                "Host {} now has boot_id {:?} and so must have rebooted",
                                self.hostname(),
                                new_boot_id
                            );
                            return true;
                        }
                    }
                }
            }

            if let Some(limit) = warning {
                if start.elapsed() > limit {
                    warn!(
                        "Host {} shutdown took longer than {}s",
                        self.hostname(),
                        limit.as_secs()
                    );
                    warning = None;
                    on_slow_shutdown(limit);
                    // a machine stuck switching runlevels may reboot on SIGHUP to init
                    let _ = self.run("kill -HUP 1", RunOptions::default().ignoring_status());
                }
            }

            thread::sleep(self.poll_interval());
        }

        false
    }

    fn reboot_setup(&self) -> HostResult<()> {
        Ok(())
    }

    /// Issue a reboot. Returns once the reboot has been requested;
    /// waiting for it is the host's job.
    fn reboot(&self) -> HostResult<()> {
        Err(HostError::Unsupported("reboot"))
    }

    fn reboot_followup(&self) -> HostResult<()> {
        Ok(())
    }

    fn get_file(&self, _source: &str, _dest: &Path) -> HostResult<()> {
        Err(HostError::Unsupported("get_file"))
    }

    fn send_file(&self, _source: &Path, _dest: &str) -> HostResult<()> {
        Err(HostError::Unsupported("send_file"))
    }

    fn get_tmp_dir(&self) -> HostResult<String> {
        let result = self.run("mktemp -d /tmp/labhost_XXXXXX", RunOptions::default())?;
        let dir = result.stdout.trim();
        if dir.is_empty() {
            return Err(HostError::InvalidOutput("mktemp printed nothing".to_string()));
        }
        Ok(dir.to_string())
    }

    /// Reinstall the operating system from scratch
    fn machine_install(&self) -> HostResult<()> {
        Err(HostError::Unsupported("machine_install"))
    }

    /// Ask for hardware repair. May return normally once repaired, or fail
    /// with `HardwareRepairRequested` to end the session.
    fn request_hardware_repair(&self) -> HostResult<()> {
        Err(HostError::Unsupported("request_hardware_repair"))
    }
}
