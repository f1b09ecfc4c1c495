//! Reboot coordination
//!
//! A restart is a down transition followed by an up transition, each with its
//! own timeout. The boot id read before the reboot lets `wait_down` notice a
//! machine that already went down and came back between polls.

use crate::boot::BootId;
use crate::host::Host;
use crate::machine::Machine;
use labhost_common::{HostError, HostResult};
use std::time::Duration;
use tracing::{info, warn};

const REBOOT_TEST_NAME: &str = "reboot.verify";

impl<M: Machine> Host<M> {
    /// Wait for the machine to go down and come back up.
    ///
    /// Records "WARN" when going down outlasts `down_warning`. Records
    /// "ABORT" and fails with `Shutdown` when it never goes down, or with
    /// `Reboot` when it never comes back. On success records "GOOD" and runs
    /// the machine's reboot followup.
    pub fn wait_for_restart(
        &self,
        timeout: Duration,
        down_timeout: Duration,
        down_warning: Option<Duration>,
        old_boot_id: Option<&BootId>,
    ) -> HostResult<()> {
        let on_slow_shutdown = |limit: Duration| {
            self.record(
                "WARN",
                None,
                Some("shutdown"),
                Some(&format!("Shutdown took longer than {}s", limit.as_secs())),
            );
        };
        if !self
            .machine
            .wait_down(down_timeout, down_warning, old_boot_id, &on_slow_shutdown)
        {
            self.record(
                "ABORT",
                None,
                Some(REBOOT_TEST_NAME),
                Some("shut down failed"),
            );
            return Err(HostError::Shutdown(format!(
                "{} did not shut down",
                self.hostname()
            )));
        }

        if !self.machine.wait_up(timeout) {
            self.record(
                "ABORT",
                None,
                Some(REBOOT_TEST_NAME),
                Some("Host did not return from reboot"),
            );
            return Err(HostError::Reboot(format!(
                "{} did not return from reboot",
                self.hostname()
            )));
        }

        self.record("GOOD", None, Some(REBOOT_TEST_NAME), None);
        self.machine.reboot_followup()
    }

    /// `wait_for_restart` with the configured down timeout and warning
    pub fn wait_for_restart_within(
        &self,
        timeout: Duration,
        old_boot_id: Option<&BootId>,
    ) -> HostResult<()> {
        self.wait_for_restart(
            timeout,
            self.settings.wait_down_timeout(),
            Some(self.settings.wait_down_warning()),
            old_boot_id,
        )
    }

    /// Boot id, or `None` when unavailable or unreadable
    pub fn get_boot_id(&self) -> Option<BootId> {
        match self.machine.get_boot_id(self.settings.boot_id_timeout()) {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not read boot id of {}: {}", self.hostname(), e);
                None
            }
        }
    }

    /// Reboot and wait for the machine to come back
    pub fn reboot(&self) -> HostResult<()> {
        let old_boot_id = self.get_boot_id();
        self.machine.reboot_setup()?;
        self.machine.reboot()?;
        self.wait_for_restart_within(self.settings.reboot_timeout(), old_boot_id.as_ref())
    }

    /// Wait out a machine that is shutting down or briefly unreachable,
    /// bounded by the recovery ceiling
    pub(crate) fn repair_wait_for_reboot(&self) -> HostResult<()> {
        let timeout = self.settings.recovery_timeout();
        if self.is_shutting_down() {
            info!("Host {} is shutting down, waiting for a restart", self.hostname());
            return self.wait_for_restart_within(timeout, None);
        }
        if !self.machine.wait_up(timeout) {
            return Err(HostError::Reboot(format!(
                "{} still down after {}s",
                self.hostname(),
                timeout.as_secs()
            )));
        }
        Ok(())
    }
}
