//! Host: one managed machine for the duration of a lease
//!
//! Wraps a machine kind with everything a verify/repair session needs: the
//! optional job to report status to, the protection level, the timeouts, the
//! repair memo and the files-removed flag.

use crate::info::HostInfo;
use crate::machine::Machine;
use crate::repair::RepairMemo;
use labhost_common::{HostResult, HostSettings, ProtectionLevel, StatusEntry, StatusRecorder};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Host<M: Machine> {
    pub(crate) machine: M,
    job: Option<Arc<dyn StatusRecorder>>,
    protection: ProtectionLevel,
    pub(crate) settings: HostSettings,
    pub(crate) memo: RepairMemo,
    /// Set when filesystem repair freed space; forces a reboot before the
    /// next successful verify returns
    pub(crate) files_removed: bool,
}

impl<M: Machine> Host<M> {
    pub fn new(machine: M, settings: HostSettings) -> Self {
        Self {
            machine,
            job: None,
            protection: ProtectionLevel::default(),
            settings,
            memo: RepairMemo::new(),
            files_removed: false,
        }
    }

    /// Attach the job whose status log receives this host's records
    pub fn with_job(mut self, job: Arc<dyn StatusRecorder>) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_protection(mut self, protection: ProtectionLevel) -> Self {
        self.protection = protection;
        self
    }

    pub fn hostname(&self) -> &str {
        self.machine.hostname()
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn protection(&self) -> ProtectionLevel {
        self.protection
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn memo(&self) -> &RepairMemo {
        &self.memo
    }

    pub fn files_removed(&self) -> bool {
        self.files_removed
    }

    /// Append a status record to the job, if any
    pub fn record(
        &self,
        status: &str,
        subdir: Option<&str>,
        test_name: Option<&str>,
        message: Option<&str>,
    ) {
        let Some(job) = &self.job else {
            return;
        };
        let mut entry = StatusEntry::new(status).with_hostname(self.hostname());
        if let Some(subdir) = subdir {
            entry = entry.with_subdir(subdir);
        }
        if let Some(test_name) = test_name {
            entry = entry.with_test_name(test_name);
        }
        if let Some(message) = message {
            entry = entry.with_message(message);
        }
        job.record(entry);
    }

    /// Record the running kernel version as an INFO entry
    pub fn log_kernel(&self) {
        if self.job.is_none() {
            return;
        }
        match self.machine.get_kernel_ver() {
            Ok(kernel) => self.record("INFO", None, None, Some(&format!("kernel={}", kernel))),
            Err(e) => warn!("Could not read kernel version of {}: {}", self.hostname(), e),
        }
    }

    /// Hardware, then connectivity, then software checks.
    /// The first failure is returned unmodified.
    pub fn verify(&self) -> HostResult<()> {
        debug!("Verifying {}", self.hostname());
        self.machine.verify_hardware()?;
        self.machine.verify_connectivity()?;
        self.machine.verify_software()?;
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.machine.is_shutting_down()
    }
}
