//! Repair ladder
//!
//! Three levels of increasingly invasive repair, each built on the one
//! below it:
//!
//! - `repair_filesystem_only`: wait out a shutdown, clear full temp dirs
//! - `repair_software_only`: reinstall the machine when it is unreachable
//!   or its disk stays full
//! - `repair_full`: request hardware repair
//!
//! Every remedial action goes through `call_once_then_reraise`. An action is
//! attempted at most once per session; hitting the same failure again after
//! the action ran re-raises that failure to the next level up. This is what
//! makes every loop below terminate.

pub mod disk;
pub mod memo;

pub use memo::{RepairMemo, RepairProcedure};

use crate::host::Host;
use crate::machine::Machine;
use crate::mountpoint::{resolve_mountpoint, tmp_dirs_on};
use labhost_common::{HostError, HostResult, ProtectionLevel};
use tracing::{error, info, warn};

impl<M: Machine> Host<M> {
    /// Run `procedure` unless this session already has, in which case `err`
    /// is returned untouched.
    ///
    /// Hardware outcomes raised by the procedure propagate. Any other failure
    /// is logged and absorbed: a partial repair may still have helped, and
    /// the next verify decides. The procedure is recorded either way.
    pub fn call_once_then_reraise(
        &mut self,
        err: HostError,
        procedure: RepairProcedure,
    ) -> HostResult<()> {
        if self.memo.contains(&procedure) {
            warn!(
                "Already done this ({}) repair procedure, re-raising the original error",
                procedure
            );
            return Err(err);
        }

        let outcome = self.run_procedure(&procedure);
        self.memo.record(procedure.clone());

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_hardware() => Err(e),
            Err(e) => {
                error!(
                    "Repair {} failed but continuing in case it managed to repair enough: {}",
                    procedure, e
                );
                Ok(())
            }
        }
    }

    fn run_procedure(&mut self, procedure: &RepairProcedure) -> HostResult<()> {
        match procedure {
            RepairProcedure::WaitForReboot => self.repair_wait_for_reboot(),
            RepairProcedure::RepairFullDisk { mountpoint } => self.repair_full_disk(mountpoint),
            RepairProcedure::MachineInstall => self.machine.machine_install(),
            RepairProcedure::RequestHardwareRepair => self.machine.request_hardware_repair(),
        }
    }

    /// Mountpoint to clear for a disk-full failure, if clearing temp dirs
    /// could fix it
    fn full_disk_target(&self, err: &HostError) -> Option<String> {
        let HostError::DiskFull { path, .. } = err else {
            return None;
        };
        let mountpoint = match resolve_mountpoint(&self.machine, path) {
            Ok(mountpoint) => mountpoint,
            Err(e) => {
                warn!("Could not resolve mountpoint of {}: {}", path, e);
                return None;
            }
        };
        match tmp_dirs_on(&self.machine, &mountpoint) {
            Ok(dirs) if !dirs.is_empty() => Some(mountpoint),
            Ok(_) => {
                info!(
                    "{} is on {}, which holds no erasable directory",
                    path, mountpoint
                );
                None
            }
            Err(e) => {
                warn!("Could not resolve temp dir mountpoints: {}", e);
                None
            }
        }
    }

    /// Filesystem-level repair: wait out shutdowns and clear temp dirs
    pub fn repair_filesystem_only(&mut self) -> HostResult<()> {
        self.memo.clear();
        self.filesystem_repair_loop()
    }

    /// Filesystem repair, falling back to reinstalling the machine
    pub fn repair_software_only(&mut self) -> HostResult<()> {
        self.memo.clear();
        self.software_repair_loop()
    }

    /// Software repair, escalating to hardware repair
    pub fn repair_full(&mut self) -> HostResult<()> {
        self.memo.clear();
        self.full_repair_loop()
    }

    /// The most invasive repair `level` allows
    pub fn repair_with_protection(&mut self, level: ProtectionLevel) -> HostResult<()> {
        match level {
            ProtectionLevel::DoNotRepair => {
                info!("Protection is \"{}\" so just verifying", level.human_name());
                self.verify()
            }
            ProtectionLevel::RepairFilesystemOnly => {
                info!("Attempting filesystem-only repair");
                self.repair_filesystem_only()
            }
            ProtectionLevel::RepairSoftwareOnly => {
                info!("Attempting software repair only");
                self.repair_software_only()
            }
            ProtectionLevel::NoProtection => {
                info!("Attempting full repair");
                self.repair_full()
            }
        }
    }

    /// Repair within this host's own protection level
    pub fn repair(&mut self) -> HostResult<()> {
        self.repair_with_protection(self.protection())
    }

    fn filesystem_repair_loop(&mut self) -> HostResult<()> {
        loop {
            info!("Running verify to find failures to repair...");
            match self.verify() {
                Ok(()) => {
                    if self.files_removed {
                        info!("Removed files, rebooting to release the inodes");
                        self.reboot()?;
                        self.files_removed = false;
                    }
                    return Ok(());
                }
                Err(err @ HostError::HostIsShuttingDown(_)) => {
                    warn!("Verify failed: {}", err);
                    self.call_once_then_reraise(err, RepairProcedure::WaitForReboot)?;
                }
                Err(err @ HostError::DiskFull { .. }) => {
                    warn!("Verify failed: {}", err);
                    let Some(mountpoint) = self.full_disk_target(&err) else {
                        return Err(err);
                    };
                    let procedure = RepairProcedure::RepairFullDisk { mountpoint };
                    self.call_once_then_reraise(err, procedure)?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn software_repair_loop(&mut self) -> HostResult<()> {
        loop {
            match self.filesystem_repair_loop() {
                Ok(()) => return Ok(()),
                Err(err) if err.is_connectivity() || matches!(err, HostError::DiskFull { .. }) => {
                    warn!("Filesystem repair failed: {}", err);
                    info!("Trying to reinstall the machine");
                    self.call_once_then_reraise(err, RepairProcedure::MachineInstall)?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn full_repair_loop(&mut self) -> HostResult<()> {
        let threshold = self.settings.hardware_repair_request_threshold;
        let mut hardware_repair_requests: u32 = 0;

        loop {
            match self.software_repair_loop() {
                Ok(()) => return Ok(()),
                Err(err @ HostError::HardwareRepairRequired(_)) => {
                    hardware_repair_requests += 1;
                    if hardware_repair_requests >= threshold {
                        info!(
                            "hardware repair requested {} times, trying hardware repair",
                            hardware_repair_requests
                        );
                        self.call_once_then_reraise(err, RepairProcedure::RequestHardwareRepair)?;
                    } else {
                        info!(
                            "hardware repair requested {} times, trying software repair again",
                            hardware_repair_requests
                        );
                    }
                }
                Err(err @ HostError::HardwareFault(_)) => {
                    warn!("Verify failed: {}", err);
                    info!("Hardware problem found, requesting hardware repairs");
                    self.call_once_then_reraise(err, RepairProcedure::RequestHardwareRepair)?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
