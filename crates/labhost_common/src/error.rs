//! Error taxonomy for host verify and repair.
//!
//! The repair ladder pattern-matches on these variants to decide whether a
//! failure is something it can escalate from or something to re-raise.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("SSH ping failed: {0}")]
    SshPing(String),

    #[error("SSH connection timed out: {0}")]
    SshTimeout(String),

    #[error("SSH permission denied: {0}")]
    SshPermissionDenied(String),

    #[error("Host is shutting down: {0}")]
    HostIsShuttingDown(String),

    #[error("Not enough free space on {path} - {free_gb:.3}GB free, want {want_gb:.3}GB")]
    DiskFull {
        path: String,
        want_gb: f64,
        free_gb: f64,
    },

    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    #[error("Hardware repair required: {0}")]
    HardwareRepairRequired(String),

    #[error("Hardware repair requested: {0}")]
    HardwareRepairRequested(String),

    #[error("Shutdown failed: {0}")]
    Shutdown(String),

    #[error("Reboot failed: {0}")]
    Reboot(String),

    #[error("Command `{command}` failed with exit status {exit_status}: {stderr}")]
    Command {
        command: String,
        exit_status: i32,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("{0} not implemented for this machine kind")]
    Unsupported(&'static str),

    #[error("Unexpected command output: {0}")]
    InvalidOutput(String),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

impl HostError {
    pub fn disk_full(path: impl Into<String>, want_gb: f64, free_gb: f64) -> Self {
        HostError::DiskFull {
            path: path.into(),
            want_gb,
            free_gb,
        }
    }

    /// Transport-level failures reaching the machine at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            HostError::SshPing(_) | HostError::SshTimeout(_) | HostError::SshPermissionDenied(_)
        )
    }

    /// Hardware outcomes. The memo wrapper never absorbs these.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            HostError::HardwareFault(_)
                | HostError::HardwareRepairRequired(_)
                | HostError::HardwareRepairRequested(_)
        )
    }

    /// Stable short name used in logs and session reports
    pub fn kind(&self) -> &'static str {
        match self {
            HostError::SshPing(_) => "ssh_ping",
            HostError::SshTimeout(_) => "ssh_timeout",
            HostError::SshPermissionDenied(_) => "ssh_permission_denied",
            HostError::HostIsShuttingDown(_) => "host_is_shutting_down",
            HostError::DiskFull { .. } => "disk_full",
            HostError::HardwareFault(_) => "hardware_fault",
            HostError::HardwareRepairRequired(_) => "hardware_repair_required",
            HostError::HardwareRepairRequested(_) => "hardware_repair_requested",
            HostError::Shutdown(_) => "shutdown",
            HostError::Reboot(_) => "reboot",
            HostError::Command { .. } => "command",
            HostError::CommandTimeout { .. } => "command_timeout",
            HostError::Unsupported(_) => "unsupported",
            HostError::InvalidOutput(_) => "invalid_output",
            HostError::Orchestration(_) => "orchestration",
        }
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError::Orchestration(format!("IO error: {}", err))
    }
}

pub type HostResult<T> = Result<T, HostError>;
