//! Labhost configuration
//!
//! Loads settings from /etc/labhost/config.toml or uses defaults.
//! Every field has a serde default so partial files are valid.

use crate::protection::ProtectionLevel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/labhost/config.toml";

/// Timeouts and thresholds for verify/repair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Time allowed for a machine to come back up after a reboot
    #[serde(default = "default_reboot_timeout")]
    pub default_reboot_timeout_secs: u64,

    /// Time allowed for a machine to go down once a reboot was issued
    #[serde(default = "default_wait_down_timeout")]
    pub wait_down_reboot_timeout_secs: u64,

    /// Log a warning when going down takes longer than this
    #[serde(default = "default_wait_down_warning")]
    pub wait_down_reboot_warning_secs: u64,

    /// Ceiling for waiting out a machine that is already shutting down
    #[serde(default = "default_hours_to_wait_for_recovery")]
    pub hours_to_wait_for_recovery: f64,

    /// Hardware repair requests needed before hardware repair is actually asked for
    #[serde(default = "default_hardware_repair_threshold")]
    pub hardware_repair_request_threshold: u32,

    /// Free space required under the install dir
    #[serde(default = "default_gb_diskspace_required")]
    pub gb_diskspace_required: f64,

    /// Processes that must be running before a machine counts as up
    #[serde(default)]
    pub wait_up_processes: Vec<String>,

    /// Poll interval of wait_up/wait_down loops
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_boot_id_timeout")]
    pub boot_id_timeout_secs: u64,
}

fn default_reboot_timeout() -> u64 {
    1800
}

fn default_wait_down_timeout() -> u64 {
    840
}

fn default_wait_down_warning() -> u64 {
    540
}

fn default_hours_to_wait_for_recovery() -> f64 {
    2.5
}

fn default_hardware_repair_threshold() -> u32 {
    4
}

fn default_gb_diskspace_required() -> f64 {
    20.0
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_boot_id_timeout() -> u64 {
    60
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            default_reboot_timeout_secs: default_reboot_timeout(),
            wait_down_reboot_timeout_secs: default_wait_down_timeout(),
            wait_down_reboot_warning_secs: default_wait_down_warning(),
            hours_to_wait_for_recovery: default_hours_to_wait_for_recovery(),
            hardware_repair_request_threshold: default_hardware_repair_threshold(),
            gb_diskspace_required: default_gb_diskspace_required(),
            wait_up_processes: Vec::new(),
            poll_interval_ms: default_poll_interval(),
            boot_id_timeout_secs: default_boot_id_timeout(),
        }
    }
}

/// Upper bound on `hours_to_wait_for_recovery` (one week)
pub const MAX_RECOVERY_HOURS: f64 = 168.0;

fn valid_recovery_hours(hours: f64) -> bool {
    hours.is_finite() && (0.0..=MAX_RECOVERY_HOURS).contains(&hours)
}

impl HostSettings {
    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_secs(self.default_reboot_timeout_secs)
    }

    pub fn wait_down_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_down_reboot_timeout_secs)
    }

    pub fn wait_down_warning(&self) -> Duration {
        Duration::from_secs(self.wait_down_reboot_warning_secs)
    }

    /// Recovery ceiling. Values `validate` would reject fall back to the default.
    pub fn recovery_timeout(&self) -> Duration {
        let hours = if valid_recovery_hours(self.hours_to_wait_for_recovery) {
            self.hours_to_wait_for_recovery
        } else {
            default_hours_to_wait_for_recovery()
        };
        let fallback = default_hours_to_wait_for_recovery() * 3600.0;
        Duration::try_from_secs_f64(hours * 3600.0)
            .unwrap_or_else(|_| Duration::from_secs_f64(fallback))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn boot_id_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_id_timeout_secs)
    }
}

/// SSH transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Extra `-o` options passed verbatim
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            options: Vec::new(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSONL status log shared by all sessions
    #[serde(default)]
    pub status_log: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            status_log: None,
        }
    }
}

/// How a machine is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineKind {
    #[default]
    Ssh,
    Local,
}

/// One managed machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub hostname: String,

    #[serde(default)]
    pub kind: MachineKind,

    #[serde(default)]
    pub protection: ProtectionLevel,

    /// Overrides `[ssh].user`
    #[serde(default)]
    pub user: Option<String>,

    /// Overrides `[ssh].port`
    #[serde(default)]
    pub port: Option<u16>,

    /// Directory whose free space verify_software checks
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Local command reinstalling the machine, `{hostname}` substituted
    #[serde(default)]
    pub install_command: Option<String>,

    /// Local command filing a hardware repair request, `{hostname}` substituted
    #[serde(default)]
    pub hardware_repair_command: Option<String>,
}

fn default_install_dir() -> String {
    "/usr/local/autotest".to_string()
}

impl MachineConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            kind: MachineKind::default(),
            protection: ProtectionLevel::default(),
            user: None,
            port: None,
            install_dir: default_install_dir(),
            install_command: None,
            hardware_repair_command: None,
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabhostConfig {
    #[serde(default)]
    pub hosts: HostSettings,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

impl LabhostConfig {
    /// Load from the default path, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!(
            "Loaded config from {} ({} machines)",
            path.display(),
            config.machines.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: LabhostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.hardware_repair_request_threshold == 0 {
            anyhow::bail!("hosts.hardware_repair_request_threshold must be at least 1");
        }
        if !valid_recovery_hours(self.hosts.hours_to_wait_for_recovery) {
            anyhow::bail!(
                "hosts.hours_to_wait_for_recovery must be between 0 and {}, got {}",
                MAX_RECOVERY_HOURS,
                self.hosts.hours_to_wait_for_recovery
            );
        }
        if !self.hosts.gb_diskspace_required.is_finite() || self.hosts.gb_diskspace_required < 0.0 {
            anyhow::bail!(
                "hosts.gb_diskspace_required must be a non-negative number, got {}",
                self.hosts.gb_diskspace_required
            );
        }
        if self.hosts.wait_down_reboot_warning_secs > self.hosts.wait_down_reboot_timeout_secs {
            warn!(
                "wait_down_reboot_warning_secs ({}) exceeds wait_down_reboot_timeout_secs ({}), warning will never fire",
                self.hosts.wait_down_reboot_warning_secs, self.hosts.wait_down_reboot_timeout_secs
            );
        }
        let mut seen = std::collections::HashSet::new();
        for machine in &self.machines {
            if machine.hostname.trim().is_empty() {
                anyhow::bail!("machine entry with empty hostname");
            }
            if !seen.insert(machine.hostname.as_str()) {
                anyhow::bail!("machine {} is configured twice", machine.hostname);
            }
        }
        Ok(())
    }

    pub fn machine(&self, hostname: &str) -> Option<&MachineConfig> {
        self.machines.iter().find(|m| m.hostname == hostname)
    }
}
