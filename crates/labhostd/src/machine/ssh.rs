//! Machines reached over ssh
//!
//! Commands go through the local `ssh` client in batch mode. ssh exits with
//! 255 when the transport itself failed; those failures are classified into
//! the connectivity errors the repair ladder escalates from.

use super::Machine;
use crate::info::HostInfo;
use crate::process;
use labhost_common::{
    sh_quote, CmdResult, HostError, HostResult, HostSettings, MachineConfig, RunOptions,
    SshSettings,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Exit status of the ssh client when the connection failed
pub const SSH_TRANSPORT_FAILURE: i32 = 255;

const SSH_PING_TIMEOUT: Duration = Duration::from_secs(60);

/// Detached so the ssh session returns before the machine goes down
const REBOOT_COMMAND: &str = "(sync; sleep 5; reboot) </dev/null >/dev/null 2>&1 &";

pub struct SshMachine {
    hostname: String,
    user: String,
    port: u16,
    connect_timeout_secs: u64,
    options: Vec<String>,
    install_dir: String,
    gb_diskspace_required: f64,
    wait_up_processes: Vec<String>,
    poll_interval: Duration,
    reboot_timeout: Duration,
    install_command: Option<String>,
    hardware_repair_command: Option<String>,
}

impl SshMachine {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self::from_config(
            &MachineConfig::new(hostname),
            &SshSettings::default(),
            &HostSettings::default(),
        )
    }

    pub fn from_config(machine: &MachineConfig, ssh: &SshSettings, hosts: &HostSettings) -> Self {
        Self {
            hostname: machine.hostname.clone(),
            user: machine.user.clone().unwrap_or_else(|| ssh.user.clone()),
            port: machine.port.unwrap_or(ssh.port),
            connect_timeout_secs: ssh.connect_timeout_secs,
            options: ssh.options.clone(),
            install_dir: machine.install_dir.clone(),
            gb_diskspace_required: hosts.gb_diskspace_required,
            wait_up_processes: hosts.wait_up_processes.clone(),
            poll_interval: hosts.poll_interval(),
            reboot_timeout: hosts.reboot_timeout(),
            install_command: machine.install_command.clone(),
            hardware_repair_command: machine.hardware_repair_command.clone(),
        }
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ];
        for option in &self.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }

    /// Arguments for `ssh` running `command` on this machine
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["-a".to_string(), "-x".to_string()];
        args.extend(self.common_options());
        args.extend([
            "-l".to_string(),
            self.user.clone(),
            "-p".to_string(),
            self.port.to_string(),
            self.hostname.clone(),
            command.to_string(),
        ]);
        args
    }

    /// Arguments for `scp` copying `sources` to `dest`
    pub fn scp_args(&self, sources: &[String], dest: &str) -> Vec<String> {
        let mut args = vec!["-r".to_string(), "-P".to_string(), self.port.to_string()];
        args.extend(self.common_options());
        args.extend(sources.iter().cloned());
        args.push(dest.to_string());
        args
    }

    fn remote_path(&self, path: &str) -> String {
        format!("{}@{}:{}", self.user, self.hostname, sh_quote(path))
    }

    /// Succeeds when a trivial command completes over ssh
    pub fn ssh_ping(&self, timeout: Duration) -> HostResult<()> {
        match self.run("true", RunOptions::default().with_timeout(timeout)) {
            Ok(_) => Ok(()),
            Err(HostError::SshTimeout(_)) | Err(HostError::CommandTimeout { .. }) => {
                Err(HostError::SshTimeout(format!(
                    "Host (ssh) verify timed out (timeout = {})",
                    timeout.as_secs()
                )))
            }
            Err(err @ HostError::SshPermissionDenied(_)) => Err(err),
            Err(err) => Err(HostError::SshPing(err.to_string())),
        }
    }

    fn scp(&self, sources: &[String], dest: &str) -> HostResult<()> {
        let args = self.scp_args(sources, dest);
        let display_cmd = format!("scp {}", args.join(" "));
        let result = process::run_local("scp", &args, RunOptions::default(), &display_cmd)?;
        result.check().map(|_| ())
    }

    /// Run a configured local hook with `{hostname}` substituted
    fn run_hook(&self, template: &str) -> HostResult<()> {
        let command = template.replace("{hostname}", &self.hostname);
        info!("Running hook for {}: {}", self.hostname, command);
        process::run_local_checked(&command, RunOptions::default()).map(|_| ())
    }
}

/// Classify an ssh transport failure from its stderr
pub fn classify_transport_failure(hostname: &str, result: &CmdResult) -> Option<HostError> {
    if result.exit_status != SSH_TRANSPORT_FAILURE {
        return None;
    }
    let stderr = result.stderr.trim();
    if stderr.contains("Permission denied") {
        return Some(HostError::SshPermissionDenied(format!(
            "{}: {}",
            hostname, stderr
        )));
    }
    if stderr.contains("timed out") {
        return Some(HostError::SshTimeout(format!("{}: {}", hostname, stderr)));
    }
    None
}

impl Machine for SshMachine {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn run(&self, command: &str, opts: RunOptions) -> HostResult<CmdResult> {
        let args = self.ssh_args(command);
        let display_cmd = format!("ssh {}@{} {}", self.user, self.hostname, command);
        let result = process::run_local("ssh", &args, opts, &display_cmd)?;

        if let Some(err) = classify_transport_failure(&self.hostname, &result) {
            return Err(err);
        }
        if opts.ignore_status {
            Ok(result)
        } else {
            result.check()
        }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn wait_up_processes(&self) -> &[String] {
        &self.wait_up_processes
    }

    fn is_up(&self) -> bool {
        self.ssh_ping(SSH_PING_TIMEOUT).is_ok()
    }

    fn verify_connectivity(&self) -> HostResult<()> {
        info!("Pinging host {}", self.hostname);
        self.ssh_ping(SSH_PING_TIMEOUT)?;
        info!("Host (ssh) {} is alive", self.hostname);

        if self.is_shutting_down() {
            return Err(HostError::HostIsShuttingDown(format!(
                "{} is shutting down",
                self.hostname
            )));
        }
        Ok(())
    }

    fn verify_software(&self) -> HostResult<()> {
        // a missing install dir only means nothing was installed yet
        if !self.path_exists(&self.install_dir) {
            debug!(
                "Install dir {} missing on {}, skipping space check",
                self.install_dir, self.hostname
            );
            return Ok(());
        }
        self.check_diskspace(&self.install_dir, self.gb_diskspace_required)
    }

    fn reboot(&self) -> HostResult<()> {
        info!("Rebooting {}", self.hostname);
        self.run(
            REBOOT_COMMAND,
            RunOptions::default()
                .ignoring_status()
                .with_timeout(Duration::from_secs(60)),
        )?;
        Ok(())
    }

    fn get_file(&self, source: &str, dest: &Path) -> HostResult<()> {
        self.scp(&[self.remote_path(source)], &dest.to_string_lossy())
    }

    fn send_file(&self, source: &Path, dest: &str) -> HostResult<()> {
        self.scp(
            &[source.to_string_lossy().to_string()],
            &self.remote_path(dest),
        )
    }

    fn machine_install(&self) -> HostResult<()> {
        let template = self
            .install_command
            .as_deref()
            .ok_or(HostError::Unsupported("machine_install"))?;
        self.run_hook(template)?;

        if !self.wait_up(self.reboot_timeout) {
            return Err(HostError::Orchestration(format!(
                "{} did not come back up after install",
                self.hostname
            )));
        }
        Ok(())
    }

    fn request_hardware_repair(&self) -> HostResult<()> {
        let template = self
            .hardware_repair_command
            .as_deref()
            .ok_or(HostError::Unsupported("request_hardware_repair"))?;
        self.run_hook(template)?;

        Err(HostError::HardwareRepairRequested(format!(
            "hardware repair requested for {}",
            self.hostname
        )))
    }
}
