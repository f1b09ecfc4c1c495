//! Verify/repair sessions
//!
//! A session is one top-level verify or repair call on one host. Sessions on
//! different hosts share nothing but the status log, so a fleet runs them
//! concurrently, each on its own blocking worker.

use crate::host::Host;
use crate::machine::{LocalMachine, Machine, SshMachine};
use crate::repair::RepairProcedure;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use labhost_common::{
    HostResult, LabhostConfig, MachineConfig, MachineKind, ProtectionLevel, StatusLog,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Verify,
    /// Repair within each host's own protection level
    Repair,
    /// Repair within the given level, whatever the host's own
    RepairWithProtection(ProtectionLevel),
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionAction::Verify => write!(f, "verify"),
            SessionAction::Repair => write!(f, "repair"),
            SessionAction::RepairWithProtection(level) => write!(f, "repair({})", level),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub hostname: String,
    pub action: String,
    pub protection: ProtectionLevel,
    pub started_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub repairs_attempted: Vec<RepairProcedure>,
    pub files_removed: bool,
    pub duration_ms: u64,
}

impl SessionReport {
    pub fn passed(&self) -> bool {
        self.outcome == SessionOutcome::Passed
    }

    /// Report for a session whose worker died before producing one
    fn aborted(hostname: &str, action: SessionAction, reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.to_string(),
            action: action.to_string(),
            protection: ProtectionLevel::default(),
            started_at: Utc::now(),
            outcome: SessionOutcome::Failed,
            error_kind: Some("orchestration".to_string()),
            error: Some(reason),
            repairs_attempted: Vec::new(),
            files_removed: false,
            duration_ms: 0,
        }
    }
}

/// Run one session to completion on the calling thread
pub fn run_session<M: Machine>(host: &mut Host<M>, action: SessionAction) -> SessionReport {
    let id = Uuid::new_v4();
    let started_at = Utc::now();
    let start = Instant::now();
    let protection = match action {
        SessionAction::RepairWithProtection(level) => level,
        _ => host.protection(),
    };
    info!("Session {} on {}: {}", id, host.hostname(), action);

    host.log_kernel();
    let result: HostResult<()> = match action {
        SessionAction::Verify => host.verify(),
        SessionAction::Repair | SessionAction::RepairWithProtection(_) => {
            host.repair_with_protection(protection)
        }
    };

    let (outcome, error_kind, error) = match &result {
        Ok(()) => {
            info!("Session {} on {} passed", id, host.hostname());
            (SessionOutcome::Passed, None, None)
        }
        Err(e) => {
            error!("Session {} on {} failed: {}", id, host.hostname(), e);
            (
                SessionOutcome::Failed,
                Some(e.kind().to_string()),
                Some(e.to_string()),
            )
        }
    };

    SessionReport {
        id,
        hostname: host.hostname().to_string(),
        action: action.to_string(),
        protection,
        started_at,
        outcome,
        error_kind,
        error,
        repairs_attempted: host.memo().attempted().to_vec(),
        files_removed: host.files_removed(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Run one session per host concurrently. Reports come back in input order.
pub async fn run_sessions<M>(hosts: Vec<Host<M>>, action: SessionAction) -> Vec<SessionReport>
where
    M: Machine + 'static,
{
    let hostnames: Vec<String> = hosts.iter().map(|h| h.hostname().to_string()).collect();
    let mut join_set = JoinSet::new();

    for (index, mut host) in hosts.into_iter().enumerate() {
        join_set.spawn_blocking(move || (index, run_session(&mut host, action)));
    }

    let mut slots: Vec<Option<SessionReport>> = vec![None; hostnames.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, report)) => slots[index] = Some(report),
            Err(e) => warn!("Session worker failed: {}", e),
        }
    }

    slots
        .into_iter()
        .zip(hostnames)
        .map(|(slot, hostname)| {
            slot.unwrap_or_else(|| {
                SessionReport::aborted(&hostname, action, "session worker panicked".to_string())
            })
        })
        .collect()
}

fn host_for<M: Machine>(
    machine: M,
    config: &LabhostConfig,
    machine_config: &MachineConfig,
    log: &Arc<StatusLog>,
) -> Host<M> {
    Host::new(machine, config.hosts.clone())
        .with_protection(machine_config.protection)
        .with_job(log.clone())
}

/// Run `action` on the named machines, or on every configured machine when
/// `hostnames` is empty
pub async fn run_fleet(
    config: &LabhostConfig,
    hostnames: &[String],
    action: SessionAction,
    log: Arc<StatusLog>,
) -> Result<Vec<SessionReport>> {
    let selected: Vec<&MachineConfig> = if hostnames.is_empty() {
        config.machines.iter().collect()
    } else {
        let mut selected = Vec::new();
        for hostname in hostnames {
            match config.machine(hostname) {
                Some(machine) => selected.push(machine),
                None => bail!("machine {} is not configured", hostname),
            }
        }
        selected
    };

    if selected.is_empty() {
        warn!("No machines configured, nothing to do");
        return Ok(Vec::new());
    }

    let mut ssh_hosts = Vec::new();
    let mut local_hosts = Vec::new();
    for machine_config in &selected {
        match machine_config.kind {
            MachineKind::Ssh => {
                let machine = SshMachine::from_config(machine_config, &config.ssh, &config.hosts);
                ssh_hosts.push(host_for(machine, config, machine_config, &log));
            }
            MachineKind::Local => {
                let machine = LocalMachine::new(machine_config.hostname.clone())
                    .with_wait_up_processes(config.hosts.wait_up_processes.clone())
                    .with_poll_interval(config.hosts.poll_interval());
                local_hosts.push(host_for(machine, config, machine_config, &log));
            }
        }
    }

    info!(
        "Running {} on {} machines ({} ssh, {} local)",
        action,
        selected.len(),
        ssh_hosts.len(),
        local_hosts.len()
    );
    let (ssh_reports, local_reports) = tokio::join!(
        run_sessions(ssh_hosts, action),
        run_sessions(local_hosts, action)
    );

    let mut reports: Vec<SessionReport> = ssh_reports.into_iter().chain(local_reports).collect();
    reports.sort_by_key(|report| {
        selected
            .iter()
            .position(|m| m.hostname == report.hostname)
            .unwrap_or(usize::MAX)
    });
    Ok(reports)
}
