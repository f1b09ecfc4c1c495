//! labhostd - verify and repair test-lab machines
//!
//! Runs one verify or repair session per configured machine, concurrently,
//! and prints a report per session. Exits non-zero when any session failed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labhost_common::{
    logging, LabhostConfig, MachineConfig, MachineKind, ProtectionLevel, StatusLog,
};
use labhostd::{
    run_fleet, HostInfo, LocalMachine, Machine, SessionAction, SessionReport, SshMachine,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "labhostd")]
#[command(about = "Verify and repair test-lab machines", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = labhost_common::config::CONFIG_PATH)]
    config: PathBuf,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// Log filter, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the read-only health checks
    Verify {
        /// Machines to verify (default: all configured)
        #[arg(long = "machine")]
        machines: Vec<String>,
    },

    /// Repair machines within their protection level
    Repair {
        /// Machines to repair (default: all configured)
        #[arg(long = "machine")]
        machines: Vec<String>,

        /// Override every machine's protection level
        #[arg(long)]
        protection: Option<ProtectionLevel>,
    },

    /// Show architecture, kernel and memory of one machine
    Info {
        #[arg(long)]
        machine: String,
    },
}

#[derive(Serialize)]
struct MachineSummary {
    hostname: String,
    arch: String,
    kernel: String,
    cpus: usize,
    mem_total: Option<String>,
}

fn summarize<M: Machine>(machine: &M) -> Result<MachineSummary> {
    let meminfo = machine.get_meminfo()?;
    Ok(MachineSummary {
        hostname: machine.hostname().to_string(),
        arch: machine.get_arch()?,
        kernel: machine.get_kernel_ver()?,
        cpus: machine.get_num_cpu()?,
        mem_total: meminfo.get("MemTotal").cloned(),
    })
}

fn machine_summary(
    config: &LabhostConfig,
    machine_config: &MachineConfig,
) -> Result<MachineSummary> {
    match machine_config.kind {
        MachineKind::Ssh => summarize(&SshMachine::from_config(
            machine_config,
            &config.ssh,
            &config.hosts,
        )),
        MachineKind::Local => summarize(&LocalMachine::new(machine_config.hostname.clone())),
    }
}

fn print_reports(reports: &[SessionReport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        let status = if report.passed() { "PASS" } else { "FAIL" };
        println!(
            "{:<4} {} [{}] {}ms",
            status, report.hostname, report.action, report.duration_ms
        );
        for procedure in &report.repairs_attempted {
            println!("     attempted {}", procedure);
        }
        if let Some(error) = &report.error {
            println!("     {}", error);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = LabhostConfig::load_from(&cli.config)?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    logging::init(level);

    let (machines, action) = match cli.command {
        Commands::Verify { machines } => (machines, SessionAction::Verify),
        Commands::Repair {
            machines,
            protection,
        } => {
            let action = match protection {
                Some(level) => SessionAction::RepairWithProtection(level),
                None => SessionAction::Repair,
            };
            (machines, action)
        }
        Commands::Info { machine } => {
            let machine_config = config
                .machine(&machine)
                .cloned()
                .with_context(|| format!("machine {} is not configured", machine))?;
            let summary = tokio::task::spawn_blocking(move || {
                machine_summary(&config, &machine_config)
            })
            .await??;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{}: {} {} ({} cpus)",
                    summary.hostname, summary.arch, summary.kernel, summary.cpus
                );
                if let Some(mem_total) = &summary.mem_total {
                    println!("MemTotal: {}", mem_total);
                }
            }
            return Ok(());
        }
    };

    let log = Arc::new(match &config.log.status_log {
        Some(path) => StatusLog::with_path(path),
        None => StatusLog::new(),
    });

    let reports = run_fleet(&config, &machines, action, log).await?;
    print_reports(&reports, cli.json)?;

    let failed = reports.iter().filter(|r| !r.passed()).count();
    info!("{} of {} sessions failed", failed, reports.len());
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
