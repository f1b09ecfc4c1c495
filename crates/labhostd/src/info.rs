//! Host information helpers
//!
//! Generic implementations built on `Machine::run`, available on every
//! machine kind through a blanket impl.

use crate::machine::Machine;
use labhost_common::{sh_quote, HostError, HostResult, RunOptions};
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Bytes per MB as reported by `df -B` (SI)
const ONE_MB: u64 = 1_000_000;
const MB_PER_GB: f64 = 1000.0;

/// Saved iptables rules while filters are disabled
const IPTABLES_SAVE_FILE: &str = "/tmp/iptable-rules";

pub trait HostInfo {
    /// Stdout of `command` with trailing whitespace removed
    fn run_output(&self, command: &str) -> HostResult<String>;

    fn path_exists(&self, path: &str) -> bool;

    /// Fail with `DiskFull` when `path` has less than `gb` GB free
    fn check_diskspace(&self, path: &str, gb: f64) -> HostResult<()>;

    fn get_num_cpu(&self) -> HostResult<usize>;

    fn get_arch(&self) -> HostResult<String>;

    fn get_kernel_ver(&self) -> HostResult<String>;

    fn get_cmdline(&self) -> HostResult<String>;

    fn get_meminfo(&self) -> HostResult<BTreeMap<String, String>>;

    /// Whether every named process is running (`pgrep -x`)
    fn processes_running(&self, processes: &[String]) -> HostResult<bool>;

    /// Save current rules and accept all traffic
    fn disable_ipfilters(&self) -> HostResult<()>;

    /// Restore rules saved by `disable_ipfilters`
    fn enable_ipfilters(&self) -> HostResult<()>;
}

impl<M: Machine + ?Sized> HostInfo for M {
    fn run_output(&self, command: &str) -> HostResult<String> {
        let result = self.run(command, RunOptions::default())?;
        Ok(result.stdout.trim_end().to_string())
    }

    fn path_exists(&self, path: &str) -> bool {
        let command = format!("ls {} > /dev/null", sh_quote(path));
        self.run(&command, RunOptions::default().ignoring_status())
            .map(|r| r.success())
            .unwrap_or(false)
    }

    fn check_diskspace(&self, path: &str, gb: f64) -> HostResult<()> {
        info!(
            "Checking for >= {} GB of space under {} on machine {}",
            gb,
            path,
            self.hostname()
        );
        let command = format!("df -PB {} {} | tail -1", ONE_MB, sh_quote(path));
        let output = self.run_output(&command)?;
        let free_gb = parse_df_free_gb(&output)
            .ok_or_else(|| HostError::InvalidOutput(format!("df: {:?}", output)))?;

        if free_gb < gb {
            return Err(HostError::disk_full(path, gb, free_gb));
        }
        info!(
            "Found {} GB >= {} GB of space under {} on machine {}",
            free_gb,
            gb,
            path,
            self.hostname()
        );
        Ok(())
    }

    fn get_num_cpu(&self) -> HostResult<usize> {
        let cpuinfo = self.run_output("cat /proc/cpuinfo")?;
        Ok(count_processors(&cpuinfo))
    }

    fn get_arch(&self) -> HostResult<String> {
        let arch = self.run_output("/bin/uname -m")?;
        Ok(normalize_arch(&arch))
    }

    fn get_kernel_ver(&self) -> HostResult<String> {
        self.run_output("/bin/uname -r")
    }

    fn get_cmdline(&self) -> HostResult<String> {
        self.run_output("cat /proc/cmdline")
    }

    fn get_meminfo(&self) -> HostResult<BTreeMap<String, String>> {
        let meminfo = self.run_output("cat /proc/meminfo")?;
        Ok(parse_meminfo(&meminfo))
    }

    fn processes_running(&self, processes: &[String]) -> HostResult<bool> {
        for process in processes {
            let command = format!("pgrep -x {}", sh_quote(process));
            let result = self.run(
                &command,
                RunOptions::default()
                    .ignoring_status()
                    .with_timeout(Duration::from_secs(30)),
            )?;
            if !result.success() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn disable_ipfilters(&self) -> HostResult<()> {
        self.run(
            &format!("iptables-save > {}", IPTABLES_SAVE_FILE),
            RunOptions::default(),
        )?;
        for chain in ["INPUT", "FORWARD", "OUTPUT"] {
            self.run(&format!("iptables -P {} ACCEPT", chain), RunOptions::default())?;
        }
        Ok(())
    }

    fn enable_ipfilters(&self) -> HostResult<()> {
        if self.path_exists(IPTABLES_SAVE_FILE) {
            self.run(
                &format!("iptables-restore < {}", IPTABLES_SAVE_FILE),
                RunOptions::default(),
            )?;
        }
        Ok(())
    }
}

/// Free GB from the last line of `df -PB 1000000`
pub fn parse_df_free_gb(line: &str) -> Option<f64> {
    let available_mb: u64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(available_mb as f64 / MB_PER_GB)
}

pub fn count_processors(cpuinfo: &str) -> usize {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count()
}

/// Collapse i386..i686 into "i386"
pub fn normalize_arch(arch: &str) -> String {
    let arch = arch.trim();
    match Regex::new(r"^i\d86$") {
        Ok(re) if re.is_match(arch) => "i386".to_string(),
        _ => arch.to_string(),
    }
}

pub fn parse_meminfo(meminfo: &str) -> BTreeMap<String, String> {
    meminfo
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
