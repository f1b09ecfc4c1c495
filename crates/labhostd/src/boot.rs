//! Boot identity and shutdown detection
//!
//! The kernel exposes a random token per boot in
//! /proc/sys/kernel/random/boot_id. Two reads returning the same token mean
//! no reboot happened in between; a different token means at least one did.

use crate::machine::Machine;
use labhost_common::{HostError, HostResult, RunOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const BOOT_ID_FILE: &str = "/proc/sys/kernel/random/boot_id";

/// Printed instead of a token when the kernel has no boot_id file
pub const NO_BOOT_ID: &str = "no boot_id available";

pub const BOOT_ID_TIMEOUT: Duration = Duration::from_secs(60);

/// Opaque per-boot token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootId(String);

impl BootId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn boot_id_command() -> String {
    format!(
        "if [ -f '{file}' ]; then cat '{file}'; else echo '{none}'; fi",
        file = BOOT_ID_FILE,
        none = NO_BOOT_ID
    )
}

/// Interpret the output of `boot_id_command`
pub fn parse_boot_id(stdout: &str) -> HostResult<Option<BootId>> {
    let id = stdout.trim();
    if id == NO_BOOT_ID {
        return Ok(None);
    }
    if id.is_empty() || id.contains(char::is_whitespace) {
        return Err(HostError::InvalidOutput(format!("boot id: {:?}", id)));
    }
    Ok(Some(BootId::new(id)))
}

pub fn read_boot_id<M: Machine + ?Sized>(
    machine: &M,
    timeout: Duration,
) -> HostResult<Option<BootId>> {
    let result = machine.run(&boot_id_command(), RunOptions::default().with_timeout(timeout))?;
    parse_boot_id(&result.stdout)
}

/// Runlevel from `runlevel` output ("N 5", "5 6", ...)
pub fn parse_runlevel(stdout: &str) -> Option<u32> {
    stdout.split_whitespace().nth(1)?.parse().ok()
}

pub fn is_shutting_down<M: Machine + ?Sized>(machine: &M) -> bool {
    let result = machine.run(
        "runlevel",
        RunOptions::default().with_timeout(Duration::from_secs(60)),
    );
    match result {
        Ok(result) => matches!(parse_runlevel(&result.stdout), Some(0) | Some(6)),
        Err(_) => false,
    }
}
