//! Mountpoint resolution on the target machine
//!
//! The path is canonicalized remotely (symlinks resolved, made absolute),
//! then walked upward one component at a time until a directory is itself a
//! mountpoint. "/" always is.

use crate::machine::Machine;
use labhost_common::{sh_quote, HostError, HostResult, RunOptions};
use std::path::Path;
use std::time::Duration;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Exit status of `mountpoint -q` for a directory that is not a mountpoint
const NOT_A_MOUNTPOINT: i32 = 32;

/// Directories whose contents are always safe to erase
pub const ERASABLE_TMP_DIRS: [&str; 2] = ["/tmp", "/var/tmp"];

/// `path` and each of its parents, deepest first, ending with "/"
pub fn candidate_dirs(path: &str) -> Vec<String> {
    Path::new(path)
        .ancestors()
        .filter_map(|p| p.to_str())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn canonicalize<M: Machine + ?Sized>(machine: &M, path: &str) -> HostResult<String> {
    let command = format!("readlink -m -- {}", sh_quote(path));
    let result = machine.run(&command, RunOptions::default().with_timeout(RESOLVE_TIMEOUT))?;
    let canonical = result.stdout.trim();
    if !canonical.starts_with('/') {
        return Err(HostError::InvalidOutput(format!(
            "readlink -m {}: {:?}",
            path, canonical
        )));
    }
    Ok(canonical.to_string())
}

/// Any exit other than 0 or 32 (missing tool, unreadable dir) is an error
fn is_mountpoint<M: Machine + ?Sized>(machine: &M, dir: &str) -> HostResult<bool> {
    let command = format!("mountpoint -q -- {}", sh_quote(dir));
    let result = machine.run(
        &command,
        RunOptions::default()
            .ignoring_status()
            .with_timeout(RESOLVE_TIMEOUT),
    )?;
    match result.exit_status {
        0 => Ok(true),
        NOT_A_MOUNTPOINT => Ok(false),
        _ => result.check().map(|_| false),
    }
}

/// Mountpoint of the filesystem containing `path`
pub fn resolve_mountpoint<M: Machine + ?Sized>(machine: &M, path: &str) -> HostResult<String> {
    let canonical = canonicalize(machine, path)?;
    for dir in candidate_dirs(&canonical) {
        if dir == "/" || is_mountpoint(machine, &dir)? {
            return Ok(dir);
        }
    }
    Ok("/".to_string())
}

/// The erasable temp dirs living on `mountpoint`
pub fn tmp_dirs_on<M: Machine + ?Sized>(
    machine: &M,
    mountpoint: &str,
) -> HostResult<Vec<&'static str>> {
    let mut dirs = Vec::new();
    for dir in ERASABLE_TMP_DIRS {
        if resolve_mountpoint(machine, dir)? == mountpoint {
            dirs.push(dir);
        }
    }
    Ok(dirs)
}
