//! Command execution results
//!
//! Results are captured as-is. Interpretation of exit codes belongs to the
//! machine kind that ran the command.

use crate::error::{HostError, HostResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for commands run on a machine
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Maximum stderr length carried inside an error
const MAX_ERROR_STDERR: usize = 4 * 1024;

/// Result of a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdResult {
    /// Full command that was executed
    pub command: String,
    /// Exit code (0 = success, -1 when killed by a signal)
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
    /// Execution duration
    pub duration_ms: u64,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Convert a non-zero exit into a `HostError::Command`
    pub fn check(self) -> HostResult<Self> {
        if self.success() {
            return Ok(self);
        }
        let mut stderr = self.stderr.trim().to_string();
        if stderr.len() > MAX_ERROR_STDERR {
            let mut cut = MAX_ERROR_STDERR;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        Err(HostError::Command {
            command: self.command,
            exit_status: self.exit_status,
            stderr,
        })
    }
}

/// Options for a single command run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub timeout: Duration,
    /// Do not fail on non-zero exit status
    pub ignore_status: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            ignore_status: false,
        }
    }
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ignoring_status(mut self) -> Self {
        self.ignore_status = true;
        self
    }
}

/// Quote a string for a POSIX shell
pub fn sh_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_status: i32, stderr: &str) -> CmdResult {
        CmdResult {
            command: "false".to_string(),
            exit_status,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_passes_success() {
        assert!(result(0, "").check().is_ok());
    }

    #[test]
    fn test_check_converts_failure() {
        let err = result(2, "boom\n").check().unwrap_err();
        assert_eq!(
            err,
            HostError::Command {
                command: "false".to_string(),
                exit_status: 2,
                stderr: "boom".to_string(),
            }
        );
    }

    #[test]
    fn test_sh_quote() {
        assert_eq!(sh_quote("/var/tmp"), "/var/tmp");
        assert_eq!(sh_quote("a b"), "'a b'");
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
        assert_eq!(sh_quote(""), "''");
    }
}
