//! Local process execution with timeouts
//!
//! Every command is wrapped in coreutils `timeout`, which exits with 124 when
//! the limit is hit. Results are returned without interpreting the exit code;
//! callers decide what a failure means.

use labhost_common::{CmdResult, HostError, HostResult, RunOptions};
use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::debug;

/// Exit status of coreutils `timeout` when the limit expired
pub const TIMEOUT_EXIT_STATUS: i32 = 124;

/// Grace period before `timeout` escalates to SIGKILL
const KILL_AFTER_SECS: u64 = 5;

/// Run `program args...` locally under a timeout.
///
/// `display_cmd` is the command as reported in results and errors.
pub fn run_local(
    program: &str,
    args: &[String],
    opts: RunOptions,
    display_cmd: &str,
) -> HostResult<CmdResult> {
    let start = Instant::now();
    let timeout_secs = opts.timeout.as_secs().max(1);

    debug!("Executing: {}", display_cmd);
    let output = Command::new("timeout")
        .arg(format!("--kill-after={}", KILL_AFTER_SECS))
        .arg(timeout_secs.to_string())
        .arg(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                HostError::Orchestration(format!("cannot execute {}: {}", program, e))
            }
            _ => HostError::Orchestration(format!("failed to spawn {}: {}", display_cmd, e)),
        })?;

    let exit_status = output.status.code().unwrap_or(-1);
    if exit_status == TIMEOUT_EXIT_STATUS {
        return Err(HostError::CommandTimeout {
            command: display_cmd.to_string(),
            timeout_secs,
        });
    }

    Ok(CmdResult {
        command: display_cmd.to_string(),
        exit_status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run a shell command line locally
pub fn run_local_shell(command: &str, opts: RunOptions) -> HostResult<CmdResult> {
    let args = vec!["-c".to_string(), command.to_string()];
    run_local("sh", &args, opts, command)
}

/// Run a shell command line locally, failing on non-zero exit unless ignored
pub fn run_local_checked(command: &str, opts: RunOptions) -> HostResult<CmdResult> {
    let result = run_local_shell(command, opts)?;
    if opts.ignore_status {
        Ok(result)
    } else {
        result.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_local_captures_output() {
        let result = run_local_shell("echo hello; echo oops >&2", RunOptions::default()).unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert!(result.success());
    }

    #[test]
    fn test_run_local_reports_display_command() {
        let args = vec!["-c".to_string(), "exit 0".to_string()];
        let result = run_local("sh", &args, RunOptions::default(), "ssh root@rig1 true").unwrap();
        assert_eq!(result.command, "ssh root@rig1 true");
    }

    #[test]
    fn test_run_local_checked_fails_on_exit() {
        let err = run_local_checked("exit 3", RunOptions::default()).unwrap_err();
        assert!(matches!(err, HostError::Command { exit_status: 3, .. }));
    }

    #[test]
    fn test_run_local_checked_ignores_status() {
        let result = run_local_checked("exit 3", RunOptions::default().ignoring_status()).unwrap();
        assert_eq!(result.exit_status, 3);
    }

    #[test]
    fn test_run_local_timeout() {
        let err = run_local_shell(
            "sleep 5",
            RunOptions::default().with_timeout(Duration::from_secs(1)),
        )
        .unwrap_err();
        assert!(matches!(err, HostError::CommandTimeout { timeout_secs: 1, .. }));
    }
}
