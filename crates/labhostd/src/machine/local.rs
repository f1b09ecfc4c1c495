//! The machine labhostd itself runs on

use super::Machine;
use crate::process;
use labhost_common::{CmdResult, HostError, HostResult, RunOptions};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub struct LocalMachine {
    hostname: String,
    wait_up_processes: Vec<String>,
    poll_interval: Duration,
}

impl LocalMachine {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            wait_up_processes: Vec::new(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_wait_up_processes(mut self, processes: Vec<String>) -> Self {
        self.wait_up_processes = processes;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Machine for LocalMachine {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn run(&self, command: &str, opts: RunOptions) -> HostResult<CmdResult> {
        process::run_local_checked(command, opts)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn wait_up_processes(&self) -> &[String] {
        &self.wait_up_processes
    }

    fn is_up(&self) -> bool {
        true
    }

    fn get_file(&self, source: &str, dest: &Path) -> HostResult<()> {
        fs::copy(source, dest)?;
        Ok(())
    }

    fn send_file(&self, source: &Path, dest: &str) -> HostResult<()> {
        fs::copy(source, dest)?;
        Ok(())
    }

    fn get_tmp_dir(&self) -> HostResult<String> {
        let dir = std::env::temp_dir().join(format!("labhost_{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        dir.to_str()
            .map(str::to_string)
            .ok_or_else(|| HostError::InvalidOutput(format!("non-UTF-8 temp dir {:?}", dir)))
    }
}
