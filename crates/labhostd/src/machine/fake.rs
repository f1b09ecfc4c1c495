//! Fake machine for deterministic testing
//!
//! Verify outcomes, command responses and wait results are configured up
//! front; every hook invocation is appended to an event log so tests can
//! assert on ordering and counts without touching a real system.
//!
//! Mount layout is emulated for `readlink -m` and `mountpoint -q` so
//! mountpoint resolution works against a declared list of mounts (only "/"
//! unless configured).

use super::Machine;
use labhost_common::{CmdResult, HostError, HostResult, RunOptions};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Hook invocations recorded by `FakeMachine`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeEvent {
    Verify,
    RebootSetup,
    Reboot,
    RebootFollowup,
    WaitUp,
    WaitDown,
    MachineInstall,
    RequestHardwareRepair,
}

pub struct FakeMachine {
    hostname: String,
    verify_script: Mutex<VecDeque<HostResult<()>>>,
    verify_fallback: HostResult<()>,
    responses: Vec<(String, CmdResult)>,
    command_failures: Vec<(String, HostError)>,
    mounts: Vec<String>,
    shutting_down: bool,
    wait_up_result: bool,
    wait_down_result: bool,
    slow_shutdown: bool,
    install_result: HostResult<()>,
    hardware_repair_result: HostResult<()>,
    events: Mutex<Vec<FakeEvent>>,
    commands: Mutex<Vec<String>>,
}

impl FakeMachine {
    /// A healthy machine: verify passes, waits succeed, repairs succeed
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            verify_script: Mutex::new(VecDeque::new()),
            verify_fallback: Ok(()),
            responses: Vec::new(),
            command_failures: Vec::new(),
            mounts: vec!["/".to_string()],
            shutting_down: false,
            wait_up_result: true,
            wait_down_result: true,
            slow_shutdown: false,
            install_result: Ok(()),
            hardware_repair_result: Ok(()),
            events: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Outcomes returned by successive verify() calls
    pub fn verify_results(self, results: impl IntoIterator<Item = HostResult<()>>) -> Self {
        Self {
            verify_script: Mutex::new(results.into_iter().collect()),
            ..self
        }
    }

    /// Outcome once the verify script is exhausted
    pub fn verify_always(mut self, result: HostResult<()>) -> Self {
        self.verify_fallback = result;
        self
    }

    /// Commands containing `pattern` succeed with `stdout`
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        let result = CmdResult {
            stdout: stdout.to_string(),
            ..Default::default()
        };
        self.respond_with(pattern, result)
    }

    /// Commands containing `pattern` exit with `exit_status`
    pub fn respond_status(self, pattern: &str, exit_status: i32) -> Self {
        let result = CmdResult {
            exit_status,
            ..Default::default()
        };
        self.respond_with(pattern, result)
    }

    pub fn respond_with(mut self, pattern: &str, result: CmdResult) -> Self {
        self.responses.push((pattern.to_string(), result));
        self
    }

    /// Commands containing `pattern` fail with `err`
    pub fn fail_command(mut self, pattern: &str, err: HostError) -> Self {
        self.command_failures.push((pattern.to_string(), err));
        self
    }

    /// Directories that are mountpoints ("/" is always one)
    pub fn mounts(mut self, mounts: &[&str]) -> Self {
        self.mounts = mounts.iter().map(|m| m.to_string()).collect();
        if !self.mounts.iter().any(|m| m == "/") {
            self.mounts.push("/".to_string());
        }
        self
    }

    pub fn shutting_down(mut self, shutting_down: bool) -> Self {
        self.shutting_down = shutting_down;
        self
    }

    pub fn wait_up_returns(mut self, up: bool) -> Self {
        self.wait_up_result = up;
        self
    }

    pub fn wait_down_returns(mut self, down: bool) -> Self {
        self.wait_down_result = down;
        self
    }

    /// Going down outlasts any shutdown warning limit
    pub fn slow_shutdown(mut self, slow: bool) -> Self {
        self.slow_shutdown = slow;
        self
    }

    pub fn install_returns(mut self, result: HostResult<()>) -> Self {
        self.install_result = result;
        self
    }

    pub fn hardware_repair_returns(mut self, result: HostResult<()>) -> Self {
        self.hardware_repair_result = result;
        self
    }

    /// Every hook invocation, in order
    pub fn events(&self) -> Vec<FakeEvent> {
        lock(&self.events).clone()
    }

    pub fn count(&self, event: FakeEvent) -> usize {
        lock(&self.events).iter().filter(|e| **e == event).count()
    }

    /// Every command passed to run(), in order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Whether any command containing `pattern` was run
    pub fn ran(&self, pattern: &str) -> bool {
        lock(&self.commands).iter().any(|c| c.contains(pattern))
    }

    fn push_event(&self, event: FakeEvent) {
        lock(&self.events).push(event);
    }

    /// Emulated mount table answers
    fn mount_response(&self, command: &str) -> Option<CmdResult> {
        if let Some(path) = command.strip_prefix("readlink -m -- ") {
            let path = path.trim_matches('\'');
            return Some(CmdResult {
                stdout: format!("{}\n", path),
                ..Default::default()
            });
        }
        if let Some(path) = command.strip_prefix("mountpoint -q -- ") {
            let path = path.trim_matches('\'');
            let is_mount = self.mounts.iter().any(|m| m == path);
            return Some(CmdResult {
                exit_status: if is_mount { 0 } else { 32 },
                ..Default::default()
            });
        }
        None
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Machine for FakeMachine {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn run(&self, command: &str, opts: RunOptions) -> HostResult<CmdResult> {
        lock(&self.commands).push(command.to_string());

        if let Some((_, err)) = self
            .command_failures
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return Err(err.clone());
        }

        let result = self
            .responses
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .or_else(|| self.mount_response(command))
            .unwrap_or_default();

        let result = CmdResult {
            command: command.to_string(),
            ..result
        };
        if opts.ignore_status {
            Ok(result)
        } else {
            result.check()
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn verify_software(&self) -> HostResult<()> {
        self.push_event(FakeEvent::Verify);
        let next = lock(&self.verify_script).pop_front();
        next.unwrap_or_else(|| self.verify_fallback.clone())
    }

    fn is_up(&self) -> bool {
        self.wait_up_result
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    fn wait_up(&self, _timeout: Duration) -> bool {
        self.push_event(FakeEvent::WaitUp);
        self.wait_up_result
    }

    fn wait_down(
        &self,
        _timeout: Duration,
        warning: Option<Duration>,
        _old_boot_id: Option<&crate::boot::BootId>,
        on_slow_shutdown: &dyn Fn(Duration),
    ) -> bool {
        self.push_event(FakeEvent::WaitDown);
        if let (true, Some(limit)) = (self.slow_shutdown, warning) {
            on_slow_shutdown(limit);
        }
        self.wait_down_result
    }

    fn reboot_setup(&self) -> HostResult<()> {
        self.push_event(FakeEvent::RebootSetup);
        Ok(())
    }

    fn reboot(&self) -> HostResult<()> {
        self.push_event(FakeEvent::Reboot);
        Ok(())
    }

    fn reboot_followup(&self) -> HostResult<()> {
        self.push_event(FakeEvent::RebootFollowup);
        Ok(())
    }

    fn machine_install(&self) -> HostResult<()> {
        self.push_event(FakeEvent::MachineInstall);
        self.install_result.clone()
    }

    fn request_hardware_repair(&self) -> HostResult<()> {
        self.push_event(FakeEvent::RequestHardwareRepair);
        self.hardware_repair_result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_script_then_fallback() {
        let machine = FakeMachine::new("rig1")
            .verify_results([Err(HostError::HostIsShuttingDown("x".into()))])
            .verify_always(Err(HostError::HardwareFault("dimm".into())));

        assert_eq!(
            machine.verify_software(),
            Err(HostError::HostIsShuttingDown("x".into()))
        );
        assert_eq!(
            machine.verify_software(),
            Err(HostError::HardwareFault("dimm".into()))
        );
        assert_eq!(machine.count(FakeEvent::Verify), 2);
    }

    #[test]
    fn test_mount_emulation() {
        let machine = FakeMachine::new("rig1").mounts(&["/tmp"]);
        let canonical = machine
            .run("readlink -m -- /tmp/x", RunOptions::default())
            .unwrap();
        assert_eq!(canonical.stdout, "/tmp/x\n");
        let tmp = machine
            .run("mountpoint -q -- /tmp", RunOptions::default().ignoring_status())
            .unwrap();
        assert!(tmp.success());
        let var = machine
            .run("mountpoint -q -- /var", RunOptions::default().ignoring_status())
            .unwrap();
        assert!(!var.success());
    }

    #[test]
    fn test_failures_take_priority() {
        let machine = FakeMachine::new("rig1")
            .respond("uname", "x86_64")
            .fail_command("uname", HostError::SshTimeout("t".into()));
        assert_eq!(
            machine.run("uname -m", RunOptions::default()),
            Err(HostError::SshTimeout("t".into()))
        );
        assert!(machine.ran("uname"));
    }

    #[test]
    fn test_non_zero_exit_respects_ignore_status() {
        let machine = FakeMachine::new("rig1").respond_status("false", 1);
        assert!(machine.run("false", RunOptions::default()).is_err());
        assert!(machine
            .run("false", RunOptions::default().ignoring_status())
            .is_ok());
    }
}
