use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Operating-system process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a process
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessStatus {
    /// Process exited and was reaped
    Exited(std::process::ExitStatus),
    /// Process was killed and its exit status could not be collected
    Terminated,
    Unknown,
}

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Signal or request was delivered
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges
    AccessDenied,
    Failed(String),
}

/// One captured output pipe of a child process
pub struct ChildPipe {
    pub stream: &'static str,
    pub reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
}

/// Handle to a spawned process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None once the process has been reaped)
    fn get_pid(&self) -> Option<ProcessId>;

    fn get_command(&self) -> &str;

    /// Take the piped stdout/stderr of the child; empty on the second call
    fn take_pipes(&mut self) -> Vec<ChildPipe>;

    /// Check whether the process is still running without blocking
    async fn is_running(&mut self) -> bool {
        matches!(self.try_wait().await, Ok(None))
    }

    /// Try to get exit status without blocking
    async fn try_wait(&mut self) -> Result<Option<ProcessStatus>>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ProcessStatus>;

    /// Kill the process and wait for it
    async fn kill(&mut self) -> Result<()>;

    /// Request a kill without waiting, usable from `Drop`
    fn start_kill(&mut self) -> Result<()>;
}

/// Process spawning and waiting
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// Spawn a process with null stdin and piped stdout/stderr
    async fn spawn_process(
        &self,
        command: &str,
        args: &[String],
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>, std::io::Error>;

    /// Wait for a process to exit with optional timeout
    async fn wait_for_exit(
        &self,
        handle: &mut dyn ProcessHandle,
        timeout: Option<Duration>,
    ) -> Result<ProcessStatus> {
        match timeout {
            Some(duration) => tokio::time::timeout(duration, handle.wait())
                .await
                .map_err(|_| anyhow::anyhow!("Timeout waiting for process exit"))?,
            None => handle.wait().await,
        }
    }
}

/// Graceful and forced termination
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Ask the process to stop (SIGTERM on Unix, WM_CLOSE on Windows)
    async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult;

    /// Force kill the process (SIGKILL on Unix, TerminateProcess on Windows)
    async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult;
}

/// Platform process manager combining lifecycle and termination
pub trait ProcessManager: ProcessLifecycle + ProcessTermination {
    fn platform_name(&self) -> &'static str;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    type Manager: ProcessManager;

    fn create_process_manager() -> Self::Manager;

    fn platform_name() -> &'static str;
}
