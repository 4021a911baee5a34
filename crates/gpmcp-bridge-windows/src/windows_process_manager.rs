use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use gpmcp_bridge_core::*;

/// Exit code taskkill reports when the target pid does not exist
const TASKKILL_NOT_FOUND: i32 = 128;

/// Windows-specific process handle implementation
pub struct WindowsProcessHandle {
    child: Child,
    pid: Option<ProcessId>,
    command: String,
    pipes: Vec<ChildPipe>,
}

impl WindowsProcessHandle {
    pub fn new(mut child: Child, command: String) -> Self {
        let mut pipes = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pipes.push(ChildPipe {
                stream: "stdout",
                reader: Box::new(stdout),
            });
        }
        if let Some(stderr) = child.stderr.take() {
            pipes.push(ChildPipe {
                stream: "stderr",
                reader: Box::new(stderr),
            });
        }

        Self {
            pid: child.id().map(ProcessId::from),
            child,
            command,
            pipes,
        }
    }
}

#[async_trait]
impl ProcessHandle for WindowsProcessHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        self.pid
    }

    fn get_command(&self) -> &str {
        &self.command
    }

    fn take_pipes(&mut self) -> Vec<ChildPipe> {
        std::mem::take(&mut self.pipes)
    }

    async fn try_wait(&mut self) -> Result<Option<ProcessStatus>> {
        match self.child.try_wait()? {
            Some(status) => Ok(Some(ProcessStatus::Exited(status))),
            None => Ok(None),
        }
    }

    async fn wait(&mut self) -> Result<ProcessStatus> {
        let status = self.child.wait().await?;
        Ok(ProcessStatus::Exited(status))
    }

    async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to kill process: {}", e))
    }

    fn start_kill(&mut self) -> Result<()> {
        if let Some(pid) = self.pid {
            // Fire and forget, the tree may outlive the direct child otherwise
            let tree = std::process::Command::new("taskkill")
                .args(taskkill_args(pid.0, true))
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            if let Err(e) = tree {
                debug!(pid = %pid.0, error = %e, "Could not run taskkill for process tree");
            }
        }
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to kill process: {}", e)),
        }
    }
}

/// Windows-specific process manager built on `taskkill`
#[derive(Debug, Default)]
pub struct WindowsProcessManager;

impl WindowsProcessManager {
    pub fn new() -> Self {
        info!("Initializing Windows process manager");
        Self
    }

    /// Run taskkill against the process tree rooted at `pid`
    async fn taskkill(&self, pid: u32, force: bool) -> TerminationResult {
        let output = match Command::new("taskkill")
            .args(taskkill_args(pid, force))
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(pid = %pid, error = %e, "Failed to run taskkill");
                return TerminationResult::Failed(format!("taskkill could not run: {e}"));
            }
        };

        match output.status.code() {
            Some(0) => TerminationResult::Success,
            Some(TASKKILL_NOT_FOUND) => TerminationResult::ProcessNotFound,
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("Access is denied") {
                    TerminationResult::AccessDenied
                } else {
                    TerminationResult::Failed(stderr.trim().to_string())
                }
            }
        }
    }
}

/// Graceful requests close the windows of the tree, forced ones terminate it
fn taskkill_args(pid: u32, force: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(4);
    if force {
        args.push("/F".to_string());
    }
    args.push("/T".to_string());
    args.push("/PID".to_string());
    args.push(pid.to_string());
    args
}

#[async_trait]
impl ProcessLifecycle for WindowsProcessManager {
    async fn spawn_process(
        &self,
        command: &str,
        args: &[String],
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>, std::io::Error> {
        let mut cmd = Command::new(command);
        cmd.args(args);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x08000000);
        }

        let child = cmd.spawn()?;

        if let Some(pid) = child.id() {
            info!(
                pid = %pid,
                command = %command,
                args = ?args,
                "Spawned Windows process"
            );
        }

        Ok(Box::new(WindowsProcessHandle::new(child, command.to_string())))
    }
}

#[async_trait]
impl ProcessTermination for WindowsProcessManager {
    async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        let result = self.taskkill(pid.0, false).await;
        match &result {
            TerminationResult::Success => {
                info!(pid = %pid.0, "Sent graceful termination to process tree")
            }
            TerminationResult::ProcessNotFound => {
                info!(pid = %pid.0, "Process not found for graceful termination")
            }
            other => warn!(pid = %pid.0, result = ?other, "Graceful termination request failed"),
        }
        result
    }

    async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };

        let result = self.taskkill(pid.0, true).await;
        match &result {
            TerminationResult::Success => {
                info!(pid = %pid.0, "Force killed process tree");
            }
            TerminationResult::ProcessNotFound => {
                info!(pid = %pid.0, "Process not found for force kill");
            }
            other => {
                warn!(pid = %pid.0, result = ?other, "taskkill /F failed, terminating child directly");
                if handle.kill().await.is_ok() {
                    return TerminationResult::Success;
                }
            }
        }
        result
    }
}

impl ProcessManager for WindowsProcessManager {
    fn platform_name(&self) -> &'static str {
        "Windows"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taskkill_args() {
        assert_eq!(taskkill_args(42, false), vec!["/T", "/PID", "42"]);
        assert_eq!(taskkill_args(42, true), vec!["/F", "/T", "/PID", "42"]);
    }

    #[cfg(windows)]
    #[tokio::test]
    async fn test_force_kill_tree() {
        let manager = WindowsProcessManager::new();
        let mut handle = manager
            .spawn_process(
                "ping",
                &["-n".to_string(), "30".to_string(), "127.0.0.1".to_string()],
                None,
                &HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            manager.force_kill(handle.as_mut()).await,
            TerminationResult::Success
        );
        let status = manager
            .wait_for_exit(handle.as_mut(), Some(std::time::Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(matches!(status, ProcessStatus::Exited(s) if !s.success()));
    }
}
