use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::process::{ChildPipe, ProcessHandle, ProcessId, ProcessManager, ProcessStatus, TerminationResult};
use crate::relay::LineFrameCodec;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

/// Lifecycle of the supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Starting,
    Running,
    Terminating,
    Terminated,
}

/// Launches the child executable and owns its termination policy
pub struct ProcessSupervisor {
    manager: Arc<dyn ProcessManager>,
    command: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_directory: Option<PathBuf>,
    warm_up: Duration,
    grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(manager: Arc<dyn ProcessManager>, config: &BridgeConfig) -> Self {
        Self {
            manager,
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            working_directory: config.working_directory.clone(),
            warm_up: config.warm_up(),
            grace: config.termination_grace(),
        }
    }

    /// Launch the child and wait out the warm-up window
    pub async fn start(&self) -> Result<SupervisedProcess, BridgeError> {
        let mut process = self.launch().await?;
        self.warm_up(&mut process).await;
        Ok(process)
    }

    /// Spawn the child without waiting for it to become reachable
    pub async fn launch(&self) -> Result<SupervisedProcess, BridgeError> {
        let command = self.command.to_string_lossy().into_owned();

        if let Some(path) = self.explicit_path() {
            if !path.exists() {
                return Err(BridgeError::Launch {
                    command,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("executable not found at {}", path.display()),
                    ),
                });
            }
        }

        info!(command = %command, args = ?self.args, "Launching child process");

        let mut handle = self
            .manager
            .spawn_process(
                &command,
                &self.args,
                self.working_directory.as_deref(),
                &self.env,
            )
            .await
            .map_err(|source| BridgeError::Launch {
                command: command.clone(),
                source,
            })?;

        let pid = handle.get_pid();
        let mut process = SupervisedProcess {
            manager: self.manager.clone(),
            pid,
            state: ChildState::Starting,
            grace: self.grace,
            forwarders: Vec::new(),
            exit_status: None,
            handle: None,
        };

        process.forwarders = handle
            .take_pipes()
            .into_iter()
            .map(|pipe| tokio::spawn(forward_child_output(pid, pipe)))
            .collect();
        process.handle = Some(handle);
        process.state = ChildState::Running;

        info!(pid = ?pid.map(|p| p.0), platform = self.manager.platform_name(), "Child process started");
        Ok(process)
    }

    /// Fixed wait for the child to bind its listener; no readiness probing
    pub async fn warm_up(&self, process: &mut SupervisedProcess) {
        info!(
            "Waiting {:.1} seconds for TCP server to be ready...",
            self.warm_up.as_secs_f64()
        );
        tokio::time::sleep(self.warm_up).await;

        if let Some(status) = process.exit_status_now().await {
            warn!(pid = ?process.pid().map(|p| p.0), ?status, "Child exited during warm-up");
        }
    }

    /// Path that must exist before spawning, if the command names one
    fn explicit_path(&self) -> Option<PathBuf> {
        let is_path = self.command.is_absolute() || self.command.components().count() > 1;
        if !is_path {
            return None;
        }
        match &self.working_directory {
            Some(dir) if self.command.is_relative() => Some(dir.join(&self.command)),
            _ => Some(self.command.clone()),
        }
    }
}

/// Scoped ownership of a running child
///
/// `terminate` runs graceful-then-forced teardown. Dropping the guard without
/// a completed `terminate` kills the child synchronously.
pub struct SupervisedProcess {
    handle: Option<Box<dyn ProcessHandle>>,
    manager: Arc<dyn ProcessManager>,
    pid: Option<ProcessId>,
    state: ChildState,
    grace: Duration,
    forwarders: Vec<JoinHandle<()>>,
    exit_status: Option<ProcessStatus>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    /// Command the child was spawned from; None once the handle is gone
    pub fn command(&self) -> Option<&str> {
        self.handle.as_deref().map(|h| h.get_command())
    }

    /// Non-blocking exit check
    pub async fn exit_status_now(&mut self) -> Option<ProcessStatus> {
        let handle = self.handle.as_mut()?;
        match handle.try_wait().await {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "try_wait failed");
                None
            }
        }
    }

    /// Graceful termination, bounded wait, then force kill. Idempotent.
    pub async fn terminate(&mut self) -> Result<ProcessStatus, BridgeError> {
        if self.state == ChildState::Terminated {
            return Ok(self.exit_status.clone().unwrap_or(ProcessStatus::Unknown));
        }

        self.state = ChildState::Terminating;
        info!(
            pid = ?self.pid.map(|p| p.0),
            command = self.command().unwrap_or("<unknown>"),
            "Terminating child process"
        );

        let status = self.stop().await?;

        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        self.state = ChildState::Terminated;
        self.exit_status = Some(status.clone());
        info!(pid = ?self.pid.map(|p| p.0), ?status, "Process terminated");
        Ok(status)
    }

    async fn stop(&mut self) -> Result<ProcessStatus, BridgeError> {
        let pid = self.pid.map(|p| p.0);
        let manager = self.manager.clone();
        let grace = self.grace;
        let Some(handle) = self.handle.as_mut() else {
            return Ok(ProcessStatus::Unknown);
        };

        if let Ok(Some(status)) = handle.try_wait().await {
            info!(pid = ?pid, "Child process had already exited");
            return Ok(status);
        }

        match manager.terminate_gracefully(handle.as_mut()).await {
            TerminationResult::Success => {
                match manager.wait_for_exit(handle.as_mut(), Some(grace)).await {
                    Ok(status) => return Ok(status),
                    Err(e) => warn!(
                        pid = ?pid,
                        grace_ms = grace.as_millis() as u64,
                        error = %e,
                        "Graceful termination did not complete, force killing"
                    ),
                }
            }
            TerminationResult::ProcessNotFound => {
                return Self::reap(manager.as_ref(), handle.as_mut(), grace).await;
            }
            other => warn!(pid = ?pid, result = ?other, "Graceful termination request failed, force killing"),
        }

        match manager.force_kill(handle.as_mut()).await {
            TerminationResult::Success | TerminationResult::ProcessNotFound => {
                Self::reap(manager.as_ref(), handle.as_mut(), grace).await
            }
            other => {
                error!(pid = ?pid, result = ?other, "Force kill failed, child process may still be running");
                Err(BridgeError::TerminationFailure(format!(
                    "force kill of pid {pid:?} failed: {other:?}"
                )))
            }
        }
    }

    async fn reap(
        manager: &dyn ProcessManager,
        handle: &mut dyn ProcessHandle,
        grace: Duration,
    ) -> Result<ProcessStatus, BridgeError> {
        manager
            .wait_for_exit(handle, Some(grace))
            .await
            .map_err(|e| {
                error!(error = %e, "Killed child process could not be reaped");
                BridgeError::TerminationFailure(e.to_string())
            })
    }
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        for forwarder in &self.forwarders {
            forwarder.abort();
        }

        if self.state == ChildState::Terminated {
            return;
        }

        if let Some(handle) = self.handle.as_mut() {
            warn!(
                pid = ?self.pid.map(|p| p.0),
                command = handle.get_command(),
                "Supervised process dropped before teardown, killing it"
            );
            if let Err(e) = handle.start_kill() {
                error!(pid = ?self.pid.map(|p| p.0), error = %e, "Emergency kill failed");
            }
        }
    }
}

/// Re-emit one child output pipe on the diagnostic channel
async fn forward_child_output(pid: Option<ProcessId>, pipe: ChildPipe) {
    let ChildPipe { stream, reader } = pipe;
    let mut lines = FramedRead::new(reader, LineFrameCodec::new());

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                let text = String::from_utf8_lossy(&line);
                info!(
                    target: "gpmcp_bridge::child",
                    pid = ?pid.map(|p| p.0),
                    stream,
                    "{}",
                    text.trim_end()
                );
            }
            Err(e) => {
                debug!(stream, error = %e, "Child output forwarding stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProcessManager, ProcessEvent};

    fn config(command: &str) -> BridgeConfig {
        BridgeConfig::builder()
            .command(command)
            .args(["-logFile", "app.log"])
            .warm_up_ms(0u64)
            .termination_grace_ms(50u64)
            .build()
            .unwrap()
    }

    fn supervisor(manager: &Arc<FakeProcessManager>, command: &str) -> ProcessSupervisor {
        ProcessSupervisor::new(manager.clone(), &config(command))
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let manager = Arc::new(FakeProcessManager::cooperative());
        let result = supervisor(&manager, "/definitely/not/here/avatar.exe")
            .start()
            .await;

        assert!(matches!(result, Err(BridgeError::Launch { .. })));
        assert!(manager.events().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_launch_error() {
        let manager = Arc::new(FakeProcessManager::failing_spawn());
        let result = supervisor(&manager, "avatar").launch().await;

        match result {
            Err(BridgeError::Launch { command, source }) => {
                assert_eq!(command, "avatar");
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("expected launch error"),
        }
    }

    #[tokio::test]
    async fn test_graceful_termination() {
        let manager = Arc::new(FakeProcessManager::cooperative());
        let mut process = supervisor(&manager, "avatar").start().await.unwrap();
        let pid = process.pid().unwrap();
        assert_eq!(process.state(), ChildState::Running);
        assert_eq!(process.command(), Some("avatar"));

        let status = process.terminate().await.unwrap();
        assert_eq!(status, ProcessStatus::Terminated);
        assert_eq!(process.state(), ChildState::Terminated);

        // Second call is a no-op
        process.terminate().await.unwrap();
        drop(process);

        assert_eq!(
            manager.events(),
            vec![
                ProcessEvent::Spawned("avatar".to_string()),
                ProcessEvent::Graceful(pid),
            ]
        );
    }

    #[tokio::test]
    async fn test_escalates_to_force_kill() {
        let manager = Arc::new(FakeProcessManager::stubborn());
        let mut process = supervisor(&manager, "avatar").start().await.unwrap();
        let pid = process.pid().unwrap();

        process.terminate().await.unwrap();
        drop(process);

        assert_eq!(
            manager.events(),
            vec![
                ProcessEvent::Spawned("avatar".to_string()),
                ProcessEvent::Graceful(pid),
                ProcessEvent::ForceKill(pid),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_force_kill_is_termination_failure() {
        let manager = Arc::new(FakeProcessManager::unkillable());
        let mut process = supervisor(&manager, "avatar").start().await.unwrap();
        let pid = process.pid().unwrap();

        let result = process.terminate().await;
        assert!(matches!(result, Err(BridgeError::TerminationFailure(_))));
        assert_eq!(process.state(), ChildState::Terminating);

        drop(process);
        assert_eq!(manager.events().last(), Some(&ProcessEvent::StartKill(pid)));
    }

    #[tokio::test]
    async fn test_drop_without_terminate_kills_child() {
        let manager = Arc::new(FakeProcessManager::cooperative());
        let process = supervisor(&manager, "avatar").launch().await.unwrap();
        let pid = process.pid().unwrap();

        drop(process);
        assert_eq!(manager.events().last(), Some(&ProcessEvent::StartKill(pid)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_waits_full_warm_up() {
        let manager = Arc::new(FakeProcessManager::cooperative());
        let mut config = config("avatar");
        config.warm_up_ms = 10_000;
        let supervisor = ProcessSupervisor::new(manager.clone(), &config);

        let started = tokio::time::Instant::now();
        let mut process = supervisor.start().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));

        process.terminate().await.unwrap();
    }

    #[test]
    fn test_explicit_path_resolution() {
        let manager = Arc::new(FakeProcessManager::cooperative());
        assert!(supervisor(&manager, "sleep").explicit_path().is_none());

        let mut relative = config("build/avatar");
        relative.working_directory = Some(PathBuf::from("/srv/unity"));
        let supervisor = ProcessSupervisor::new(manager, &relative);
        assert_eq!(
            supervisor.explicit_path(),
            Some(PathBuf::from("/srv/unity/build/avatar"))
        );
    }
}
