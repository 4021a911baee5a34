#[cfg(unix)]
mod unix_impl {
    use anyhow::Result;
    use async_trait::async_trait;
    use gpmcp_bridge_core::{
        ChildPipe, ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessStatus,
        ProcessTermination, TerminationResult,
    };
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::collections::HashMap;
    use std::path::Path;
    use std::process::Stdio;
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    /// Unix-specific process handle implementation
    pub struct UnixProcessHandle {
        child: Child,
        // Kept after reaping, `Child::id` turns into None
        pid: Option<ProcessId>,
        command: String,
        pipes: Vec<ChildPipe>,
    }

    impl UnixProcessHandle {
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
    impl ProcessHandle for UnixProcessHandle {
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
                // Take the rest of the group down with the leader
                let _ = signal::killpg(NixPid::from_raw(pid.0 as i32), Signal::SIGKILL);
            }
            match self.child.start_kill() {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                Err(e) => Err(anyhow::anyhow!("Failed to kill process: {}", e)),
            }
        }
    }

    /// Unix process manager; every child leads its own process group
    #[derive(Debug, Default)]
    pub struct UnixProcessManager;

    impl UnixProcessManager {
        pub fn new() -> Self {
            info!("Initializing Unix process manager");
            Self
        }

        /// Signal the child's process group, falling back to the single pid
        fn send_signal(pid: ProcessId, sig: Signal) -> TerminationResult {
            let nix_pid = NixPid::from_raw(pid.0 as i32);

            let result = match signal::killpg(nix_pid, sig) {
                Err(Errno::ESRCH) => signal::kill(nix_pid, sig),
                other => other,
            };

            match result {
                Ok(()) => {
                    info!("Sent {} to process group {}", sig, pid.0);
                    TerminationResult::Success
                }
                Err(Errno::ESRCH) => {
                    info!("Process {} not found (already terminated)", pid.0);
                    TerminationResult::ProcessNotFound
                }
                Err(Errno::EPERM) => {
                    warn!("Permission denied to signal process {}", pid.0);
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!("Failed to send {} to process {}: {}", sig, pid.0, e);
                    TerminationResult::Failed(format!("{sig} failed: {e}"))
                }
            }
        }
    }

    #[async_trait]
    impl ProcessLifecycle for UnixProcessManager {
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

            // Protocol traffic never reaches the child; its output goes to diagnostics
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            // New process group so the whole tree can be signalled at once
            cmd.process_group(0);

            let child = cmd.spawn()?;

            if let Some(pid) = child.id() {
                info!(
                    "Spawned Unix process: {} (PID: {}) with args: {:?}",
                    command, pid, args
                );
            }

            Ok(Box::new(UnixProcessHandle::new(child, command.to_string())))
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
            match handle.get_pid() {
                Some(pid) => Self::send_signal(pid, Signal::SIGTERM),
                None => TerminationResult::ProcessNotFound,
            }
        }

        async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
            let Some(pid) = handle.get_pid() else {
                return TerminationResult::ProcessNotFound;
            };

            let result = Self::send_signal(pid, Signal::SIGKILL);
            if result == TerminationResult::Success {
                // Make sure the leader itself is gone even if it left the group
                if let Err(e) = handle.start_kill() {
                    debug!("Handle kill cleanup failed: {}", e);
                }
            }
            result
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn platform_name(&self) -> &'static str {
            "Unix"
        }
    }

}

#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager};

// Provide stub implementations for non-Unix systems
#[cfg(not(unix))]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct UnixProcessManager;

#[cfg(not(unix))]
impl UnixProcessManager {
    pub fn new() -> Self {
        Self
    }
}
