//! In-memory process manager and connector used by the unit tests

use crate::connector::UpstreamConnector;
use crate::error::BridgeError;
use crate::process::{
    ChildPipe, ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessStatus,
    ProcessTermination, TerminationResult,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Spawned(String),
    Graceful(ProcessId),
    ForceKill(ProcessId),
    StartKill(ProcessId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    /// Exits on the graceful request
    Cooperative,
    /// Ignores the graceful request, dies on force kill
    Stubborn,
    /// Survives everything
    Unkillable,
    /// Spawn itself fails
    FailSpawn,
}

type EventLog = Arc<Mutex<Vec<ProcessEvent>>>;

pub struct FakeProcessManager {
    behaviour: Behaviour,
    events: EventLog,
    next_pid: AtomicU32,
    exits: Mutex<HashMap<ProcessId, Arc<watch::Sender<bool>>>>,
}

impl FakeProcessManager {
    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            events: Arc::new(Mutex::new(Vec::new())),
            next_pid: AtomicU32::new(1000),
            exits: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooperative() -> Self {
        Self::with_behaviour(Behaviour::Cooperative)
    }

    pub fn stubborn() -> Self {
        Self::with_behaviour(Behaviour::Stubborn)
    }

    pub fn unkillable() -> Self {
        Self::with_behaviour(Behaviour::Unkillable)
    }

    pub fn failing_spawn() -> Self {
        Self::with_behaviour(Behaviour::FailSpawn)
    }

    pub fn events(&self) -> Vec<ProcessEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: ProcessEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn mark_exited(&self, pid: ProcessId) {
        if let Some(exit) = self.exits.lock().unwrap().get(&pid) {
            exit.send_replace(true);
        }
    }
}

struct FakeHandle {
    pid: ProcessId,
    command: String,
    exited: Arc<watch::Sender<bool>>,
    pipes: Vec<ChildPipe>,
    events: EventLog,
    killable: bool,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        Some(self.pid)
    }

    fn get_command(&self) -> &str {
        &self.command
    }

    fn take_pipes(&mut self) -> Vec<ChildPipe> {
        std::mem::take(&mut self.pipes)
    }

    async fn try_wait(&mut self) -> Result<Option<ProcessStatus>> {
        if *self.exited.borrow() {
            Ok(Some(ProcessStatus::Terminated))
        } else {
            Ok(None)
        }
    }

    async fn wait(&mut self) -> Result<ProcessStatus> {
        let mut exited = self.exited.subscribe();
        loop {
            if *exited.borrow_and_update() {
                return Ok(ProcessStatus::Terminated);
            }
            exited.changed().await?;
        }
    }

    async fn kill(&mut self) -> Result<()> {
        if self.killable {
            self.exited.send_replace(true);
        }
        Ok(())
    }

    fn start_kill(&mut self) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ProcessEvent::StartKill(self.pid));
        if self.killable {
            self.exited.send_replace(true);
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessLifecycle for FakeProcessManager {
    async fn spawn_process(
        &self,
        command: &str,
        _args: &[String],
        _working_dir: Option<&Path>,
        _env: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>, io::Error> {
        if self.behaviour == Behaviour::FailSpawn {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "spawn refused"));
        }

        let pid = ProcessId(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let (exited, _) = watch::channel(false);
        let exited = Arc::new(exited);
        self.exits.lock().unwrap().insert(pid, exited.clone());
        self.record(ProcessEvent::Spawned(command.to_string()));

        let stdout: ChildPipe = ChildPipe {
            stream: "stdout",
            reader: Box::new(io::Cursor::new(b"child ready\n".to_vec())),
        };

        Ok(Box::new(FakeHandle {
            pid,
            command: command.to_string(),
            exited,
            pipes: vec![stdout],
            events: self.events.clone(),
            killable: self.behaviour != Behaviour::Unkillable,
        }))
    }
}

#[async_trait]
impl ProcessTermination for FakeProcessManager {
    async fn terminate_gracefully(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };
        self.record(ProcessEvent::Graceful(pid));
        if self.behaviour == Behaviour::Cooperative {
            self.mark_exited(pid);
        }
        TerminationResult::Success
    }

    async fn force_kill(&self, handle: &mut dyn ProcessHandle) -> TerminationResult {
        let Some(pid) = handle.get_pid() else {
            return TerminationResult::ProcessNotFound;
        };
        self.record(ProcessEvent::ForceKill(pid));
        if self.behaviour == Behaviour::Unkillable {
            return TerminationResult::AccessDenied;
        }
        self.mark_exited(pid);
        TerminationResult::Success
    }
}

impl ProcessManager for FakeProcessManager {
    fn platform_name(&self) -> &'static str {
        "fake"
    }
}

/// Connector that hands out one prepared stream or a prepared failure
pub struct FakeConnector {
    attempts: Arc<AtomicUsize>,
    outcome: Mutex<Option<Result<DuplexStream, io::ErrorKind>>>,
}

impl FakeConnector {
    pub fn with_stream(stream: DuplexStream) -> Self {
        Self {
            attempts: Arc::new(AtomicUsize::new(0)),
            outcome: Mutex::new(Some(Ok(stream))),
        }
    }

    pub fn refusing() -> Self {
        Self {
            attempts: Arc::new(AtomicUsize::new(0)),
            outcome: Mutex::new(Some(Err(io::ErrorKind::ConnectionRefused))),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    type Stream = DuplexStream;

    async fn connect(&self, host: &str, port: u16) -> Result<DuplexStream, BridgeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let addr = format!("{host}:{port}");
        match self.outcome.lock().unwrap().take() {
            Some(Ok(stream)) => Ok(stream),
            Some(Err(kind)) => Err(BridgeError::from_connect(addr, io::Error::from(kind))),
            None => Err(BridgeError::from_connect(
                addr,
                io::Error::new(io::ErrorKind::AddrNotAvailable, "stream already handed out"),
            )),
        }
    }
}
