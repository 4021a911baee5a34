use crate::config::BridgeConfig;
use crate::connector::UpstreamConnector;
use crate::error::BridgeError;
use crate::process::{ProcessId, ProcessManager, ProcessStatus};
use crate::relay::{Relay, RelayDirection, RelayReport};
use crate::supervisor::{ProcessSupervisor, SupervisedProcess};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Session lifecycle, strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Launching,
    WarmingUp,
    Connecting,
    Bridging,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a session that reached the bridging phase
#[derive(Debug)]
pub struct BridgeReport {
    pub inbound: RelayReport,
    pub outbound: RelayReport,
    pub child_pid: Option<ProcessId>,
    pub child_status: ProcessStatus,
}

/// Sequences launch, warm-up, connect, relaying and teardown for one session
pub struct BridgeCoordinator<C: UpstreamConnector> {
    config: BridgeConfig,
    supervisor: ProcessSupervisor,
    connector: C,
    state: watch::Sender<BridgeState>,
    shutdown: CancellationToken,
}

impl<C: UpstreamConnector> BridgeCoordinator<C> {
    pub fn new(
        config: BridgeConfig,
        manager: Arc<dyn ProcessManager>,
        connector: C,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let supervisor = ProcessSupervisor::new(manager, &config);
        let (state, _) = watch::channel(BridgeState::Idle);

        Ok(Self {
            config,
            supervisor,
            connector,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Cancelling this token ends the session through the normal teardown path
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run one session between `input`/`output` and the child's TCP endpoint
    ///
    /// Teardown of the child always runs once it has been spawned, whatever
    /// the session outcome.
    pub async fn run<I, O>(self, input: I, output: O) -> Result<BridgeReport, BridgeError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
    {
        self.transition(BridgeState::Launching);
        let mut child = match self.supervisor.launch().await {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "Failed to start child process");
                self.transition(BridgeState::ShuttingDown);
                self.transition(BridgeState::Terminated);
                return Err(e);
            }
        };

        let session = self.session(&mut child, input, output).await;

        self.transition(BridgeState::ShuttingDown);
        let teardown = child.terminate().await;
        let child_pid = child.pid();
        drop(child);
        self.transition(BridgeState::Terminated);

        match (session, teardown) {
            (Ok((inbound, outbound)), Ok(child_status)) => Ok(BridgeReport {
                inbound,
                outbound,
                child_pid,
                child_status,
            }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(teardown)) => {
                error!(error = %teardown, "Teardown failed after session error");
                Err(e)
            }
        }
    }

    async fn session<I, O>(
        &self,
        child: &mut SupervisedProcess,
        input: I,
        output: O,
    ) -> Result<(RelayReport, RelayReport), BridgeError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
    {
        self.transition(BridgeState::WarmingUp);
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(self.cancelled()),
            _ = self.supervisor.warm_up(child) => {}
        }

        self.transition(BridgeState::Connecting);
        let stream = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(self.cancelled()),
            result = self.connector.connect(&self.config.host, self.config.port) => result,
        };
        let stream = stream.inspect_err(|e| error!(error = %e, "Failed to connect to TCP server"))?;

        self.transition(BridgeState::Bridging);
        info!(addr = %self.config.upstream_addr(), "Bridge established");

        let (upstream_read, upstream_write) = tokio::io::split(stream);
        let relays = self.shutdown.child_token();
        let max = self.config.max_message_bytes;

        let inbound = Relay::new(
            RelayDirection::InboundToUpstream,
            input,
            upstream_write,
            relays.clone(),
            max,
        );
        let outbound = Relay::new(
            RelayDirection::UpstreamToOutbound,
            upstream_read,
            output,
            relays.clone(),
            max,
        );

        // Whichever direction ends first cancels the other
        let (inbound, outbound) = tokio::join!(
            async {
                let report = inbound.run().await;
                relays.cancel();
                report
            },
            async {
                let report = outbound.run().await;
                relays.cancel();
                report
            },
        );

        for report in [&inbound, &outbound] {
            if let Some(e) = &report.error {
                warn!(direction = %report.direction, error = %e, "Relay ended with transport error");
            }
        }

        Ok((inbound, outbound))
    }

    fn cancelled(&self) -> BridgeError {
        info!("Shutdown requested before bridging started");
        BridgeError::Cancelled
    }

    fn transition(&self, next: BridgeState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "Bridge state changed");
    }
}
