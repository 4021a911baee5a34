//! GPMCP Bridge - stdio to TCP bridge for a locally launched tool server
//!
//! [`GpmcpBridge`] wires the platform process manager and a plain TCP
//! connector into a [`BridgeCoordinator`] and runs one session over the
//! process's standard streams.

pub mod cli;
mod factory;
pub mod logging;
pub mod signals;

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use factory::PlatformProcessManagerFactory;

/// One bridging session backed by the platform process manager
pub struct GpmcpBridge {
    coordinator: BridgeCoordinator<TcpConnector>,
}

impl GpmcpBridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let manager = Arc::new(PlatformProcessManagerFactory::create_process_manager());
        tracing::debug!(
            platform = PlatformProcessManagerFactory::platform_name(),
            "Created process manager"
        );
        let coordinator = BridgeCoordinator::new(config, manager, TcpConnector)?;
        Ok(Self { coordinator })
    }

    /// Token that ends the session through the normal teardown path
    pub fn shutdown_token(&self) -> CancellationToken {
        self.coordinator.shutdown_token()
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.coordinator.subscribe()
    }

    /// Run the session over arbitrary controlling streams
    pub async fn run<I, O>(self, input: I, output: O) -> Result<BridgeReport, BridgeError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
    {
        self.coordinator.run(input, output).await
    }

    /// Run the session over this process's stdin and stdout
    pub async fn run_stdio(self) -> Result<BridgeReport, BridgeError> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

// Re-export core functionality
pub use gpmcp_bridge_core::*;
