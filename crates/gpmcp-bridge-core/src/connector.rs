use crate::error::BridgeError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Opens the single upstream connection of a session
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Attempt exactly one connection; any failure is session-fatal
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream, BridgeError>;
}

/// Plain TCP connector, one attempt and no retry
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl UpstreamConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, BridgeError> {
        let addr = format!("{host}:{port}");
        info!(addr = %addr, "Attempting TCP connection");

        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                // Messages are small and latency bound
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(error = %e, "Failed to set TCP_NODELAY");
                }
                info!(addr = %addr, "TCP connection established");
                Ok(stream)
            }
            Err(e) => {
                let err = BridgeError::from_connect(addr, e);
                if matches!(err, BridgeError::ConnectionRefused { .. }) {
                    warn!("Connection refused: the child may not be listening yet or the port is closed");
                }
                Err(err)
            }
        }
    }
}
