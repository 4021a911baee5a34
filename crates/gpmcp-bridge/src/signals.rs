//! Process signals that end a session
//!
//! The child runs in its own process group, so a terminal or supervisor
//! signalling the bridge never reaches it directly. Every signal that asks
//! the bridge to stop has to be turned into a session shutdown.

use std::io;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Shutdown requests delivered to this process.
///
/// Handlers are registered by [`ShutdownSignals::install`], so a signal that
/// arrives before [`ShutdownSignals::recv`] is first polled is not lost.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl ShutdownSignals {
    /// Register the handlers; must be called inside a tokio runtime
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next shutdown request and return the signal's name
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => Ok("SIGINT"),
                _ = self.terminate.recv() => Ok("SIGTERM"),
                _ = self.hangup.recv() => Ok("SIGHUP"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok("Ctrl-C")
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{Signal as NixSignal, raise};
    use std::time::Duration;

    #[tokio::test]
    async fn test_hangup_is_a_shutdown_request() {
        let mut signals = ShutdownSignals::install().unwrap();
        raise(NixSignal::SIGHUP).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, "SIGHUP");
    }
}
