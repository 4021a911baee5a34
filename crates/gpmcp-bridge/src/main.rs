use anyhow::Context;
use clap::Parser;
use gpmcp_bridge::cli::Cli;
use gpmcp_bridge::logging::{DEFAULT_FILTER, init_tracing};
use gpmcp_bridge::signals::ShutdownSignals;
use gpmcp_bridge::{BridgeError, GpmcpBridge};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Upper bound on waiting for a stdin read parked on the blocking pool
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(DEFAULT_FILTER, cli.log_json);

    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.into_config().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let code = runtime.block_on(async move {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = %config.command.display(),
            addr = %config.upstream_addr(),
            "Starting gpmcp-bridge"
        );

        // Before the child exists, so no stop request can slip past it
        let mut signals =
            ShutdownSignals::install().context("failed to install signal handlers")?;
        let bridge = GpmcpBridge::new(config)?;
        let shutdown = bridge.shutdown_token();
        let interrupt = tokio::spawn(async move {
            match signals.recv().await {
                Ok(signal) => {
                    info!(signal, "Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => warn!(error = %e, "Cannot listen for shutdown signals"),
            }
        });

        let result = bridge.run_stdio().await;
        interrupt.abort();

        Ok::<_, anyhow::Error>(match result {
            Ok(report) => {
                info!(
                    sent = report.inbound.messages,
                    received = report.outbound.messages,
                    inbound = %report.inbound.state,
                    outbound = %report.outbound.state,
                    child_status = ?report.child_status,
                    "Bridge finished"
                );
                ExitCode::SUCCESS
            }
            Err(BridgeError::Cancelled) => {
                info!("Bridge cancelled before the connection was established");
                ExitCode::from(130)
            }
            Err(e) => {
                error!(error = %e, "Bridge failed");
                ExitCode::FAILURE
            }
        })
    })?;

    // A pending stdin read cannot be interrupted; don't let it hold the process
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    Ok(code)
}
