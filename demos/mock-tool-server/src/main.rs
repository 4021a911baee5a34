//! Line-delimited JSON-RPC tool server for trying the bridge by hand.
//!
//! Launch it as the bridge's child (`--executable`); it listens on
//! `127.0.0.1:$PORT` (default 8080) and accepts the `-logFile <path>`
//! argument the bridge passes.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

mod tools;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_tool_server=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(start())
}

async fn start() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if let Some(log_file) = args
        .iter()
        .position(|a| a == "-logFile")
        .and_then(|i| args.get(i + 1))
    {
        tracing::info!(log_file = %log_file, "Log file requested, logging to stderr instead");
    }

    let port: u16 = std::env::var("PORT")
        .ok()
        .map(|v| v.parse())
        .transpose()?
        .unwrap_or(8080);
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "Mock tool server listening");

    let ct = CancellationToken::new();
    let shutdown = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = ct.cancelled() => break,
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                tracing::info!(%peer, "Client connected");
                tokio::spawn(async move {
                    if let Err(e) = serve(socket).await {
                        tracing::error!(error = %e, "Connection failed");
                    }
                    tracing::info!(%peer, "Client disconnected");
                });
            }
        }
    }

    tracing::info!("Mock tool server cancelled");
    Ok(())
}

async fn serve(socket: TcpStream) -> anyhow::Result<()> {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        if let Some(reply) = tools::handle_line(&line) {
            let mut bytes = serde_json::to_vec(&reply)?;
            bytes.push(b'\n');
            write.write_all(&bytes).await?;
        }
    }
    Ok(())
}
