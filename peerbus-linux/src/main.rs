// Peer bus Linux daemon: one consumer task fed by the line transport.

mod config;
mod consumer;
mod replay;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use peerbus_core::NetworkCore;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "peerbus-linux", version, about = "Peer presence and command protocol daemon")]
struct Args {
    /// Config file (default: ~/.config/peerbus/config.toml, then /etc/peerbus/config.toml).
    #[arg(long, env = "PEERBUS_CONFIG")]
    config: Option<PathBuf>,
    /// Replay file with bus events; stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Broadcast group of the bus.
    #[arg(long)]
    group: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(input) = args.input {
        cfg.input = Some(input);
    }
    if let Some(group) = args.group {
        cfg.bus.group = group;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let core = NetworkCore::with_config(cfg.bus.clone()).context("invalid bus config")?;
    tracing::info!(group = core.group(), headers = ?core.service_headers(), "service description");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (tx, rx) = tokio::sync::mpsc::channel(cfg.channel_capacity);
        let reader = match &cfg.input {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                tokio::spawn(replay::read_lines(BufReader::new(file), tx))
            }
            None => tokio::spawn(replay::read_lines(BufReader::new(tokio::io::stdin()), tx)),
        };

        let mut transport = consumer::LineTransport::new(std::io::stdout());
        tokio::select! {
            core = consumer::run_consumer(core, rx, &mut transport) => {
                match reader.await {
                    Ok(Ok(lines)) => tracing::info!(lines, peers = core.registry().len(), "input finished"),
                    Ok(Err(e)) => tracing::error!(error = %e, "reading input failed"),
                    Err(e) => tracing::error!(error = %e, "input reader task failed"),
                }
            }
            res = shutdown_signal() => {
                reader.abort();
                res?;
                tracing::info!("shutdown requested");
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix). Dropping the consumer closes the event channel.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
