//! StompGate Relay
//!
//! Reads client commands from stdin as newline-delimited JSON, relays them
//! to a STOMP broker and writes broker frames back to stdout.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use stompgate_core::RelayMessage;
use stompgate_core::config::load_config;
use stompgate_core::tracing_init::{LogFormat, init_tracing};
use stompgate_relay::{ClientSink, RelayController, stdio};

/// How long to wait for readers to drain after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "stompgate-relay")]
#[command(
    version,
    about = "StompGate relay - bridges local client sessions to a STOMP broker"
)]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, env = "STOMPGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host.
    #[arg(long)]
    broker_host: Option<String>,

    /// Broker port.
    #[arg(long)]
    broker_port: Option<u16>,

    /// Broker connect timeout in seconds.
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Largest inbound frame in bytes before a session is dropped.
    #[arg(long)]
    max_frame_bytes: Option<usize>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("stompgate_relay=info", LogFormat::from_json_flag(args.log_json))?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.broker_host {
        config.broker.host = host;
    }
    if let Some(port) = args.broker_port {
        config.broker.port = port;
    }
    if let Some(secs) = args.connect_timeout {
        config.broker.connect_timeout_secs = secs;
    }
    if let Some(limit) = args.max_frame_bytes {
        config.relay.max_frame_bytes = limit;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = %config.broker.address(),
        "Starting stompgate-relay"
    );

    let (sink, outbound) = ClientSink::channel(config.relay.bus_capacity);
    let controller = RelayController::new(&config, sink);
    let writer = tokio::spawn(write_outbound(outbound));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match stdio::parse_event(&line) {
                        Ok(event) => {
                            if let Err(e) = controller.handle(event).await {
                                warn!(session_id = e.session_id(), error = %e, "Relay command failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "Skipping unparseable bus line"),
                    }
                }
                Ok(None) => {
                    info!("Local bus closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read local bus");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    controller.shutdown().await;
    drop(controller);
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("Timed out draining outbound messages");
    }

    info!("Relay stopped");
    Ok(())
}

/// Write outbound messages to stdout, one JSON object per line.
async fn write_outbound(mut outbound: mpsc::Receiver<RelayMessage>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = outbound.recv().await {
        let line = match stdio::render_message(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(session_id = %message.session_id, error = %e, "Could not render message");
                continue;
            }
        };
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            error!(error = %e, "Failed to write to stdout");
            break;
        }
    }
}
