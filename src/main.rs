use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use logcast_core::EventBus;
use logcast_server::ServerConfig;
use logcast_telemetry::{LogFormat, TelemetryConfig};
use tracing::Level;

/// Stream this process's log events to live observers over a text event stream.
#[derive(Debug, Parser)]
#[command(name = "logcast", version)]
struct Args {
    /// JSON config file; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// stdout log format: pretty or json.
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Least severe level mirrored from process logs onto the stream.
    #[arg(long, default_value = "info")]
    stream_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Event bus lives for the whole process.
    let bus = Arc::new(EventBus::new());

    logcast_telemetry::init_telemetry(TelemetryConfig {
        format: args.log_format,
        forward_to_bus: Some((Arc::clone(&bus), args.stream_level)),
        ..Default::default()
    });

    let mut config = ServerConfig::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let stream_path = config.stream_path.clone();
    let handle = logcast_server::start(config, Arc::clone(&bus))
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, path = %stream_path, "logcast ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
