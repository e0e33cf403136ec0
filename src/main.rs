//! Tremor Monitor - real-time tremor acquisition and analysis service
//!
//! # Usage
//!
//! ```bash
//! # Simulated link with synthetic samples
//! cargo run --release
//!
//! # Peripheral mode against the in-process loopback device
//! cargo run --release -- --mode peripheral --loopback
//!
//! # Peripheral mode against a real Bluetooth LE sensor
//! cargo run --release --features ble -- --mode peripheral
//! ```
//!
//! # Environment Variables
//!
//! - `TREMOR_CONFIG`: Path to a TOML engine config
//! - `TREMOR_SERVER_ADDR`: HTTP bind address (overrides the config file)
//! - `TREMOR_CORS_ORIGINS`: Comma-separated origins allowed by CORS
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tremor_monitor::api::create_app;
use tremor_monitor::config::EngineConfig;
use tremor_monitor::link::{LoopbackTransport, PeripheralTransport};
use tremor_monitor::pipeline::{Engine, TaskName};
use tremor_monitor::types::ConnectionMode;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "tremor-monitor")]
#[command(about = "Real-time tremor signal acquisition and analysis")]
#[command(version)]
struct CliArgs {
    /// Connection mode at startup: simulated, peripheral or cable-stub
    #[arg(short, long)]
    mode: Option<ConnectionMode>,

    /// Path to a TOML engine config (overrides TREMOR_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the server address
    #[arg(short, long, env = "TREMOR_SERVER_ADDR")]
    addr: Option<String>,

    /// Use the in-process loopback device as the peripheral transport
    #[arg(long)]
    loopback: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Configuration
// ============================================================================

fn load_config(args: &CliArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };
    if let Some(mode) = args.mode {
        config.connection.mode = mode;
    }
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

async fn select_transport(config: &EngineConfig, loopback: bool) -> Arc<dyn PeripheralTransport> {
    if loopback {
        info!("🔁 Transport: in-process loopback device");
        return Arc::new(
            LoopbackTransport::new(&config.peripheral).with_streaming(config.acquisition.frame_rate_hz),
        );
    }

    #[cfg(feature = "ble")]
    {
        info!("📡 Transport: Bluetooth LE");
        return Arc::new(tremor_monitor::link::BtleTransport::new().await);
    }

    #[cfg(not(feature = "ble"))]
    {
        info!("📡 Transport: none (build with --features ble for Bluetooth LE)");
        Arc::new(tremor_monitor::link::UnavailableTransport)
    }
}

// ============================================================================
// Task Supervision
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe cancellation and drain.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("🔒 Supervisor: Task {} stopped", task_name);
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = load_config(&args)?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Tremor Monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("  Real-time tremor acquisition and analysis");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");
    info!(
        "   Mode: {} | Frame rate: {:.0} Hz | Window: {:.1}s | Analysis every {}ms",
        config.connection.mode,
        config.acquisition.frame_rate_hz,
        config.acquisition.window_seconds,
        config.analysis.interval_ms,
    );

    let transport = select_transport(&config, args.loopback).await;
    let server_addr = config.server.addr.clone();

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let engine = Engine::new(config, transport);
    let handles = engine.spawn(&mut task_set, cancel_token.clone());

    info!("🌐 Starting HTTP server on {}...", server_addr);
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("✓ HTTP server listening on {}", server_addr);
    info!("🎯 API available at: http://{}/api/v1", server_addr);

    let controller = handles.controller.clone();
    spawn_http_server(&mut task_set, listener, create_app(handles), cancel_token.clone());

    let result = run_supervisor(&mut task_set, cancel_token).await;
    controller.disconnect().await;
    info!("👋 Tremor Monitor stopped");
    result
}
