//! # Aisle Sync Daemon
//!
//! Standalone runner for the sync channel. Connects to the configured
//! endpoint, keeps the channel alive through reconnects, and logs status
//! once a cycle. Useful for exercising a sync backend without the app in
//! front of it.
//!
//! ## Usage
//! ```bash
//! # Connect using the default config (sync.toml in the platform config dir)
//! cargo run -p aisle-sync --bin syncd
//!
//! # Explicit config file
//! cargo run -p aisle-sync --bin syncd -- --config ./sync.toml
//!
//! # Point at a local dev server
//! AISLE_WS_URL=ws://localhost:8080/ws cargo run -p aisle-sync --bin syncd
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aisle_sync::{SyncClient, SyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut status_secs: u64 = 30;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--status-secs" | "-s" => {
                if i + 1 < args.len() {
                    status_secs = args[i + 1].parse().unwrap_or(30);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Aisle Sync Daemon");
                println!();
                println!("Usage: syncd [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>    Config file path (default: platform config dir)");
                println!("  -s, --status-secs <N>  Seconds between status log lines (default: 30)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    // Load configuration
    let config = SyncConfig::load(config_path)?;
    let endpoint = config.ws_endpoint()?;
    info!(
        endpoint = %endpoint,
        heartbeat_secs = config.channel.heartbeat_secs,
        max_attempts = config.channel.max_attempts,
        "Configuration loaded"
    );

    // Start the client and dial
    let client = SyncClient::start(config)?;
    client.connect().await;

    // Run until a shutdown signal arrives
    tokio::select! {
        _ = log_status(&client, Duration::from_secs(status_secs.max(1))) => {}
        _ = shutdown_signal() => {}
    }

    client.shutdown().await;
    info!("Sync daemon shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=aisle_sync=trace` - Show trace for the sync crate only
/// - Default: INFO level, DEBUG for the aisle crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,aisle_sync=debug,aisle_core=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Logs channel status on a fixed cadence. Never returns.
async fn log_status(client: &SyncClient, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // first tick is immediate, skip it

    loop {
        interval.tick().await;
        let status = client.status().await;
        info!(
            state = %status.state,
            connected = status.connected,
            pending = status.pending_ops,
            retries = status.retry_count,
            "Sync status"
        );
        if let Some(ref err) = status.last_error {
            warn!(error = %err, "Last channel error");
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
