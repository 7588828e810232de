//! dynag-dns binary entry point.

use clap::Parser;
use dynag_dns::{telemetry, Config, DnsServer};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Authoritative DNS server serving records gated by health checks.
#[derive(Parser, Debug)]
#[command(name = "dynag-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON or YAML).
    #[arg(short, long, default_value = "dynag-dns.toml")]
    config: PathBuf,
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.server.listen_addr(),
        records = config.records.len(),
        "Starting dynag-dns"
    );

    let server = DnsServer::new(config)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let result = server.run(shutdown).await;

    telemetry::shutdown();

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("dynag-dns shutdown complete");
    Ok(())
}
