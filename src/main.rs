//! Port decoy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                      PORT DECOY                      │
//!   peer :22 ──────┼─▶ listener ─┐                                        │
//!   peer :80 ──────┼─▶ listener ─┼─▶ admission ─▶ registry ─▶ handler ────┼──▶ banner / one read
//!   peer :8080 ────┼─▶ listener ─┘     gate                               │
//!                  │                                                      │
//!   SIGINT/TERM ───┼─▶ shutdown: stop accepting → drain → wait            │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use port_decoy::cli::Cli;
use port_decoy::config::{load_config, validate_config, ConfigError, DecoyConfig};
use port_decoy::lifecycle::{wait_for_shutdown_signal, Decoy};
use port_decoy::observability::{init_logging, metrics};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => DecoyConfig::default(),
    };
    cli.apply(&mut config);

    // Held until exit so the file writer flushes.
    let _log_guard = match init_logging(&config.observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("port-decoy v{} starting", env!("CARGO_PKG_VERSION"));

    let validated = match validate_config(&config) {
        Ok(validated) => validated,
        Err(ConfigError::NoValidPorts) => {
            tracing::error!("No valid ports provided. Exiting.");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        ports = ?validated.ports,
        max_connections = validated.max_connections,
        timeout = ?validated.connection_timeout,
        banners = validated.banners.configured_ports(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let decoy = Decoy::new(validated);
    let running = match decoy.start().await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let report = running
        .run_until(async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(event = "shutdown_signal", signal, "Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Failed to install signal handlers, shutting down"),
            }
        })
        .await;

    if !report.drained {
        tracing::warn!("Some connections did not close before exit");
    }
    ExitCode::SUCCESS
}
