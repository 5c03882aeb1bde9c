//! Management server process entry.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │               MANAGEMENT SERVER               │
//!                         │                                              │
//!   plain client   ──────▶│  plain listener :4080 ─┐                     │
//!                         │                        ├─▶ RouteTable        │
//!   agent (mTLS)   ──────▶│  secured listener :8443┘    │                │
//!                         │        ▲                    ├─ /api/*   api  │
//!                         │        │ keystore           ├─ /agent/* agent│
//!                         │  ┌─────┴──────┐             ├─ /cert/*  cert │
//!                         │  │ CA manager │◀── enroll ──┘  /*  static    │
//!                         │  └────────────┘                              │
//!                         └──────────────────────────────────────────────┘
//! ```
//!
//! Fatal startup errors are logged and the process exits with a failure
//! code; a termination signal stops the server and the process returns.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use mgmt_server::config::{load_config, ServerConfig};
use mgmt_server::lifecycle::signals::spawn_stop_on_signal;
use mgmt_server::observability::{logging, metrics};
use mgmt_server::ManagementServer;

#[derive(Parser)]
#[command(name = "mgmt-server")]
#[command(about = "Management server with self-bootstrapped mutual TLS", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the plain listener port
    #[arg(long)]
    plain_port: Option<u16>,

    /// Override the secured listener port
    #[arg(long)]
    secure_port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.plain_port {
        config.listener.plain_port = port;
    }
    if let Some(port) = cli.secure_port {
        config.listener.secure_port = port;
    }

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mgmt-server starting");
    tracing::info!(
        plain_port = config.listener.plain_port,
        secure_port = config.listener.secure_port,
        keystore = %config.keystore.keystore_path().display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Validated before anything touches the keystore.
    let server = match ManagementServer::builder(config).build() {
        Ok(server) => Arc::new(server),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // Eager warm-up; the coordinator ensures the root again during start.
    if let Err(e) = server.authority().ensure_root_certificate() {
        tracing::error!(error = %e, "Root certificate initialization failed");
        return ExitCode::FAILURE;
    }

    spawn_stop_on_signal(Arc::clone(&server));

    match server.start().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}
