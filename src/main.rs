//! User Service
//!
//! Serves one in-memory user collection over REST and binary RPC.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 USER SERVICE                 │
//!                    │                                              │
//!   REST client ─────┼─▶ http listener ──▶ handlers ──┐             │
//!                    │                                ▼             │
//!                    │                         ┌─────────────┐      │
//!                    │                         │  UserStore  │      │
//!                    │                         │  (RwLock)   │      │
//!                    │                         └─────────────┘      │
//!                    │                                ▲             │
//!   RPC client  ─────┼─▶ rpc listener ───▶ dispatch ──┘             │
//!                    │                                              │
//!                    │  lifecycle: bind all → run → SIGINT/SIGTERM  │
//!                    │             → concurrent drain (deadline)    │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use user_service::config;
use user_service::lifecycle::{self, DrainOutcome, StartupError};
use user_service::observability::{logging, metrics};
use user_service::store::InMemoryUserStore;

#[derive(Parser)]
#[command(name = "user-service")]
#[command(about = "User store served over REST and binary RPC", long_about = None)]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the REST bind address.
    #[arg(long)]
    http_addr: Option<String>,

    /// Override the RPC bind address.
    #[arg(long)]
    rpc_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    run(args).await?;
    Ok(())
}

async fn run(args: Args) -> Result<(), StartupError> {
    let mut config = config::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.http.bind_address = addr;
    }
    if let Some(addr) = args.rpc_addr {
        config.rpc.bind_address = addr;
    }
    config::validation::validate_config(&config).map_err(config::ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("user-service v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(InMemoryUserStore::new());
    let service = lifecycle::bind_service(&config, store).await?;
    let report = service.run().await;

    for listener in &report.listeners {
        match &listener.outcome {
            DrainOutcome::Clean => {}
            DrainOutcome::Forced => {
                tracing::warn!(listener = listener.name, "Listener was stopped forcibly")
            }
            DrainOutcome::Failed(error) => {
                tracing::error!(listener = listener.name, error = %error, "Listener failed")
            }
        }
    }
    tracing::info!(clean = report.is_clean(), "Shutdown complete");
    Ok(())
}
