//! # Runnerd — Process Supervisor Daemon
//!
//! Registers named OS executables, launches and terminates them on
//! request, and fires one-shot scheduled launches at a configured time.
//!
//! Usage:
//!   runnerd                     # Start gateway + interactive console
//!   runnerd --no-repl           # Gateway only (service mode)
//!   runnerd --config path.toml  # Explicit config file

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use runnerd_core::RunnerdConfig;
use runnerd_gateway::AppState;
use runnerd_supervisor::{ProcessRegistry, StateStore};

mod repl;

#[derive(Parser)]
#[command(name = "runnerd", version, about = "Supervisor for named OS executables")]
struct Cli {
    /// Path to the config file (default: ~/.runnerd/config.toml)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Disable the interactive console and run the gateway only
    #[arg(long)]
    no_repl: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RunnerdConfig::load_from(path)?,
        None => RunnerdConfig::load()?,
    };

    let filter = if cli.verbose {
        "runnerd=debug,runnerd_supervisor=debug,tower_http=debug".to_string()
    } else {
        format!("runnerd={0},runnerd_supervisor={0},runnerd_gateway={0}", config.log_level)
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "🚀 runnerd starting");

    // One registry instance for the whole process: every front end gets a
    // handle to this, there is no ambient global.
    let store = StateStore::new(&config.data_dir, &config.schedule_dir);
    let registry = Arc::new(ProcessRegistry::new(store));
    let loaded = registry.load_from_disk()?;
    tracing::info!(loaded, "state restored");

    let state = AppState::new(Arc::clone(&registry), &config.gateway);
    let gateway_config = config.gateway.clone();
    let gateway = tokio::spawn(async move {
        if let Err(e) = runnerd_gateway::serve(state, &gateway_config).await {
            tracing::error!(error = %e, "gateway terminated");
        }
    });

    if cli.no_repl {
        tokio::signal::ctrl_c().await?;
    } else {
        let console = tokio::task::spawn_blocking(move || repl::run(registry));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = console => {}
        }
    }

    tracing::info!("shutting down");
    gateway.abort();
    Ok(())
}
