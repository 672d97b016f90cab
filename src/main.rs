use anyhow::{Context, Result};
use clap::Parser;
use configuration::{load_config, ConfigArgs};
use database::{control_plane_source, PoolRegistry};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Control plane and tenant pool manager for the de-identification gateway.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

/// The entry point for the privacy gateway.
#[tokio::main]
async fn main() -> Result<()> {
    // A .env file is optional; DATABASE_URL may also come from the shell.
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")?;

    let cli = Cli::parse();
    let path = &cli.config.config;
    let settings =
        load_config(path).with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let source = control_plane_source(&settings.control_plane)?;

    // Every request handler shares this registry.
    let registry = Arc::new(PoolRegistry::new(settings.pools.clone()));
    registry
        .initialize(&source, settings.control_plane.tracing)
        .await
        .context("Failed to initialize connection pools")?;
    info!(tenants = ?registry.tenant_ids(), "Gateway pools are ready. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down.");
    Ok(())
}
