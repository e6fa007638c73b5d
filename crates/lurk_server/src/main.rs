//! Lurk Server - CLI entry point
//!
//! Loads configuration, restores the roster, and serves until Ctrl-C.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use lurk_server::{
    GameContext, GameServer, MemoryPlayerStore, PlayerStore, ServerConfig, SessionSettings,
    SqlitePlayerStore,
};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(address = %config.bind_address(), ephemeral = config.ephemeral(), "Starting lurk server");

    let store = open_store(&config)?;
    let context = GameContext::restore(store, SessionSettings::from(&config))?;

    let server = GameServer::bind(&config, Arc::new(context)).await?;
    info!(local = %server.local_addr()?, "Server ready");
    server.run().await?;

    Ok(())
}

/// Reads the config file, if any, and applies CLI overrides.
#[instrument(skip(cli))]
fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    let config = cli.apply(config);
    config.validate()?;
    Ok(config)
}

/// Opens the store the config asks for.
#[instrument(skip(config))]
fn open_store(config: &ServerConfig) -> Result<Arc<dyn PlayerStore>> {
    if *config.ephemeral() {
        info!("Using in-memory player store");
        return Ok(Arc::new(MemoryPlayerStore::new()));
    }
    info!(database = %config.database(), "Opening SQLite player store");
    let store = SqlitePlayerStore::open(config.database().clone())?;
    Ok(Arc::new(store))
}
