//! Command-line interface for lurk_server.

use std::path::PathBuf;

use clap::Parser;
use lurk_server::ServerConfig;

/// Lurk Server - multiplayer text-protocol game server
#[derive(Parser, Debug)]
#[command(name = "lurk_server")]
#[command(about = "Multiplayer text-protocol game server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the database file (created if it doesn't exist)
    #[arg(long)]
    pub database: Option<String>,

    /// Keep players in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Stat points each player can divide among attack, defense and regen
    #[arg(long)]
    pub max_stat_points: Option<u32>,

    /// Answer unparseable values with MALFORMED_VALUE instead of INCORRECT_STATE
    #[arg(long)]
    pub report_malformed_values: bool,
}

impl Cli {
    /// Layers the flags that were given over `config`.
    pub fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(database) = &self.database {
            config = config.with_database(database.clone());
        }
        if let Some(max) = self.max_stat_points {
            config = config.with_max_stat_points(max);
        }
        if self.ephemeral {
            config = config.with_ephemeral(true);
        }
        if self.report_malformed_values {
            config = config.with_report_malformed_values(true);
        }
        config
    }
}
