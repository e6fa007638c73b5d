//! Lurk server library - a line-protocol multiplayer game server
//!
//! Every TCP connection gets its own session state machine. Sessions share
//! one set of registries that map identities to live connections and to
//! player records, so a name can be claimed by at most one connection.
//!
//! # Architecture
//!
//! - **Protocol**: command/response vocabularies and line framing
//! - **Transport**: per-connection socket task feeding command batches
//! - **Session**: the NOT_CONNECTED → NOT_STARTED → STARTED → QUIT machine
//! - **Registries**: atomic connect, disconnect and roster snapshots
//! - **Store**: SQLite (diesel) or in-memory persistence of started players
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lurk_server::{GameContext, GameServer, MemoryPlayerStore, ServerConfig, SessionSettings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default().with_port(0u16);
//! let context = GameContext::new(Arc::new(MemoryPlayerStore::new()), SessionSettings::from(&config));
//! let server = GameServer::bind(&config, Arc::new(context)).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod db;
mod game;
mod player;
mod protocol;
mod registry;
mod server;
mod session;
mod transport;

// Crate-level exports - Configuration
pub use config::{ConfigError, DEFAULT_BATCH_QUEUE_DEPTH, DEFAULT_PORT, ServerConfig};

// Crate-level exports - Persistence
pub use db::{MemoryPlayerStore, PlayerRow, PlayerStore, SqlitePlayerStore, StoreError};

// Crate-level exports - Shared game state
pub use game::{GameContext, QuerySnapshot, SessionSettings};
pub use registry::{ClientEntry, ConnectOutcome, GameRegistries, PlayerNotFound, RosterEntry};

// Crate-level exports - Players
pub use player::{MAX_STAT_POINTS, PlayerRecord, PlayerSnapshot, StatKind, StatOutcome};

// Crate-level exports - Wire protocol
pub use protocol::{
    Command, CommandKind, DEFAULT_MAX_LINE_LENGTH, LineFramer, LineTooLong, Response,
    ResponseKind, UnknownCommand, UnknownResponse, decode_line,
};

// Crate-level exports - Connections
pub use server::GameServer;
pub use session::{ClientState, ConnectionSession, SessionError, run_session};
pub use transport::{CommandBatch, Outbox, Transport, TransportConfig};
