//! Player storage backends.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument, warn};

use crate::db::{PlayerRow, StoreError, schema};
use crate::player::PlayerSnapshot;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Durable storage for players that have finished setup.
///
/// Saving is invoked once per successful START; loading happens at boot so a
/// restarted server can still reprise known players.
pub trait PlayerStore: Send + Sync + std::fmt::Debug {
    /// Saves (or overwrites) a player.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the player could not be made durable.
    fn save_player(&self, player: &PlayerSnapshot) -> Result<(), StoreError>;

    /// Loads every stored player.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn load_players(&self) -> Result<Vec<PlayerSnapshot>, StoreError>;
}

/// SQLite-backed player store.
///
/// Holds one connection for the life of the store; saves from concurrent
/// sessions take turns on it instead of contending for the database lock.
pub struct SqlitePlayerStore {
    db_path: String,
    conn: Mutex<SqliteConnection>,
}

impl std::fmt::Debug for SqlitePlayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePlayerStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqlitePlayerStore {
    /// Opens the database at `db_path`, creating it and applying pending
    /// migrations as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, StoreError> {
        info!(path = %db_path, "Opening player store");
        let mut conn = SqliteConnection::establish(&db_path)
            .map_err(|e| StoreError::new(format!("Failed to connect to '{}': {}", db_path, e)))?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::new(format!("Migrations failed: {}", e)))?;
        debug!(applied = applied.len(), "Migrations applied");

        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    /// Path the store was opened with.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn connection(&self) -> MutexGuard<'_, SqliteConnection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlayerStore for SqlitePlayerStore {
    #[instrument(skip(self, player), fields(name = %player.name()))]
    fn save_player(&self, player: &PlayerSnapshot) -> Result<(), StoreError> {
        debug!("Saving player");
        let row = PlayerRow::from_snapshot(player)?;
        let mut conn = self.connection();

        diesel::replace_into(schema::players::table)
            .values(&row)
            .execute(&mut *conn)?;

        info!(name = %row.name(), "Player saved");
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_players(&self) -> Result<Vec<PlayerSnapshot>, StoreError> {
        debug!("Loading players");
        let mut conn = self.connection();

        let rows = schema::players::table
            .order(schema::players::name.asc())
            .select(PlayerRow::as_select())
            .load::<PlayerRow>(&mut *conn)?;

        let players = rows
            .into_iter()
            .map(PlayerRow::into_snapshot)
            .collect::<Result<Vec<_>, _>>()?;

        info!(count = players.len(), "Players loaded");
        Ok(players)
    }
}

/// In-memory player store for ephemeral servers and tests.
#[derive(Debug, Default)]
pub struct MemoryPlayerStore {
    players: Mutex<BTreeMap<String, PlayerSnapshot>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryPlayerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent save fail (or succeed again).
    #[instrument(skip(self))]
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Returns the stored copy of a player.
    pub fn saved(&self, name: &str) -> Option<PlayerSnapshot> {
        self.players().get(name).cloned()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn players(&self) -> MutexGuard<'_, BTreeMap<String, PlayerSnapshot>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlayerStore for MemoryPlayerStore {
    #[instrument(skip(self, player), fields(name = %player.name()))]
    fn save_player(&self, player: &PlayerSnapshot) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            warn!("Refusing save");
            return Err(StoreError::new(format!(
                "Memory store refused to save '{}'",
                player.name()
            )));
        }
        self.players().insert(player.name().clone(), player.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        debug!("Player saved in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_players(&self) -> Result<Vec<PlayerSnapshot>, StoreError> {
        Ok(self.players().values().cloned().collect())
    }
}
