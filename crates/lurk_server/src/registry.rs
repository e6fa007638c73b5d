//! Shared directories of live connections and known players.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::db::StoreError;
use crate::player::{PlayerRecord, PlayerSnapshot};
use crate::protocol::ResponseKind;

/// A live connection in the client directory.
#[derive(Debug, Clone, Getters)]
pub struct ClientEntry {
    peer: String,
    connected_at: DateTime<Utc>,
}

impl ClientEntry {
    fn new(peer: String) -> Self {
        Self {
            peer,
            connected_at: Utc::now(),
        }
    }
}

/// Result of an attempt to bind a connection to a player name.
///
/// A successful bind carries the player it was bound to, taken under the
/// same lock as the bind itself.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// The name was unknown; a fresh player was created.
    NewPlayer(Arc<PlayerRecord>),
    /// The name belongs to a known player nobody is connected as.
    ReprisingPlayer(Arc<PlayerRecord>),
    /// Another live connection already holds the name.
    Rejected,
}

impl ConnectOutcome {
    /// Response the client receives for this outcome.
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            Self::NewPlayer(_) => ResponseKind::NewPlayer,
            Self::ReprisingPlayer(_) => ResponseKind::ReprisingPlayer,
            Self::Rejected => ResponseKind::NameInUse,
        }
    }

    /// The bound player, unless the bind was rejected.
    pub fn player(&self) -> Option<&Arc<PlayerRecord>> {
        match self {
            Self::NewPlayer(player) | Self::ReprisingPlayer(player) => Some(player),
            Self::Rejected => None,
        }
    }
}

/// No player is registered under the identity.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("No player bound to identity '{}'", identity)]
pub struct PlayerNotFound {
    /// The identity that was looked up.
    pub identity: String,
}

/// One roster line in a query snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct RosterEntry {
    #[serde(flatten)]
    player: PlayerSnapshot,
    online: bool,
}

#[derive(Debug, Default)]
struct Directory {
    clients: HashMap<String, ClientEntry>,
    players: HashMap<String, Arc<PlayerRecord>>,
}

impl Directory {
    fn unbind(&mut self, identity: &str) -> bool {
        self.clients.remove(identity).is_some()
    }

    fn forget(&mut self, identity: &str) -> Option<Arc<PlayerRecord>> {
        self.players.remove(identity)
    }
}

/// Connection and player directories shared by every session.
///
/// Both maps sit behind one mutex, so every compound operation (bind if
/// absent, rebind, unbind and forget) is atomic with respect to all others.
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct GameRegistries {
    max_stat_points: u32,
    directory: Mutex<Directory>,
}

impl GameRegistries {
    /// Creates empty registries whose new players get `max_stat_points`.
    #[instrument]
    pub fn new(max_stat_points: u32) -> Self {
        info!("Creating game registries");
        Self {
            max_stat_points,
            directory: Mutex::new(Directory::default()),
        }
    }

    /// Creates registries whose roster already holds `players`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any player exceeds `max_stat_points`.
    #[instrument(skip(players))]
    pub fn with_roster(
        players: impl IntoIterator<Item = PlayerSnapshot>,
        max_stat_points: u32,
    ) -> Result<Self, StoreError> {
        let registries = Self::new(max_stat_points);
        {
            let mut directory = registries.lock();
            for snapshot in players {
                let record = PlayerRecord::restored(snapshot, max_stat_points)?;
                directory
                    .players
                    .insert(record.name().to_string(), Arc::new(record));
            }
            info!(count = directory.players.len(), "Roster restored");
        }
        Ok(registries)
    }

    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a freshly accepted connection under its ephemeral identity.
    #[instrument(skip(self))]
    pub fn register_connection(&self, identity: &str, peer: &str) {
        debug!("Registering connection");
        self.lock()
            .clients
            .insert(identity.to_string(), ClientEntry::new(peer.to_string()));
    }

    /// Binds the connection known as `current_identity` to `name`.
    ///
    /// Concurrent attempts to claim the same name serialize on the registry
    /// lock; exactly one of them can win. A rejected attempt changes nothing.
    #[instrument(skip(self))]
    pub fn connect_client(&self, name: &str, current_identity: &str) -> ConnectOutcome {
        let mut directory = self.lock();

        if directory.clients.contains_key(name) {
            warn!("Name already bound to a live connection");
            return ConnectOutcome::Rejected;
        }

        let entry = directory.clients.remove(current_identity).unwrap_or_else(|| {
            warn!("Binding a connection that was never registered");
            ClientEntry::new("unknown".to_string())
        });
        directory.clients.insert(name.to_string(), entry);

        if let Some(player) = directory.players.get(name) {
            info!("Reprising known player");
            ConnectOutcome::ReprisingPlayer(Arc::clone(player))
        } else {
            let player = Arc::new(PlayerRecord::new(name.to_string(), self.max_stat_points));
            directory
                .players
                .insert(name.to_string(), Arc::clone(&player));
            info!("Created new player");
            ConnectOutcome::NewPlayer(player)
        }
    }

    /// Removes the connection binding for `identity`.
    ///
    /// Returns whether a binding was removed; calling it twice is harmless.
    #[instrument(skip(self))]
    pub fn stage_client_disconnect(&self, identity: &str) -> bool {
        let removed = self.lock().unbind(identity);
        debug!(removed, "Staged client disconnect");
        removed
    }

    /// Removes the player from the roster entirely.
    #[instrument(skip(self))]
    pub fn remove_player(&self, identity: &str) -> Option<Arc<PlayerRecord>> {
        let removed = self.lock().forget(identity);
        debug!(removed = removed.is_some(), "Removed player");
        removed
    }

    /// Unbinds `identity` and, if its player never started, forgets the
    /// player too, all under one lock.
    ///
    /// A player who never started cannot be reprised, so keeping it would
    /// only reserve the name. Returns whether the player was forgotten.
    #[instrument(skip(self))]
    pub fn disconnect_client(&self, identity: &str) -> bool {
        let mut directory = self.lock();
        directory.unbind(identity);

        let unstarted = directory
            .players
            .get(identity)
            .is_some_and(|player| !player.is_started());
        if unstarted {
            directory.forget(identity);
        }

        info!(forgotten = unstarted, "Client disconnected");
        unstarted
    }

    /// Looks up the player registered under `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerNotFound`] if no such player is in the roster.
    #[instrument(skip(self))]
    pub fn get_player(&self, identity: &str) -> Result<Arc<PlayerRecord>, PlayerNotFound> {
        self.lock()
            .players
            .get(identity)
            .cloned()
            .ok_or_else(|| PlayerNotFound {
                identity: identity.to_string(),
            })
    }

    /// Whether a live connection is bound to `identity`.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.lock().clients.contains_key(identity)
    }

    /// Number of live connections, bound or not.
    pub fn connection_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// Number of players in the roster.
    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    /// Lists every player with a consistent copy of its fields, sorted by
    /// name.
    #[instrument(skip(self))]
    pub fn query_snapshot(&self) -> Vec<RosterEntry> {
        let directory = self.lock();
        let mut roster: Vec<RosterEntry> = directory
            .players
            .iter()
            .map(|(identity, player)| RosterEntry {
                player: player.snapshot(),
                online: directory.clients.contains_key(identity),
            })
            .collect();
        roster.sort_by(|a, b| a.player.name().cmp(b.player.name()));
        debug!(count = roster.len(), "Roster snapshot taken");
        roster
    }
}
