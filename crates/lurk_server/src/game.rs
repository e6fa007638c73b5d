//! Shared game context handed to every session.

use std::sync::Arc;

use derive_getters::Getters;
use derive_new::new;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::ServerConfig;
use crate::db::{PlayerStore, StoreError};
use crate::player::MAX_STAT_POINTS;
use crate::protocol::{Response, ResponseKind};
use crate::registry::{GameRegistries, RosterEntry};
use crate::session::ClientState;

/// Per-server rules every session applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, new)]
pub struct SessionSettings {
    /// Budget shared by attack, defense and regen.
    max_stat_points: u32,
    /// Report unparseable values as MALFORMED_VALUE.
    report_malformed_values: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new(MAX_STAT_POINTS, false)
    }
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self::new(*config.max_stat_points(), *config.report_malformed_values())
    }
}

impl SessionSettings {
    /// Response for a parameter that could not be parsed.
    pub fn malformed_response(&self) -> ResponseKind {
        if self.report_malformed_values {
            ResponseKind::MalformedValue
        } else {
            ResponseKind::IncorrectState
        }
    }
}

/// Payload of a QUERY_RESULT response.
#[derive(Debug, Clone, Serialize, Getters)]
pub struct QuerySnapshot {
    requester: String,
    state: ClientState,
    online: usize,
    players: Vec<RosterEntry>,
}

/// Everything sessions share: registries, storage, and rules.
#[derive(Debug, Getters)]
pub struct GameContext {
    registries: GameRegistries,
    store: Arc<dyn PlayerStore>,
    settings: SessionSettings,
}

impl GameContext {
    /// Creates a context with an empty roster.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn PlayerStore>, settings: SessionSettings) -> Self {
        info!("Creating game context");
        Self {
            registries: GameRegistries::new(settings.max_stat_points),
            store,
            settings,
        }
    }

    /// Creates a context whose roster holds every player in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stored players cannot be read, or if one
    /// of them exceeds the configured stat budget.
    #[instrument(skip(store))]
    pub fn restore(store: Arc<dyn PlayerStore>, settings: SessionSettings) -> Result<Self, StoreError> {
        let players = store.load_players()?;
        info!(count = players.len(), "Restoring roster from store");
        Ok(Self {
            registries: GameRegistries::with_roster(players, settings.max_stat_points)?,
            store,
            settings,
        })
    }

    /// Builds the read-only snapshot a QUERY returns.
    #[instrument(skip(self))]
    pub fn query_snapshot(&self, requester: &str, state: ClientState) -> QuerySnapshot {
        let players = self.registries.query_snapshot();
        let online = players.iter().filter(|entry| *entry.online()).count();
        debug!(players = players.len(), online, "Query snapshot assembled");
        QuerySnapshot {
            requester: requester.to_string(),
            state,
            online,
            players,
        }
    }

    /// Builds the QUERY_RESULT response for `requester`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the snapshot cannot be encoded.
    #[instrument(skip(self))]
    pub fn generate_query_response(
        &self,
        requester: &str,
        state: ClientState,
    ) -> Result<Response, serde_json::Error> {
        let snapshot = self.query_snapshot(requester, state);
        let payload = serde_json::to_string(&snapshot)?;
        Ok(Response::with_payload(ResponseKind::QueryResult, payload))
    }
}
