//! Per-connection session state machine.
//!
//! A [`ConnectionSession`] consumes command batches in order and answers each
//! command with at most one response. [`run_session`] wires a session to a
//! socket through a [`Transport`] and tears both down when the client leaves,
//! the peer goes away, or the server shuts down.

use std::sync::Arc;

use derive_more::{Display, Error, From};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::db::StoreError;
use crate::game::GameContext;
use crate::player::{PlayerRecord, StatKind, StatOutcome};
use crate::protocol::{Command, CommandKind, Response, ResponseKind};
use crate::registry::{ConnectOutcome, PlayerNotFound};
use crate::transport::{CommandBatch, Outbox, Transport, TransportConfig};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientState {
    /// Accepted, no name claimed yet.
    NotConnected,
    /// Bound to a new player that is still being set up.
    NotStarted,
    /// Bound to a player that has started.
    Started,
    /// Left; every further command is ignored.
    Quit,
}

/// Failure that ends a session.
#[derive(Debug, Display, Error, From)]
pub enum SessionError {
    /// The player could not be persisted.
    #[display("Failed to persist player: {_0}")]
    Storage(StoreError),
    /// The bound player vanished from the roster.
    #[display("Registry inconsistency: {_0}")]
    Registry(PlayerNotFound),
    /// The query snapshot could not be encoded.
    #[display("Failed to encode query result: {_0}")]
    Query(serde_json::Error),
}

/// State machine for one client connection.
#[derive(Debug)]
pub struct ConnectionSession {
    identity: String,
    state: ClientState,
    player: Option<Arc<PlayerRecord>>,
    context: Arc<GameContext>,
    outbox: Outbox,
}

impl ConnectionSession {
    /// Creates a session in [`ClientState::NotConnected`].
    ///
    /// `identity` is the key the connection is registered under until it
    /// claims a name; the caller registers it with
    /// [`GameRegistries::register_connection`](crate::GameRegistries::register_connection).
    #[instrument(skip(context, outbox))]
    pub fn new(context: Arc<GameContext>, identity: String, outbox: Outbox) -> Self {
        debug!("Creating connection session");
        Self {
            identity,
            state: ClientState::NotConnected,
            player: None,
            context,
            outbox,
        }
    }

    /// Current registry identity: ephemeral until CONNECT, then the name.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The bound player, if any.
    pub fn player(&self) -> Option<&Arc<PlayerRecord>> {
        self.player.as_ref()
    }

    /// Processes a batch in order. Once the session has quit, the rest of
    /// the batch is ignored.
    ///
    /// # Errors
    ///
    /// Stops at the first command that fails and returns its error; the
    /// caller is expected to tear the session down.
    #[instrument(skip(self, batch), fields(identity = %self.identity, len = batch.len()))]
    pub async fn handle_batch(&mut self, batch: CommandBatch) -> Result<(), SessionError> {
        for command in batch {
            if self.state == ClientState::Quit {
                trace!("Ignoring remainder of batch after quit");
                break;
            }
            self.handle_command(command).await?;
        }
        Ok(())
    }

    /// Applies one command and queues its response, if it has one.
    #[instrument(skip(self, command), fields(identity = %self.identity, state = %self.state, kind = %command.kind()))]
    pub async fn handle_command(&mut self, command: Command) -> Result<(), SessionError> {
        debug!("Handling command");
        let response = match (self.state, command.kind()) {
            (ClientState::Quit, _) => None,
            (_, CommandKind::Leave) => {
                self.leave();
                None
            }
            (ClientState::NotConnected, CommandKind::Connect) => {
                Some(self.connect(command.parameter()))
            }
            (ClientState::NotConnected, _) | (_, CommandKind::Connect) => {
                warn!("Command not allowed in current state");
                Some(ResponseKind::IncorrectState.response())
            }
            (_, CommandKind::Query) => Some(self.query()?),
            (ClientState::NotStarted, _) => self.handle_not_started(&command).await?,
            (ClientState::Started, _) => self.handle_started(&command),
        };

        if let Some(response) = response {
            self.outbox.send(response);
        }
        Ok(())
    }

    fn connect(&mut self, name: Option<&str>) -> Response {
        let Some(name) = name.filter(|name| !name.trim().is_empty()) else {
            warn!("CONNECT without a name");
            return self.context.settings().malformed_response().response();
        };

        let outcome = self.context.registries().connect_client(name, &self.identity);
        let state = match &outcome {
            ConnectOutcome::Rejected => None,
            ConnectOutcome::NewPlayer(_) => Some(ClientState::NotStarted),
            ConnectOutcome::ReprisingPlayer(_) => Some(ClientState::Started),
        };
        if let Some(state) = state {
            self.identity = name.to_string();
            self.player = outcome.player().cloned();
            self.state = state;
            info!(name, state = %self.state, "Client connected");
        }
        outcome.response_kind().response()
    }

    fn leave(&mut self) {
        info!("Client leaving");
        self.release();
    }

    /// Releases the identity and applies the roster policy; the session ends
    /// in [`ClientState::Quit`]. Harmless to call more than once.
    fn release(&mut self) {
        if self.state == ClientState::Quit {
            return;
        }
        self.context.registries().disconnect_client(&self.identity);
        self.player = None;
        self.state = ClientState::Quit;
    }

    fn query(&self) -> Result<Response, SessionError> {
        Ok(self
            .context
            .generate_query_response(&self.identity, self.state)?)
    }

    fn bound_player(&self) -> Result<Arc<PlayerRecord>, SessionError> {
        self.player.clone().ok_or_else(|| {
            SessionError::Registry(PlayerNotFound {
                identity: self.identity.clone(),
            })
        })
    }

    /// Setup commands: description, stats, and START.
    async fn handle_not_started(
        &mut self,
        command: &Command,
    ) -> Result<Option<Response>, SessionError> {
        let stat = match command.kind() {
            CommandKind::SetPlayerDesc => {
                let response = match command.parameter() {
                    Some(text) => {
                        self.bound_player()?.set_description(text.to_string());
                        ResponseKind::Fine
                    }
                    None => {
                        warn!("Description missing");
                        self.context.settings().malformed_response()
                    }
                };
                return Ok(Some(response.response()));
            }
            CommandKind::Start => return self.start().await,
            CommandKind::SetAttackStat => StatKind::Attack,
            CommandKind::SetDefenseStat => StatKind::Defense,
            CommandKind::SetRegenStat => StatKind::Regen,
            _ => {
                warn!("Command not allowed before start");
                return Ok(Some(ResponseKind::IncorrectState.response()));
            }
        };

        let player = self.bound_player()?;
        let outcome = player.set_stat(stat, command.parameter().unwrap_or_default());
        let response = match outcome {
            StatOutcome::Fine => ResponseKind::Fine,
            StatOutcome::StatsTooHigh => ResponseKind::StatsTooHigh,
            StatOutcome::Malformed => {
                warn!(%stat, "Malformed stat value");
                self.context.settings().malformed_response()
            }
        };
        Ok(Some(response.response()))
    }

    async fn start(&mut self) -> Result<Option<Response>, SessionError> {
        let player = self.bound_player()?;
        if !player.is_ready() {
            debug!("Player not ready");
            return Ok(Some(ResponseKind::NotReady.response()));
        }

        let store = Arc::clone(self.context.store());
        tokio::task::spawn_blocking(move || player.save_data(store.as_ref()))
            .await
            .map_err(StoreError::from)??;

        self.state = ClientState::Started;
        info!("Player started");
        Ok(None)
    }

    /// Commands from a started player. Gameplay is not interpreted yet, so
    /// every command is accepted silently.
    fn handle_started(&mut self, command: &Command) -> Option<Response> {
        debug!(kind = %command.kind(), gameplay = command.kind().is_gameplay(), "Ignoring command from started player");
        None
    }

    /// Cleans up after a connection that ended without LEAVE.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub fn close(&mut self) {
        if self.state != ClientState::Quit {
            info!(state = %self.state, "Closing session without LEAVE");
            self.release();
        }
    }
}

/// Drives one connection from accept to teardown.
///
/// Registers the connection under a fresh identity, feeds every batch from
/// the transport to a [`ConnectionSession`], and stops when the client
/// leaves, the transport closes, a command fails, or `shutdown` fires.
/// Whatever ended it, the registry binding is released and the transport is
/// stopped and awaited before returning.
#[instrument(skip(context, io, config, shutdown))]
pub async fn run_session<S>(
    context: Arc<GameContext>,
    io: S,
    peer: String,
    config: TransportConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let identity = Uuid::new_v4().to_string();
    context.registries().register_connection(&identity, &peer);

    let (transport, mut batches) = Transport::spawn(io, peer, config);
    let mut session = ConnectionSession::new(context, identity, transport.outbox());
    info!(identity = %session.identity(), "Session opened");

    loop {
        tokio::select! {
            batch = batches.recv() => {
                let Some(batch) = batch else {
                    debug!("Transport closed");
                    break;
                };
                if let Err(e) = session.handle_batch(batch).await {
                    error!(identity = %session.identity(), error = %e, "Session failed");
                    break;
                }
                if session.state() == ClientState::Quit {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Server shutting down, closing session");
                    break;
                }
            }
        }
    }

    session.close();
    // Unblocks a reader waiting on a full queue.
    drop(batches);
    transport.shutdown().await;
    info!(identity = %session.identity(), "Session closed");
}
