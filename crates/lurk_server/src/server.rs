//! TCP accept loop.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::game::GameContext;
use crate::session::run_session;
use crate::transport::TransportConfig;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listens for clients and runs one session task per connection.
#[derive(Debug)]
pub struct GameServer {
    listener: TcpListener,
    context: Arc<GameContext>,
    transport: TransportConfig,
}

impl GameServer {
    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the address cannot be bound.
    #[instrument(skip(config, context), fields(address = %config.bind_address()))]
    pub async fn bind(config: &ServerConfig, context: Arc<GameContext>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        info!(local = ?listener.local_addr().ok(), "Listening");
        Ok(Self {
            listener,
            context,
            transport: TransportConfig::from(config),
        })
    }

    /// Address actually bound; useful when the port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared state every session uses.
    pub fn context(&self) -> &Arc<GameContext> {
        &self.context
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received"),
                Err(e) => {
                    warn!(error = %e, "Cannot listen for Ctrl-C, serving until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Serves until `shutdown` completes, then signals every session to close
    /// and waits for them.
    #[instrument(skip_all)]
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Accepting connections");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!(peer = %addr, active = sessions.len(), "Accepted connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %addr, error = %e, "Could not disable Nagle");
                        }
                        sessions.spawn(run_session(
                            Arc::clone(&self.context),
                            stream,
                            addr.to_string(),
                            self.transport,
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Session task ended abnormally");
                    }
                }
            }
        }

        if stop_tx.send(true).is_err() {
            debug!("No sessions listening for shutdown");
        }
        info!(remaining = sessions.len(), "Waiting for sessions to close");
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Session task ended abnormally");
            }
        }
        info!("Server stopped");
        Ok(())
    }
}
