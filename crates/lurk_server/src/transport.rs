//! Per-connection transport: framing, socket I/O, and orderly shutdown.
//!
//! A [`Transport`] owns one spawned task that reads the socket, frames and
//! decodes lines, and hands each read's commands to the session as one
//! [`CommandBatch`]. The same task writes every [`Response`] queued on the
//! [`Outbox`]. The session never touches the socket.

use derive_getters::Getters;
use derive_new::new;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{DEFAULT_BATCH_QUEUE_DEPTH, ServerConfig};
use crate::protocol::{
    Command, DEFAULT_MAX_LINE_LENGTH, LineFramer, Response, decode_line,
};

/// Commands decoded from one read, in arrival order.
pub type CommandBatch = Vec<Command>;

const READ_CHUNK: usize = 4096;

/// Transport limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, new)]
pub struct TransportConfig {
    /// Longest inbound line accepted, in bytes.
    max_line_length: usize,
    /// Batches buffered before the reader waits for the session.
    batch_queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH, DEFAULT_BATCH_QUEUE_DEPTH)
    }
}

impl From<&ServerConfig> for TransportConfig {
    fn from(config: &ServerConfig) -> Self {
        Self::new(*config.max_line_length(), *config.batch_queue_depth())
    }
}

/// Outbound handle: queues responses for the transport to write.
///
/// Sending never blocks and never fails from the caller's point of view; a
/// response queued after the connection is gone is dropped.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Response>,
}

impl Outbox {
    /// Creates an outbox and the receiver the writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Response>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a response.
    pub fn send(&self, response: Response) {
        trace!(kind = %response.kind(), "Queueing response");
        if self.tx.send(response).is_err() {
            debug!("Response dropped, transport already closed");
        }
    }
}

/// Handle to a running transport task.
#[derive(Debug)]
pub struct Transport {
    peer: String,
    outbox: Outbox,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Transport {
    /// Spawns the transport task for `io`.
    ///
    /// Returns the handle and the receiver of decoded batches. The receiver
    /// yields `None` once the peer closes the connection, the connection
    /// fails, or the transport is shut down.
    #[instrument(skip(io))]
    pub fn spawn<S>(io: S, peer: String, config: TransportConfig) -> (Self, mpsc::Receiver<CommandBatch>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (batch_tx, batch_rx) = mpsc::channel(config.batch_queue_depth);
        let (outbox, outbound) = Outbox::channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let framer = LineFramer::new(config.max_line_length);
        let task_peer = peer.clone();
        let task = tokio::spawn(async move {
            run_transport(io, framer, batch_tx, outbound, stop_rx, task_peer).await;
        });

        debug!("Transport spawned");
        (
            Self {
                peer,
                outbox,
                stop: Some(stop_tx),
                task,
            },
            batch_rx,
        )
    }

    /// Remote address this transport serves.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// A handle for queueing responses.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Stops the transport and waits for its task to finish.
    ///
    /// Responses already queued are written before the socket is closed. A
    /// task that panicked or was cancelled is logged, not propagated.
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            // The task may already have exited on its own.
            let _ = stop.send(());
        }
        match self.task.await {
            Ok(()) => debug!("Transport stopped"),
            Err(e) => warn!(error = %e, "Transport task ended abnormally"),
        }
    }
}

/// Reads, frames and decodes until the peer goes away; writes responses until
/// told to stop.
async fn run_transport<S>(
    io: S,
    mut framer: LineFramer,
    batch_tx: mpsc::Sender<CommandBatch>,
    mut outbound: mpsc::UnboundedReceiver<Response>,
    mut stop: oneshot::Receiver<()>,
    peer: String,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut buf = vec![0u8; READ_CHUNK];
    // Dropping the sender is how the session learns the peer is gone.
    let mut batch_tx = Some(batch_tx);

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(peer = %peer, "Stop requested");
                break;
            }
            read = reader.read(&mut buf), if batch_tx.is_some() => {
                match read {
                    Ok(0) => {
                        info!(peer = %peer, "Peer closed connection");
                        batch_tx = None;
                    }
                    Ok(n) => {
                        let keep_reading = match framer.push(&buf[..n]) {
                            Ok(lines) => {
                                let batch = decode_batch(&lines, &peer);
                                match (&batch_tx, batch.is_empty()) {
                                    (Some(tx), false) => tx.send(batch).await.is_ok(),
                                    _ => true,
                                }
                            }
                            Err(e) => {
                                warn!(peer = %peer, error = %e, "Closing connection");
                                false
                            }
                        };
                        if !keep_reading {
                            batch_tx = None;
                        }
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Read failed");
                        batch_tx = None;
                    }
                }
            }
            response = outbound.recv() => {
                let Some(response) = response else { break };
                if let Err(e) = write_response(&mut writer, &response).await {
                    warn!(peer = %peer, error = %e, "Write failed");
                    break;
                }
            }
        }
    }

    // Flush whatever the session queued before asking us to stop.
    while let Ok(response) = outbound.try_recv() {
        if let Err(e) = write_response(&mut writer, &response).await {
            warn!(peer = %peer, error = %e, "Write failed while draining");
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(peer = %peer, error = %e, "Socket shutdown failed");
    }
}

fn decode_batch(lines: &[String], peer: &str) -> CommandBatch {
    lines
        .iter()
        .filter_map(|line| match decode_line(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping undecodable line");
                None
            }
        })
        .collect()
}

async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = response.encode();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
