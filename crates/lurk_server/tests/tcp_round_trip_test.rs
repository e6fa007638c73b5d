//! End-to-end test over a real TCP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use lurk_server::{
    GameContext, GameServer, MemoryPlayerStore, Response, ResponseKind, ServerConfig,
    SessionSettings,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// A line-oriented test client.
struct Client {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Connect failed");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("Write failed");
    }

    async fn recv(&mut self) -> Option<Response> {
        let line = tokio::time::timeout(TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for response")
            .expect("Read failed")?;
        Some(Response::decode(&line).expect("Unknown response"))
    }

    async fn expect(&mut self, line: &str, kind: ResponseKind) -> Response {
        self.send(line).await;
        let response = self.recv().await.expect("Connection closed");
        assert_eq!(response.kind(), kind, "response to {line}");
        response
    }
}

async fn start_server() -> (SocketAddr, oneshot::Sender<()>, JoinHandle<std::io::Result<()>>) {
    let config = ServerConfig::default().with_port(0u16).with_max_stat_points(30u32);
    let context = GameContext::new(
        Arc::new(MemoryPlayerStore::new()),
        SessionSettings::from(&config),
    );
    let server = GameServer::bind(&config, Arc::new(context))
        .await
        .expect("Bind failed");
    let addr = server.local_addr().expect("No local address");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx, handle)
}

#[tokio::test]
async fn test_full_round_trip() {
    let (addr, stop_tx, server) = start_server().await;

    let mut alice = Client::connect(addr).await;
    alice.expect("QUERY", ResponseKind::IncorrectState).await;
    alice.expect("CONNECT Alice", ResponseKind::NewPlayer).await;
    alice
        .expect("SET_PLAYER_DESC Wears a green hat", ResponseKind::Fine)
        .await;
    alice.expect("SET_ATTACK_STAT 20", ResponseKind::Fine).await;
    alice
        .expect("SET_DEFENSE_STAT 15", ResponseKind::StatsTooHigh)
        .await;
    alice.expect("SET_DEFENSE_STAT 10", ResponseKind::Fine).await;
    alice.expect("SET_REGEN_STAT abc", ResponseKind::IncorrectState).await;

    // START succeeds silently; QUERY shows the new state.
    alice.send("START").await;
    let query = alice.expect("QUERY", ResponseKind::QueryResult).await;
    let payload: serde_json::Value =
        serde_json::from_str(query.payload().expect("Payload present")).expect("Valid JSON");
    assert_eq!(payload["state"], "STARTED");
    assert_eq!(payload["players"][0]["name"], "Alice");
    assert_eq!(payload["players"][0]["started"], true);

    // A second client cannot take the name while Alice is online.
    let mut impostor = Client::connect(addr).await;
    impostor.expect("CONNECT Alice", ResponseKind::NameInUse).await;

    alice.send("LEAVE").await;
    assert!(alice.recv().await.is_none(), "connection closes after LEAVE");

    // Once Alice is gone the name can be reprised.
    let mut returning = Client::connect(addr).await;
    returning
        .expect("CONNECT Alice", ResponseKind::ReprisingPlayer)
        .await;
    returning.send("SET_ATTACK_STAT 1").await;
    let query = returning.expect("QUERY", ResponseKind::QueryResult).await;
    let payload: serde_json::Value =
        serde_json::from_str(query.payload().expect("Payload present")).expect("Valid JSON");
    assert_eq!(payload["players"][0]["attack"], 20);
    assert_eq!(payload["players"][0]["online"], true);

    stop_tx.send(()).expect("Server already stopped");
    tokio::time::timeout(TIMEOUT, server)
        .await
        .expect("Server did not stop")
        .expect("Server panicked")
        .expect("Server failed");

    assert!(impostor.recv().await.is_none(), "shutdown closes sessions");
}
