//! Tests for the SQLite player store.

use std::sync::Arc;

use tempfile::NamedTempFile;

use lurk_server::{
    ClientState, Command, CommandKind, ConnectionSession, GameContext, Outbox, PlayerSnapshot,
    PlayerStore, ResponseKind, SessionSettings, SqlitePlayerStore,
};

/// Creates a temporary database file and opens a store on it. The file handle
/// must stay in scope to keep the file alive.
fn setup_test_db() -> (NamedTempFile, SqlitePlayerStore) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let store = SqlitePlayerStore::open(db_path).expect("Failed to open store");
    (db_file, store)
}

fn snapshot(name: &str, description: Option<&str>, attack: u32) -> PlayerSnapshot {
    PlayerSnapshot::new(
        name.to_string(),
        description.map(str::to_string),
        attack,
        2,
        3,
        true,
    )
}

#[test]
fn test_empty_store_loads_nothing() {
    let (_db, store) = setup_test_db();
    let players = store.load_players().expect("Load failed");
    assert!(players.is_empty());
}

#[test]
fn test_save_then_load() {
    let (_db, store) = setup_test_db();
    store
        .save_player(&snapshot("Bob", Some("Rogue"), 7))
        .expect("Save failed");
    store
        .save_player(&snapshot("Alice", None, 1))
        .expect("Save failed");

    let players = store.load_players().expect("Load failed");
    assert_eq!(players.len(), 2);
    assert_eq!(players[0], snapshot("Alice", None, 1));
    assert_eq!(players[1], snapshot("Bob", Some("Rogue"), 7));
}

#[test]
fn test_save_overwrites_existing_player() {
    let (_db, store) = setup_test_db();
    store
        .save_player(&snapshot("Alice", Some("Old"), 1))
        .expect("First save failed");
    store
        .save_player(&snapshot("Alice", Some("New"), 9))
        .expect("Second save failed");

    let players = store.load_players().expect("Load failed");
    assert_eq!(players, vec![snapshot("Alice", Some("New"), 9)]);
}

#[test]
fn test_players_survive_reopen() {
    let (db, store) = setup_test_db();
    store
        .save_player(&snapshot("Alice", Some("Persistent"), 4))
        .expect("Save failed");
    drop(store);

    let db_path = db.path().to_str().expect("Invalid path").to_string();
    let reopened = SqlitePlayerStore::open(db_path).expect("Reopen failed");
    let players = reopened.load_players().expect("Load failed");
    assert_eq!(players, vec![snapshot("Alice", Some("Persistent"), 4)]);
}

#[test]
fn test_in_memory_database() {
    let store = SqlitePlayerStore::open(":memory:".to_string()).expect("Failed to open store");
    store
        .save_player(&snapshot("Alice", None, 1))
        .expect("Save failed");
    assert_eq!(store.load_players().expect("Load failed").len(), 1);
    assert_eq!(store.db_path(), ":memory:");
}

#[tokio::test]
async fn test_started_player_reprised_after_restart() {
    let (db, store) = setup_test_db();
    let context = Arc::new(GameContext::new(Arc::new(store), SessionSettings::default()));

    let (outbox, mut responses) = Outbox::channel();
    context.registries().register_connection("ephemeral-1", "peer");
    let mut session = ConnectionSession::new(Arc::clone(&context), "ephemeral-1".to_string(), outbox);
    let batch = vec![
        Command::with_parameter(CommandKind::Connect, "Alice"),
        Command::with_parameter(CommandKind::SetPlayerDesc, "Survivor"),
        Command::with_parameter(CommandKind::SetDefenseStat, "12"),
        Command::bare(CommandKind::Start),
        Command::bare(CommandKind::Leave),
    ];
    session.handle_batch(batch).await.expect("Batch failed");
    assert_eq!(
        responses.try_recv().expect("Connect answered").kind(),
        ResponseKind::NewPlayer
    );
    drop(session);
    drop(context);

    // A fresh server on the same database.
    let db_path = db.path().to_str().expect("Invalid path").to_string();
    let store = SqlitePlayerStore::open(db_path).expect("Reopen failed");
    let context = GameContext::restore(Arc::new(store), SessionSettings::default())
        .expect("Restore failed");
    let context = Arc::new(context);
    assert_eq!(context.registries().player_count(), 1);

    let (outbox, mut responses) = Outbox::channel();
    context.registries().register_connection("ephemeral-2", "peer");
    let mut session = ConnectionSession::new(Arc::clone(&context), "ephemeral-2".to_string(), outbox);
    session
        .handle_command(Command::with_parameter(CommandKind::Connect, "Alice"))
        .await
        .expect("Connect failed");
    assert_eq!(
        responses.try_recv().expect("Connect answered").kind(),
        ResponseKind::ReprisingPlayer
    );
    assert_eq!(session.state(), ClientState::Started);

    let restored = session.player().expect("Player bound").snapshot();
    assert_eq!(*restored.defense(), 12);
    assert_eq!(restored.description().as_deref(), Some("Survivor"));
}

#[test]
fn test_restore_rejects_player_over_budget() {
    let (_db, store) = setup_test_db();
    store
        .save_player(&PlayerSnapshot::new(
            "Zed".to_string(),
            Some("Hoarder".to_string()),
            20,
            20,
            20,
            true,
        ))
        .expect("Save failed");

    // Saved under a budget of 60, restored under 30.
    let err = GameContext::restore(Arc::new(store), SessionSettings::new(30, false)).unwrap_err();
    assert!(err.message.contains("Zed"), "unexpected error: {err}");
}

#[test]
fn test_restore_rejects_overflowing_stats() {
    let (_db, store) = setup_test_db();
    let big = i32::MAX as u32;
    store
        .save_player(&PlayerSnapshot::new("Big".to_string(), None, big, big, big, true))
        .expect("Save failed");

    assert!(GameContext::restore(Arc::new(store), SessionSettings::default()).is_err());
}
