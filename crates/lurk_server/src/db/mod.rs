//! Persistence layer for started players.

mod error;
mod models;
mod schema; // Diesel generated schema - internal use only
mod store;

pub use error::StoreError;
pub use models::PlayerRow;
pub use store::{MemoryPlayerStore, PlayerStore, SqlitePlayerStore};
