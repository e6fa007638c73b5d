//! Database models for stored players.

use chrono::{NaiveDateTime, Utc};
use derive_getters::Getters;
use diesel::prelude::*;
use tracing::instrument;

use crate::db::{StoreError, schema};
use crate::player::PlayerSnapshot;

/// Stored player row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Getters)]
#[diesel(table_name = schema::players)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlayerRow {
    name: String,
    description: Option<String>,
    attack: i32,
    defense: i32,
    regen: i32,
    saved_at: NaiveDateTime,
}

#[track_caller]
fn to_column(stat: &'static str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::new(format!("{stat} value {value} out of range")))
}

#[track_caller]
fn from_column(stat: &'static str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::new(format!("Stored {stat} value {value} is negative")))
}

impl PlayerRow {
    /// Builds a row from a snapshot, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a stat does not fit the column type.
    #[instrument(skip(snapshot), fields(name = %snapshot.name()))]
    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Result<Self, StoreError> {
        Ok(Self {
            name: snapshot.name().clone(),
            description: snapshot.description().clone(),
            attack: to_column("attack", *snapshot.attack())?,
            defense: to_column("defense", *snapshot.defense())?,
            regen: to_column("regen", *snapshot.regen())?,
            saved_at: Utc::now().naive_utc(),
        })
    }

    /// Converts the row back into a started player snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a stored stat is negative.
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn into_snapshot(self) -> Result<PlayerSnapshot, StoreError> {
        let attack = from_column("attack", self.attack)?;
        let defense = from_column("defense", self.defense)?;
        let regen = from_column("regen", self.regen)?;
        Ok(PlayerSnapshot::new(
            self.name,
            self.description,
            attack,
            defense,
            regen,
            true,
        ))
    }
}
