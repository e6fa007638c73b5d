//! Player records: description, stat allocation, and readiness.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::db::{PlayerStore, StoreError};

/// Default budget shared by attack, defense and regen.
pub const MAX_STAT_POINTS: u32 = 100;

/// One of the three allocatable stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StatKind {
    /// Damage dealt.
    Attack,
    /// Damage absorbed.
    Defense,
    /// Health regained over time.
    Regen,
}

/// Result of a stat allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOutcome {
    /// The value was committed.
    Fine,
    /// The value is negative or exceeds the remaining budget.
    StatsTooHigh,
    /// The value is not an integer.
    Malformed,
}

/// Consistent copy of a player's fields.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    name: String,
    description: Option<String>,
    attack: u32,
    defense: u32,
    regen: u32,
    started: bool,
}

impl PlayerSnapshot {
    /// Creates a snapshot from stored values.
    pub fn new(
        name: String,
        description: Option<String>,
        attack: u32,
        defense: u32,
        regen: u32,
        started: bool,
    ) -> Self {
        Self {
            name,
            description,
            attack,
            defense,
            regen,
            started,
        }
    }

    /// Sum of all allocated stat points, saturating at `u32::MAX`.
    pub fn total(&self) -> u32 {
        self.checked_total().unwrap_or(u32::MAX)
    }

    /// Sum of all allocated stat points, or `None` if it overflows.
    pub fn checked_total(&self) -> Option<u32> {
        self.attack.checked_add(self.defense)?.checked_add(self.regen)
    }

    /// Description is set and at least one stat is non-zero.
    pub fn is_ready(&self) -> bool {
        self.description.is_some() && (self.attack > 0 || self.defense > 0 || self.regen > 0)
    }
}

#[derive(Debug, Default)]
struct PlayerFields {
    description: Option<String>,
    attack: u32,
    defense: u32,
    regen: u32,
    started: bool,
}

/// A player in the roster.
///
/// Only the session bound to this player mutates it, but any session may read
/// it while answering QUERY. Every mutation happens under one write lock so
/// readers never see a half-applied allocation.
#[derive(Debug)]
pub struct PlayerRecord {
    name: String,
    max_stat_points: u32,
    fields: RwLock<PlayerFields>,
}

impl PlayerRecord {
    /// Creates a fresh player with no description and no stats.
    #[instrument]
    pub fn new(name: String, max_stat_points: u32) -> Self {
        debug!("Creating player record");
        Self {
            name,
            max_stat_points,
            fields: RwLock::new(PlayerFields::default()),
        }
    }

    /// Rebuilds a player from a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stored stats exceed `max_stat_points`,
    /// which happens when the server restarts with a smaller budget.
    #[instrument(skip(snapshot), fields(name = %snapshot.name))]
    pub fn restored(snapshot: PlayerSnapshot, max_stat_points: u32) -> Result<Self, StoreError> {
        match snapshot.checked_total() {
            Some(total) if total <= max_stat_points => {}
            total => {
                warn!(?total, max_stat_points, "Stored player exceeds the stat budget");
                return Err(StoreError::new(format!(
                    "Stored player '{}' has {}/{}/{} stat points, over the budget of {}",
                    snapshot.name, snapshot.attack, snapshot.defense, snapshot.regen, max_stat_points
                )));
            }
        }
        Ok(Self {
            name: snapshot.name,
            max_stat_points,
            fields: RwLock::new(PlayerFields {
                description: snapshot.description,
                attack: snapshot.attack,
                defense: snapshot.defense,
                regen: snapshot.regen,
                started: snapshot.started,
            }),
        })
    }

    /// The player's name, which is also their registry identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Budget shared by the three stats.
    pub fn max_stat_points(&self) -> u32 {
        self.max_stat_points
    }

    fn read(&self) -> RwLockReadGuard<'_, PlayerFields> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PlayerFields> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies every field under a single read lock.
    pub fn snapshot(&self) -> PlayerSnapshot {
        let fields = self.read();
        PlayerSnapshot {
            name: self.name.clone(),
            description: fields.description.clone(),
            attack: fields.attack,
            defense: fields.defense,
            regen: fields.regen,
            started: fields.started,
        }
    }

    /// Replaces the description.
    #[instrument(skip(self, description), fields(name = %self.name))]
    pub fn set_description(&self, description: String) {
        debug!(len = description.len(), "Setting description");
        self.write().description = Some(description);
    }

    /// Validates `raw` against the remaining budget and commits it on success.
    ///
    /// `raw` must be a 32-bit signed integer; anything else is malformed.
    /// The remaining budget is the maximum minus the other two stats, so
    /// lowering a stat that is already allocated is always allowed.
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn set_stat(&self, kind: StatKind, raw: &str) -> StatOutcome {
        let Ok(value) = raw.parse::<i32>() else {
            debug!("Stat value is not a 32-bit integer");
            return StatOutcome::Malformed;
        };
        let Ok(value) = u32::try_from(value) else {
            debug!(value, "Negative stat value");
            return StatOutcome::StatsTooHigh;
        };

        let mut fields = self.write();
        let others = match kind {
            StatKind::Attack => fields.defense.saturating_add(fields.regen),
            StatKind::Defense => fields.attack.saturating_add(fields.regen),
            StatKind::Regen => fields.attack.saturating_add(fields.defense),
        };
        let remaining = self.max_stat_points.saturating_sub(others);

        if value > remaining {
            debug!(value, remaining, "Stat value outside remaining budget");
            return StatOutcome::StatsTooHigh;
        }

        match kind {
            StatKind::Attack => fields.attack = value,
            StatKind::Defense => fields.defense = value,
            StatKind::Regen => fields.regen = value,
        }
        debug!(value, remaining, "Stat committed");
        StatOutcome::Fine
    }

    /// Description is set and at least one stat is non-zero.
    pub fn is_ready(&self) -> bool {
        let fields = self.read();
        fields.description.is_some() && (fields.attack > 0 || fields.defense > 0 || fields.regen > 0)
    }

    /// Whether this player has completed setup at least once.
    pub fn is_started(&self) -> bool {
        self.read().started
    }

    /// Persists the player as started.
    ///
    /// The record is only flagged as started once the store accepted it, so a
    /// failed save leaves the player exactly as it was.
    #[instrument(skip(self, store), fields(name = %self.name))]
    pub fn save_data(&self, store: &dyn PlayerStore) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot();
        snapshot.started = true;
        store.save_player(&snapshot)?;
        self.write().started = true;
        debug!("Player saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(max: u32) -> PlayerRecord {
        PlayerRecord::new("Alice".to_string(), max)
    }

    #[test]
    fn test_budget_example() {
        let player = record(30);
        assert_eq!(player.set_stat(StatKind::Attack, "20"), StatOutcome::Fine);
        assert_eq!(player.set_stat(StatKind::Defense, "15"), StatOutcome::StatsTooHigh);
        assert_eq!(player.set_stat(StatKind::Defense, "10"), StatOutcome::Fine);
        assert_eq!(player.snapshot().total(), 30);
    }

    #[test]
    fn test_reallocating_same_stat_ignores_its_old_value() {
        let player = record(30);
        assert_eq!(player.set_stat(StatKind::Regen, "30"), StatOutcome::Fine);
        assert_eq!(player.set_stat(StatKind::Regen, "25"), StatOutcome::Fine);
        assert_eq!(player.set_stat(StatKind::Attack, "5"), StatOutcome::Fine);
        assert_eq!(player.set_stat(StatKind::Attack, "6"), StatOutcome::StatsTooHigh);
    }

    #[test]
    fn test_malformed_and_negative_values() {
        let player = record(30);
        assert_eq!(player.set_stat(StatKind::Attack, "abc"), StatOutcome::Malformed);
        assert_eq!(player.set_stat(StatKind::Attack, ""), StatOutcome::Malformed);
        assert_eq!(player.set_stat(StatKind::Attack, "-1"), StatOutcome::StatsTooHigh);
        assert_eq!(player.snapshot().total(), 0);
    }

    #[test]
    fn test_values_outside_i32_are_malformed() {
        let player = record(30);
        assert_eq!(player.set_stat(StatKind::Attack, "3000000000"), StatOutcome::Malformed);
        assert_eq!(player.set_stat(StatKind::Attack, "-3000000000"), StatOutcome::Malformed);
        assert_eq!(player.set_stat(StatKind::Attack, "2147483647"), StatOutcome::StatsTooHigh);
        assert_eq!(player.snapshot().total(), 0);
    }

    #[test]
    fn test_readiness_needs_description_and_points() {
        let player = record(30);
        assert!(!player.is_ready());

        player.set_description("A tall elf".to_string());
        assert!(!player.is_ready());

        player.set_stat(StatKind::Defense, "1");
        assert!(player.is_ready());
        assert!(player.snapshot().is_ready());
    }

    #[test]
    fn test_restored_keeps_fields() {
        let snapshot = PlayerSnapshot::new("Bob".to_string(), Some("Rogue".to_string()), 3, 4, 5, true);
        let player = PlayerRecord::restored(snapshot.clone(), MAX_STAT_POINTS).unwrap();
        assert_eq!(player.snapshot(), snapshot);
        assert!(player.is_started());
    }

    #[test]
    fn test_restored_rejects_over_budget() {
        let snapshot = PlayerSnapshot::new("Zed".to_string(), Some("d".to_string()), 20, 20, 20, true);
        let err = PlayerRecord::restored(snapshot.clone(), 30).unwrap_err();
        assert!(err.message.contains("Zed"));
        assert!(PlayerRecord::restored(snapshot, 60).is_ok());
    }

    #[test]
    fn test_restored_rejects_overflowing_total() {
        let big = i32::MAX as u32;
        let snapshot = PlayerSnapshot::new("Big".to_string(), None, big, big, big, true);
        assert_eq!(snapshot.checked_total(), None);
        assert_eq!(snapshot.total(), u32::MAX);
        assert!(!snapshot.is_ready());
        assert!(PlayerRecord::restored(snapshot, MAX_STAT_POINTS).is_err());
    }
}
