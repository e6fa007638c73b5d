//! Client command vocabulary and line decoding.

use std::str::FromStr;

use derive_more::{Display, Error};
use derive_new::new;
use tracing::instrument;

/// Kind of command a client can send.
///
/// The wire keyword is the variant name in SCREAMING_SNAKE_CASE, matched
/// without regard to ASCII case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CommandKind {
    /// Claim a player name.
    Connect,
    /// Leave the game and close the session.
    Leave,
    /// Request a snapshot of the visible game state.
    Query,
    /// Set the player's description.
    SetPlayerDesc,
    /// Allocate points to attack.
    SetAttackStat,
    /// Allocate points to defense.
    SetDefenseStat,
    /// Allocate points to regeneration.
    SetRegenStat,
    /// Finish setup and enter the game.
    Start,
    /// Move to another room.
    ChangeRoom,
    /// Fight the monsters in the current room.
    Fight,
    /// Fight another player.
    PvpFight,
    /// Loot a defeated character.
    Loot,
    /// Send a chat message.
    Message,
    /// Perform a room action.
    Action,
}

impl CommandKind {
    /// Returns true for commands only meaningful once a player has started.
    #[instrument]
    pub fn is_gameplay(self) -> bool {
        matches!(
            self,
            Self::ChangeRoom
                | Self::Fight
                | Self::PvpFight
                | Self::Loot
                | Self::Message
                | Self::Action
        )
    }
}

/// A decoded client command with its optional parameter.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Command {
    kind: CommandKind,
    parameter: Option<String>,
}

impl Command {
    /// Creates a command that carries no parameter.
    pub fn bare(kind: CommandKind) -> Self {
        Self::new(kind, None)
    }

    /// Creates a command with a parameter.
    pub fn with_parameter(kind: CommandKind, parameter: impl Into<String>) -> Self {
        Self::new(kind, Some(parameter.into()))
    }

    /// Returns the command kind.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Returns the parameter, if one was sent.
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    /// Encodes the command as a wire line (without the trailing newline).
    pub fn encode(&self) -> String {
        match &self.parameter {
            Some(parameter) => format!("{} {}", self.kind, parameter),
            None => self.kind.to_string(),
        }
    }
}

/// An inbound line whose keyword names no known command.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Unknown command keyword '{}'", keyword)]
pub struct UnknownCommand {
    /// The keyword as received.
    pub keyword: String,
}

/// Decodes one inbound line.
///
/// Returns `Ok(None)` for blank lines. Everything after the first space is
/// the parameter, kept verbatim; an empty remainder counts as no parameter.
#[instrument(level = "trace")]
pub fn decode_line(line: &str) -> Result<Option<Command>, UnknownCommand> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let (keyword, parameter) = match line.split_once(' ') {
        Some((keyword, rest)) => (keyword, (!rest.is_empty()).then(|| rest.to_string())),
        None => (line, None),
    };

    let kind = CommandKind::from_str(keyword.trim()).map_err(|_| UnknownCommand {
        keyword: keyword.to_string(),
    })?;

    Ok(Some(Command::new(kind, parameter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_keyword_only() {
        let command = decode_line("QUERY").unwrap().unwrap();
        assert_eq!(command.kind(), CommandKind::Query);
        assert_eq!(command.parameter(), None);
    }

    #[test]
    fn test_decode_keeps_parameter_verbatim() {
        let command = decode_line("SET_PLAYER_DESC A tall  elf\r").unwrap().unwrap();
        assert_eq!(command.kind(), CommandKind::SetPlayerDesc);
        assert_eq!(command.parameter(), Some("A tall  elf"));
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        let command = decode_line("connect Alice").unwrap().unwrap();
        assert_eq!(command, Command::with_parameter(CommandKind::Connect, "Alice"));
    }

    #[test]
    fn test_decode_blank_line() {
        assert_eq!(decode_line("   ").unwrap(), None);
        assert_eq!(decode_line("\r").unwrap(), None);
    }

    #[test]
    fn test_decode_trailing_space_means_no_parameter() {
        let command = decode_line("SET_ATTACK_STAT ").unwrap().unwrap();
        assert_eq!(command.parameter(), None);
    }

    #[test]
    fn test_decode_unknown_keyword() {
        let err = decode_line("DANCE wildly").unwrap_err();
        assert_eq!(err.keyword, "DANCE");
    }

    #[test]
    fn test_encode_matches_decode() {
        let command = Command::with_parameter(CommandKind::SetRegenStat, "12");
        assert_eq!(command.encode(), "SET_REGEN_STAT 12");
        assert_eq!(decode_line(&command.encode()).unwrap(), Some(command));
    }

    #[test]
    fn test_gameplay_kinds() {
        assert!(CommandKind::Fight.is_gameplay());
        assert!(!CommandKind::Start.is_gameplay());
    }
}
