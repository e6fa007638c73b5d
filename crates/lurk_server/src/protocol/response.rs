//! Response vocabulary sent back to clients.

use std::str::FromStr;

use derive_more::{Display, Error};
use tracing::instrument;

/// Outcome kinds the server reports to a client.
///
/// The wire code is the variant name in SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseKind {
    /// The command was applied.
    Fine,
    /// The command is not valid in the session's current state.
    IncorrectState,
    /// The requested stat exceeds the remaining budget.
    StatsTooHigh,
    /// START was sent before the player was ready.
    NotReady,
    /// CONNECT created a new player.
    NewPlayer,
    /// CONNECT resumed a previously started player.
    ReprisingPlayer,
    /// CONNECT named a player bound to another live connection.
    NameInUse,
    /// A parameter could not be parsed.
    ///
    /// Only sent when the server is configured to report malformed values
    /// separately; otherwise those surface as [`ResponseKind::IncorrectState`].
    MalformedValue,
    /// Snapshot of the visible game state, carried as a JSON payload.
    QueryResult,
}

impl ResponseKind {
    /// Returns the transmittable response for this kind, with no payload.
    pub fn response(self) -> Response {
        Response::from(self)
    }
}

/// A response ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    kind: ResponseKind,
    payload: Option<String>,
}

impl From<ResponseKind> for Response {
    fn from(kind: ResponseKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }
}

impl Response {
    /// Creates a response carrying a payload.
    pub fn with_payload(kind: ResponseKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: Some(payload.into()),
        }
    }

    /// Returns the response kind.
    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Returns the payload, if any.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Encodes the response as a wire line (without the trailing newline).
    ///
    /// Newlines inside a payload are escaped so a response is always one line.
    pub fn encode(&self) -> String {
        match &self.payload {
            Some(payload) => format!("{} {}", self.kind, payload.replace('\n', "\\n")),
            None => self.kind.to_string(),
        }
    }

    /// Decodes a wire line produced by [`Response::encode`].
    #[instrument(level = "trace")]
    pub fn decode(line: &str) -> Result<Self, UnknownResponse> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, payload) = match line.split_once(' ') {
            Some((code, rest)) => (code, Some(rest.to_string())),
            None => (line, None),
        };
        let kind = ResponseKind::from_str(code).map_err(|_| UnknownResponse {
            code: code.to_string(),
        })?;
        Ok(Self { kind, payload })
    }
}

/// A wire line whose code names no known response.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Unknown response code '{}'", code)]
pub struct UnknownResponse {
    /// The code as received.
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_screaming_snake_case() {
        assert_eq!(ResponseKind::IncorrectState.to_string(), "INCORRECT_STATE");
        assert_eq!(ResponseKind::ReprisingPlayer.to_string(), "REPRISING_PLAYER");
        assert_eq!(ResponseKind::StatsTooHigh.response().encode(), "STATS_TOO_HIGH");
    }

    #[test]
    fn test_payload_stays_on_one_line() {
        let response = Response::with_payload(ResponseKind::QueryResult, "a\nb");
        assert_eq!(response.encode(), "QUERY_RESULT a\\nb");
    }

    #[test]
    fn test_decode_response_line() {
        let response = Response::decode("QUERY_RESULT {\"players\":[]}\n").unwrap();
        assert_eq!(response.kind(), ResponseKind::QueryResult);
        assert_eq!(response.payload(), Some("{\"players\":[]}"));

        assert!(Response::decode("WHATEVER").is_err());
    }
}
