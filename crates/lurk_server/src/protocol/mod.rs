//! Text protocol: command and response vocabularies plus line framing.

mod command;
mod framing;
mod response;

pub use command::{Command, CommandKind, UnknownCommand, decode_line};
pub use framing::{DEFAULT_MAX_LINE_LENGTH, LineFramer, LineTooLong};
pub use response::{Response, ResponseKind, UnknownResponse};
