//! Storage error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// Player storage error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Storage error: {} at {}:{}", message, file, line)]
pub struct StoreError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::new(format!("Diesel error: {}", err))
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("Connection error: {}", err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    /// A save runs on the blocking pool; losing that task loses the save.
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        let cause = if err.is_panic() { "panicked" } else { "was cancelled" };
        Self::new(format!("Save task {}: {}", cause, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panicked_save_task_becomes_store_error() {
        let joined = tokio::task::spawn_blocking(|| -> Result<(), StoreError> {
            panic!("disk on fire");
        })
        .await;

        let err = StoreError::from(joined.unwrap_err());
        assert!(err.message.starts_with("Save task panicked"));
        assert!(err.file.ends_with("error.rs"));
    }
}
