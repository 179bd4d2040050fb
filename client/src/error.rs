//! Unified error handling for the client.

use crate::remote::RemoteError;
use crate::storage::StorageError;
use tally_engine::GameId;
use thiserror::Error;

/// Client error type.
///
/// Validation and storage-exhaustion errors surface synchronously to the
/// caller. Sync failures are reported as outcomes, not errors (see
/// [`crate::sync::SyncOutcome`]), and recovery failures are logged at the
/// boundary rather than raised.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("validation error: {0}")]
    Validation(#[from] tally_engine::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("record not found: {0}")]
    RecordNotFound(GameId),

    #[error("shared record not found: {0}")]
    SharedNotFound(String),

    #[error("share payload expired")]
    ShareExpired,

    #[error("corrupt store document under '{key}': {reason}")]
    CorruptDocument { key: String, reason: String },
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ClientError::RecordNotFound("g1".into());
        assert_eq!(err.to_string(), "record not found: g1");

        let err = ClientError::Storage(StorageError::Exhausted("quota".into()));
        assert_eq!(err.to_string(), "storage error: storage exhausted: quota");
    }
}
