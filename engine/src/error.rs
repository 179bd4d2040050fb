//! Error types for the Tally engine.

use thiserror::Error;

/// All possible errors from the Tally engine.
///
/// Every variant is a validation-class failure: recoverable locally,
/// surfaced to the caller, never partially applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Payload format errors. Deliberately generic: the raw malformed
    // input is never echoed back.
    #[error("malformed payload")]
    MalformedPayload,

    #[error("payload too large: estimated {estimated} bytes (limit {limit})")]
    PayloadTooLarge { estimated: usize, limit: usize },

    // Structural errors
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("game has no players")]
    NoPlayers,

    #[error("too many players: {count} (limit {limit})")]
    TooManyPlayers { count: usize, limit: usize },

    #[error("too many rounds: {count} (limit {limit})")]
    TooManyRounds { count: u32, limit: u32 },

    #[error("unknown game mode: {0}")]
    UnknownMode(String),

    #[error("too many records in batch: {count} (limit {limit})")]
    TooManyRecords { count: usize, limit: usize },

    #[error("empty batch")]
    EmptyBatch,

    // Recovery ledger errors
    #[error("invalid recovery ledger: {0}")]
    InvalidLedger(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
