//! # Tally Engine
//!
//! The deterministic core of Tally, a local-first store for card-game
//! session results.
//!
//! This crate holds everything that can be computed without I/O: the record
//! model, content-based identity, the validation/sanitization boundary for
//! untrusted share payloads, and the recovery ledger state machine. The
//! async client crate layers persistence, remote sync and connectivity
//! handling on top.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Deterministic**: same inputs always produce same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`GameRecord`] is one finished (or in-progress) game: players, rounds
//! with per-player bid/made/score tuples, final scores, winners, and
//! provenance metadata. Its [`SyncStatus`] tracks local/remote
//! reconciliation and is the sole concurrency-control token.
//!
//! ### Content identity
//!
//! [`identity::content_hash`] derives identity purely from gameplay-semantic
//! fields, so two devices that independently record the same game produce
//! the same hash. [`identity::lookup_key`] is the coarser pre-filter key
//! used to fetch duplicate candidates before a full comparison.
//!
//! ### Share validation
//!
//! [`ShareValidator`] is the boundary for payloads arriving through share
//! links or bulk import: format and size checks before decode, strict typed
//! parse, structural bounds, and free-text sanitization with numeric
//! clamping.
//!
//! ### Recovery
//!
//! [`RecoveryLedger`] tracks named recovery scopes through
//! `Clean -> Dirty -> Snapshotted -> Clean`, with snapshots aging out past a
//! hard ceiling instead of resurrecting stale state.

pub mod error;
pub mod identity;
pub mod record;
pub mod recovery;
pub mod sanitize;
pub mod validate;

// Re-export main types at crate root
pub use error::Error;
pub use identity::{content_hash, lookup_key, matches_candidate, RemoteCandidate};
pub use record::{
    clamp_score, winners_from_scores, GameMode, GameRecord, Player, PlayerRound, RecordSource,
    Round, SyncStatus, MAX_NAME_LEN, MAX_PLAYERS, MAX_ROUNDS, SCORE_MAX, SCORE_MIN,
};
pub use recovery::{
    classify, Freshness, RecoveryLedger, RecoverySnapshot, ScopeState, CRASH_WINDOW_MS,
    HARD_CEILING_MS, RECENT_WINDOW_MS,
};
pub use sanitize::sanitize_text;
pub use validate::{ShareLimits, ShareValidator, MAX_BULK_RECORDS, MAX_DECODED_BYTES};

/// Type aliases for clarity
pub type GameId = String;
pub type PlayerId = String;
pub type RemoteId = String;
pub type Timestamp = u64;
