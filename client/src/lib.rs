//! Local-first client for the tally record store.
//!
//! Persists finished game records locally, uploads them to the remote store
//! at most once, resolves shared records from other devices, and snapshots
//! volatile state for crash recovery. All engine logic is pure and lives in
//! `tally-engine`; this crate supplies the async I/O around it.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod recovery;
pub mod remote;
pub mod share;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::ClientConfig;
pub use connectivity::{ConnectivityEdge, ConnectivityHandler};
pub use error::{ClientError, Result};
pub use recovery::{
    ClockFn, RecoveryManager, RecoveryReport, SaveOptions, ScopeAge, RECOVERY_STORAGE_KEY,
};
pub use remote::{MemoryRemote, RemoteBackend, RemoteError};
pub use share::{
    import_bulk, parse_shared_path, pending_bulk_share, resolve_shared, stash_bulk_share,
    LegacyBulkShare, PENDING_SHARE_KEY,
};
pub use storage::{FileBackend, MemoryBackend, StorageBackend, StorageError};
pub use store::{new_game_id, LocalRecordStore, GAMES_STORAGE_KEY};
pub use sync::{CatchUpSummary, SyncCoordinator, SyncFailure, SyncOutcome};
