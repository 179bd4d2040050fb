//! Sync coordinator.
//!
//! Uploads unsynced records to the remote store at most once and reconciles
//! duplicates by content identity. The remote store is the long-term source
//! of truth; this coordinator only ever moves a record forward once the
//! remote has acknowledged it, so a failure can never leave a record falsely
//! marked Synced.

use crate::error::{ClientError, Result};
use crate::remote::{RemoteBackend, RemoteError};
use crate::store::LocalRecordStore;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tally_engine::{lookup_key, matches_candidate, GameId, RemoteId, SyncStatus};
use tokio::sync::Mutex;

/// Result of [`SyncCoordinator::ensure_synced`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The record already holds a remote identity (or is imported and thus
    /// synced by construction). No I/O was performed.
    AlreadySynced,
    /// The record was created remotely.
    Uploaded(RemoteId),
    /// An existing remote record with identical content was adopted.
    /// No create call was issued.
    DuplicateFound(RemoteId),
    /// The upload failed; the record stays Unsynced and will be retried on
    /// the next opportunity.
    Failed(SyncFailure),
}

/// Categorized sync failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    Network(String),
    AuthRequired,
    Quota,
    Validation(String),
}

impl From<RemoteError> for SyncFailure {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(msg) => SyncFailure::Network(msg),
            RemoteError::AuthRequired => SyncFailure::AuthRequired,
            RemoteError::Quota => SyncFailure::Quota,
            RemoteError::Validation(msg) => SyncFailure::Validation(msg),
        }
    }
}

/// Tally of one best-effort catch-up pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchUpSummary {
    pub uploaded: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Coordinates uploads between the local store and the remote backend.
pub struct SyncCoordinator {
    store: Arc<LocalRecordStore>,
    remote: Arc<dyn RemoteBackend>,
    // Per-record guard: a second ensure_synced for the same id awaits the
    // first instead of racing it into a double upload.
    in_flight: DashMap<GameId, Arc<Mutex<()>>>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<LocalRecordStore>, remote: Arc<dyn RemoteBackend>) -> Self {
        Self {
            store,
            remote,
            in_flight: DashMap::new(),
        }
    }

    fn guard_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure a record has a remote identity, uploading it if necessary.
    ///
    /// Idempotent: repeated calls never create two remote copies of the same
    /// game. Concurrent calls for the same id serialize on a per-record
    /// guard.
    pub async fn ensure_synced(&self, id: &str) -> Result<SyncOutcome> {
        let guard = self.guard_for(id);
        let outcome = {
            let _permit = guard.lock().await;
            self.sync_record(id).await
        };
        drop(guard);
        // Evict the guard once no other call holds it, so the map does not
        // grow one entry per game id for the process lifetime.
        self.in_flight
            .remove_if(id, |_, entry| Arc::strong_count(entry) == 1);
        outcome
    }

    async fn sync_record(&self, id: &str) -> Result<SyncOutcome> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ClientError::RecordNotFound(id.to_string()))?;

        // Imported/shared copies carry external provenance: synced by
        // construction, never uploaded.
        if record.is_imported() {
            tracing::debug!(game_id = %id, "skipping imported record");
            return Ok(SyncOutcome::AlreadySynced);
        }
        match record.sync_status {
            SyncStatus::Synced => return Ok(SyncOutcome::AlreadySynced),
            SyncStatus::Conflict => {
                return Ok(SyncOutcome::Failed(SyncFailure::Validation(
                    "unresolved duplicate conflict".to_string(),
                )))
            }
            SyncStatus::Syncing => {
                // Leftover marker from an interrupted session. We hold the
                // per-record guard, so nothing is actually in flight.
                self.store.abort_sync(id).await?;
            }
            SyncStatus::Unsynced => {}
        }

        // A local duplicate that already synced settles this without I/O.
        if let Some(remote_id) = self.store.find_synced_duplicate(&record).await? {
            if !self.store.begin_sync(id).await? {
                return Ok(SyncOutcome::AlreadySynced);
            }
            let adopted = self.store.complete_sync(id, remote_id).await?;
            tracing::info!(game_id = %id, remote_id = %adopted, "adopted local duplicate");
            return Ok(SyncOutcome::DuplicateFound(adopted));
        }

        if !self.store.begin_sync(id).await? {
            // Status changed between read and transition; someone else
            // finished the job.
            return Ok(SyncOutcome::AlreadySynced);
        }

        let key = lookup_key(&record);
        let candidates = match self.remote.query(&key).await {
            Ok(candidates) => candidates,
            Err(err) => {
                self.store.abort_sync(id).await?;
                tracing::warn!(game_id = %id, error = %err, "candidate query failed");
                return Ok(SyncOutcome::Failed(err.into()));
            }
        };

        for candidate in candidates {
            if matches_candidate(&record, &candidate) {
                let adopted = self.store.complete_sync(id, candidate.remote_id).await?;
                tracing::info!(game_id = %id, remote_id = %adopted, "matched existing remote record");
                return Ok(SyncOutcome::DuplicateFound(adopted));
            }
        }

        match self.remote.create(&record).await {
            Ok(remote_id) => {
                let adopted = self.store.complete_sync(id, remote_id).await?;
                tracing::info!(game_id = %id, remote_id = %adopted, "uploaded record");
                Ok(SyncOutcome::Uploaded(adopted))
            }
            Err(err) => {
                self.store.abort_sync(id).await?;
                tracing::warn!(game_id = %id, error = %err, "upload failed");
                Ok(SyncOutcome::Failed(err.into()))
            }
        }
    }

    /// Offer every Unsynced record a best-effort sync pass.
    ///
    /// Failures are logged and counted, never surfaced: background sync must
    /// not block the user.
    pub async fn catch_up(&self) -> CatchUpSummary {
        let mut summary = CatchUpSummary::default();
        let ids = match self.store.unsynced_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "catch-up pass could not list records");
                return summary;
            }
        };
        tracing::debug!(count = ids.len(), "starting catch-up pass");
        for id in ids {
            match self.ensure_synced(&id).await {
                Ok(SyncOutcome::Uploaded(_)) => summary.uploaded += 1,
                Ok(SyncOutcome::DuplicateFound(_)) => summary.duplicates += 1,
                Ok(SyncOutcome::AlreadySynced) => {}
                Ok(SyncOutcome::Failed(failure)) => {
                    tracing::warn!(game_id = %id, ?failure, "catch-up sync failed");
                    summary.failed += 1;
                }
                Err(err) => {
                    tracing::warn!(game_id = %id, error = %err, "catch-up sync errored");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
