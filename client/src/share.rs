//! Shared-record resolution and import.
//!
//! Two entry routes bring external records in. Share links name one record
//! by its remote id and resolve against the remote store. Legacy bulk
//! payloads carry base64-encoded JSON produced by untrusted peers; they pass
//! through [`ShareValidator`] before anything reaches local storage. Both
//! routes produce imported records: synced by construction, never uploaded.

use crate::error::{ClientError, Result};
use crate::remote::RemoteBackend;
use crate::storage::StorageBackend;
use crate::store::LocalRecordStore;
use serde::{Deserialize, Serialize};
use tally_engine::validate::ShareValidator;
use tally_engine::{GameId, RecordSource, Timestamp};

/// Storage key for a pending legacy bulk share awaiting import.
pub const PENDING_SHARE_KEY: &str = "tally.pendingShare";

/// Extract the remote id from a share link path of the form `/shared/{id}`.
///
/// Returns `None` for any other path shape, including trailing segments.
pub fn parse_shared_path(path: &str) -> Option<&str> {
    let id = path.strip_prefix("/shared/")?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}

/// Resolve a share link: fetch the record from the remote store and insert
/// it locally as an imported record.
pub async fn resolve_shared(
    remote: &dyn RemoteBackend,
    store: &LocalRecordStore,
    remote_id: &str,
) -> Result<GameId> {
    let mut record = remote
        .fetch(remote_id)
        .await
        .map_err(ClientError::Remote)?
        .ok_or_else(|| ClientError::SharedNotFound(remote_id.to_string()))?;
    record.source = RecordSource::Imported;
    record.mark_synced(remote_id.to_string());
    tracing::info!(remote_id = %remote_id, game_id = %record.id, "resolved shared record");
    store.insert(record).await
}

/// A bulk share payload from the legacy export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBulkShare {
    /// Base64-encoded JSON map of `game_id -> shared game`.
    pub payload: String,
    /// Expiry instant in milliseconds since the epoch, if the share carries
    /// one.
    pub expires_at: Option<Timestamp>,
}

impl LegacyBulkShare {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Persist a bulk share so it survives a restart until imported or expired.
pub async fn stash_bulk_share(
    backend: &dyn StorageBackend,
    share: &LegacyBulkShare,
) -> Result<()> {
    let doc = serde_json::to_string(share).map_err(|e| ClientError::CorruptDocument {
        key: PENDING_SHARE_KEY.to_string(),
        reason: e.to_string(),
    })?;
    backend.write(PENDING_SHARE_KEY, &doc).await?;
    Ok(())
}

/// Load the pending bulk share, if one is stored.
pub async fn pending_bulk_share(backend: &dyn StorageBackend) -> Result<Option<LegacyBulkShare>> {
    let Some(doc) = backend.read(PENDING_SHARE_KEY).await? else {
        return Ok(None);
    };
    serde_json::from_str(&doc)
        .map(Some)
        .map_err(|e| ClientError::CorruptDocument {
            key: PENDING_SHARE_KEY.to_string(),
            reason: e.to_string(),
        })
}

/// Validate and import a legacy bulk share atomically.
///
/// Expired shares are refused before any decoding. A payload that fails
/// validation imports nothing and stays stored for another attempt. The
/// stored entry is removed once the share is consumed or found expired.
pub async fn import_bulk(
    backend: &dyn StorageBackend,
    store: &LocalRecordStore,
    validator: &ShareValidator,
    share: &LegacyBulkShare,
    now: Timestamp,
) -> Result<Vec<GameId>> {
    if share.is_expired(now) {
        backend.remove(PENDING_SHARE_KEY).await?;
        return Err(ClientError::ShareExpired);
    }
    let records = validator.validate_bulk(&share.payload)?;
    let imported = store.import(records).await?;
    backend.remove(PENDING_SHARE_KEY).await?;
    tracing::info!(count = imported.len(), "imported bulk share");
    Ok(imported)
}
