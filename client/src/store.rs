//! Local record store.
//!
//! A keyed map of `game_id -> GameRecord` serialized as one JSON document
//! under a single well-known storage key. Every operation reads the whole
//! map, mutates it, and writes the whole map back; the per-record
//! `sync_status` field is the only concurrency-control token, so mutating
//! operations verify it hasn't changed since read.

use crate::error::{ClientError, Result};
use crate::storage::StorageBackend;
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_engine::{GameId, GameRecord, RecordSource, RemoteId, SyncStatus};

/// Default storage key for the games document.
pub const GAMES_STORAGE_KEY: &str = "tally.games";

type GameMap = BTreeMap<GameId, GameRecord>;

/// Mint a fresh local game id.
pub fn new_game_id() -> GameId {
    uuid::Uuid::new_v4().to_string()
}

/// The persistent map of game records.
pub struct LocalRecordStore {
    backend: Arc<dyn StorageBackend>,
    key: String,
    // Serializes read-modify-write cycles within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalRecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_key(backend, GAMES_STORAGE_KEY)
    }

    pub fn with_key(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the full map.
    pub async fn load(&self) -> Result<GameMap> {
        let Some(doc) = self.backend.read(&self.key).await? else {
            return Ok(GameMap::new());
        };
        serde_json::from_str(&doc).map_err(|e| ClientError::CorruptDocument {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, map: &GameMap) -> Result<()> {
        let doc = serde_json::to_string(map).map_err(|e| ClientError::CorruptDocument {
            key: self.key.clone(),
            reason: e.to_string(),
        })?;
        self.backend.write(&self.key, &doc).await?;
        Ok(())
    }

    /// Get one record.
    pub async fn get(&self, id: &str) -> Result<Option<GameRecord>> {
        Ok(self.load().await?.remove(id))
    }

    /// All records, in id order.
    pub async fn list(&self) -> Result<Vec<GameRecord>> {
        Ok(self.load().await?.into_values().collect())
    }

    /// Ids of records still awaiting upload. Imported records are excluded:
    /// they are synced by construction.
    pub async fn unsynced_ids(&self) -> Result<Vec<GameId>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|(_, r)| r.sync_status == SyncStatus::Unsynced && !r.is_imported())
            .map(|(id, _)| id)
            .collect())
    }

    /// Insert a record.
    ///
    /// Refreshes the cached content hash and enforces the duplicate
    /// invariant: if another record with the same content hash is already
    /// Synced, the new record adopts its remote id instead of ever holding a
    /// distinct one.
    pub async fn insert(&self, mut record: GameRecord) -> Result<GameId> {
        let _guard = self.write_lock.lock().await;
        record.refresh_content_hash();

        let mut map = self.load().await?;
        if let Some(remote_id) = synced_duplicate(&map, &record) {
            record.mark_synced(remote_id);
        }
        let id = record.id.clone();
        map.insert(id.clone(), record);
        self.save(&map).await?;
        Ok(id)
    }

    /// Find an already-Synced record with identical content and return its
    /// remote id.
    pub async fn find_synced_duplicate(&self, record: &GameRecord) -> Result<Option<RemoteId>> {
        let map = self.load().await?;
        Ok(synced_duplicate(&map, record))
    }

    /// Transition a record `Unsynced -> Syncing`.
    ///
    /// Returns false without writing if the record is not currently
    /// Unsynced: the status changed since the caller read it, and the caller
    /// must re-read rather than proceed.
    pub async fn begin_sync(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let record = map
            .get_mut(id)
            .ok_or_else(|| ClientError::RecordNotFound(id.to_string()))?;
        if record.sync_status != SyncStatus::Unsynced {
            return Ok(false);
        }
        record.sync_status = SyncStatus::Syncing;
        self.save(&map).await?;
        Ok(true)
    }

    /// Transition a record `Syncing -> Synced`, adopting a remote identity.
    ///
    /// If another record with the same content hash became Synced in the
    /// meantime, its remote id wins and `remote_id` is discarded.
    pub async fn complete_sync(&self, id: &str, remote_id: RemoteId) -> Result<RemoteId> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let record = map
            .get(id)
            .ok_or_else(|| ClientError::RecordNotFound(id.to_string()))?;
        let adopted = synced_duplicate(&map, record).unwrap_or(remote_id);
        if let Some(record) = map.get_mut(id) {
            record.mark_synced(adopted.clone());
        }
        self.save(&map).await?;
        Ok(adopted)
    }

    /// Transition a record `Syncing -> Unsynced` after a failed upload.
    pub async fn abort_sync(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        if let Some(record) = map.get_mut(id) {
            if record.sync_status == SyncStatus::Syncing {
                record.mark_unsynced();
                self.save(&map).await?;
            }
        }
        Ok(())
    }

    /// Atomically insert a batch of validated imported records.
    ///
    /// Either every record lands or none does; a storage failure midway is
    /// impossible because the map is written once.
    pub async fn import(&self, records: BTreeMap<GameId, GameRecord>) -> Result<Vec<GameId>> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let mut imported = Vec::with_capacity(records.len());
        for (id, mut record) in records {
            record.source = RecordSource::Imported;
            record.refresh_content_hash();
            if let Some(remote_id) = synced_duplicate(&map, &record) {
                record.mark_synced(remote_id);
            }
            record.id = id.clone();
            map.insert(id.clone(), record);
            imported.push(id);
        }
        self.save(&map).await?;
        Ok(imported)
    }

    /// Delete a record. Only ever driven by explicit user action.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let removed = map.remove(id).is_some();
        if removed {
            self.save(&map).await?;
        }
        Ok(removed)
    }
}

fn synced_duplicate(map: &GameMap, record: &GameRecord) -> Option<RemoteId> {
    map.values()
        .filter(|other| other.id != record.id)
        .filter(|other| other.is_synced() && other.content_hash == record.content_hash)
        .find_map(|other| other.remote_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::collections::BTreeMap as Map;
    use tally_engine::{GameMode, Player, PlayerRound, Round};

    fn sample(id: &str) -> GameRecord {
        let players = vec![
            Player {
                id: "p1".into(),
                name: "Alice".into(),
            },
            Player {
                id: "p2".into(),
                name: "Bob".into(),
            },
        ];
        let rounds = vec![Round {
            round_number: 1,
            cards_in_round: 7,
            per_player: vec![PlayerRound {
                player_id: "p1".into(),
                bid: 2,
                made: 2,
                round_score: 12,
                cumulative_score: 12,
            }],
        }];
        let mut scores = Map::new();
        scores.insert("p1".to_string(), 12);
        scores.insert("p2".to_string(), 3);
        GameRecord::new(id, players, rounds, scores, GameMode::Classic, 1000, 60)
    }

    fn store() -> LocalRecordStore {
        LocalRecordStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = store();
        store.insert(sample("g1")).await.unwrap();
        let record = store.get("g1").await.unwrap().unwrap();
        assert_eq!(record.id, "g1");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn minted_ids_are_unique() {
        let store = store();
        let a = store.insert(sample(&new_game_id())).await.unwrap();
        let b = store.insert(sample(&new_game_id())).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_transitions_check_current_state() {
        let store = store();
        store.insert(sample("g1")).await.unwrap();

        assert!(store.begin_sync("g1").await.unwrap());
        // Already Syncing: a second transition is refused.
        assert!(!store.begin_sync("g1").await.unwrap());

        store.complete_sync("g1", "remote-1".into()).await.unwrap();
        let record = store.get("g1").await.unwrap().unwrap();
        assert!(record.is_synced());
        assert_eq!(record.remote_id.as_deref(), Some("remote-1"));

        // Synced records refuse another sync cycle.
        assert!(!store.begin_sync("g1").await.unwrap());
    }

    #[tokio::test]
    async fn abort_sync_reverts_to_unsynced() {
        let store = store();
        store.insert(sample("g1")).await.unwrap();
        store.begin_sync("g1").await.unwrap();
        store.abort_sync("g1").await.unwrap();
        let record = store.get("g1").await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Unsynced);
    }

    #[tokio::test]
    async fn duplicate_content_adopts_existing_remote_id() {
        let store = store();
        store.insert(sample("g1")).await.unwrap();
        store.begin_sync("g1").await.unwrap();
        store.complete_sync("g1", "remote-1".into()).await.unwrap();

        // Same content, different local id: insert adopts the remote id.
        store.insert(sample("g2")).await.unwrap();
        let record = store.get("g2").await.unwrap().unwrap();
        assert!(record.is_synced());
        assert_eq!(record.remote_id.as_deref(), Some("remote-1"));
    }

    #[tokio::test]
    async fn unsynced_ids_excludes_imported_and_synced() {
        let store = store();
        store.insert(sample("g1")).await.unwrap();

        let mut imported = sample("g2");
        imported.rounds[0].per_player[0].round_score = 99;
        imported.source = RecordSource::Imported;
        let mut batch = Map::new();
        batch.insert("g2".to_string(), imported);
        store.import(batch).await.unwrap();

        assert_eq!(store.unsynced_ids().await.unwrap(), vec!["g1".to_string()]);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = LocalRecordStore::new(backend.clone());
            store.insert(sample("g1")).await.unwrap();
        }
        let reopened = LocalRecordStore::new(backend);
        assert!(reopened.get("g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn exhausted_backend_surfaces_distinctly() {
        let store = LocalRecordStore::new(Arc::new(MemoryBackend::with_capacity(64)));
        let err = store.insert(sample("g1")).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Storage(crate::storage::StorageError::Exhausted(_))
        ));
        // Nothing was stored: the failed write is not partially applied.
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_explicit() {
        let store = store();
        store.insert(sample("g1")).await.unwrap();
        assert!(store.delete("g1").await.unwrap());
        assert!(!store.delete("g1").await.unwrap());
    }
}
