//! Remote backend seam.
//!
//! The remote store is the long-term source of truth. The client only ever
//! issues single fallible calls against it: create a record, query duplicate
//! candidates by lookup key, or fetch a shared record by id. No
//! transactionality is assumed beyond one call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tally_engine::{lookup_key, GameRecord, RemoteCandidate, RemoteId};
use thiserror::Error;

/// Categorized remote failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("quota exceeded")]
    Quota,

    #[error("remote rejected record: {0}")]
    Validation(String),
}

/// The remote record store.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Create a record remotely, returning its remote id.
    async fn create(&self, record: &GameRecord) -> Result<RemoteId, RemoteError>;

    /// Fetch summaries of remote records matching a lookup key.
    async fn query(&self, key: &str) -> Result<Vec<RemoteCandidate>, RemoteError>;

    /// Fetch a shared record by its remote id.
    async fn fetch(&self, remote_id: &str) -> Result<Option<GameRecord>, RemoteError>;
}

/// In-memory remote backend for tests.
///
/// Counts create calls and can be told to fail, so tests can assert on
/// idempotence and failure handling.
#[derive(Default)]
pub struct MemoryRemote {
    records: Mutex<HashMap<RemoteId, GameRecord>>,
    create_calls: AtomicUsize,
    fail_next: Mutex<Option<RemoteError>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create calls issued so far.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of records held remotely.
    pub fn record_count(&self) -> usize {
        self.records.lock().expect("remote lock poisoned").len()
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: RemoteError) {
        *self.fail_next.lock().expect("remote lock poisoned") = Some(err);
    }

    /// Delay every call, to widen race windows in concurrency tests.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("remote lock poisoned") = Some(latency);
    }

    /// Seed a record directly, as if another device had uploaded it.
    pub fn seed(&self, remote_id: &str, mut record: GameRecord) {
        record.refresh_content_hash();
        self.records
            .lock()
            .expect("remote lock poisoned")
            .insert(remote_id.to_string(), record);
    }

    async fn interject(&self) -> Result<(), RemoteError> {
        let latency = *self.latency.lock().expect("remote lock poisoned");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.fail_next.lock().expect("remote lock poisoned").take();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemote {
    async fn create(&self, record: &GameRecord) -> Result<RemoteId, RemoteError> {
        self.interject().await?;
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let remote_id = format!("r-{n}");
        let mut stored = record.clone();
        stored.mark_synced(remote_id.clone());
        self.records
            .lock()
            .expect("remote lock poisoned")
            .insert(remote_id.clone(), stored);
        Ok(remote_id)
    }

    async fn query(&self, key: &str) -> Result<Vec<RemoteCandidate>, RemoteError> {
        self.interject().await?;
        let records = self.records.lock().expect("remote lock poisoned");
        Ok(records
            .iter()
            .filter(|(_, record)| lookup_key(record) == key)
            .map(|(remote_id, record)| RemoteCandidate {
                remote_id: remote_id.clone(),
                player_count: record.players.len(),
                total_rounds: record.total_rounds,
                final_scores: record.final_scores.clone(),
            })
            .collect())
    }

    async fn fetch(&self, remote_id: &str) -> Result<Option<GameRecord>, RemoteError> {
        self.interject().await?;
        let records = self.records.lock().expect("remote lock poisoned");
        Ok(records.get(remote_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tally_engine::{GameMode, Player};

    fn sample() -> GameRecord {
        let players = vec![Player {
            id: "p1".into(),
            name: "Alice".into(),
        }];
        let mut scores = BTreeMap::new();
        scores.insert("p1".to_string(), 10);
        GameRecord::new("g1", players, vec![], scores, GameMode::Rapid, 1000, 60)
    }

    #[tokio::test]
    async fn create_then_query_finds_candidate() {
        let remote = MemoryRemote::new();
        let record = sample();
        let remote_id = remote.create(&record).await.unwrap();
        assert_eq!(remote.create_calls(), 1);

        let candidates = remote.query(&lookup_key(&record)).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].remote_id, remote_id);
        assert!(remote.query("nobody:0:classic").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_next_applies_once() {
        let remote = MemoryRemote::new();
        remote.fail_next(RemoteError::AuthRequired);
        assert_eq!(
            remote.create(&sample()).await,
            Err(RemoteError::AuthRequired)
        );
        assert!(remote.create(&sample()).await.is_ok());
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test]
    async fn fetch_by_remote_id() {
        let remote = MemoryRemote::new();
        remote.seed("r-shared", sample());
        assert!(remote.fetch("r-shared").await.unwrap().is_some());
        assert!(remote.fetch("r-missing").await.unwrap().is_none());
    }
}
