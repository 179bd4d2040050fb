//! Persistent local storage seam.
//!
//! The store is a keyed map of whole JSON documents: callers read a full
//! document, mutate, and write the full document back. There are no
//! partial-field updates at this layer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors.
///
/// `Exhausted` is distinct from `Io` so callers can prompt the user instead
/// of retrying: a capacity failure will not resolve itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage exhausted: {0}")]
    Exhausted(String),

    #[error("storage io error: {0}")]
    Io(String),
}

/// Whole-document persistent storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the document under `key`, if any.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the document under `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the document under `key`. Removing a missing key is not an
    /// error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory backend for tests and tooling.
///
/// An optional byte capacity simulates quota exhaustion.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that fails writes once the total stored bytes would exceed
    /// `capacity_bytes`.
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    fn stored_bytes(docs: &HashMap<String, String>) -> usize {
        docs.values().map(|v| v.len()).sum()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let docs = self.docs.lock().expect("storage lock poisoned");
        Ok(docs.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut docs = self.docs.lock().expect("storage lock poisoned");
        if let Some(capacity) = self.capacity_bytes {
            let existing = docs.get(key).map(|v| v.len()).unwrap_or(0);
            let projected = Self::stored_bytes(&docs) - existing + value.len();
            if projected > capacity {
                return Err(StorageError::Exhausted(format!(
                    "{projected} bytes exceeds capacity of {capacity}"
                )));
            }
        }
        docs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut docs = self.docs.lock().expect("storage lock poisoned");
        docs.remove(key);
        Ok(())
    }
}

/// File-backed storage: one JSON document per key under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write never leaves a truncated document.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants, but keep the filename safe anyway.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    fn map_io(err: std::io::Error) -> StorageError {
        match err.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => {
                StorageError::Exhausted(err.to_string())
            }
            _ => StorageError::Io(err.to_string()),
        }
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io(e)),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(Self::map_io)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await.map_err(Self::map_io)?;
        tokio::fs::rename(&tmp, &path).await.map_err(Self::map_io)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.read("k").await.unwrap(), None);

        backend.write("k", "v1").await.unwrap();
        assert_eq!(backend.read("k").await.unwrap(), Some("v1".to_string()));

        backend.write("k", "v2").await.unwrap();
        assert_eq!(backend.read("k").await.unwrap(), Some("v2".to_string()));

        backend.remove("k").await.unwrap();
        assert_eq!(backend.read("k").await.unwrap(), None);
        // Removing a missing key is fine.
        backend.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn memory_backend_reports_exhaustion() {
        let backend = MemoryBackend::with_capacity(8);
        backend.write("a", "1234").await.unwrap();
        let err = backend.write("b", "123456").await.unwrap_err();
        assert!(matches!(err, StorageError::Exhausted(_)));
        // Replacing an existing document within capacity still works.
        backend.write("a", "12345678").await.unwrap();
    }

    #[tokio::test]
    async fn file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        assert_eq!(backend.read("tally.games").await.unwrap(), None);
        backend.write("tally.games", "{}").await.unwrap();
        assert_eq!(
            backend.read("tally.games").await.unwrap(),
            Some("{}".to_string())
        );
        backend.remove("tally.games").await.unwrap();
        assert_eq!(backend.read("tally.games").await.unwrap(), None);
    }
}
