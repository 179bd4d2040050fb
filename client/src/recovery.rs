//! Recovery manager.
//!
//! Drives the engine's [`RecoveryLedger`] with real time and persistence.
//! Owning components register a recovery scope with a payload provider (how
//! to snapshot their volatile state) and a restore handler (how to take it
//! back). The ledger itself is persisted as one JSON document, so a crashed
//! or disconnected session leaves its snapshots behind for the next one.
//!
//! Recovery is best-effort by design: snapshot read/write failures are
//! logged and never block the operation that triggered them.

use crate::config::ClientConfig;
use crate::storage::StorageBackend;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tally_engine::recovery::{classify, Freshness, RecoveryLedger};
use tally_engine::Timestamp;
use tokio::sync::Mutex;

/// Default storage key for the recovery ledger document.
pub const RECOVERY_STORAGE_KEY: &str = "tally.recovery";

/// Options for [`RecoveryManager::save_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Bypass the debounce window. Used on disconnect edges, where the save
    /// must be issued before control returns.
    pub immediate: bool,
}

impl SaveOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

/// One recoverable scope and the age of its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeAge {
    pub scope_key: String,
    pub age_ms: u64,
    pub freshness: Freshness,
}

/// Report from [`RecoveryManager::has_recoverable_state`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub has_recovery: bool,
    pub states: Vec<ScopeAge>,
}

/// Produces a scope's snapshot payload on demand.
pub type PayloadProvider = Box<dyn Fn() -> serde_json::Value + Send + Sync>;
/// Hands a restored snapshot payload back to its owning scope.
pub type RestoreHandler = Box<dyn Fn(serde_json::Value) + Send + Sync>;
/// Millisecond clock, injectable for tests.
pub type ClockFn = Box<dyn Fn() -> Timestamp + Send + Sync>;

struct ScopeHooks {
    provider: PayloadProvider,
    restore: RestoreHandler,
}

struct Inner {
    ledger: RecoveryLedger,
    scopes: HashMap<String, ScopeHooks>,
    last_save_at: Timestamp,
}

/// Snapshots volatile state on a cadence or on disconnect, and restores it
/// after a crash or stale session.
pub struct RecoveryManager {
    backend: Arc<dyn StorageBackend>,
    key: String,
    debounce_ms: u64,
    clock: ClockFn,
    inner: Mutex<Inner>,
}

fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RecoveryManager {
    /// Open a manager over the given backend, loading any persisted ledger.
    pub async fn open(backend: Arc<dyn StorageBackend>, config: &ClientConfig) -> Self {
        Self::open_with_clock(backend, config, Box::new(now_ms)).await
    }

    /// As [`Self::open`], with an injected clock. Used by tests to simulate
    /// the passage of time across restarts.
    pub async fn open_with_clock(
        backend: Arc<dyn StorageBackend>,
        config: &ClientConfig,
        clock: ClockFn,
    ) -> Self {
        let key = config.recovery_key.clone();
        let ledger = match backend.read(&key).await {
            Ok(Some(doc)) => match RecoveryLedger::from_json(&doc) {
                Ok(ledger) => ledger,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding unreadable recovery ledger");
                    RecoveryLedger::new()
                }
            },
            Ok(None) => RecoveryLedger::new(),
            Err(err) => {
                tracing::warn!(error = %err, "recovery ledger unavailable, starting fresh");
                RecoveryLedger::new()
            }
        };
        Self {
            backend,
            key,
            debounce_ms: config.save_debounce_ms,
            clock,
            inner: Mutex::new(Inner {
                ledger,
                scopes: HashMap::new(),
                last_save_at: 0,
            }),
        }
    }

    /// Register a recovery scope with its snapshot provider and restore
    /// handler. Re-registering replaces the hooks.
    pub async fn register_scope<P, R>(&self, scope_key: &str, provider: P, restore: R)
    where
        P: Fn() -> serde_json::Value + Send + Sync + 'static,
        R: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner.scopes.insert(
            scope_key.to_string(),
            ScopeHooks {
                provider: Box::new(provider),
                restore: Box::new(restore),
            },
        );
    }

    /// Mark a scope's in-memory state as diverged from its last snapshot.
    pub async fn mark_dirty(&self, scope_key: &str) {
        let mut inner = self.inner.lock().await;
        inner.ledger.mark_dirty(scope_key);
    }

    /// Confirm a scope's state is durably held by its owner.
    pub async fn mark_clean(&self, scope_key: &str) {
        let mut inner = self.inner.lock().await;
        inner.ledger.mark_clean(scope_key);
        self.persist(&inner).await;
    }

    /// Snapshot every dirty scope and persist the ledger.
    ///
    /// Without `immediate`, calls within the debounce window are skipped.
    pub async fn save_all(&self, options: SaveOptions) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = (self.clock)();
        if !options.immediate && now.saturating_sub(inner.last_save_at) < self.debounce_ms {
            return;
        }

        for scope_key in inner.ledger.dirty_scopes() {
            let Some(hooks) = inner.scopes.get(&scope_key) else {
                tracing::debug!(scope = %scope_key, "dirty scope has no registered provider");
                continue;
            };
            let payload = (hooks.provider)();
            inner.ledger.record_snapshot(&scope_key, payload, now);
        }
        inner.last_save_at = now;
        self.persist(inner).await;
    }

    /// Report scopes whose snapshots would be restored right now.
    pub async fn has_recoverable_state(&self) -> RecoveryReport {
        let mut inner = self.inner.lock().await;
        let now = (self.clock)();
        let states: Vec<ScopeAge> = inner
            .ledger
            .recoverable(now)
            .into_iter()
            .map(|(scope_key, age_ms)| ScopeAge {
                scope_key,
                age_ms,
                freshness: classify(age_ms),
            })
            .collect();
        RecoveryReport {
            has_recovery: !states.is_empty(),
            states,
        }
    }

    /// Restore all unclaimed, unexpired snapshots to their owning scopes.
    ///
    /// Returns the scope keys successfully restored. Idempotent: claimed
    /// scopes are Clean afterwards, so repeated calls (cold start followed
    /// by reconnect) are no-ops. Snapshots whose owner has not registered
    /// yet are left unclaimed for a later call.
    pub async fn attempt_recovery(&self) -> Vec<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = (self.clock)();
        let mut restored = Vec::new();
        for snapshot in inner.ledger.take_recoverable(now) {
            match inner.scopes.get(&snapshot.scope_key) {
                Some(hooks) => {
                    (hooks.restore)(snapshot.payload);
                    tracing::info!(scope = %snapshot.scope_key, "restored recovery snapshot");
                    restored.push(snapshot.scope_key);
                }
                None => {
                    // Put it back, preserving its age.
                    inner.ledger.record_snapshot(
                        &snapshot.scope_key,
                        snapshot.payload,
                        snapshot.saved_at,
                    );
                }
            }
        }
        inner.ledger.gc(now);
        self.persist(inner).await;
        restored
    }

    async fn persist(&self, inner: &Inner) {
        let doc = match inner.ledger.to_json() {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, "could not serialize recovery ledger");
                return;
            }
        };
        if let Err(err) = self.backend.write(&self.key, &doc).await {
            tracing::warn!(error = %err, "could not persist recovery ledger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fixed_clock(at: Arc<AtomicU64>) -> ClockFn {
        Box::new(move || at.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn debounce_skips_rapid_saves() {
        let backend = Arc::new(MemoryBackend::new());
        let time = Arc::new(AtomicU64::new(10_000));
        let config = ClientConfig::default();
        let manager =
            RecoveryManager::open_with_clock(backend.clone(), &config, fixed_clock(time.clone()))
                .await;

        manager
            .register_scope("game", || json!({"v": 1}), |_| {})
            .await;
        manager.mark_dirty("game").await;
        manager.save_all(SaveOptions::default()).await;
        assert!(manager.has_recoverable_state().await.has_recovery);

        // A second non-immediate save inside the debounce window is skipped.
        manager.mark_dirty("game").await;
        manager.save_all(SaveOptions::default()).await;
        // But an immediate one is not.
        manager.save_all(SaveOptions::immediate()).await;
        assert!(manager.has_recoverable_state().await.has_recovery);
    }

    #[tokio::test]
    async fn unregistered_scope_snapshot_waits_for_owner() {
        let backend = Arc::new(MemoryBackend::new());
        let time = Arc::new(AtomicU64::new(10_000));
        let config = ClientConfig::default();
        let manager =
            RecoveryManager::open_with_clock(backend.clone(), &config, fixed_clock(time.clone()))
                .await;
        manager
            .register_scope("game", || json!({"round": 2}), |_| {})
            .await;
        manager.mark_dirty("game").await;
        manager.save_all(SaveOptions::immediate()).await;

        // New session where the owner hasn't registered yet.
        let other = RecoveryManager::open_with_clock(backend, &config, fixed_clock(time)).await;
        assert!(other.attempt_recovery().await.is_empty());
        assert!(other.has_recoverable_state().await.has_recovery);
    }
}
