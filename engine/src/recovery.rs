//! Recovery ledger: a pure state machine over recovery scopes.
//!
//! A scope is a named unit of volatile in-memory state (an in-progress game,
//! an unsent import, ...). The ledger tracks each scope through
//! `Clean -> Dirty` (on mutation) `-> Snapshotted` (on save) `-> Clean`
//! (on claim or confirmed persistence), with snapshots aging out instead of
//! being restored arbitrarily late.
//!
//! The ledger does no I/O and takes `now` as a parameter; the client layer
//! persists it as a JSON document and supplies real time.

use crate::error::{Error, Result};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the ledger document format.
pub const LEDGER_FORMAT_VERSION: u32 = 1;

/// A snapshot younger than this belongs to a possibly-crashed session.
pub const CRASH_WINDOW_MS: u64 = 10_000;
/// A snapshot younger than this is considered recent.
pub const RECENT_WINDOW_MS: u64 = 5 * 60 * 1000;
/// Snapshots older than this are discarded unclaimed, never restored.
pub const HARD_CEILING_MS: u64 = 10 * 60 * 1000;

/// Age classification of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Freshness {
    /// Saved moments ago; the owning session likely just crashed.
    PossiblyCrashed,
    /// Saved within the recent window.
    Recent,
    /// Beyond the recent window but still under the hard ceiling.
    Stale,
}

/// Classify a snapshot age in milliseconds.
pub fn classify(age_ms: u64) -> Freshness {
    if age_ms < CRASH_WINDOW_MS {
        Freshness::PossiblyCrashed
    } else if age_ms < RECENT_WINDOW_MS {
        Freshness::Recent
    } else {
        Freshness::Stale
    }
}

/// State of one recovery scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeState {
    Clean,
    Dirty,
    Snapshotted,
    Stale,
}

/// A persisted point-in-time copy of one scope's volatile state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySnapshot {
    pub scope_key: String,
    pub payload: serde_json::Value,
    /// Milliseconds since epoch.
    pub saved_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeEntry {
    state: ScopeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<RecoverySnapshot>,
}

/// The ledger of all recovery scopes.
///
/// BTreeMap keeps serialization deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryLedger {
    format_version: u32,
    scopes: BTreeMap<String, ScopeEntry>,
}

impl Default for RecoveryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryLedger {
    pub fn new() -> Self {
        Self {
            format_version: LEDGER_FORMAT_VERSION,
            scopes: BTreeMap::new(),
        }
    }

    /// Mark a scope dirty: its in-memory state has diverged from any
    /// snapshot. No-op transition-wise if a snapshot exists; the snapshot is
    /// kept until superseded by the next save.
    pub fn mark_dirty(&mut self, scope_key: &str) {
        let entry = self.scopes.entry(scope_key.to_string()).or_insert(ScopeEntry {
            state: ScopeState::Clean,
            snapshot: None,
        });
        entry.state = ScopeState::Dirty;
    }

    /// Record a snapshot for a scope. Supersedes any previous snapshot.
    pub fn record_snapshot(
        &mut self,
        scope_key: &str,
        payload: serde_json::Value,
        now: Timestamp,
    ) {
        self.scopes.insert(
            scope_key.to_string(),
            ScopeEntry {
                state: ScopeState::Snapshotted,
                snapshot: Some(RecoverySnapshot {
                    scope_key: scope_key.to_string(),
                    payload,
                    saved_at: now,
                }),
            },
        );
    }

    /// Confirm a scope's state is durably held by its owner; drops the
    /// snapshot.
    pub fn mark_clean(&mut self, scope_key: &str) {
        if let Some(entry) = self.scopes.get_mut(scope_key) {
            entry.state = ScopeState::Clean;
            entry.snapshot = None;
        }
    }

    /// Whether any scope is dirty.
    pub fn has_dirty(&self) -> bool {
        self.scopes
            .values()
            .any(|e| e.state == ScopeState::Dirty)
    }

    /// Keys of all dirty scopes.
    pub fn dirty_scopes(&self) -> Vec<String> {
        self.scopes
            .iter()
            .filter(|(_, e)| e.state == ScopeState::Dirty)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Unclaimed snapshots that would be restored at `now`, with their ages.
    /// Snapshots past the hard ceiling are excluded (and marked stale).
    pub fn recoverable(&mut self, now: Timestamp) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        for (key, entry) in &mut self.scopes {
            let Some(snapshot) = &entry.snapshot else {
                continue;
            };
            let age = now.saturating_sub(snapshot.saved_at);
            if age > HARD_CEILING_MS {
                entry.state = ScopeState::Stale;
                continue;
            }
            out.push((key.clone(), age));
        }
        out
    }

    /// Claim every restorable snapshot.
    ///
    /// Claimed scopes become Clean, so calling this again is a no-op for
    /// them. Snapshots past the hard ceiling are discarded unclaimed rather
    /// than resurrecting arbitrarily old partial state.
    pub fn take_recoverable(&mut self, now: Timestamp) -> Vec<RecoverySnapshot> {
        let mut out = Vec::new();
        for entry in self.scopes.values_mut() {
            let Some(snapshot) = entry.snapshot.take() else {
                continue;
            };
            let age = now.saturating_sub(snapshot.saved_at);
            if age > HARD_CEILING_MS {
                entry.state = ScopeState::Clean;
                continue;
            }
            entry.state = ScopeState::Clean;
            out.push(snapshot);
        }
        out
    }

    /// Drop expired snapshots and forget clean scopes with nothing pending.
    pub fn gc(&mut self, now: Timestamp) {
        for entry in self.scopes.values_mut() {
            let expired = entry
                .snapshot
                .as_ref()
                .is_some_and(|s| now.saturating_sub(s.saved_at) > HARD_CEILING_MS);
            if expired {
                entry.snapshot = None;
                entry.state = ScopeState::Clean;
            }
        }
        self.scopes
            .retain(|_, e| e.state != ScopeState::Clean || e.snapshot.is_some());
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidLedger(e.to_string()))
    }

    /// Deserialize from JSON, rejecting documents from a newer format.
    pub fn from_json(json: &str) -> Result<Self> {
        let ledger: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidLedger(e.to_string()))?;
        if ledger.format_version > LEDGER_FORMAT_VERSION {
            return Err(Error::InvalidLedger(format!(
                "unsupported ledger format version: {} (max supported: {})",
                ledger.format_version, LEDGER_FORMAT_VERSION
            )));
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dirty_then_snapshot_then_clean() {
        let mut ledger = RecoveryLedger::new();
        assert!(!ledger.has_dirty());

        ledger.mark_dirty("active-game");
        assert!(ledger.has_dirty());
        assert_eq!(ledger.dirty_scopes(), vec!["active-game".to_string()]);

        ledger.record_snapshot("active-game", json!({"round": 3}), 1000);
        assert!(!ledger.has_dirty());

        ledger.mark_clean("active-game");
        assert!(ledger.recoverable(2000).is_empty());
    }

    #[test]
    fn take_recoverable_claims_exactly_once() {
        let mut ledger = RecoveryLedger::new();
        ledger.record_snapshot("active-game", json!({"round": 3}), 1000);

        let restored = ledger.take_recoverable(5000);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].scope_key, "active-game");
        assert_eq!(restored[0].payload, json!({"round": 3}));

        // Idempotent: the scope is Clean now.
        assert!(ledger.take_recoverable(5000).is_empty());
    }

    #[test]
    fn snapshot_past_ceiling_is_discarded_unclaimed() {
        let mut ledger = RecoveryLedger::new();
        ledger.record_snapshot("old", json!({"x": 1}), 1000);
        ledger.record_snapshot("fresh", json!({"x": 2}), 1000 + HARD_CEILING_MS);

        let now = 1000 + HARD_CEILING_MS + 1;
        assert_eq!(
            ledger.recoverable(now),
            vec![("fresh".to_string(), 1)]
        );

        let restored = ledger.take_recoverable(now);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].scope_key, "fresh");
    }

    #[test]
    fn newer_snapshot_supersedes_older() {
        let mut ledger = RecoveryLedger::new();
        ledger.record_snapshot("scope", json!({"v": 1}), 1000);
        ledger.record_snapshot("scope", json!({"v": 2}), 2000);

        let restored = ledger.take_recoverable(3000);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].payload, json!({"v": 2}));
    }

    #[test]
    fn gc_drops_expired_and_clean() {
        let mut ledger = RecoveryLedger::new();
        ledger.record_snapshot("old", json!({}), 0);
        ledger.record_snapshot("fresh", json!({}), HARD_CEILING_MS);
        ledger.mark_dirty("pending");

        ledger.gc(HARD_CEILING_MS + 1);

        assert!(ledger.recoverable(HARD_CEILING_MS + 1).iter().all(|(k, _)| k == "fresh"));
        assert!(ledger.dirty_scopes().contains(&"pending".to_string()));
    }

    #[test]
    fn classify_windows() {
        assert_eq!(classify(0), Freshness::PossiblyCrashed);
        assert_eq!(classify(CRASH_WINDOW_MS - 1), Freshness::PossiblyCrashed);
        assert_eq!(classify(CRASH_WINDOW_MS), Freshness::Recent);
        assert_eq!(classify(RECENT_WINDOW_MS), Freshness::Stale);
    }

    #[test]
    fn json_roundtrip() {
        let mut ledger = RecoveryLedger::new();
        ledger.record_snapshot("scope-a", json!({"round": 1}), 1000);
        ledger.mark_dirty("scope-b");

        let json = ledger.to_json().unwrap();
        let restored = RecoveryLedger::from_json(&json).unwrap();
        assert_eq!(ledger, restored);
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{"formatVersion": 999, "scopes": {}}"#;
        assert!(matches!(
            RecoveryLedger::from_json(json),
            Err(Error::InvalidLedger(_))
        ));
    }
}
