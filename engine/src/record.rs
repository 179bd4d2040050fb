//! Game record types and bounds.

use crate::{GameId, PlayerId, RemoteId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of players in a single game.
pub const MAX_PLAYERS: usize = 20;
/// Maximum number of rounds in a single game.
pub const MAX_ROUNDS: u32 = 1000;
/// Maximum length of a player name after sanitization.
pub const MAX_NAME_LEN: usize = 50;
/// Lower bound for any score-like value.
pub const SCORE_MIN: i64 = -1_000_000;
/// Upper bound for any score-like value.
pub const SCORE_MAX: i64 = 1_000_000;

/// Clamp a score-like value into the safe range.
pub fn clamp_score(value: i64) -> i64 {
    value.clamp(SCORE_MIN, SCORE_MAX)
}

/// Game mode. Fixed set; anything else is rejected at the import boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Classic,
    Rapid,
    Marathon,
}

impl GameMode {
    /// Parse a mode from its wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "classic" => Some(GameMode::Classic),
            "rapid" => Some(GameMode::Rapid),
            "marathon" => Some(GameMode::Marathon),
            _ => None,
        }
    }

    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Rapid => "rapid",
            GameMode::Marathon => "marathon",
        }
    }
}

/// Local/remote reconciliation state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Never uploaded, or a previous upload failed.
    Unsynced,
    /// An upload is in flight. This field is the concurrency token:
    /// read-modify-write must verify it hasn't changed since read.
    Syncing,
    /// Uploaded or matched to an existing remote record.
    Synced,
    /// A duplicate with a distinct remote identity was detected and
    /// could not be resolved automatically.
    Conflict,
}

/// Where a record came from.
///
/// Imported records carry external provenance and are never uploaded:
/// they are synced by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Finished on this device.
    Local,
    /// Arrived through a share link or bulk import.
    Imported,
}

/// A participant in a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
}

/// One player's result within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRound {
    pub player_id: PlayerId,
    pub bid: i64,
    pub made: i64,
    pub round_score: i64,
    /// Running total after this round. Derived from the per-round scores,
    /// so it does not participate in content identity.
    pub cumulative_score: i64,
}

/// One round of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub round_number: u32,
    pub cards_in_round: u32,
    pub per_player: Vec<PlayerRound>,
}

/// One completed (or in-progress) game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Locally generated identifier, unique per device. Not part of identity.
    pub id: GameId,
    /// Ordered list of participants.
    pub players: Vec<Player>,
    /// Ordered round-by-round results.
    pub rounds: Vec<Round>,
    /// Final score per player id. BTreeMap for deterministic serialization.
    pub final_scores: BTreeMap<PlayerId, i64>,
    /// Players holding the top score. Non-empty, ties allowed.
    pub winner_ids: Vec<PlayerId>,
    pub total_rounds: u32,
    pub mode: GameMode,
    /// Provenance metadata (milliseconds since epoch). Not part of identity.
    pub created_at: Timestamp,
    /// Provenance metadata. Not part of identity.
    pub duration_seconds: u64,
    pub sync_status: SyncStatus,
    /// Present only when Synced. Assigned exclusively by the sync coordinator.
    pub remote_id: Option<RemoteId>,
    pub source: RecordSource,
    /// Cached content digest. Recomputed whenever players, rounds,
    /// final scores, total rounds or mode change.
    pub content_hash: String,
}

impl GameRecord {
    /// Create a new locally finished record.
    ///
    /// Computes winners from the final scores and caches the content hash.
    pub fn new(
        id: impl Into<GameId>,
        players: Vec<Player>,
        rounds: Vec<Round>,
        final_scores: BTreeMap<PlayerId, i64>,
        mode: GameMode,
        created_at: Timestamp,
        duration_seconds: u64,
    ) -> Self {
        let total_rounds = rounds.len() as u32;
        let winner_ids = winners_from_scores(&final_scores);
        let mut record = Self {
            id: id.into(),
            players,
            rounds,
            final_scores,
            winner_ids,
            total_rounds,
            mode,
            created_at,
            duration_seconds,
            sync_status: SyncStatus::Unsynced,
            remote_id: None,
            source: RecordSource::Local,
            content_hash: String::new(),
        };
        record.refresh_content_hash();
        record
    }

    /// Recompute and cache the content hash.
    ///
    /// Call after any mutation of players, rounds, final scores,
    /// total rounds or mode.
    pub fn refresh_content_hash(&mut self) {
        self.content_hash = crate::identity::content_hash(self);
    }

    /// Whether this record arrived through an untrusted import channel.
    pub fn is_imported(&self) -> bool {
        self.source == RecordSource::Imported
    }

    /// Whether this record already holds a remote identity.
    pub fn is_synced(&self) -> bool {
        self.sync_status == SyncStatus::Synced
    }

    /// Adopt a remote identity and mark the record synced.
    pub fn mark_synced(&mut self, remote_id: impl Into<RemoteId>) {
        self.remote_id = Some(remote_id.into());
        self.sync_status = SyncStatus::Synced;
    }

    /// Drop back to Unsynced after a failed upload. Never clears an
    /// already-assigned remote id.
    pub fn mark_unsynced(&mut self) {
        if self.remote_id.is_none() {
            self.sync_status = SyncStatus::Unsynced;
        }
    }
}

/// Player ids holding the extremal (highest) final score. Ties allowed.
pub fn winners_from_scores(final_scores: &BTreeMap<PlayerId, i64>) -> Vec<PlayerId> {
    let top = match final_scores.values().max() {
        Some(top) => *top,
        None => return Vec::new(),
    };
    final_scores
        .iter()
        .filter(|(_, score)| **score == top)
        .map(|(id, _)| id.clone())
        .collect()
}
