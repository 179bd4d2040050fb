//! Validation boundary for records arriving through untrusted channels.
//!
//! Share links and bulk imports carry attacker-controlled payloads. Nothing
//! from those channels touches the local store until it has passed this
//! pipeline, each stage short-circuiting on failure:
//!
//! 1. format check of the base64 encoding, before any allocation for decode;
//! 2. size ceiling on the estimated decoded length, before decode;
//! 3. decode + strict typed parse (unknown and dangerous structural keys are
//!    dropped by construction; failures return a generic format error that
//!    never echoes the input back);
//! 4. structural validation of bounds and enumerations;
//! 5. sanitization of free text and clamping of numeric fields.
//!
//! The bulk form validates each record independently but fails the whole
//! batch on any structural failure: import is atomic from the user's view.

use crate::error::{Error, Result};
use crate::record::{
    clamp_score, GameMode, GameRecord, Player, PlayerRound, RecordSource, Round, MAX_NAME_LEN,
    MAX_PLAYERS, MAX_ROUNDS,
};
use crate::sanitize::sanitize_text;
use crate::GameId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Hard ceiling on the estimated decoded payload size.
pub const MAX_DECODED_BYTES: usize = 1 << 20;
/// Maximum number of records in one bulk import.
pub const MAX_BULK_RECORDS: usize = 100;
/// Maximum length of a sanitized identifier.
const MAX_ID_LEN: usize = 64;
/// Cards dealt in a round are clamped into this range.
const MAX_CARDS_IN_ROUND: i64 = 52;

/// Map keys that could shadow behavioral machinery in a dynamic runtime.
/// Stripped before anything is merged into the local store.
const DANGEROUS_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Bounds applied by the validator. Defaults match the record-model limits.
#[derive(Debug, Clone)]
pub struct ShareLimits {
    pub max_decoded_bytes: usize,
    pub max_players: usize,
    pub max_rounds: u32,
    pub max_records: usize,
    pub max_name_len: usize,
}

impl Default for ShareLimits {
    fn default() -> Self {
        Self {
            max_decoded_bytes: MAX_DECODED_BYTES,
            max_players: MAX_PLAYERS,
            max_rounds: MAX_ROUNDS,
            max_records: MAX_BULK_RECORDS,
            max_name_len: MAX_NAME_LEN,
        }
    }
}

// Wire shapes for shared payloads. Strict typing does the numeric checks:
// a string where a number belongs fails the parse, and unknown properties
// never survive into a `GameRecord`.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedPlayer {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedPlayerRound {
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    bid: i64,
    #[serde(default)]
    made: i64,
    #[serde(default)]
    round_score: i64,
    #[serde(default)]
    cumulative_score: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedRound {
    #[serde(default)]
    round_number: Option<u32>,
    #[serde(default)]
    cards_in_round: i64,
    #[serde(default)]
    per_player: Vec<SharedPlayerRound>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedGame {
    #[serde(default)]
    id: Option<String>,
    players: Vec<SharedPlayer>,
    #[serde(default, alias = "roundData")]
    rounds: Vec<SharedRound>,
    #[serde(default)]
    final_scores: BTreeMap<String, i64>,
    total_rounds: u32,
    mode: String,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    duration_seconds: u64,
    #[serde(default)]
    remote_id: Option<String>,
}

/// The validation/sanitization boundary for shared payloads.
#[derive(Debug, Clone, Default)]
pub struct ShareValidator {
    limits: ShareLimits,
}

impl ShareValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ShareLimits) -> Self {
        Self { limits }
    }

    /// Validate a single-record payload.
    ///
    /// Returns a sanitized record with `source = Imported`. If the payload
    /// carried a remote id, the record is Synced by construction.
    pub fn validate(&self, encoded: &str) -> Result<GameRecord> {
        let shared: SharedGame = self.decode(encoded)?;
        self.build_record(shared)
    }

    /// Validate a bulk payload: a map of game id to record.
    ///
    /// Atomic: any structurally invalid member fails the whole batch.
    pub fn validate_bulk(&self, encoded: &str) -> Result<BTreeMap<GameId, GameRecord>> {
        let shared: BTreeMap<String, SharedGame> = self.decode(encoded)?;
        if shared.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if shared.len() > self.limits.max_records {
            return Err(Error::TooManyRecords {
                count: shared.len(),
                limit: self.limits.max_records,
            });
        }

        let mut out = BTreeMap::new();
        for (key, game) in shared {
            let record = self.build_record(game)?;
            let key = sanitize_key(&key, &record);
            // A sanitized-key collision falls back to content identity
            // rather than silently dropping a record.
            if out.contains_key(&key) {
                out.insert(record.content_hash.clone(), record);
            } else {
                out.insert(key, record);
            }
        }
        Ok(out)
    }

    /// Stages 1-3: format check, size ceiling, decode and typed parse.
    fn decode<T: serde::de::DeserializeOwned>(&self, encoded: &str) -> Result<T> {
        if encoded.is_empty() || !is_base64_shaped(encoded) {
            return Err(Error::MalformedPayload);
        }

        // Estimated before decoding: bounds memory against adversarial input.
        let estimated = encoded.len() / 4 * 3;
        if estimated > self.limits.max_decoded_bytes {
            return Err(Error::PayloadTooLarge {
                estimated,
                limit: self.limits.max_decoded_bytes,
            });
        }

        let bytes = STANDARD
            .decode(encoded)
            .map_err(|_| Error::MalformedPayload)?;
        serde_json::from_slice(&bytes).map_err(|_| Error::MalformedPayload)
    }

    /// Stages 4-5: structural validation, sanitization, clamping.
    fn build_record(&self, shared: SharedGame) -> Result<GameRecord> {
        if shared.players.is_empty() {
            return Err(Error::NoPlayers);
        }
        if shared.players.len() > self.limits.max_players {
            return Err(Error::TooManyPlayers {
                count: shared.players.len(),
                limit: self.limits.max_players,
            });
        }
        let round_count = shared.rounds.len() as u32;
        if round_count > self.limits.max_rounds {
            return Err(Error::TooManyRounds {
                count: round_count,
                limit: self.limits.max_rounds,
            });
        }
        if shared.total_rounds > self.limits.max_rounds {
            return Err(Error::TooManyRounds {
                count: shared.total_rounds,
                limit: self.limits.max_rounds,
            });
        }

        let mode_raw = shared.mode.trim().to_lowercase();
        let mode = GameMode::parse(&mode_raw)
            .ok_or_else(|| Error::UnknownMode(sanitize_text(&mode_raw, 20)))?;

        let mut players = Vec::with_capacity(shared.players.len());
        for (i, p) in shared.players.iter().enumerate() {
            let raw_name = p
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| Error::MissingField("player.name".into()))?;
            let mut name = sanitize_text(raw_name, self.limits.max_name_len);
            if name.is_empty() {
                // Entirely markup; keep the slot rather than rejecting.
                name = format!("Player {}", i + 1);
            }
            let mut id = sanitize_id(p.id.as_deref().unwrap_or(""));
            if id.is_empty() {
                id = format!("p{}", i + 1);
            }
            players.push(Player { id, name });
        }
        let known_ids: Vec<&str> = players.iter().map(|p| p.id.as_str()).collect();

        let mut rounds = Vec::with_capacity(shared.rounds.len());
        for (i, r) in shared.rounds.into_iter().enumerate() {
            let per_player = r
                .per_player
                .into_iter()
                .filter_map(|pr| {
                    let player_id = sanitize_id(pr.player_id.as_deref().unwrap_or(""));
                    // Rows for unknown players are dropped, not rejected.
                    if !known_ids.contains(&player_id.as_str()) {
                        return None;
                    }
                    Some(PlayerRound {
                        player_id,
                        bid: clamp_score(pr.bid),
                        made: clamp_score(pr.made),
                        round_score: clamp_score(pr.round_score),
                        cumulative_score: clamp_score(pr.cumulative_score),
                    })
                })
                .collect();
            rounds.push(Round {
                round_number: r.round_number.unwrap_or(i as u32 + 1),
                cards_in_round: r.cards_in_round.clamp(0, MAX_CARDS_IN_ROUND) as u32,
                per_player,
            });
        }

        let mut final_scores: BTreeMap<String, i64> = shared
            .final_scores
            .into_iter()
            .filter_map(|(player_id, score)| {
                let player_id = sanitize_id(&player_id);
                known_ids
                    .contains(&player_id.as_str())
                    .then(|| (player_id, clamp_score(score)))
            })
            .collect();
        if final_scores.is_empty() {
            // Summary missing or entirely bogus: rebuild from round scores so
            // the winner set stays non-empty.
            for player in &players {
                let total: i64 = rounds
                    .iter()
                    .flat_map(|r| &r.per_player)
                    .filter(|pr| pr.player_id == player.id)
                    .map(|pr| pr.round_score)
                    .sum();
                final_scores.insert(player.id.clone(), clamp_score(total));
            }
        }

        let total_rounds = if rounds.is_empty() {
            shared.total_rounds
        } else {
            rounds.len() as u32
        };

        let mut record = GameRecord::new(
            String::new(),
            players,
            rounds,
            final_scores,
            mode,
            shared.created_at,
            shared.duration_seconds,
        );
        record.total_rounds = total_rounds;
        record.refresh_content_hash();
        record.source = RecordSource::Imported;

        let provided_id = sanitize_id(shared.id.as_deref().unwrap_or(""));
        record.id = if provided_id.is_empty() {
            format!("import-{}", record.content_hash)
        } else {
            provided_id
        };

        if let Some(remote_id) = shared.remote_id.as_deref() {
            let remote_id = sanitize_id(remote_id);
            if !remote_id.is_empty() {
                record.mark_synced(remote_id);
            }
        }
        Ok(record)
    }
}

/// Cheap shape check before decoding: standard base64 alphabet only.
fn is_base64_shaped(encoded: &str) -> bool {
    encoded
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Identifiers allow a narrow character set after sanitization.
fn sanitize_id(raw: &str) -> String {
    sanitize_text(raw, MAX_ID_LEN)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Sanitize a bulk-map key; dangerous or empty keys fall back to the
/// record's content identity.
fn sanitize_key(raw: &str, record: &GameRecord) -> String {
    let key = sanitize_id(raw);
    if key.is_empty() || DANGEROUS_KEYS.contains(&key.as_str()) {
        record.content_hash.clone()
    } else {
        key
    }
}
