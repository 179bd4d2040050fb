//! Content-based identity for game records.
//!
//! Two devices that independently record the same game must be able to
//! recognize each other's copies. Identity is therefore derived purely from
//! gameplay-semantic fields: player identities, round-by-round results, final
//! scores, round count and mode. Locally generated ids, timestamps, duration
//! and sync metadata are excluded so that a local draft and its remote copy
//! hash identically.

use crate::record::GameRecord;
use crate::{PlayerId, RemoteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Hex characters kept from the BLAKE3 digest (64 bits).
const HASH_HEX_LEN: usize = 16;

/// Field separator in the canonical encoding. Never appears in sanitized
/// identifiers, so encodings of distinct content never collide textually.
const SEP: char = '\x1f';

/// Compute the content hash of a record.
///
/// Deterministic digest of the canonical content encoding. Records that
/// differ only in `id`, `created_at`, `duration_seconds` or sync metadata
/// produce the same hash.
pub fn content_hash(record: &GameRecord) -> String {
    let digest = blake3::hash(canonical_content(record).as_bytes());
    digest.to_hex()[..HASH_HEX_LEN].to_string()
}

/// Canonical, order-independent encoding of the identity-bearing fields.
fn canonical_content(record: &GameRecord) -> String {
    let mut out = String::new();

    let mut player_ids: Vec<&str> = record.players.iter().map(|p| p.id.as_str()).collect();
    player_ids.sort_unstable();
    for id in player_ids {
        let _ = write!(out, "{id}{SEP}");
    }

    for round in &record.rounds {
        let _ = write!(out, "r{}:{}{SEP}", round.round_number, round.cards_in_round);
        let mut per_player: Vec<_> = round.per_player.iter().collect();
        per_player.sort_unstable_by(|a, b| a.player_id.cmp(&b.player_id));
        for pr in per_player {
            let _ = write!(
                out,
                "{}={},{},{}{SEP}",
                pr.player_id, pr.bid, pr.made, pr.round_score
            );
        }
    }

    // BTreeMap iterates in key order.
    for (player_id, score) in &record.final_scores {
        let _ = write!(out, "f{player_id}={score}{SEP}");
    }

    let _ = write!(out, "n{}{SEP}m{}", record.total_rounds, record.mode.as_str());
    out
}

/// Compute the coarse lookup key of a record.
///
/// More forgiving than the content hash: sorted lowercased player names plus
/// round count and mode. Used to fetch duplicate candidates from the remote
/// store before a full content comparison.
pub fn lookup_key(record: &GameRecord) -> String {
    let mut names: Vec<String> = record
        .players
        .iter()
        .map(|p| p.name.trim().to_lowercase())
        .collect();
    names.sort_unstable();
    format!(
        "{}:{}:{}",
        names.join("|"),
        record.total_rounds,
        record.mode.as_str()
    )
}

/// A remote record summary returned by a lookup-key query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCandidate {
    pub remote_id: RemoteId,
    pub player_count: usize,
    pub total_rounds: u32,
    pub final_scores: BTreeMap<PlayerId, i64>,
}

/// Full content comparison between a local record and a remote candidate.
///
/// The candidate carries only summary fields, so the comparison checks player
/// count, round count and final-score map equality. A false positive here
/// would silently drop a game, so every gameplay-distinguishing summary field
/// participates.
pub fn matches_candidate(record: &GameRecord, candidate: &RemoteCandidate) -> bool {
    record.players.len() == candidate.player_count
        && record.total_rounds == candidate.total_rounds
        && record.final_scores == candidate.final_scores
}
