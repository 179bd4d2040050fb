//! Edge case tests for tally-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use tally_engine::{
    content_hash, lookup_key, GameMode, GameRecord, Player, PlayerRound, Round, ShareValidator,
    MAX_PLAYERS, MAX_ROUNDS,
};

fn encode(value: &serde_json::Value) -> String {
    STANDARD.encode(serde_json::to_vec(value).unwrap())
}

fn payload_with_players(count: usize) -> serde_json::Value {
    let players: Vec<_> = (0..count)
        .map(|i| json!({"id": format!("p{i}"), "name": format!("Player {i}")}))
        .collect();
    let scores: serde_json::Map<String, serde_json::Value> = (0..count)
        .map(|i| (format!("p{i}"), json!(10 - i as i64)))
        .collect();
    json!({
        "players": players,
        "rounds": [],
        "finalScores": scores,
        "totalRounds": 10,
        "mode": "classic",
    })
}

fn record_with(players: Vec<(&str, &str)>, scores: Vec<(&str, i64)>) -> GameRecord {
    let players = players
        .into_iter()
        .map(|(id, name)| Player {
            id: id.into(),
            name: name.into(),
        })
        .collect();
    let rounds = vec![Round {
        round_number: 1,
        cards_in_round: 5,
        per_player: scores
            .iter()
            .map(|(id, score)| PlayerRound {
                player_id: (*id).into(),
                bid: 1,
                made: 1,
                round_score: *score,
                cumulative_score: *score,
            })
            .collect(),
    }];
    let final_scores: BTreeMap<String, i64> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    GameRecord::new(
        "local-1",
        players,
        rounds,
        final_scores,
        GameMode::Classic,
        1_706_745_600_000,
        900,
    )
}

// ============================================================================
// Boundary Values
// ============================================================================

#[test]
fn exactly_max_players_accepted() {
    let validator = ShareValidator::new();
    let record = validator.validate(&encode(&payload_with_players(MAX_PLAYERS)));
    assert!(record.is_ok());
    assert_eq!(record.unwrap().players.len(), MAX_PLAYERS);
}

#[test]
fn one_over_max_players_rejected() {
    let validator = ShareValidator::new();
    assert!(validator
        .validate(&encode(&payload_with_players(MAX_PLAYERS + 1)))
        .is_err());
}

#[test]
fn exactly_max_rounds_accepted() {
    let validator = ShareValidator::new();
    let mut payload = payload_with_players(2);
    payload["totalRounds"] = json!(MAX_ROUNDS);
    assert!(validator.validate(&encode(&payload)).is_ok());
}

#[test]
fn unicode_player_names_survive() {
    let validator = ShareValidator::new();
    let mut payload = payload_with_players(2);
    payload["players"][0]["name"] = json!("日本語テスト");
    payload["players"][1]["name"] = json!("Привет мир");
    let record = validator.validate(&encode(&payload)).unwrap();
    assert_eq!(record.players[0].name, "日本語テスト");
    assert_eq!(record.players[1].name, "Привет мир");
}

#[test]
fn unknown_top_level_fields_are_dropped() {
    let validator = ShareValidator::new();
    let mut payload = payload_with_players(2);
    payload["__proto__"] = json!({"polluted": true});
    payload["adminFlag"] = json!(true);
    assert!(validator.validate(&encode(&payload)).is_ok());
}

#[test]
fn negative_scores_are_preserved() {
    let validator = ShareValidator::new();
    let mut payload = payload_with_players(2);
    payload["finalScores"]["p0"] = json!(-37);
    let record = validator.validate(&encode(&payload)).unwrap();
    assert_eq!(record.final_scores["p0"], -37);
}

#[test]
fn untrusted_winner_list_is_ignored() {
    // A payload may claim winners that contradict its own scores.
    let validator = ShareValidator::new();
    let mut payload = payload_with_players(3);
    payload["winnerIds"] = json!(["p2"]);
    let record = validator.validate(&encode(&payload)).unwrap();
    // p0 holds the top score in payload_with_players.
    assert_eq!(record.winner_ids, vec!["p0".to_string()]);
}

// ============================================================================
// Identity Properties
// ============================================================================

#[test]
fn same_game_from_two_devices_hashes_identically() {
    let device_a = record_with(
        vec![("p1", "Alice"), ("p2", "Bob")],
        vec![("p1", 21), ("p2", 12)],
    );
    let mut device_b = record_with(
        vec![("p2", "Bob"), ("p1", "Alice")],
        vec![("p2", 12), ("p1", 21)],
    );
    device_b.id = "other-device-id".into();
    device_b.created_at = 1_706_745_777_000;
    device_b.duration_seconds = 901;

    assert_eq!(content_hash(&device_a), content_hash(&device_b));
    assert_eq!(lookup_key(&device_a), lookup_key(&device_b));
}

#[test]
fn different_scores_hash_differently() {
    let a = record_with(
        vec![("p1", "Alice"), ("p2", "Bob")],
        vec![("p1", 21), ("p2", 12)],
    );
    let b = record_with(
        vec![("p1", "Alice"), ("p2", "Bob")],
        vec![("p1", 22), ("p2", 12)],
    );
    assert_ne!(content_hash(&a), content_hash(&b));
}

proptest! {
    #[test]
    fn hash_invariant_under_provenance_mutation(
        id in "[a-z0-9-]{1,16}",
        created_at in 0u64..u64::MAX / 2,
        duration in 0u64..1_000_000,
    ) {
        let base = record_with(
            vec![("p1", "Alice"), ("p2", "Bob")],
            vec![("p1", 21), ("p2", 12)],
        );
        let mut mutated = base.clone();
        mutated.id = id;
        mutated.created_at = created_at;
        mutated.duration_seconds = duration;
        prop_assert_eq!(content_hash(&base), content_hash(&mutated));
    }

    #[test]
    fn hash_sensitive_to_any_round_score(delta in 1i64..1000) {
        let base = record_with(
            vec![("p1", "Alice"), ("p2", "Bob")],
            vec![("p1", 21), ("p2", 12)],
        );
        let mut mutated = base.clone();
        mutated.rounds[0].per_player[0].round_score += delta;
        prop_assert_ne!(content_hash(&base), content_hash(&mutated));
    }
}
