use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::{atomic_write, fnv1a64};

/// Metadata for a finished game, enough to locate its record in the
/// tournament record file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedGameMeta {
    #[serde(default)]
    pub game_no: u32,
    #[serde(default)]
    pub fixture_index: usize,
    #[serde(default)]
    pub white: String,
    #[serde(default)]
    pub black: String,
    #[serde(default)]
    pub opening_id: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub termination: String,
    #[serde(default)]
    pub pgn_offset: u64,
    #[serde(default)]
    pub pgn_path: String,
}

/// A game that was in flight when the snapshot was taken; restarted on
/// resume.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveGameMeta {
    #[serde(default)]
    pub game_no: u32,
    #[serde(default)]
    pub fixture_index: usize,
    #[serde(default)]
    pub white: String,
    #[serde(default)]
    pub black: String,
    #[serde(default)]
    pub opening_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StandingsSnapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub games: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub points: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NextGameSnapshot {
    #[serde(default = "no_next_fixture")]
    pub fixture_index: i64,
    #[serde(default)]
    pub white: String,
    #[serde(default)]
    pub black: String,
    #[serde(default)]
    pub opening_id: String,
}

impl Default for NextGameSnapshot {
    fn default() -> Self {
        Self {
            fixture_index: no_next_fixture(),
            white: String::new(),
            black: String::new(),
            opening_id: String::new(),
        }
    }
}

fn no_next_fixture() -> i64 {
    -1
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwissPairingSnapshot {
    #[serde(default)]
    pub white_engine_id: usize,
    #[serde(default)]
    pub black_engine_id: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwissColorSnapshot {
    #[serde(default)]
    pub last_color: i32,
    #[serde(default)]
    pub streak: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwissPendingFixture {
    #[serde(default)]
    pub fixture_index: usize,
    #[serde(default)]
    pub round_index: u32,
    #[serde(default)]
    pub white_engine_id: usize,
    #[serde(default)]
    pub black_engine_id: usize,
    #[serde(default)]
    pub game_index_within_pairing: u32,
    #[serde(default)]
    pub pairing_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwissCheckpointState {
    #[serde(default)]
    pub current_round: u32,
    #[serde(default)]
    pub bye_history: Vec<usize>,
    #[serde(default)]
    pub pairings_played: Vec<SwissPairingSnapshot>,
    #[serde(default)]
    pub color_history: Vec<SwissColorSnapshot>,
    #[serde(default)]
    pub pending_pairings_current_round: Vec<SwissPendingFixture>,
}

/// Crash-consistent snapshot of one tournament run. Field names are the
/// stable on-disk schema; loading tolerates missing optional fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub config_hash: String,
    #[serde(default)]
    pub total_games: u32,
    #[serde(default)]
    pub next_fixture_index: usize,
    #[serde(default)]
    pub opening_index: usize,
    #[serde(default)]
    pub completed_fixture_indices: Vec<usize>,
    #[serde(default)]
    pub completed_games: Vec<CompletedGameMeta>,
    #[serde(default)]
    pub standings: Vec<StandingsSnapshot>,
    #[serde(default)]
    pub active_games: Vec<ActiveGameMeta>,
    #[serde(default)]
    pub next_game: NextGameSnapshot,
    #[serde(default)]
    pub rng_seed: u64,
    #[serde(default)]
    pub last_game_no: u32,
    #[serde(default)]
    pub last_game_end_time: String,
    #[serde(default)]
    pub swiss: SwissCheckpointState,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            version: default_version(),
            config_hash: String::new(),
            total_games: 0,
            next_fixture_index: 0,
            opening_index: 0,
            completed_fixture_indices: Vec::new(),
            completed_games: Vec::new(),
            standings: Vec::new(),
            active_games: Vec::new(),
            next_game: NextGameSnapshot::default(),
            rng_seed: 0,
            last_game_no: 0,
            last_game_end_time: String::new(),
            swiss: SwissCheckpointState::default(),
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Deterministic 64-bit digest of the canonical config serialisation,
/// rendered in decimal. Gates every resume.
pub fn compute_config_hash(payload: &str) -> String {
    fnv1a64(payload.as_bytes()).to_string()
}

/// Serialise and write atomically: a reader (or a crashed writer) never
/// leaves a truncated checkpoint behind.
pub fn save_checkpoint(path: &Path, state: &CheckpointState) -> Result<()> {
    let body = serde_json::to_string_pretty(state).context("failed to serialise checkpoint")?;
    atomic_write(path, &body)
}

pub fn load_checkpoint(path: &Path) -> Result<CheckpointState> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to open checkpoint {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse checkpoint {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> CheckpointState {
        CheckpointState {
            version: 2,
            config_hash: "12345".to_string(),
            total_games: 30,
            next_fixture_index: 12,
            opening_index: 12,
            completed_fixture_indices: (0..12).collect(),
            completed_games: vec![CompletedGameMeta {
                game_no: 12,
                fixture_index: 11,
                white: "alpha".into(),
                black: "beta".into(),
                opening_id: "sicilian".into(),
                result: "1-0".into(),
                termination: "score adjudication".into(),
                pgn_offset: 4096,
                pgn_path: "out/tournament.pgn".into(),
            }],
            standings: vec![StandingsSnapshot {
                name: "alpha".into(),
                games: 12,
                wins: 7,
                draws: 3,
                losses: 2,
                points: 8.5,
            }],
            active_games: vec![ActiveGameMeta {
                game_no: 13,
                fixture_index: 12,
                white: "beta".into(),
                black: "alpha".into(),
                opening_id: "caro".into(),
            }],
            next_game: NextGameSnapshot {
                fixture_index: 12,
                white: "beta".into(),
                black: "alpha".into(),
                opening_id: "caro".into(),
            },
            rng_seed: 99,
            last_game_no: 12,
            last_game_end_time: "2025-06-01T10:00:00Z".into(),
            swiss: SwissCheckpointState {
                current_round: 3,
                bye_history: vec![4, 2],
                pairings_played: vec![SwissPairingSnapshot {
                    white_engine_id: 0,
                    black_engine_id: 1,
                }],
                color_history: vec![SwissColorSnapshot { last_color: 1, streak: 2 }],
                pending_pairings_current_round: vec![SwissPendingFixture {
                    fixture_index: 12,
                    round_index: 2,
                    white_engine_id: 1,
                    black_engine_id: 0,
                    game_index_within_pairing: 0,
                    pairing_id: "pair_0_1".into(),
                }],
            },
        }
    }

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let state = sample_state();
        save_checkpoint(&path, &state).unwrap();
        let loaded = load_checkpoint(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_tolerates_missing_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, r#"{"config_hash":"abc","last_game_no":7}"#).unwrap();
        let loaded = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.config_hash, "abc");
        assert_eq!(loaded.last_game_no, 7);
        assert!(loaded.completed_fixture_indices.is_empty());
        assert_eq!(loaded.next_game.fixture_index, -1);
        assert_eq!(loaded.swiss.current_round, 0);
    }

    #[test]
    fn load_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_checkpoint(&path).is_err());
        assert!(load_checkpoint(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn schema_uses_stable_field_names() {
        let json = serde_json::to_value(sample_state()).unwrap();
        for field in [
            "version",
            "config_hash",
            "total_games",
            "next_fixture_index",
            "opening_index",
            "completed_fixture_indices",
            "completed_games",
            "standings",
            "active_games",
            "next_game",
            "rng_seed",
            "last_game_no",
            "last_game_end_time",
            "swiss",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        let swiss = json.get("swiss").unwrap();
        for field in [
            "current_round",
            "bye_history",
            "pairings_played",
            "color_history",
            "pending_pairings_current_round",
        ] {
            assert!(swiss.get(field).is_some(), "missing swiss field {field}");
        }
        let game = json.get("completed_games").unwrap().get(0).unwrap();
        assert!(game.get("pgn_offset").is_some());
        assert!(game.get("pgn_path").is_some());
    }

    #[test]
    fn config_hash_is_deterministic_and_content_sensitive() {
        assert_eq!(compute_config_hash(""), "14695981039346656037");
        assert_eq!(compute_config_hash("payload"), compute_config_hash("payload"));
        assert_ne!(compute_config_hash("payload"), compute_config_hash("payloae"));
    }
}
