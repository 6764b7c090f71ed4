use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::tournament::Fixture;
use crate::util::fnv1a64;

/// One opening: a stable id, an optional starting position (empty = standard
/// start) and pre-played long-form moves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Opening {
    pub id: String,
    pub fen: String,
    pub moves: Vec<String>,
}

impl Opening {
    /// Fallback when no suite is configured.
    pub fn startpos() -> Self {
        Self { id: "startpos".to_string(), fen: String::new(), moves: Vec::new() }
    }
}

/// Load an EPD openings suite. Each line carries a 4-to-6-field position
/// (normalised to a full 6-field string) and optional `;`-separated
/// operations; `id "<name>"` and `moves <m1> …` are honoured. Blank lines
/// and `#`/`;` comments are skipped, as are lines too short to be a
/// position.
pub fn load_epd(path: &Path) -> Result<Vec<Opening>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to open openings suite {}", path.display()))?;
    let mut openings = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let fen_part = line.split(';').next().unwrap_or_default();
        let fen_tokens: Vec<&str> = fen_part.split_whitespace().collect();
        if fen_tokens.len() < 4 {
            continue;
        }

        let mut opening = Opening {
            fen: normalize_fen(&fen_tokens[..fen_tokens.len().min(6)]),
            ..Opening::default()
        };
        parse_operations(line, &mut opening);
        if opening.id.is_empty() {
            opening.id = fnv1a64(line.as_bytes()).to_string();
        }
        openings.push(opening);
    }
    Ok(openings)
}

/// Shuffle the suite deterministically. A zero seed leaves file order.
pub fn shuffle_openings(openings: &mut [Opening], seed: u64) {
    if seed != 0 {
        let mut rng = StdRng::seed_from_u64(seed);
        openings.shuffle(&mut rng);
    }
}

/// Round-robin policy: one opening per pairing, cycling through the suite in
/// pairing order. Every game of a pairing shares its opening.
pub fn assign_round_robin(
    fixtures: &[Fixture],
    openings: &[Opening],
    games_per_pairing: u32,
) -> Vec<Opening> {
    let mut assigned = Vec::with_capacity(fixtures.len());
    if fixtures.is_empty() {
        return assigned;
    }
    if openings.is_empty() {
        assigned.resize(fixtures.len(), Opening::default());
        return assigned;
    }

    let per_pairing = games_per_pairing.max(1) as usize;
    let mut pairing_index = 0;
    for fixture in fixtures {
        if games_per_pairing <= 1 || fixture.game_index_within_pairing == 0 {
            pairing_index = assigned.len() / per_pairing;
        }
        assigned.push(openings[pairing_index % openings.len()].clone());
    }
    assigned
}

/// Swiss policy: same per-pairing cycling, computed from the dense fixture
/// ordinal so a resumed run re-derives the same assignment.
pub fn assign_swiss_for_index(
    fixture_index: usize,
    openings: &[Opening],
    games_per_pairing: u32,
) -> Opening {
    if openings.is_empty() {
        return Opening::default();
    }
    let pairing_index = if games_per_pairing == 0 {
        fixture_index
    } else {
        fixture_index / games_per_pairing as usize
    };
    openings[pairing_index % openings.len()].clone()
}

/// Load a PGN openings suite: one opening per game. `SetUp`/`FEN` tags set
/// the starting position; the movetext supplies the pre-played moves (move
/// numbers, result tokens and `{…}` comments are dropped). The id comes
/// from `Event` + `Round` when present, otherwise a stable hash of the
/// movetext.
pub fn load_pgn_suite(path: &Path) -> Result<Vec<Opening>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to open openings suite {}", path.display()))?;

    let mut openings = Vec::new();
    let mut tags: Vec<(String, String)> = Vec::new();
    let mut movetext = String::new();

    let mut flush_game = |tags: &mut Vec<(String, String)>, movetext: &mut String| {
        if tags.is_empty() && movetext.is_empty() {
            return;
        }
        let tag = |key: &str| {
            tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
        };
        let mut opening = Opening::default();
        if tag("SetUp") == Some("1") {
            if let Some(fen) = tag("FEN") {
                let fields: Vec<&str> = fen.split_whitespace().collect();
                opening.fen = normalize_fen(&fields[..fields.len().min(6)]);
            }
        }
        opening.moves = parse_movetext(movetext);
        if let (Some(event), Some(round)) = (tag("Event"), tag("Round")) {
            opening.id = format!("{event} {round}");
        }
        if opening.id.is_empty() {
            opening.id = fnv1a64(movetext.as_bytes()).to_string();
        }
        openings.push(opening);
        tags.clear();
        movetext.clear();
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            if !movetext.is_empty() {
                flush_game(&mut tags, &mut movetext);
            }
            continue;
        }
        if line.starts_with('[') {
            if let (Some(space), Some(quote), Some(last_quote)) =
                (line.find(' '), line.find('"'), line.rfind('"'))
            {
                if last_quote > quote {
                    tags.push((
                        line[1..space].to_string(),
                        line[quote + 1..last_quote].to_string(),
                    ));
                }
            }
            continue;
        }
        movetext.push_str(line);
        movetext.push(' ');
    }
    flush_game(&mut tags, &mut movetext);

    Ok(openings)
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

fn parse_movetext(movetext: &str) -> Vec<String> {
    let mut moves = Vec::new();
    let mut in_comment = false;
    for token in movetext.split_whitespace() {
        if in_comment {
            if token.ends_with('}') {
                in_comment = false;
            }
            continue;
        }
        if token.starts_with('{') {
            in_comment = !token.ends_with('}');
            continue;
        }
        if is_result_token(token) || token.contains('.') {
            continue;
        }
        moves.push(token.to_string());
    }
    moves
}

/// Pad a truncated position string out to the full 6 fields.
fn normalize_fen(tokens: &[&str]) -> String {
    let mut fields: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    if fields.len() == 4 {
        fields.push("0".to_string());
        fields.push("1".to_string());
    } else if fields.len() == 5 {
        fields.push("1".to_string());
    }
    fields.truncate(6);
    fields.join(" ")
}

fn parse_operations(line: &str, opening: &mut Opening) {
    let mut ops = line.split(';');
    ops.next(); // position part
    for op in ops {
        let op = op.trim();
        if let Some(rest) = op.strip_prefix("id") {
            if let (Some(first), Some(last)) = (rest.find('"'), rest.rfind('"')) {
                if last > first {
                    opening.id = rest[first + 1..last].to_string();
                }
            }
        } else if let Some(rest) = op.strip_prefix("moves") {
            opening.moves.extend(rest.split_whitespace().map(|m| m.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn suite(contents: &str) -> Vec<Opening> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        load_epd(file.path()).unwrap()
    }

    #[test]
    fn parses_ids_moves_and_normalises_fields() {
        let openings = suite(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - ; id \"start\"; moves e2e4 e7e5\n\
             # a comment\n\
             \n\
             4k3/8/8/8/8/8/8/4K3 w - - 12 34 ; id \"kk\"\n\
             short line\n",
        );
        assert_eq!(openings.len(), 2);
        assert_eq!(openings[0].id, "start");
        assert_eq!(
            openings[0].fen,
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
        assert_eq!(openings[0].moves, vec!["e2e4", "e7e5"]);
        assert_eq!(openings[1].fen, "4k3/8/8/8/8/8/8/4K3 w - - 12 34");
    }

    #[test]
    fn missing_id_gets_a_stable_hash() {
        let line = "4k3/8/8/8/8/8/8/4K3 w - -\n";
        let first = suite(line);
        let second = suite(line);
        assert!(!first[0].id.is_empty());
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn load_fails_on_missing_file() {
        assert!(load_epd(Path::new("/nonexistent/suite.epd")).is_err());
        assert!(load_pgn_suite(Path::new("/nonexistent/suite.pgn")).is_err());
    }

    #[test]
    fn pgn_suite_splits_games_and_strips_movetext_noise() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"[Event \"test suite\"]\n\
              [Round \"1\"]\n\
              [Result \"1/2-1/2\"]\n\
              \n\
              1. e2e4 e7e5 2. g1f3 {book line ends} 1/2-1/2\n\
              \n\
              [Event \"test suite\"]\n\
              [Round \"2\"]\n\
              [SetUp \"1\"]\n\
              [FEN \"4k3/8/8/8/8/8/8/4K3 w - -\"]\n\
              \n\
              1. e1e2 e8e7 *\n",
        )
        .unwrap();
        let openings = load_pgn_suite(file.path()).unwrap();
        assert_eq!(openings.len(), 2);
        assert_eq!(openings[0].id, "test suite 1");
        assert_eq!(openings[0].fen, "");
        assert_eq!(openings[0].moves, vec!["e2e4", "e7e5", "g1f3"]);
        assert_eq!(openings[1].fen, "4k3/8/8/8/8/8/8/4K3 w - - 0 1");
        assert_eq!(openings[1].moves, vec!["e1e2", "e8e7"]);
    }

    #[test]
    fn pgn_game_without_event_gets_hash_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1. d2d4 d7d5 *\n").unwrap();
        let openings = load_pgn_suite(file.path()).unwrap();
        assert_eq!(openings.len(), 1);
        assert!(!openings[0].id.is_empty());
        assert_eq!(openings[0].moves, vec!["d2d4", "d7d5"]);
    }

    #[test]
    fn round_robin_assignment_cycles_per_pairing() {
        let fixtures = crate::tournament::round_robin::build_schedule(4, false, 2, 1);
        let openings = vec![
            Opening { id: "a".into(), ..Opening::default() },
            Opening { id: "b".into(), ..Opening::default() },
        ];
        let assigned = assign_round_robin(&fixtures, &openings, 2);
        assert_eq!(assigned.len(), fixtures.len());
        for pair in assigned.chunks(2) {
            assert_eq!(pair[0].id, pair[1].id, "both games of a pairing share the opening");
        }
        let ids: Vec<&str> = assigned.iter().step_by(2).map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a", "b", "a", "b"]);
    }

    #[test]
    fn swiss_assignment_derives_from_ordinal() {
        let openings = vec![
            Opening { id: "a".into(), ..Opening::default() },
            Opening { id: "b".into(), ..Opening::default() },
        ];
        assert_eq!(assign_swiss_for_index(0, &openings, 2).id, "a");
        assert_eq!(assign_swiss_for_index(1, &openings, 2).id, "a");
        assert_eq!(assign_swiss_for_index(2, &openings, 2).id, "b");
        assert_eq!(assign_swiss_for_index(5, &openings, 2).id, "a");
    }

    #[test]
    fn shuffle_is_seed_deterministic() {
        let base: Vec<Opening> = (0..16)
            .map(|i| Opening { id: format!("o{i}"), ..Opening::default() })
            .collect();
        let mut a = base.clone();
        let mut b = base.clone();
        shuffle_openings(&mut a, 42);
        shuffle_openings(&mut b, 42);
        assert_eq!(a, b);
        assert_ne!(a, base, "seeded shuffle should move something");

        let mut untouched = base.clone();
        shuffle_openings(&mut untouched, 0);
        assert_eq!(untouched, base);
    }
}
