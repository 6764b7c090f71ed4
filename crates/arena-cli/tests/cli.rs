use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn arena() -> Command {
    Command::cargo_bin("arena").unwrap()
}

fn write_mock_engine(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    fs::write(
        &path,
        r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name cli-mock"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 20 score cp 0"
      echo "bestmove g1f3"
      ;;
    quit) exit 0 ;;
  esac
done
"#,
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path.display().to_string()
}

#[test]
fn missing_config_exits_with_error() {
    arena()
        .arg("/nonexistent/config.json")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn malformed_config_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{broken").unwrap();
    arena()
        .arg(path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to parse config"));
}

#[test]
fn too_few_engines_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"engines": [{"name": "solo", "cmd": "/bin/solo"}]}"#).unwrap();
    arena()
        .arg(path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("at least 2 engines"));
}

#[test]
fn resume_and_fresh_are_mutually_exclusive() {
    arena()
        .args(["config.json", "--resume", "--fresh"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn runs_a_minimal_tournament_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let alpha = write_mock_engine(dir.path(), "alpha.sh");
    let beta = write_mock_engine(dir.path(), "beta.sh");
    let out = dir.path().join("out");

    let config = serde_json::json!({
        "engines": [
            {"name": "alpha", "cmd": alpha},
            {"name": "beta", "cmd": beta}
        ],
        "time_control": {"base_seconds": 60, "move_time_ms": 10},
        "tournament": {"games_per_pairing": 1},
        "adjudication": {"score_draw_moves": 2, "min_depth": 12},
        "output": {
            "tournament_pgn": out.join("tournament.pgn"),
            "live_pgn": out.join("live.pgn"),
            "results_json": out.join("results.json"),
            "pairings_csv": out.join("pairings.csv"),
            "checkpoint_json": out.join("checkpoint.json"),
            "standings_csv": out.join("standings.csv"),
            "standings_html": out.join("standings.html"),
            "summary_json": out.join("summary.json"),
            "metrics_json": out.join("metrics.json"),
            "games_dir": out.join("games"),
            "checkpoint_interval_seconds": 0,
            "metrics_interval_seconds": 0
        }
    });
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    arena().arg(&config_path).timeout(std::time::Duration::from_secs(60)).assert().success();

    assert!(out.join("tournament.pgn").exists());
    assert!(out.join("checkpoint.json").exists());
    let csv = fs::read_to_string(out.join("standings.csv")).unwrap();
    assert!(csv.lines().count() >= 3, "header plus two engines: {csv}");
}
