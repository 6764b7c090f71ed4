//! Scripted mock UCI engines for integration tests. Each mock is a small
//! shell script speaking just enough of the protocol over stdin/stdout.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Write an executable shell script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// A well-behaved engine: answers the handshake, reports a stable draw-ish
/// evaluation at depth 20 and always plays the same shuffle move.
pub fn cooperative_engine(dir: &Path, name: &str, id_name: &str) -> PathBuf {
    let body = format!(
        r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name {id_name}"
      echo "id author arena tests"
      echo "option name Hash type spin default 16 min 1 max 1024"
      echo "option name Clear Hash type button"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 8 score cp 12"
      echo "info depth 20 score cp 0 nodes 4242 pv g1f3"
      echo "bestmove g1f3"
      ;;
    quit) exit 0 ;;
  esac
done
"#
    );
    write_script(dir, name, &body)
}

/// Handshakes fine but never answers `go`.
pub fn silent_engine(dir: &Path, name: &str, id_name: &str) -> PathBuf {
    let body = format!(
        r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name {id_name}"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#
    );
    write_script(dir, name, &body)
}

/// Claims to have no legal moves.
pub fn no_move_engine(dir: &Path, name: &str, mate: bool) -> PathBuf {
    let info = if mate {
        "echo \"info depth 15 score mate -1\""
    } else {
        "echo \"info depth 15 score cp 0\""
    };
    let body = format!(
        r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name stuck"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*)
      {info}
      echo "bestmove (none)"
      ;;
    quit) exit 0 ;;
  esac
done
"#
    );
    write_script(dir, name, &body)
}

/// Exits the moment it is asked to search.
pub fn dying_engine(dir: &Path, name: &str) -> PathBuf {
    let body = r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name flaky"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*) exit 9 ;;
    quit) exit 0 ;;
  esac
done
"#;
    write_script(dir, name, body)
}
