use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::process::{LineProcess, ReadLine};

pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// How a session operation went wrong. Failures that end a game are data for
/// the termination arbiter, not errors to propagate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EngineFailure {
    #[default]
    None,
    Timeout,
    EngineExited,
    WriteFailed,
    NoBestmove,
    HandshakeTimeout,
    HandshakeFailed,
}

/// Last evaluation reported by an engine, from its own point of view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalInfo {
    pub cp: Option<i32>,
    pub mate: Option<i32>,
    pub depth: u32,
}

impl EvalInfo {
    pub fn has_eval(&self) -> bool {
        self.cp.is_some() || self.mate.is_some()
    }

    /// Fold one `info … depth D … score (cp V | mate M) …` line into the
    /// snapshot, keeping only the deepest scored entry.
    fn update_from_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first().copied() != Some("info") {
            return;
        }
        let mut depth = 0u32;
        let mut cp = None;
        let mut mate = None;
        let mut scored = false;
        let mut i = 1;
        while i < tokens.len() {
            match tokens[i] {
                "depth" => {
                    if i + 1 < tokens.len() {
                        depth = tokens[i + 1].parse::<u32>().unwrap_or(0);
                        i += 1;
                    }
                }
                "score" => {
                    if i + 2 < tokens.len() {
                        match tokens[i + 1] {
                            "cp" => {
                                cp = tokens[i + 2].parse::<i32>().ok();
                                mate = None;
                                scored = true;
                                i += 2;
                            }
                            "mate" => {
                                mate = tokens[i + 2].parse::<i32>().ok();
                                cp = None;
                                scored = true;
                                i += 2;
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if scored && depth >= self.depth {
            *self = EvalInfo { cp, mate, depth };
        }
    }
}

/// One UCI dialogue over a child process: handshake, options, per-move
/// request/response with timeout, latest-evaluation capture, and failure
/// classification.
pub struct UciEngine {
    name: String,
    command: String,
    args: Vec<String>,
    handshake_timeout: Duration,
    process: Option<LineProcess>,
    id_name: String,
    id_author: String,
    available_options: BTreeMap<String, String>,
    last_eval: EvalInfo,
    last_failure: EngineFailure,
}

impl UciEngine {
    pub fn new(name: String, command: String, args: Vec<String>) -> Self {
        Self {
            name,
            command,
            args,
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            process: None,
            id_name: String::new(),
            id_author: String::new(),
            available_options: BTreeMap::new(),
            last_eval: EvalInfo::default(),
            last_failure: EngineFailure::None,
        }
    }

    pub fn set_handshake_timeout_ms(&mut self, timeout_ms: u64) {
        self.handshake_timeout = Duration::from_millis(timeout_ms);
    }

    /// Launch the child process. Protocol state is reset; the handshake has
    /// not happened yet.
    pub fn start(&mut self, working_dir: Option<&Path>) -> Result<()> {
        let process = LineProcess::spawn(&self.command, &self.args, working_dir)
            .with_context(|| format!("engine \"{}\" failed to start", self.name))?;
        self.process = Some(process);
        self.id_name.clear();
        self.id_author.clear();
        self.available_options.clear();
        self.last_eval = EvalInfo::default();
        self.last_failure = EngineFailure::None;
        Ok(())
    }

    /// Polite teardown: `quit`, a short grace period, then a hard kill.
    pub fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.write_line("quit");
            if !process.wait_for_exit(QUIT_GRACE) {
                process.terminate();
            }
        }
    }

    /// Send `uci` and read until `uciok`, recording `id name`, `id author`
    /// and `option name <N> type …` lines along the way.
    pub fn handshake(&mut self) -> Result<(), EngineFailure> {
        self.last_failure = EngineFailure::None;
        self.write_line("uci")?;
        let deadline = Instant::now() + self.handshake_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.fail(EngineFailure::HandshakeTimeout));
            }
            match self.read_line(deadline - now) {
                ReadLine::Line(line) => {
                    if let Some(rest) = line.strip_prefix("id name ") {
                        self.id_name = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("id author ") {
                        self.id_author = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("option ") {
                        if let Some(option_name) = parse_option_name(rest) {
                            self.available_options.insert(option_name, line.clone());
                        }
                    }
                    if line.trim() == "uciok" {
                        return Ok(());
                    }
                }
                ReadLine::Timeout => return Err(self.fail(EngineFailure::HandshakeTimeout)),
                ReadLine::Eof => return Err(self.fail(EngineFailure::EngineExited)),
            }
        }
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineFailure> {
        let command = if value.is_empty() {
            format!("setoption name {name}")
        } else {
            format!("setoption name {name} value {value}")
        };
        self.write_line(&command)
    }

    /// `isready` … `readyok`, bounded by the handshake timeout.
    pub fn is_ready(&mut self) -> Result<(), EngineFailure> {
        self.last_failure = EngineFailure::None;
        self.write_line("isready")?;
        self.wait_for_token("readyok", self.handshake_timeout)
    }

    pub fn new_game(&mut self) -> Result<(), EngineFailure> {
        self.write_line("ucinewgame")
    }

    /// `position (startpos | fen <fen>) [moves m1 m2 …]`. An empty `fen`
    /// means the standard start position.
    pub fn position(&mut self, fen: &str, moves: &[String]) -> Result<(), EngineFailure> {
        let mut command = if fen.is_empty() {
            String::from("position startpos")
        } else {
            format!("position fen {fen}")
        };
        if !moves.is_empty() {
            command.push_str(" moves");
            for mv in moves {
                command.push(' ');
                command.push_str(mv);
            }
        }
        self.write_line(&command)
    }

    /// Run one search and return the bestmove. `info` lines seen while
    /// waiting update the session's last evaluation (deepest entry wins);
    /// `bestmove (none)` maps to `NoBestmove`.
    pub fn go(
        &mut self,
        wtime_ms: i64,
        btime_ms: i64,
        winc_ms: i64,
        binc_ms: i64,
        movetime_ms: i64,
        timeout: Duration,
    ) -> Result<String, EngineFailure> {
        self.last_failure = EngineFailure::None;
        let mut command =
            format!("go wtime {wtime_ms} btime {btime_ms} winc {winc_ms} binc {binc_ms}");
        if movetime_ms > 0 {
            command.push_str(&format!(" movetime {movetime_ms}"));
        }
        self.write_line(&command)?;

        let deadline = Instant::now() + timeout;
        let mut snapshot = EvalInfo::default();
        loop {
            let now = Instant::now();
            if now >= deadline {
                self.store_eval(snapshot);
                return Err(self.fail(EngineFailure::Timeout));
            }
            match self.read_line(deadline - now) {
                ReadLine::Line(line) => {
                    if line.starts_with("info") {
                        snapshot.update_from_line(&line);
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix("bestmove ") {
                        self.store_eval(snapshot);
                        let mv = rest.split_whitespace().next().unwrap_or_default();
                        if mv == "(none)" {
                            return Err(self.fail(EngineFailure::NoBestmove));
                        }
                        return Ok(mv.to_string());
                    }
                }
                ReadLine::Timeout => {
                    self.store_eval(snapshot);
                    return Err(self.fail(EngineFailure::Timeout));
                }
                ReadLine::Eof => {
                    self.store_eval(snapshot);
                    return Err(self.fail(EngineFailure::EngineExited));
                }
            }
        }
    }

    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => process.is_running(),
            None => false,
        }
    }

    pub fn exit_code(&mut self) -> Option<i32> {
        self.process.as_mut().and_then(|process| process.exit_code())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_name(&self) -> &str {
        &self.id_name
    }

    pub fn id_author(&self) -> &str {
        &self.id_author
    }

    pub fn available_options(&self) -> &BTreeMap<String, String> {
        &self.available_options
    }

    pub fn last_eval(&self) -> EvalInfo {
        self.last_eval
    }

    pub fn last_failure(&self) -> EngineFailure {
        self.last_failure
    }

    pub fn clear_failure(&mut self) {
        self.last_failure = EngineFailure::None;
    }

    fn store_eval(&mut self, snapshot: EvalInfo) {
        // A search that never reported a score keeps the previous value.
        if snapshot.has_eval() {
            self.last_eval = snapshot;
        }
    }

    fn fail(&mut self, failure: EngineFailure) -> EngineFailure {
        self.last_failure = failure;
        failure
    }

    fn write_line(&mut self, line: &str) -> Result<(), EngineFailure> {
        let written = match self.process.as_mut() {
            Some(process) => process.write_line(line).is_ok(),
            None => false,
        };
        if written {
            Ok(())
        } else {
            Err(self.fail(EngineFailure::WriteFailed))
        }
    }

    fn read_line(&self, timeout: Duration) -> ReadLine {
        match self.process.as_ref() {
            Some(process) => process.read_line(timeout),
            None => ReadLine::Eof,
        }
    }

    fn wait_for_token(&mut self, token: &str, timeout: Duration) -> Result<(), EngineFailure> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.fail(EngineFailure::Timeout));
            }
            match self.read_line(deadline - now) {
                ReadLine::Line(line) => {
                    if line.trim() == token {
                        return Ok(());
                    }
                }
                ReadLine::Timeout => return Err(self.fail(EngineFailure::Timeout)),
                ReadLine::Eof => return Err(self.fail(EngineFailure::EngineExited)),
            }
        }
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Extract the option name from the tail of an `option name <N> type …` line.
fn parse_option_name(rest: &str) -> Option<String> {
    let mut tokens = rest.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token == "name" {
            let mut parts = Vec::new();
            while let Some(next) = tokens.peek() {
                if *next == "type" {
                    break;
                }
                parts.push(tokens.next().unwrap().to_string());
            }
            if !parts.is_empty() {
                return Some(parts.join(" "));
            }
        }
    }
    None
}
