use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::pool::EngineSpec;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub cmd: String,
    pub args: Vec<String>,
    /// Option name → value, applied after the handshake. Values may be
    /// strings, numbers or booleans; everything is sent as text.
    pub uci_options: std::collections::BTreeMap<String, serde_json::Value>,
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeControlConfig {
    pub base_seconds: i64,
    pub increment_seconds: i64,
    pub move_time_ms: i64,
}

impl Default for TimeControlConfig {
    fn default() -> Self {
        Self { base_seconds: 60, increment_seconds: 0, move_time_ms: 200 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub mode: String,
    pub double_round_robin: bool,
    pub rounds: u32,
    pub games_per_pairing: u32,
    pub concurrency: usize,
    pub avoid_repeats: bool,
    pub bye_points: f64,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            mode: "round_robin".to_string(),
            double_round_robin: false,
            rounds: 1,
            games_per_pairing: 1,
            concurrency: 1,
            avoid_repeats: true,
            bye_points: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningConfig {
    #[serde(rename = "type")]
    pub suite_type: String,
    pub path: String,
    pub policy: String,
    pub seed: u64,
}

impl Default for OpeningConfig {
    fn default() -> Self {
        Self {
            suite_type: "epd".to_string(),
            path: String::new(),
            policy: "round_robin".to_string(),
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub tournament_pgn: String,
    pub live_pgn: String,
    pub results_json: String,
    pub pairings_csv: String,
    pub progress_log: String,
    pub checkpoint_json: String,
    pub standings_csv: String,
    pub standings_html: String,
    pub summary_json: String,
    pub metrics_json: String,
    pub games_dir: String,
    pub write_game_files: bool,
    pub checkpoint_interval_seconds: u64,
    pub metrics_interval_seconds: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            tournament_pgn: "out/tournament.pgn".to_string(),
            live_pgn: "out/live.pgn".to_string(),
            results_json: "out/results.json".to_string(),
            pairings_csv: "out/pairings.csv".to_string(),
            progress_log: String::new(),
            checkpoint_json: "out/checkpoint.json".to_string(),
            standings_csv: "out/standings.csv".to_string(),
            standings_html: "out/standings.html".to_string(),
            summary_json: "out/summary.json".to_string(),
            metrics_json: "out/metrics.json".to_string(),
            games_dir: "out/games".to_string(),
            write_game_files: false,
            checkpoint_interval_seconds: 120,
            metrics_interval_seconds: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_plies: usize,
    pub max_games: i64,
    pub draw_by_repetition: bool,
    pub abort_on_stop: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_plies: 400, max_games: -1, draw_by_repetition: false, abort_on_stop: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationConfig {
    pub enabled: bool,
    pub score_draw_cp: i32,
    pub score_draw_moves: u32,
    pub score_win_cp: i32,
    pub score_win_moves: u32,
    pub min_depth: u32,
}

impl Default for AdjudicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            score_draw_cp: 15,
            score_draw_moves: 8,
            score_win_cp: 700,
            score_win_moves: 6,
            min_depth: 12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablebaseConfig {
    pub enabled: bool,
    pub paths: Vec<String>,
    pub probe_limit_pieces: u32,
}

impl Default for TablebaseConfig {
    fn default() -> Self {
        Self { enabled: true, paths: Vec::new(), probe_limit_pieces: 6 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResignConfig {
    pub enabled: bool,
    pub cp: i32,
    pub moves: u32,
    pub min_depth: u32,
}

impl Default for ResignConfig {
    fn default() -> Self {
        Self { enabled: true, cp: 900, moves: 3, min_depth: 12 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub handshake_timeout_ms: u64,
    pub go_timeout_ms: i64,
    pub max_failures: u32,
    pub failure_window_games: u32,
    pub pause_on_unhealthy: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 10_000,
            go_timeout_ms: 0,
            max_failures: 3,
            failure_window_games: 10,
            pause_on_unhealthy: true,
        }
    }
}

/// Runtime configuration for one tournament. Every section has defaults so
/// a config file only states what it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub engines: Vec<EngineConfig>,
    pub time_control: TimeControlConfig,
    pub tournament: TournamentConfig,
    pub openings: OpeningConfig,
    pub output: OutputConfig,
    pub limits: LimitsConfig,
    pub adjudication: AdjudicationConfig,
    pub tablebases: TablebaseConfig,
    pub resign: ResignConfig,
    pub watchdog: WatchdogConfig,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to open config {}", path.display()))?;
        let config: RunnerConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::util::ensure_parent_dir(path)?;
        let body = serde_json::to_string_pretty(self).context("failed to serialise config")?;
        fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Canonical serialisation feeding the checkpoint config hash: compact
    /// JSON in declaration order, stable for byte-identical configs.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.engines.len() < 2 {
            bail!("at least 2 engines are required (got {})", self.engines.len());
        }
        for (i, engine) in self.engines.iter().enumerate() {
            if engine.cmd.is_empty() {
                bail!("engine {i} has no launch command");
            }
        }
        if self.tournament.concurrency == 0 {
            bail!("tournament.concurrency must be at least 1");
        }
        if self.tournament.games_per_pairing == 0 {
            bail!("tournament.games_per_pairing must be at least 1");
        }
        match self.tournament.mode.as_str() {
            "round_robin" | "swiss" => {}
            other => bail!("unknown tournament mode \"{other}\""),
        }
        if !self.openings.path.is_empty()
            && !matches!(self.openings.suite_type.as_str(), "epd" | "pgn")
        {
            bail!("unsupported openings type \"{}\"", self.openings.suite_type);
        }
        Ok(())
    }

    pub fn engine_specs(&self) -> Vec<EngineSpec> {
        self.engines
            .iter()
            .map(|engine| EngineSpec {
                name: if engine.name.is_empty() { "UCI".to_string() } else { engine.name.clone() },
                command: engine.cmd.clone(),
                args: engine.args.clone(),
                uci_options: engine
                    .uci_options
                    .iter()
                    .map(|(name, value)| (name.clone(), json_value_to_string(value)))
                    .collect(),
            })
            .collect()
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.engine_specs().into_iter().map(|spec| spec.name).collect()
    }
}
