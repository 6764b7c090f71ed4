use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::config::RunnerConfig;
use crate::export;
use crate::game::TimeControl;
use crate::openings::{self, Opening};
use crate::persist::{
    self, ActiveGameMeta, CheckpointState, CompletedGameMeta, StandingsSnapshot,
    SwissColorSnapshot, SwissPairingSnapshot, SwissPendingFixture,
};
use crate::pgn::PgnGame;
use crate::pool::EnginePool;
use crate::runner::{
    MatchCallbacks, MatchJob, MatchResult, MatchRunner, MatchRunnerSettings, RunControl,
};
use crate::standings::{EngineStats, StandingsTable};
use crate::termination::{
    ResignLimits, ScoreAdjudicationLimits, TablebaseLimits, TerminationLimits,
};
use crate::tournament::swiss::{self, SwissColorState};
use crate::tournament::{pair_key, round_robin, Fixture};
use crate::util::{atomic_write, format_utc_timestamp};

pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Sink for rendered live game records. Broadcast adapters implement this
/// outside the core; the orchestrator only hands them text.
pub trait LiveSink: Send + Sync {
    fn publish_live(&self, rendered: &str);
}

/// Caller-supplied integration points for one run.
#[derive(Default)]
pub struct RunnerHooks {
    pub log: Option<LogSink>,
    pub broadcast: Option<Arc<dyn LiveSink>>,
    pub site_tag: String,
}

/// Drive one tournament to completion (or until the control stops it).
///
/// Fresh or resumed: with `resume` set, a checkpoint whose config hash
/// matches the current configuration restores schedule progress, standings
/// and Swiss state; a mismatch is logged and ignored.
pub fn run_tournament(
    config: &RunnerConfig,
    resume: bool,
    hooks: RunnerHooks,
    control: &RunControl,
) -> Result<()> {
    config.validate()?;
    let RunnerHooks { log, broadcast, site_tag } = hooks;
    let log: LogSink = log.unwrap_or_else(|| Arc::new(|line: &str| log::info!("{line}")));
    log("[arena] runner starting");

    let mut pool = EnginePool::new(config.engine_specs(), {
        let log = log.clone();
        Some(Box::new(move |line: &str| log(line)))
    });
    pool.set_handshake_timeout_ms(config.watchdog.handshake_timeout_ms);
    pool.start_all(None).context("failed to start engine pool")?;

    let mut openings = if config.openings.path.is_empty() {
        Vec::new()
    } else if config.openings.suite_type == "pgn" {
        openings::load_pgn_suite(Path::new(&config.openings.path))?
    } else {
        openings::load_epd(Path::new(&config.openings.path))?
    };
    if openings.is_empty() {
        openings.push(Opening::startpos());
    }
    openings::shuffle_openings(&mut openings, config.openings.seed);

    let outcome = if config.tournament.mode == "swiss" {
        run_swiss(config, &pool, &openings, resume, &log, broadcast, &site_tag, control)
    } else {
        run_round_robin(config, &pool, &openings, resume, &log, broadcast, &site_tag, control)
    };

    pool.stop_all();
    log("[arena] runner stopped");
    outcome
}

fn runner_settings(config: &RunnerConfig) -> MatchRunnerSettings {
    MatchRunnerSettings {
        time_control: TimeControl {
            base_ms: config.time_control.base_seconds * 1000,
            increment_ms: config.time_control.increment_seconds * 1000,
            move_time_ms: config.time_control.move_time_ms,
        },
        limits: termination_limits(config),
        go_timeout_ms: config.watchdog.go_timeout_ms,
        abort_on_stop: config.limits.abort_on_stop,
        max_failures: config.watchdog.max_failures,
        failure_window_games: config.watchdog.failure_window_games,
        pause_on_unhealthy: config.watchdog.pause_on_unhealthy,
    }
}

fn termination_limits(config: &RunnerConfig) -> TerminationLimits {
    TerminationLimits {
        max_plies: config.limits.max_plies,
        draw_by_repetition: config.limits.draw_by_repetition,
        adjudication: ScoreAdjudicationLimits {
            enabled: config.adjudication.enabled,
            score_draw_cp: config.adjudication.score_draw_cp,
            score_draw_moves: config.adjudication.score_draw_moves,
            score_win_cp: config.adjudication.score_win_cp,
            score_win_moves: config.adjudication.score_win_moves,
            min_depth: config.adjudication.min_depth,
        },
        tablebases: TablebaseLimits {
            enabled: config.tablebases.enabled,
            paths: config.tablebases.paths.clone(),
            probe_limit_pieces: config.tablebases.probe_limit_pieces,
        },
        resign: ResignLimits {
            enabled: config.resign.enabled,
            cp: config.resign.cp,
            moves: config.resign.moves,
            min_depth: config.resign.min_depth,
        },
    }
}

fn tc_desc(config: &RunnerConfig) -> String {
    format!("{}+{}", config.time_control.base_seconds, config.time_control.increment_seconds)
}

/// Load the checkpoint for a resume, honouring it only when its config hash
/// matches. A mismatch or load failure logs and falls back to a fresh start,
/// never a silent merge.
fn load_matching_checkpoint(
    config: &RunnerConfig,
    config_hash: &str,
    resume: bool,
    log: &LogSink,
) -> Option<CheckpointState> {
    if !resume {
        return None;
    }
    let path = Path::new(&config.output.checkpoint_json);
    if !path.exists() {
        return None;
    }
    match persist::load_checkpoint(path) {
        Ok(state) => {
            if state.config_hash == config_hash {
                log("[arena] resuming from checkpoint");
                if !state.active_games.is_empty() {
                    log("[arena] active games will be restarted on resume");
                }
                Some(state)
            } else {
                log("[arena] checkpoint config mismatch; starting fresh");
                None
            }
        }
        Err(err) => {
            log(&format!("[arena] failed to load checkpoint: {err:#}"));
            None
        }
    }
}

/// Align a checkpoint standings snapshot to the current engine list by name.
fn merge_standings_snapshot(
    engine_names: &[String],
    snapshot: &[StandingsSnapshot],
) -> Vec<EngineStats> {
    let by_name: HashMap<&str, &StandingsSnapshot> =
        snapshot.iter().map(|row| (row.name.as_str(), row)).collect();
    engine_names
        .iter()
        .map(|name| match by_name.get(name.as_str()) {
            Some(row) => EngineStats {
                name: name.clone(),
                games: row.games,
                wins: row.wins,
                draws: row.draws,
                losses: row.losses,
                points: row.points,
            },
            None => EngineStats { name: name.clone(), ..EngineStats::default() },
        })
        .collect()
}

#[derive(Clone, Debug)]
struct PendingFixture {
    fixture: Fixture,
    fixture_index: usize,
}

/// Everything the result path, the checkpoint writer and the metrics writer
/// share. The single `state` mutex serialises the whole result path:
/// record append, CSV append, standings update, exports and checkpoint
/// mutation happen under it.
struct TournamentShared {
    config: RunnerConfig,
    engine_names: Vec<String>,
    event_name: String,
    config_hash: String,
    total_games: u32,
    log: LogSink,
    broadcast: Option<Arc<dyn LiveSink>>,
    running: AtomicBool,
    disk_write_errors: AtomicU32,
    active_games: AtomicI64,
    last_game_number: AtomicU32,
    last_game_end_unix: AtomicI64,
    state: Mutex<MutableState>,
}

#[derive(Default)]
struct MutableState {
    standings: StandingsTable,
    completed_games: Vec<CompletedGameMeta>,
    completed_set: HashSet<usize>,
    active_games_meta: Vec<ActiveGameMeta>,
    termination_counts: BTreeMap<String, u32>,
    // Swiss substate; untouched in round-robin mode.
    current_round: u32,
    next_fixture_index: usize,
    pending_fixtures: Vec<PendingFixture>,
    bye_history: Vec<usize>,
    pairings_played: Vec<(usize, usize)>,
    pairings_played_set: HashSet<(usize, usize)>,
    opponent_history: Vec<Vec<usize>>,
    color_history: Vec<SwissColorState>,
    pairing_games_completed: HashMap<(usize, usize), u32>,
    pairing_games_total: HashMap<(usize, usize), u32>,
}

impl TournamentShared {
    fn bump_disk_error(&self) {
        self.disk_write_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn publish_live(&self, pgn: &PgnGame) {
        let rendered = pgn.render();
        if let Some(broadcast) = &self.broadcast {
            broadcast.publish_live(&rendered);
        }
        if atomic_write(Path::new(&self.config.output.live_pgn), &rendered).is_err() {
            self.bump_disk_error();
        }
    }

    fn on_job_event(&self, job: &MatchJob, game_number: u32, started: bool) {
        if started {
            self.active_games.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().unwrap();
            state.active_games_meta.push(ActiveGameMeta {
                game_no: game_number,
                fixture_index: job.fixture_index,
                white: self.engine_names[job.fixture.white_engine_id].clone(),
                black: self.engine_names[job.fixture.black_engine_id].clone(),
                opening_id: job.opening.id.clone(),
            });
        } else {
            self.active_games.fetch_sub(1, Ordering::SeqCst);
            let mut state = self.state.lock().unwrap();
            state.active_games_meta.retain(|entry| entry.game_no != game_number);
        }
    }

    fn last_game_end_time(&self) -> String {
        let unix = self.last_game_end_unix.load(Ordering::SeqCst);
        if unix == 0 {
            return String::new();
        }
        DateTime::from_timestamp(unix, 0).map(format_utc_timestamp).unwrap_or_default()
    }

    fn write_metrics(&self) {
        let completed = {
            let state = self.state.lock().unwrap();
            state.completed_set.len() as i64
        };
        let metrics = serde_json::json!({
            "active_games": self.active_games.load(Ordering::SeqCst),
            "queue_remaining": i64::from(self.total_games) - completed,
            "total_games": self.total_games,
            "engines_running": self.engine_names.len(),
            "last_game_end_time": self.last_game_end_time(),
            "disk_write_errors_count": self.disk_write_errors.load(Ordering::SeqCst),
        });
        let body = serde_json::to_string_pretty(&metrics).unwrap_or_default();
        if atomic_write(Path::new(&self.config.output.metrics_json), &body).is_err() {
            self.bump_disk_error();
        }
    }

    /// Fold one finished game into every output surface. Runs entirely under
    /// the state mutex so concurrent workers serialise here.
    fn handle_result(&self, result: &MatchResult, is_swiss: bool) {
        let fixture = &result.job.fixture;
        let white_name = &self.engine_names[fixture.white_engine_id];
        let black_name = &self.engine_names[fixture.black_engine_id];
        let final_pgn = result.record.pgn.render();

        let mut state = self.state.lock().unwrap();

        let pgn_path = PathBuf::from(&self.config.output.tournament_pgn);
        let pgn_offset = fs::metadata(&pgn_path).map(|meta| meta.len()).unwrap_or(0);
        if append_tournament_pgn(&pgn_path, &final_pgn).is_err() {
            self.bump_disk_error();
        }

        if self.config.output.write_game_files && !self.config.output.games_dir.is_empty() {
            let game_path = PathBuf::from(&self.config.output.games_dir)
                .join(format!("game_{:06}.pgn", result.game_number));
            if crate::util::ensure_parent_dir(&game_path).is_err()
                || fs::write(&game_path, &final_pgn).is_err()
            {
                self.bump_disk_error();
            }
        }

        state.standings.record_result(
            fixture.white_engine_id,
            fixture.black_engine_id,
            &result.record.state.result,
        );
        if !result.record.state.termination.is_empty() {
            *state
                .termination_counts
                .entry(result.record.state.termination.clone())
                .or_insert(0) += 1;
        }

        if is_swiss {
            swiss::update_color_history(&mut state.color_history[fixture.white_engine_id], 1);
            swiss::update_color_history(&mut state.color_history[fixture.black_engine_id], -1);

            let key = pair_key(fixture.white_engine_id, fixture.black_engine_id);
            let completed = {
                let entry = state.pairing_games_completed.entry(key).or_insert(0);
                *entry += 1;
                *entry
            };
            let total = state.pairing_games_total.get(&key).copied().unwrap_or(0);
            if completed == total && state.pairings_played_set.insert(key) {
                state.pairings_played.push(key);
                state.opponent_history[fixture.white_engine_id].push(fixture.black_engine_id);
                state.opponent_history[fixture.black_engine_id].push(fixture.white_engine_id);
            }

            let fixture_index = result.job.fixture_index;
            state.pending_fixtures.retain(|pending| pending.fixture_index != fixture_index);
            if state.pending_fixtures.is_empty() {
                state.current_round += 1;
                state.pairing_games_completed.clear();
                state.pairing_games_total.clear();
            }
        }

        let csv_line = format!(
            "{},{},{},{},{},{},{},{},{}",
            result.game_number,
            fixture.round_index + 1,
            white_name,
            black_name,
            result.job.opening.id,
            result.job.opening.fen,
            result.record.state.result,
            result.record.state.termination,
            self.config.output.tournament_pgn,
        );
        if append_csv_line(
            Path::new(&self.config.output.pairings_csv),
            &csv_line,
            "game_no,round,white,black,opening_id,fen,result,termination,pgn_path",
        )
        .is_err()
        {
            self.bump_disk_error();
        }

        let log_line = format!(
            "GAME END #{} | {} vs {} | {} | term={} | opening={}",
            result.game_number,
            white_name,
            black_name,
            result.record.state.result,
            result.record.state.termination,
            result.job.opening.id,
        );
        (self.log)(&log_line);
        if !self.config.output.progress_log.is_empty()
            && append_plain_line(Path::new(&self.config.output.progress_log), &log_line).is_err()
        {
            self.bump_disk_error();
        }

        let rows = state.standings.rows().to_vec();
        let games_played = state.standings.games_played();
        if export::write_results_json(
            Path::new(&self.config.output.results_json),
            &self.event_name,
            &tc_desc(&self.config),
            &self.config.tournament.mode,
            games_played,
            &rows,
            &state.termination_counts,
        )
        .is_err()
        {
            self.bump_disk_error();
        }
        if export::write_standings_csv(Path::new(&self.config.output.standings_csv), &rows)
            .is_err()
        {
            self.bump_disk_error();
        }
        if export::write_standings_html(
            Path::new(&self.config.output.standings_html),
            &self.event_name,
            &rows,
        )
        .is_err()
        {
            self.bump_disk_error();
        }
        if export::write_summary_json(
            Path::new(&self.config.output.summary_json),
            &self.event_name,
            &tc_desc(&self.config),
            &self.config.tournament.mode,
            self.total_games,
            &rows,
        )
        .is_err()
        {
            self.bump_disk_error();
        }

        state.completed_games.push(CompletedGameMeta {
            game_no: result.game_number,
            fixture_index: result.job.fixture_index,
            white: white_name.clone(),
            black: black_name.clone(),
            opening_id: result.job.opening.id.clone(),
            result: result.record.state.result.clone(),
            termination: result.record.state.termination.clone(),
            pgn_offset,
            pgn_path: self.config.output.tournament_pgn.clone(),
        });
        state.completed_set.insert(result.job.fixture_index);

        self.last_game_number.store(result.game_number, Ordering::SeqCst);
        self.last_game_end_unix.store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    /// Common checkpoint fields; mode-specific writers fill in the rest.
    fn base_checkpoint(&self, version: u32) -> CheckpointState {
        let state = self.state.lock().unwrap();
        let mut completed: Vec<usize> = state.completed_set.iter().copied().collect();
        completed.sort_unstable();
        CheckpointState {
            version,
            config_hash: self.config_hash.clone(),
            total_games: self.total_games,
            rng_seed: self.config.openings.seed,
            last_game_no: self.last_game_number.load(Ordering::SeqCst),
            last_game_end_time: self.last_game_end_time(),
            completed_fixture_indices: completed,
            completed_games: state.completed_games.clone(),
            active_games: state.active_games_meta.clone(),
            standings: state
                .standings
                .rows()
                .iter()
                .map(|row| StandingsSnapshot {
                    name: row.name.clone(),
                    games: row.games,
                    wins: row.wins,
                    draws: row.draws,
                    losses: row.losses,
                    points: row.points,
                })
                .collect(),
            ..CheckpointState::default()
        }
    }

    fn round_robin_checkpoint(
        &self,
        fixtures: &[Fixture],
        assigned_openings: &[Opening],
    ) -> CheckpointState {
        let mut snapshot = self.base_checkpoint(1);
        snapshot.next_fixture_index = fixtures.len();
        snapshot.opening_index = fixtures.len();
        let completed: HashSet<usize> = snapshot.completed_fixture_indices.iter().copied().collect();
        for (index, fixture) in fixtures.iter().enumerate() {
            if !completed.contains(&index) {
                snapshot.next_fixture_index = index;
                snapshot.opening_index = index;
                snapshot.next_game.fixture_index = index as i64;
                snapshot.next_game.white = self.engine_names[fixture.white_engine_id].clone();
                snapshot.next_game.black = self.engine_names[fixture.black_engine_id].clone();
                snapshot.next_game.opening_id = assigned_openings[index].id.clone();
                break;
            }
        }
        snapshot
    }

    fn swiss_checkpoint(&self, openings: &[Opening]) -> CheckpointState {
        let mut snapshot = self.base_checkpoint(2);
        let state = self.state.lock().unwrap();
        snapshot.next_fixture_index = state.next_fixture_index;
        snapshot.opening_index = state.next_fixture_index;
        snapshot.swiss.current_round = state.current_round;
        snapshot.swiss.bye_history = state.bye_history.clone();
        snapshot.swiss.pairings_played = state
            .pairings_played
            .iter()
            .map(|&(lo, hi)| SwissPairingSnapshot { white_engine_id: lo, black_engine_id: hi })
            .collect();
        snapshot.swiss.color_history = state
            .color_history
            .iter()
            .map(|entry| SwissColorSnapshot { last_color: entry.last_color, streak: entry.streak })
            .collect();
        snapshot.swiss.pending_pairings_current_round = state
            .pending_fixtures
            .iter()
            .map(|pending| SwissPendingFixture {
                fixture_index: pending.fixture_index,
                round_index: pending.fixture.round_index,
                white_engine_id: pending.fixture.white_engine_id,
                black_engine_id: pending.fixture.black_engine_id,
                game_index_within_pairing: pending.fixture.game_index_within_pairing,
                pairing_id: pending.fixture.pairing_id.clone(),
            })
            .collect();
        if let Some(pending) = state.pending_fixtures.first() {
            snapshot.next_game.fixture_index = pending.fixture_index as i64;
            snapshot.next_game.white =
                self.engine_names[pending.fixture.white_engine_id].clone();
            snapshot.next_game.black =
                self.engine_names[pending.fixture.black_engine_id].clone();
            snapshot.next_game.opening_id = openings::assign_swiss_for_index(
                pending.fixture_index,
                openings,
                self.config.tournament.games_per_pairing,
            )
            .id;
        }
        snapshot
    }
}

fn append_tournament_pgn(path: &Path, pgn: &str) -> Result<()> {
    crate::util::ensure_parent_dir(path)?;
    let prepend_newline = fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if prepend_newline {
        file.write_all(b"\n")?;
    }
    file.write_all(pgn.as_bytes())?;
    Ok(())
}

fn append_csv_line(path: &Path, line: &str, header: &str) -> Result<()> {
    crate::util::ensure_parent_dir(path)?;
    let needs_header = fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if needs_header {
        writeln!(file, "{header}")?;
    }
    writeln!(file, "{line}")?;
    Ok(())
}

fn append_plain_line(path: &Path, line: &str) -> Result<()> {
    crate::util::ensure_parent_dir(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Periodic background task with a short poll slice so teardown never waits
/// a full interval.
fn spawn_periodic(
    shared: Arc<TournamentShared>,
    interval: Duration,
    task: impl Fn() + Send + 'static,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let slice = Duration::from_millis(200);
        let mut waited = Duration::ZERO;
        while shared.running.load(Ordering::SeqCst) {
            std::thread::sleep(slice.min(interval));
            waited += slice;
            if waited >= interval {
                waited = Duration::ZERO;
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                task();
            }
        }
    })
}

struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn spawn(
        shared: &Arc<TournamentShared>,
        write_checkpoint: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        let mut handles = Vec::new();
        let checkpoint_secs = shared.config.output.checkpoint_interval_seconds;
        if checkpoint_secs > 0 {
            let write_checkpoint = write_checkpoint.clone();
            handles.push(spawn_periodic(
                shared.clone(),
                Duration::from_secs(checkpoint_secs),
                move || write_checkpoint(),
            ));
        }
        let metrics_secs = shared.config.output.metrics_interval_seconds;
        if metrics_secs > 0 {
            let shared_metrics = shared.clone();
            handles.push(spawn_periodic(
                shared.clone(),
                Duration::from_secs(metrics_secs),
                move || shared_metrics.write_metrics(),
            ));
        }
        Self { handles }
    }

    fn join(self, shared: &TournamentShared) {
        shared.running.store(false, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn make_callbacks(
    shared: &Arc<TournamentShared>,
    write_checkpoint: &Arc<dyn Fn() + Send + Sync>,
    log: &LogSink,
    is_swiss: bool,
) -> MatchCallbacks {
    let on_live = {
        let shared = shared.clone();
        Box::new(move |pgn: &PgnGame| shared.publish_live(pgn))
    };
    let on_job_event = {
        let shared = shared.clone();
        Box::new(move |job: &MatchJob, game_number: u32, started: bool| {
            shared.on_job_event(job, game_number, started)
        })
    };
    let on_result = {
        let shared = shared.clone();
        let write_checkpoint = write_checkpoint.clone();
        Box::new(move |result: &MatchResult| {
            shared.handle_result(result, is_swiss);
            write_checkpoint();
        })
    };
    let on_log = {
        let log = log.clone();
        Box::new(move |line: &str| log(line))
    };
    MatchCallbacks { on_result, on_live, on_job_event, on_log }
}

#[allow(clippy::too_many_arguments)]
fn run_round_robin(
    config: &RunnerConfig,
    pool: &EnginePool,
    openings: &[Opening],
    resume: bool,
    log: &LogSink,
    broadcast: Option<Arc<dyn LiveSink>>,
    site_tag: &str,
    control: &RunControl,
) -> Result<()> {
    let engine_names = config.engine_names();
    let mut fixtures = round_robin::build_schedule(
        engine_names.len(),
        config.tournament.double_round_robin,
        config.tournament.games_per_pairing,
        config.tournament.rounds,
    );
    if config.limits.max_games > 0 && fixtures.len() as i64 > config.limits.max_games {
        fixtures.truncate(config.limits.max_games as usize);
    }
    let assigned_openings =
        openings::assign_round_robin(&fixtures, openings, config.tournament.games_per_pairing);
    let total_games = fixtures.len() as u32;

    let config_hash = persist::compute_config_hash(&config.canonical_json());
    let checkpoint = load_matching_checkpoint(config, &config_hash, resume, log);

    let mut standings = StandingsTable::new(engine_names.clone());
    let mut initial_game_number = 0;
    let mut completed_games = Vec::new();
    let mut completed_set = HashSet::new();
    if let Some(checkpoint) = &checkpoint {
        completed_set = checkpoint.completed_fixture_indices.iter().copied().collect();
        completed_games = checkpoint.completed_games.clone();
        initial_game_number = checkpoint.last_game_no;
        if !checkpoint.standings.is_empty() {
            standings
                .load_snapshot(merge_standings_snapshot(&engine_names, &checkpoint.standings));
        }
    }

    let jobs: Vec<MatchJob> = fixtures
        .iter()
        .enumerate()
        .filter(|(index, _)| !completed_set.contains(index))
        .map(|(index, fixture)| MatchJob {
            fixture: fixture.clone(),
            opening: assigned_openings[index].clone(),
            event_name: "arena round robin".to_string(),
            site_tag: site_tag.to_string(),
            round_label: (fixture.round_index + 1).to_string(),
            fixture_index: index,
        })
        .collect();

    let shared = Arc::new(TournamentShared {
        config: config.clone(),
        engine_names,
        event_name: "arena round robin".to_string(),
        config_hash,
        total_games,
        log: log.clone(),
        broadcast,
        running: AtomicBool::new(true),
        disk_write_errors: AtomicU32::new(0),
        active_games: AtomicI64::new(0),
        last_game_number: AtomicU32::new(initial_game_number),
        last_game_end_unix: AtomicI64::new(0),
        state: Mutex::new(MutableState {
            standings,
            completed_games,
            completed_set,
            ..MutableState::default()
        }),
    });

    let write_checkpoint: Arc<dyn Fn() + Send + Sync> = {
        let shared = shared.clone();
        let fixtures = fixtures.clone();
        let assigned_openings = assigned_openings.clone();
        Arc::new(move || {
            let snapshot = shared.round_robin_checkpoint(&fixtures, &assigned_openings);
            if persist::save_checkpoint(
                Path::new(&shared.config.output.checkpoint_json),
                &snapshot,
            )
            .is_err()
            {
                shared.bump_disk_error();
            }
        })
    };

    let callbacks = make_callbacks(&shared, &write_checkpoint, log, false);
    let background = BackgroundTasks::spawn(&shared, write_checkpoint.clone());
    let match_runner = MatchRunner::new(pool, runner_settings(config), &callbacks);

    write_checkpoint();
    match_runner.run(&jobs, config.tournament.concurrency, control, initial_game_number);

    pool.stop_all();
    write_checkpoint();
    background.join(&shared);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_swiss(
    config: &RunnerConfig,
    pool: &EnginePool,
    openings: &[Opening],
    resume: bool,
    log: &LogSink,
    broadcast: Option<Arc<dyn LiveSink>>,
    site_tag: &str,
    control: &RunControl,
) -> Result<()> {
    let engine_names = config.engine_names();
    let engine_count = engine_names.len();
    let games_per_pairing = config.tournament.games_per_pairing.max(1);
    let fixtures_per_round = (engine_count as u32 / 2) * games_per_pairing;

    // max_games clamps to whole rounds; a partial round is never scheduled.
    let mut total_rounds = config.tournament.rounds.max(1);
    if config.limits.max_games > 0 && fixtures_per_round > 0 {
        let max_rounds = (config.limits.max_games as u32) / fixtures_per_round;
        if max_rounds > 0 {
            total_rounds = total_rounds.min(max_rounds);
        }
    }
    let total_games = fixtures_per_round * total_rounds;

    let config_hash = persist::compute_config_hash(&config.canonical_json());
    let checkpoint = load_matching_checkpoint(config, &config_hash, resume, log);

    let mut standings = StandingsTable::new(engine_names.clone());
    let mut initial_game_number = 0;
    let mut state = MutableState {
        opponent_history: vec![Vec::new(); engine_count],
        color_history: vec![SwissColorState::default(); engine_count],
        ..MutableState::default()
    };
    if let Some(checkpoint) = &checkpoint {
        state.completed_set = checkpoint.completed_fixture_indices.iter().copied().collect();
        state.completed_games = checkpoint.completed_games.clone();
        initial_game_number = checkpoint.last_game_no;
        state.current_round = checkpoint.swiss.current_round;
        state.next_fixture_index = checkpoint.next_fixture_index;
        state.bye_history = checkpoint.swiss.bye_history.clone();
        for pairing in &checkpoint.swiss.pairings_played {
            let (white, black) = (pairing.white_engine_id, pairing.black_engine_id);
            if white >= engine_count || black >= engine_count {
                continue;
            }
            let key = pair_key(white, black);
            if state.pairings_played_set.insert(key) {
                state.pairings_played.push(key);
                state.opponent_history[white].push(black);
                state.opponent_history[black].push(white);
            }
        }
        if !checkpoint.swiss.color_history.is_empty() {
            state.color_history = checkpoint
                .swiss
                .color_history
                .iter()
                .map(|entry| SwissColorState { last_color: entry.last_color, streak: entry.streak })
                .collect();
            state.color_history.resize(engine_count, SwissColorState::default());
        }
        state.pending_fixtures = checkpoint
            .swiss
            .pending_pairings_current_round
            .iter()
            .map(|pending| PendingFixture {
                fixture: Fixture {
                    round_index: pending.round_index,
                    white_engine_id: pending.white_engine_id,
                    black_engine_id: pending.black_engine_id,
                    game_index_within_pairing: pending.game_index_within_pairing,
                    pairing_id: pending.pairing_id.clone(),
                },
                fixture_index: pending.fixture_index,
            })
            .collect();
        if !state.pending_fixtures.is_empty() {
            let mut pending_counts: HashMap<(usize, usize), u32> = HashMap::new();
            for pending in &state.pending_fixtures {
                let key = pair_key(
                    pending.fixture.white_engine_id,
                    pending.fixture.black_engine_id,
                );
                *pending_counts.entry(key).or_insert(0) += 1;
            }
            for (key, pending) in pending_counts {
                state.pairing_games_total.insert(key, games_per_pairing);
                state
                    .pairing_games_completed
                    .insert(key, games_per_pairing.saturating_sub(pending));
            }
        }
        if !checkpoint.standings.is_empty() {
            standings
                .load_snapshot(merge_standings_snapshot(&engine_names, &checkpoint.standings));
        }
    }
    state.standings = standings;

    let shared = Arc::new(TournamentShared {
        config: config.clone(),
        engine_names: engine_names.clone(),
        event_name: "arena swiss".to_string(),
        config_hash,
        total_games,
        log: log.clone(),
        broadcast,
        running: AtomicBool::new(true),
        disk_write_errors: AtomicU32::new(0),
        active_games: AtomicI64::new(0),
        last_game_number: AtomicU32::new(initial_game_number),
        last_game_end_unix: AtomicI64::new(0),
        state: Mutex::new(state),
    });

    let write_checkpoint: Arc<dyn Fn() + Send + Sync> = {
        let shared = shared.clone();
        let openings = openings.to_vec();
        Arc::new(move || {
            let snapshot = shared.swiss_checkpoint(&openings);
            if persist::save_checkpoint(
                Path::new(&shared.config.output.checkpoint_json),
                &snapshot,
            )
            .is_err()
            {
                shared.bump_disk_error();
            }
        })
    };

    let callbacks = make_callbacks(&shared, &write_checkpoint, log, true);
    let background = BackgroundTasks::spawn(&shared, write_checkpoint.clone());
    let match_runner = MatchRunner::new(pool, runner_settings(config), &callbacks);

    write_checkpoint();

    loop {
        if control.is_stopped() {
            break;
        }
        let jobs: Vec<MatchJob> = {
            let mut state = shared.state.lock().unwrap();
            if state.current_round >= total_rounds {
                break;
            }
            if state.pending_fixtures.is_empty() {
                let scores: Vec<f64> =
                    state.standings.rows().iter().map(|row| row.points).collect();
                let swiss_round = swiss::build_swiss_round(
                    state.current_round,
                    &scores,
                    &state.opponent_history,
                    &state.bye_history,
                    &state.color_history,
                    &state.pairings_played_set,
                    games_per_pairing,
                    config.tournament.avoid_repeats,
                );

                if let Some(bye) = swiss_round.bye_engine_id {
                    if config.tournament.bye_points > 0.0 {
                        state.standings.record_bye(bye, config.tournament.bye_points);
                    }
                    state.bye_history.push(bye);
                    log(&format!("[arena] swiss bye: {}", engine_names[bye]));
                }

                for &(a, b) in &swiss_round.pairings {
                    state.pairing_games_total.insert(pair_key(a, b), games_per_pairing);
                }
                let mut next_fixture_index = state.next_fixture_index;
                let pending: Vec<PendingFixture> = swiss_round
                    .fixtures
                    .into_iter()
                    .map(|fixture| {
                        let fixture_index = next_fixture_index;
                        next_fixture_index += 1;
                        PendingFixture { fixture, fixture_index }
                    })
                    .collect();
                state.next_fixture_index = next_fixture_index;
                state.pending_fixtures = pending;
            }

            state
                .pending_fixtures
                .iter()
                .filter(|pending| !state.completed_set.contains(&pending.fixture_index))
                .map(|pending| MatchJob {
                    fixture: pending.fixture.clone(),
                    opening: openings::assign_swiss_for_index(
                        pending.fixture_index,
                        openings,
                        games_per_pairing,
                    ),
                    event_name: "arena swiss".to_string(),
                    site_tag: site_tag.to_string(),
                    round_label: (pending.fixture.round_index + 1).to_string(),
                    fixture_index: pending.fixture_index,
                })
                .collect()
        };

        if jobs.is_empty() {
            let mut state = shared.state.lock().unwrap();
            state.current_round += 1;
            state.pending_fixtures.clear();
            continue;
        }

        match_runner.run(&jobs, config.tournament.concurrency, control, initial_game_number);
        initial_game_number = shared.last_game_number.load(Ordering::SeqCst);
    }

    pool.stop_all();
    write_checkpoint();
    background.join(&shared);
    Ok(())
}
