use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::game::{is_startpos_fen, play_game, GameRecord, TimeControl};
use crate::openings::Opening;
use crate::pgn::PgnGame;
use crate::pool::EnginePool;
use crate::termination::TerminationLimits;
use crate::tournament::Fixture;
use crate::uci::EngineFailure;

/// One unit of schedulable work.
#[derive(Clone, Debug)]
pub struct MatchJob {
    pub fixture: Fixture,
    pub opening: Opening,
    pub event_name: String,
    pub site_tag: String,
    pub round_label: String,
    pub fixture_index: usize,
}

#[derive(Debug)]
pub struct MatchResult {
    pub job: MatchJob,
    pub record: GameRecord,
    pub game_number: u32,
}

/// Capability set the match runner consumes; callers plug concrete sinks.
/// Every callback may be invoked concurrently from worker threads.
pub struct MatchCallbacks {
    pub on_result: Box<dyn Fn(&MatchResult) + Send + Sync>,
    pub on_live: Box<dyn Fn(&PgnGame) + Send + Sync>,
    pub on_job_event: Box<dyn Fn(&MatchJob, u32, bool) + Send + Sync>,
    pub on_log: Box<dyn Fn(&str) + Send + Sync>,
}

impl Default for MatchCallbacks {
    fn default() -> Self {
        Self {
            on_result: Box::new(|_| {}),
            on_live: Box::new(|_| {}),
            on_job_event: Box::new(|_, _, _| {}),
            on_log: Box::new(|line| log::info!("{line}")),
        }
    }
}

/// Stop/pause switchboard shared between the orchestrator and the workers.
/// Stop is cooperative: workers observe it between jobs and within a game
/// through the arbiter's manual-stop path.
#[derive(Default)]
pub struct RunControl {
    pub stop: AtomicBool,
    pub paused: AtomicBool,
    pause_lock: Mutex<()>,
    pause_cv: Condvar,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        let _guard = self.pause_lock.lock().unwrap();
        self.stop.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.pause_cv.notify_all();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let _guard = self.pause_lock.lock().unwrap();
        self.paused.store(false, Ordering::SeqCst);
        self.pause_cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Block while paused. The wait predicate is `!paused || stop`.
    fn wait_while_paused(&self) {
        let mut guard = self.pause_lock.lock().unwrap();
        while self.paused.load(Ordering::SeqCst) && !self.stop.load(Ordering::SeqCst) {
            guard = self.pause_cv.wait(guard).unwrap();
        }
    }
}

pub struct MatchRunnerSettings {
    pub time_control: TimeControl,
    pub limits: TerminationLimits,
    pub go_timeout_ms: i64,
    pub abort_on_stop: bool,
    pub max_failures: u32,
    pub failure_window_games: u32,
    pub pause_on_unhealthy: bool,
}

/// Multi-threaded worker loop over a job list: leases a pair, drives one
/// game, applies the watchdog policy, delivers callbacks.
pub struct MatchRunner<'a> {
    pool: &'a EnginePool,
    settings: MatchRunnerSettings,
    callbacks: &'a MatchCallbacks,
    failure_history: Mutex<Vec<VecDeque<u32>>>,
}

impl<'a> MatchRunner<'a> {
    pub fn new(
        pool: &'a EnginePool,
        settings: MatchRunnerSettings,
        callbacks: &'a MatchCallbacks,
    ) -> Self {
        let failure_history = Mutex::new(vec![VecDeque::new(); pool.engine_count()]);
        Self { pool, settings, callbacks, failure_history }
    }

    /// Run every job to completion (or until stopped). Game numbers continue
    /// from `initial_game_number`, in dispatch order.
    pub fn run(
        &self,
        jobs: &[MatchJob],
        concurrency: usize,
        control: &RunControl,
        initial_game_number: u32,
    ) {
        if jobs.is_empty() {
            return;
        }
        {
            let mut history = self.failure_history.lock().unwrap();
            history.clear();
            history.resize(self.pool.engine_count(), VecDeque::new());
        }

        let worker_count = concurrency.max(1);
        let next_job = AtomicUsize::new(0);
        let game_counter = AtomicU32::new(initial_game_number);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| self.run_worker(jobs, &next_job, &game_counter, control));
            }
        });
    }

    fn run_worker(
        &self,
        jobs: &[MatchJob],
        next_job: &AtomicUsize,
        game_counter: &AtomicU32,
        control: &RunControl,
    ) {
        loop {
            if control.is_stopped() {
                return;
            }
            control.wait_while_paused();
            if control.is_stopped() {
                return;
            }

            let index = next_job.fetch_add(1, Ordering::SeqCst);
            let Some(job) = jobs.get(index) else {
                return;
            };
            let game_number = game_counter.fetch_add(1, Ordering::SeqCst) + 1;
            (self.callbacks.on_job_event)(job, game_number, true);

            let lease =
                self.pool.acquire_pair(job.fixture.white_engine_id, job.fixture.black_engine_id);

            let record = {
                let mut white = lease.white();
                let mut black = lease.black();
                let _ = white.new_game();
                let _ = black.new_game();
                let _ = white.is_ready();
                let _ = black.is_ready();

                let mut pgn = PgnGame::new();
                pgn.set_tag("Event", &job.event_name);
                if !job.site_tag.is_empty() {
                    pgn.set_tag("Site", &job.site_tag);
                }
                pgn.set_tag("Round", &job.round_label);
                pgn.set_tag("White", white.name());
                pgn.set_tag("Black", black.name());
                pgn.set_tag("Result", "*");
                if !job.opening.fen.is_empty() && !is_startpos_fen(&job.opening.fen) {
                    pgn.set_tag("SetUp", "1");
                    pgn.set_tag("FEN", &job.opening.fen);
                }

                let mut on_live = |live: &PgnGame| (self.callbacks.on_live)(live);
                play_game(
                    &mut white,
                    &mut black,
                    &self.settings.time_control,
                    &self.settings.limits,
                    self.settings.go_timeout_ms,
                    if self.settings.abort_on_stop { Some(&control.stop) } else { None },
                    pgn,
                    &job.opening.fen,
                    &job.opening.moves,
                    &mut on_live,
                )
            };

            self.handle_failure(job.fixture.white_engine_id, game_number, control);
            self.handle_failure(job.fixture.black_engine_id, game_number, control);

            (self.callbacks.on_job_event)(job, game_number, false);
            let result = MatchResult { job: job.clone(), record, game_number };
            (self.callbacks.on_result)(&result);
        }
    }

    /// Watchdog: log the failure, track it in the per-engine sliding window,
    /// restart the engine, and pause or stop the tournament when the window
    /// overflows.
    fn handle_failure(&self, engine_id: usize, game_number: u32, control: &RunControl) {
        let (failure, crashed, exit_code, label) = {
            let mut engine = self.pool.engine(engine_id);
            (
                engine.last_failure(),
                !engine.is_running(),
                engine.exit_code(),
                engine.name().to_string(),
            )
        };
        if failure == EngineFailure::None && !crashed {
            return;
        }

        if crashed {
            (self.callbacks.on_log)(&format!(
                "WATCHDOG: Engine \"{label}\" crashed, exitCode={}",
                exit_code.unwrap_or(-1)
            ));
        } else {
            (self.callbacks.on_log)(&format!(
                "WATCHDOG: Engine \"{label}\" unresponsive, restarting..."
            ));
        }

        {
            let mut history = self.failure_history.lock().unwrap();
            if let Some(entries) = history.get_mut(engine_id) {
                entries.push_back(game_number);
                let window = self.settings.failure_window_games.max(1);
                while entries
                    .front()
                    .is_some_and(|&first| i64::from(first) <= i64::from(game_number) - i64::from(window))
                {
                    entries.pop_front();
                }
                if self.settings.max_failures > 0
                    && entries.len() > self.settings.max_failures as usize
                {
                    (self.callbacks.on_log)(&format!(
                        "WATCHDOG: Engine \"{label}\" unhealthy (too many failures)."
                    ));
                    if self.settings.pause_on_unhealthy {
                        control.pause();
                    } else {
                        control.stop.store(true, Ordering::SeqCst);
                    }
                }
            }
        }

        if let Err(err) = self.pool.restart_engine(engine_id) {
            (self.callbacks.on_log)(&format!(
                "WATCHDOG: Engine \"{label}\" failed to restart: {err:#}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_wait_releases_on_stop() {
        let control = std::sync::Arc::new(RunControl::new());
        control.pause();
        let control2 = control.clone();
        let handle = std::thread::spawn(move || {
            control2.wait_while_paused();
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished(), "worker should block while paused");
        control.request_stop();
        handle.join().unwrap();
    }

    #[test]
    fn resume_releases_waiters() {
        let control = std::sync::Arc::new(RunControl::new());
        control.pause();
        let control2 = control.clone();
        let handle = std::thread::spawn(move || control2.wait_while_paused());
        std::thread::sleep(std::time::Duration::from_millis(50));
        control.resume();
        handle.join().unwrap();
        assert!(!control.is_stopped());
    }
}
