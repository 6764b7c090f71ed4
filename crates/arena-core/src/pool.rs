use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::uci::UciEngine;

/// Start/restart backoff schedule, in milliseconds.
const START_BACKOFF_MS: [u64; 5] = [0, 1000, 2000, 5000, 10_000];

pub type LogFn = Box<dyn Fn(&str) + Send + Sync>;

/// Immutable description of how to launch and configure one engine.
#[derive(Clone, Debug)]
pub struct EngineSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub uci_options: Vec<(String, String)>,
}

/// Owns N engine sessions and arbitrates exclusive pairwise leases over
/// them. Busy bits live under one mutex + condvar; the per-engine mutexes
/// are uncontended once a lease is held and exist to hand out `&mut`
/// access across worker threads.
pub struct EnginePool {
    specs: Vec<EngineSpec>,
    engines: Vec<Mutex<UciEngine>>,
    busy: Mutex<Vec<bool>>,
    available: Condvar,
    working_dir: Mutex<Option<PathBuf>>,
    handshake_timeout_ms: u64,
    log_fn: Option<LogFn>,
}

impl EnginePool {
    pub fn new(specs: Vec<EngineSpec>, log_fn: Option<LogFn>) -> Self {
        let engines = specs
            .iter()
            .map(|spec| {
                Mutex::new(UciEngine::new(
                    spec.name.clone(),
                    spec.command.clone(),
                    spec.args.clone(),
                ))
            })
            .collect::<Vec<_>>();
        let busy = Mutex::new(vec![false; specs.len()]);
        Self {
            specs,
            engines,
            busy,
            available: Condvar::new(),
            working_dir: Mutex::new(None),
            handshake_timeout_ms: crate::uci::DEFAULT_HANDSHAKE_TIMEOUT_MS,
            log_fn,
        }
    }

    pub fn set_handshake_timeout_ms(&mut self, timeout_ms: u64) {
        self.handshake_timeout_ms = timeout_ms;
    }

    pub fn engine_count(&self) -> usize {
        self.specs.len()
    }

    pub fn specs(&self) -> &[EngineSpec] {
        &self.specs
    }

    /// Initialise every session (start + handshake + options + isready) with
    /// retry backoff. Returns only when every engine is ready.
    pub fn start_all(&self, working_dir: Option<PathBuf>) -> Result<()> {
        *self.working_dir.lock().unwrap() = working_dir;
        for id in 0..self.engines.len() {
            self.initialize_engine(id)?;
        }
        Ok(())
    }

    /// Block until both engines are free, then reserve them. Ids are claimed
    /// in canonical (min, max) order so two workers wanting the same pair
    /// cannot deadlock.
    pub fn acquire_pair(&self, white_id: usize, black_id: usize) -> EngineLease<'_> {
        let (lo, hi) = (white_id.min(black_id), white_id.max(black_id));
        let mut busy = self.busy.lock().unwrap();
        while busy[lo] || busy[hi] {
            busy = self.available.wait(busy).unwrap();
        }
        busy[lo] = true;
        busy[hi] = true;
        EngineLease { pool: self, white_id, black_id }
    }

    fn release_pair(&self, white_id: usize, black_id: usize) {
        {
            let mut busy = self.busy.lock().unwrap();
            busy[white_id] = false;
            busy[black_id] = false;
        }
        self.available.notify_all();
    }

    /// Tear the session down and re-run the initialisation sequence for one
    /// engine. The watchdog calls this between games, while its lease still
    /// guarantees exclusivity for the id.
    pub fn restart_engine(&self, engine_id: usize) -> Result<()> {
        if engine_id >= self.engines.len() {
            bail!("engine id {engine_id} out of range");
        }
        self.engines[engine_id].lock().unwrap().stop();
        self.initialize_engine(engine_id)
    }

    pub fn engine(&self, engine_id: usize) -> MutexGuard<'_, UciEngine> {
        self.engines[engine_id].lock().unwrap()
    }

    pub fn stop_all(&self) {
        for engine in &self.engines {
            engine.lock().unwrap().stop();
        }
    }

    fn initialize_engine(&self, engine_id: usize) -> Result<()> {
        let spec = &self.specs[engine_id];
        let working_dir = self.working_dir.lock().unwrap().clone();
        for wait_ms in START_BACKOFF_MS {
            if wait_ms > 0 {
                std::thread::sleep(Duration::from_millis(wait_ms));
            }
            let mut engine = self.engines[engine_id].lock().unwrap();
            engine.set_handshake_timeout_ms(self.handshake_timeout_ms);
            if let Err(err) = engine.start(working_dir.as_deref()) {
                log::warn!("failed to start engine {engine_id}: {err:#}");
                continue;
            }
            if engine.handshake().is_err() {
                self.log(&format!(
                    "WATCHDOG: Engine \"{}\" unresponsive during handshake, restarting...",
                    spec.name
                ));
                engine.stop();
                continue;
            }
            let options = spec.uci_options.clone();
            let mut options_ok = true;
            for (name, value) in &options {
                if engine.set_option(name, value).is_err() {
                    options_ok = false;
                    break;
                }
            }
            if !options_ok || engine.is_ready().is_err() {
                log::warn!("engine {engine_id} (\"{}\") not ready, retrying", spec.name);
                engine.stop();
                continue;
            }
            engine.clear_failure();
            log::info!("engine {engine_id} (\"{}\") ready", spec.name);
            return Ok(());
        }
        bail!(
            "engine \"{}\" failed to start after {} attempts",
            spec.name,
            START_BACKOFF_MS.len()
        );
    }

    fn log(&self, line: &str) {
        if let Some(log_fn) = &self.log_fn {
            log_fn(line);
        }
        log::warn!("{line}");
    }
}

/// Exclusive reservation of two engine sessions for one game. Both ids are
/// released on drop, on every exit path.
pub struct EngineLease<'a> {
    pool: &'a EnginePool,
    white_id: usize,
    black_id: usize,
}

impl EngineLease<'_> {
    pub fn white(&self) -> MutexGuard<'_, UciEngine> {
        self.pool.engine(self.white_id)
    }

    pub fn black(&self) -> MutexGuard<'_, UciEngine> {
        self.pool.engine(self.black_id)
    }

    pub fn white_id(&self) -> usize {
        self.white_id
    }

    pub fn black_id(&self) -> usize {
        self.black_id
    }
}

impl Drop for EngineLease<'_> {
    fn drop(&mut self) {
        self.pool.release_pair(self.white_id, self.black_id);
    }
}
