//! Tournament execution engine for UCI chess engines: scheduling
//! (round-robin and Swiss), a concurrent match runner over a pool of engine
//! subprocesses, per-game termination adjudication, standings, and
//! crash-consistent checkpointing.

pub mod config;
pub mod export;
pub mod game;
pub mod openings;
pub mod persist;
pub mod pgn;
pub mod pool;
pub mod position;
pub mod process;
pub mod runner;
pub mod service;
pub mod standings;
pub mod termination;
pub mod tournament;
pub mod uci;
pub mod util;

pub use config::RunnerConfig;
pub use runner::RunControl;
pub use service::{run_tournament, LiveSink, LogSink, RunnerHooks};
