use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::pgn::PgnGame;
use crate::position::STARTPOS_FEN;
use crate::termination::{EngineInfos, GameArbiter, TerminationLimits, TerminationReason};
use crate::uci::{EngineFailure, EvalInfo, UciEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn flip(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Side::White => 'w',
            Side::Black => 'b',
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TimeControl {
    pub base_ms: i64,
    pub increment_ms: i64,
    pub move_time_ms: i64,
}

impl Default for TimeControl {
    fn default() -> Self {
        Self { base_ms: 0, increment_ms: 0, move_time_ms: 200 }
    }
}

/// Live state of one game.
#[derive(Clone, Debug)]
pub struct GameState {
    pub moves_uci: Vec<String>,
    pub side_to_move: Side,
    pub wtime_ms: i64,
    pub btime_ms: i64,
    pub winc_ms: i64,
    pub binc_ms: i64,
    pub last_eval_white: EvalInfo,
    pub last_eval_black: EvalInfo,
    pub result: String,
    pub termination: String,
    pub termination_detail: String,
    pub tablebase_used: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            moves_uci: Vec::new(),
            side_to_move: Side::White,
            wtime_ms: 0,
            btime_ms: 0,
            winc_ms: 0,
            binc_ms: 0,
            last_eval_white: EvalInfo::default(),
            last_eval_black: EvalInfo::default(),
            result: "*".to_string(),
            termination: String::new(),
            termination_detail: String::new(),
            tablebase_used: false,
        }
    }
}

/// Finished (or aborted) game: final state plus the rendered-record source.
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub state: GameState,
    pub pgn: PgnGame,
    pub final_fen: String,
}

pub fn is_startpos_fen(fen: &str) -> bool {
    fen == STARTPOS_FEN
}

/// Drive one game between two leased engines until the arbiter calls it.
///
/// The caller prepares `pgn_template` (event/site/round/player tags); this
/// function owns the move loop: position + go per ply, clock decrement by
/// movetime plus increment, live-record callback after every move, arbiter
/// consult after every ply, manual-stop consult when `stop` is raised.
#[allow(clippy::too_many_arguments)]
pub fn play_game(
    white: &mut UciEngine,
    black: &mut UciEngine,
    time_control: &TimeControl,
    limits: &TerminationLimits,
    go_timeout_ms: i64,
    stop: Option<&AtomicBool>,
    pgn_template: PgnGame,
    initial_fen: &str,
    opening_moves: &[String],
    on_live: &mut dyn FnMut(&PgnGame),
) -> GameRecord {
    let mut state = GameState {
        wtime_ms: time_control.base_ms,
        btime_ms: time_control.base_ms,
        winc_ms: time_control.increment_ms,
        binc_ms: time_control.increment_ms,
        moves_uci: opening_moves.to_vec(),
        ..GameState::default()
    };
    if opening_moves.len() % 2 == 1 {
        state.side_to_move = Side::Black;
    }

    let mut pgn = pgn_template;
    pgn.set_tag("Date", &Utc::now().format("%Y.%m.%d").to_string());

    let position_fen = if is_startpos_fen(initial_fen) { "" } else { initial_fen };
    let mut arbiter = GameArbiter::new(position_fen, opening_moves, limits.clone());
    let mut infos = EngineInfos::default();
    let mut termination_reason: Option<TerminationReason> = None;

    let record_verdict =
        |state: &mut GameState,
         reason_slot: &mut Option<TerminationReason>,
         verdict: crate::termination::Verdict| {
            state.result = verdict.result.to_string();
            state.termination = verdict.reason.reason_str().to_string();
            state.termination_detail = verdict.detail;
            state.tablebase_used = verdict.tablebase_used;
            *reason_slot = Some(verdict.reason);
        };

    loop {
        if stop.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            let probe = arbiter.probe();
            if let Some(verdict) = arbiter.should_end(&state, &infos, &probe, true) {
                record_verdict(&mut state, &mut termination_reason, verdict);
            }
            break;
        }

        let side = state.side_to_move;
        let engine = match side {
            Side::White => &mut *white,
            Side::Black => &mut *black,
        };
        let info = match side {
            Side::White => &mut infos.white,
            Side::Black => &mut infos.black,
        };
        info.no_move = false;
        info.timeout = false;
        info.crashed = false;

        if !engine.is_running() {
            info.crashed = true;
            let probe = arbiter.probe();
            if let Some(verdict) = arbiter.should_end(&state, &infos, &probe, false) {
                record_verdict(&mut state, &mut termination_reason, verdict);
            }
            break;
        }

        if engine.position(position_fen, &state.moves_uci).is_err() {
            info.crashed = true;
            let probe = arbiter.probe();
            if let Some(verdict) = arbiter.should_end(&state, &infos, &probe, false) {
                record_verdict(&mut state, &mut termination_reason, verdict);
            }
            break;
        }

        let movetime_ms = time_control.move_time_ms;
        let timeout_ms = if go_timeout_ms > 0 { go_timeout_ms } else { movetime_ms + 5000 };
        let outcome = engine.go(
            state.wtime_ms,
            state.btime_ms,
            state.winc_ms,
            state.binc_ms,
            movetime_ms,
            std::time::Duration::from_millis(timeout_ms.max(0) as u64),
        );

        match outcome {
            Err(failure) => {
                match failure {
                    EngineFailure::Timeout => info.timeout = true,
                    EngineFailure::NoBestmove => info.no_move = true,
                    _ => {}
                }
                if !engine.is_running() {
                    info.crashed = true;
                }
                store_eval(&mut state, &mut infos, side, engine.last_eval());
                let probe = arbiter.probe();
                if let Some(verdict) = arbiter.should_end(&state, &infos, &probe, false) {
                    record_verdict(&mut state, &mut termination_reason, verdict);
                }
                break;
            }
            Ok(bestmove) => {
                state.moves_uci.push(bestmove.clone());
                store_eval(&mut state, &mut infos, side, engine.last_eval());
                arbiter.apply_move(&bestmove);

                match side {
                    Side::White => {
                        state.wtime_ms -= movetime_ms;
                        state.wtime_ms += state.winc_ms;
                    }
                    Side::Black => {
                        state.btime_ms -= movetime_ms;
                        state.btime_ms += state.binc_ms;
                    }
                }

                publish_live(&mut pgn, &state, "*", on_live);
                state.side_to_move = state.side_to_move.flip();

                let probe = arbiter.probe();
                if let Some(verdict) = arbiter.should_end(&state, &infos, &probe, false) {
                    record_verdict(&mut state, &mut termination_reason, verdict);
                    break;
                }
            }
        }
    }

    if state.result == "*" && state.termination.is_empty() {
        state.result = "1/2-1/2".to_string();
        state.termination = TerminationReason::MaxPlies.reason_str().to_string();
        termination_reason = Some(TerminationReason::MaxPlies);
    }

    pgn.set_tag("Result", &state.result);
    if let Some(reason) = termination_reason {
        pgn.set_tag("Termination", reason.tag());
        if reason == TerminationReason::ScoreAdjudication {
            pgn.termination_comment = format!("ScoreAdjudication: {}", state.termination_detail);
        } else if reason == TerminationReason::TbAdjudication {
            pgn.termination_comment = format!("TBAdjudication: {}", state.termination_detail);
        }
    }
    let result = state.result.clone();
    publish_live(&mut pgn, &state, &result, on_live);

    let final_fen = arbiter.tracker().fen();
    GameRecord { state, pgn, final_fen }
}

fn store_eval(state: &mut GameState, infos: &mut EngineInfos, side: Side, eval: EvalInfo) {
    match side {
        Side::White => {
            state.last_eval_white = eval;
            infos.white.eval = eval;
        }
        Side::Black => {
            state.last_eval_black = eval;
            infos.black.eval = eval;
        }
    }
}

fn publish_live(pgn: &mut PgnGame, state: &GameState, outcome: &str, on_live: &mut dyn FnMut(&PgnGame)) {
    pgn.moves = state.moves_uci.clone();
    pgn.result = outcome.to_string();
    if !state.termination.is_empty() {
        pgn.set_tag("Termination", &state.termination);
    }
    if !state.termination_detail.is_empty() {
        pgn.termination_comment = state.termination_detail.clone();
    }
    on_live(pgn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_flip_and_letters() {
        assert_eq!(Side::White.flip(), Side::Black);
        assert_eq!(Side::Black.flip(), Side::White);
        assert_eq!(Side::White.letter(), 'w');
        assert_eq!(Side::Black.letter(), 'b');
    }

    #[test]
    fn startpos_fen_is_recognised() {
        assert!(is_startpos_fen(STARTPOS_FEN));
        assert!(!is_startpos_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1"));
    }
}
