use crate::game::{GameState, Side};
use crate::position::PositionTracker;
use crate::uci::EvalInfo;

/// Why a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    Checkmate,
    Stalemate,
    Resign,
    Timeout,
    Crash,
    Threefold,
    FiftyMove,
    TbAdjudication,
    ScoreAdjudication,
    MaxPlies,
    ManualStop,
}

impl TerminationReason {
    /// Human-readable reason recorded in game state and logs.
    pub fn reason_str(self) -> &'static str {
        match self {
            TerminationReason::Checkmate => "checkmate",
            TerminationReason::Stalemate => "stalemate",
            TerminationReason::Resign => "resign",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Crash => "engine crash",
            TerminationReason::Threefold => "threefold repetition",
            TerminationReason::FiftyMove => "fifty-move",
            TerminationReason::TbAdjudication => "tablebase adjudication",
            TerminationReason::ScoreAdjudication => "score adjudication",
            TerminationReason::MaxPlies => "ply limit",
            TerminationReason::ManualStop => "manual stop",
        }
    }

    /// Value for the game record's Termination tag.
    pub fn tag(self) -> &'static str {
        match self {
            TerminationReason::ScoreAdjudication | TerminationReason::TbAdjudication => {
                "adjudication"
            }
            TerminationReason::ManualStop => "aborted",
            TerminationReason::Crash => "forfeit",
            TerminationReason::Timeout => "time forfeit",
            TerminationReason::Checkmate => "checkmate",
            TerminationReason::Stalemate => "stalemate",
            TerminationReason::Resign => "resign",
            TerminationReason::Threefold => "threefold repetition",
            TerminationReason::FiftyMove => "fifty-move rule",
            TerminationReason::MaxPlies => "move limit",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScoreAdjudicationLimits {
    pub enabled: bool,
    pub score_draw_cp: i32,
    pub score_draw_moves: u32,
    pub score_win_cp: i32,
    pub score_win_moves: u32,
    pub min_depth: u32,
}

impl Default for ScoreAdjudicationLimits {
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

#[derive(Clone, Debug)]
pub struct TablebaseLimits {
    pub enabled: bool,
    pub paths: Vec<String>,
    pub probe_limit_pieces: u32,
}

impl Default for TablebaseLimits {
    fn default() -> Self {
        Self { enabled: true, paths: Vec::new(), probe_limit_pieces: 6 }
    }
}

#[derive(Clone, Debug)]
pub struct ResignLimits {
    pub enabled: bool,
    pub cp: i32,
    pub moves: u32,
    pub min_depth: u32,
}

impl Default for ResignLimits {
    fn default() -> Self {
        Self { enabled: true, cp: 900, moves: 3, min_depth: 12 }
    }
}

#[derive(Clone, Debug)]
pub struct TerminationLimits {
    pub max_plies: usize,
    pub draw_by_repetition: bool,
    pub adjudication: ScoreAdjudicationLimits,
    pub tablebases: TablebaseLimits,
    pub resign: ResignLimits,
}

impl Default for TerminationLimits {
    fn default() -> Self {
        Self {
            max_plies: 400,
            draw_by_repetition: false,
            adjudication: ScoreAdjudicationLimits::default(),
            tablebases: TablebaseLimits::default(),
            resign: ResignLimits::default(),
        }
    }
}

/// Per-side protocol status fed to the arbiter after each move request.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineInfo {
    pub eval: EvalInfo,
    pub crashed: bool,
    pub timeout: bool,
    pub no_move: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EngineInfos {
    pub white: EngineInfo,
    pub black: EngineInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wdl {
    Win,
    Draw,
    Loss,
}

/// Result of a tablebase probe. The probing backend is a reserved hook: the
/// core reports availability and piece count but never resolves WDL itself.
#[derive(Clone, Debug, Default)]
pub struct ProbeInfo {
    pub wdl: Option<Wdl>,
    pub pieces: u32,
    pub tb_available: bool,
    pub tb_used: bool,
    pub detail: String,
}

/// End-of-game verdict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub result: &'static str,
    pub reason: TerminationReason,
    pub detail: String,
    pub tablebase_used: bool,
}

impl Verdict {
    fn new(result: &'static str, reason: TerminationReason, detail: &str) -> Self {
        Self { result, reason, detail: detail.to_string(), tablebase_used: false }
    }
}

/// One arbiter per game. Owns the position tracker and the private streak
/// counters; never touches engines and never mutates game state.
pub struct GameArbiter {
    tracker: PositionTracker,
    limits: TerminationLimits,
    draw_score_streak: u32,
    win_score_streak_white: u32,
    win_score_streak_black: u32,
    resign_streak_white: u32,
    resign_streak_black: u32,
}

impl GameArbiter {
    /// `initial_fen` empty means the standard start; opening moves are
    /// pre-applied so the repetition ledger covers them.
    pub fn new(initial_fen: &str, opening_moves: &[String], limits: TerminationLimits) -> Self {
        let mut tracker = if initial_fen.is_empty() {
            PositionTracker::startpos()
        } else {
            PositionTracker::from_fen(initial_fen)
        };
        for mv in opening_moves {
            tracker.apply(mv);
        }
        Self {
            tracker,
            limits,
            draw_score_streak: 0,
            win_score_streak_white: 0,
            win_score_streak_black: 0,
            resign_streak_white: 0,
            resign_streak_black: 0,
        }
    }

    pub fn apply_move(&mut self, mv: &str) {
        self.tracker.apply(mv);
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn probe(&self) -> ProbeInfo {
        let tb = &self.limits.tablebases;
        let pieces = self.tracker.piece_count();
        let tb_available = tb.enabled && !tb.paths.is_empty();
        let detail = if !tb.enabled || tb.paths.is_empty() || pieces > tb.probe_limit_pieces {
            "tb disabled or above piece limit"
        } else {
            "tb backend not available"
        };
        ProbeInfo { wdl: None, pieces, tb_available, tb_used: false, detail: detail.to_string() }
    }

    /// Apply the termination rules in order; the first match wins. Streak
    /// counters advance on every call, so call this exactly once per ply.
    pub fn should_end(
        &mut self,
        state: &GameState,
        infos: &EngineInfos,
        probe: &ProbeInfo,
        manual_stop: bool,
    ) -> Option<Verdict> {
        if manual_stop {
            return Some(Verdict::new("*", TerminationReason::ManualStop, "manual stop"));
        }

        if infos.white.crashed || infos.black.crashed {
            let result = if infos.white.crashed { "0-1" } else { "1-0" };
            return Some(Verdict::new(result, TerminationReason::Crash, "engine crash"));
        }

        if infos.white.timeout || infos.black.timeout {
            let result = if infos.white.timeout { "0-1" } else { "1-0" };
            return Some(Verdict::new(result, TerminationReason::Timeout, "timeout"));
        }

        let mover = match state.side_to_move {
            Side::White => &infos.white,
            Side::Black => &infos.black,
        };
        if mover.no_move {
            let checkmate = mover.eval.mate.is_some_and(|mate| mate != 0);
            return Some(if checkmate {
                let result = if state.side_to_move == Side::White { "0-1" } else { "1-0" };
                Verdict::new(result, TerminationReason::Checkmate, "no legal moves")
            } else {
                Verdict::new("1/2-1/2", TerminationReason::Stalemate, "no legal moves")
            });
        }

        if state.wtime_ms <= 0 || state.btime_ms <= 0 {
            let result = if state.wtime_ms <= 0 { "0-1" } else { "1-0" };
            return Some(Verdict::new(result, TerminationReason::Timeout, "clock flag"));
        }

        if probe.tb_used {
            let result = match probe.wdl {
                Some(Wdl::Win) => "1-0",
                Some(Wdl::Loss) => "0-1",
                Some(Wdl::Draw) | None => "1/2-1/2",
            };
            let mut verdict = Verdict::new(result, TerminationReason::TbAdjudication, &probe.detail);
            verdict.tablebase_used = true;
            return Some(verdict);
        }

        if self.limits.adjudication.enabled {
            if let Some(verdict) = self.check_score_adjudication(state) {
                return Some(verdict);
            }
        }

        if self.limits.resign.enabled {
            if let Some(verdict) = self.check_resign(state) {
                return Some(verdict);
            }
        }

        if self.limits.draw_by_repetition {
            let key = self.tracker.position_key();
            if self.tracker.repetition_count(&key) >= 3 {
                return Some(Verdict::new(
                    "1/2-1/2",
                    TerminationReason::Threefold,
                    "threefold repetition",
                ));
            }
        }

        if self.tracker.halfmove_clock() >= 100 {
            return Some(Verdict::new("1/2-1/2", TerminationReason::FiftyMove, "fifty-move rule"));
        }

        if state.moves_uci.len() >= self.limits.max_plies {
            return Some(Verdict::new("1/2-1/2", TerminationReason::MaxPlies, "max plies"));
        }

        None
    }

    fn check_score_adjudication(&mut self, state: &GameState) -> Option<Verdict> {
        let adj = &self.limits.adjudication;

        let draw_ok = eval_near_zero(&state.last_eval_white, adj.score_draw_cp, adj.min_depth)
            && eval_near_zero(&state.last_eval_black, adj.score_draw_cp, adj.min_depth);
        if draw_ok {
            self.draw_score_streak += 1;
        } else {
            self.draw_score_streak = 0;
        }
        if self.draw_score_streak >= adj.score_draw_moves {
            return Some(Verdict::new(
                "1/2-1/2",
                TerminationReason::ScoreAdjudication,
                "score draw",
            ));
        }

        // Evaluations are each side's own view: a win is adjudicated only
        // when the winner claims it and the loser concedes (or is silent).
        let white_win = eval_above(&state.last_eval_white, adj.score_win_cp, adj.min_depth)
            && (!state.last_eval_black.has_eval()
                || eval_below(&state.last_eval_black, adj.score_win_cp, adj.min_depth));
        let black_win = eval_below(&state.last_eval_white, adj.score_win_cp, adj.min_depth)
            && (!state.last_eval_black.has_eval()
                || eval_above(&state.last_eval_black, adj.score_win_cp, adj.min_depth));

        if white_win {
            self.win_score_streak_white += 1;
            self.win_score_streak_black = 0;
        } else if black_win {
            self.win_score_streak_black += 1;
            self.win_score_streak_white = 0;
        } else {
            self.win_score_streak_white = 0;
            self.win_score_streak_black = 0;
        }

        if self.win_score_streak_white >= adj.score_win_moves {
            return Some(Verdict::new("1-0", TerminationReason::ScoreAdjudication, "score win"));
        }
        if self.win_score_streak_black >= adj.score_win_moves {
            return Some(Verdict::new("0-1", TerminationReason::ScoreAdjudication, "score win"));
        }
        None
    }

    fn check_resign(&mut self, state: &GameState) -> Option<Verdict> {
        let resign = &self.limits.resign;
        if eval_below(&state.last_eval_white, resign.cp, resign.min_depth) {
            self.resign_streak_white += 1;
        } else {
            self.resign_streak_white = 0;
        }
        if eval_below(&state.last_eval_black, resign.cp, resign.min_depth) {
            self.resign_streak_black += 1;
        } else {
            self.resign_streak_black = 0;
        }
        if self.resign_streak_white >= resign.moves {
            return Some(Verdict::new("0-1", TerminationReason::Resign, "resign eval"));
        }
        if self.resign_streak_black >= resign.moves {
            return Some(Verdict::new("1-0", TerminationReason::Resign, "resign eval"));
        }
        None
    }
}

fn eval_below(eval: &EvalInfo, threshold: i32, min_depth: u32) -> bool {
    if eval.depth < min_depth {
        return false;
    }
    if let Some(mate) = eval.mate {
        return mate < 0;
    }
    if let Some(cp) = eval.cp {
        return cp <= -threshold;
    }
    false
}

fn eval_above(eval: &EvalInfo, threshold: i32, min_depth: u32) -> bool {
    if eval.depth < min_depth {
        return false;
    }
    if let Some(mate) = eval.mate {
        return mate > 0;
    }
    if let Some(cp) = eval.cp {
        return cp >= threshold;
    }
    false
}

fn eval_near_zero(eval: &EvalInfo, threshold: i32, min_depth: u32) -> bool {
    if eval.depth < min_depth {
        return false;
    }
    if eval.mate.is_some() {
        return false;
    }
    if let Some(cp) = eval.cp {
        return cp.abs() <= threshold;
    }
    false
}
