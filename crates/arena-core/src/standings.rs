/// Aggregate line for one engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineStats {
    pub name: String,
    pub games: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub points: f64,
}

impl EngineStats {
    pub fn score_percent(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.points / f64::from(self.games) * 100.0
    }
}

/// Per-engine W/D/L/points table. `games_played` counts games once, byes
/// included.
#[derive(Clone, Debug, Default)]
pub struct StandingsTable {
    rows: Vec<EngineStats>,
    games_played: u32,
}

impl StandingsTable {
    pub fn new(engine_names: Vec<String>) -> Self {
        let rows = engine_names
            .into_iter()
            .map(|name| EngineStats { name, ..EngineStats::default() })
            .collect();
        Self { rows, games_played: 0 }
    }

    pub fn record_result(&mut self, white_id: usize, black_id: usize, result: &str) {
        if white_id >= self.rows.len() || black_id >= self.rows.len() {
            return;
        }
        self.rows[white_id].games += 1;
        self.rows[black_id].games += 1;
        self.games_played += 1;

        match result {
            "1-0" => {
                self.rows[white_id].wins += 1;
                self.rows[white_id].points += 1.0;
                self.rows[black_id].losses += 1;
            }
            "0-1" => {
                self.rows[black_id].wins += 1;
                self.rows[black_id].points += 1.0;
                self.rows[white_id].losses += 1;
            }
            "1/2-1/2" => {
                self.rows[white_id].draws += 1;
                self.rows[black_id].draws += 1;
                self.rows[white_id].points += 0.5;
                self.rows[black_id].points += 0.5;
            }
            _ => {}
        }
    }

    /// Credit a Swiss bye. A full point counts as a win, a part point as a
    /// draw.
    pub fn record_bye(&mut self, engine_id: usize, points: f64) {
        let Some(row) = self.rows.get_mut(engine_id) else {
            return;
        };
        row.games += 1;
        if points >= 1.0 {
            row.wins += 1;
        } else if points > 0.0 {
            row.draws += 1;
        }
        row.points += points;
        self.games_played += 1;
    }

    /// Replace the table with a checkpoint snapshot.
    pub fn load_snapshot(&mut self, snapshot: Vec<EngineStats>) {
        let total_engine_games: u32 = snapshot.iter().map(|row| row.games).sum();
        self.rows = snapshot;
        self.games_played = total_engine_games / 2;
    }

    pub fn rows(&self) -> &[EngineStats] {
        &self.rows
    }

    pub fn games_played(&self) -> u32 {
        self.games_played
    }
}
