use std::collections::HashSet;

use super::{pair_key, pairing_id_for, Fixture};

/// Colour memory for one engine: last colour played (+1 white, -1 black,
/// 0 never played) and how many consecutive games it has held it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwissColorState {
    pub last_color: i32,
    pub streak: u32,
}

/// One published Swiss round: the drawn pairs (for display), the fixtures,
/// and the bye recipient if the field is odd.
#[derive(Clone, Debug, Default)]
pub struct SwissRound {
    pub round_index: u32,
    pub bye_engine_id: Option<usize>,
    pub pairings: Vec<(usize, usize)>,
    pub fixtures: Vec<Fixture>,
}

struct PlayerEntry {
    engine_id: usize,
    points: f64,
    buchholz: f64,
}

/// Pair one Swiss round. Deterministic: identical inputs produce the same
/// pairing.
#[allow(clippy::too_many_arguments)]
pub fn build_swiss_round(
    round_index: u32,
    scores: &[f64],
    opponent_history: &[Vec<usize>],
    bye_history: &[usize],
    color_history: &[SwissColorState],
    pairings_played: &HashSet<(usize, usize)>,
    games_per_pairing: u32,
    avoid_repeats: bool,
) -> SwissRound {
    let mut result = SwissRound { round_index, ..SwissRound::default() };
    let engine_count = scores.len();
    if engine_count < 2 {
        return result;
    }

    let mut players: Vec<PlayerEntry> = (0..engine_count)
        .map(|engine_id| {
            let buchholz = opponent_history[engine_id]
                .iter()
                .filter(|&&opp| opp < engine_count)
                .map(|&opp| scores[opp])
                .sum();
            PlayerEntry { engine_id, points: scores[engine_id], buchholz }
        })
        .collect();

    players.sort_by(|a, b| {
        b.points
            .partial_cmp(&a.points)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.buchholz.partial_cmp(&a.buchholz).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.engine_id.cmp(&b.engine_id))
    });

    // Odd field: the lowest-ranked player without a previous bye sits out;
    // once everyone has had one, the last player does.
    if engine_count % 2 == 1 {
        let position = players
            .iter()
            .rposition(|entry| !bye_history.contains(&entry.engine_id))
            .unwrap_or(players.len() - 1);
        result.bye_engine_id = Some(players.remove(position).engine_id);
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for entry in &players {
        let same_group = groups
            .last()
            .map(|group| scores[group[0]] == entry.points)
            .unwrap_or(false);
        if !same_group {
            groups.push(Vec::new());
        }
        groups.last_mut().unwrap().push(entry.engine_id);
    }

    let group_count = groups.len();
    let mut carry: Vec<usize> = Vec::new();
    for (group_index, group) in groups.into_iter().enumerate() {
        let mut list: Vec<usize> = Vec::with_capacity(carry.len() + group.len());
        list.append(&mut carry);
        list.extend(group);

        while list.len() >= 2 {
            let a = list.remove(0);
            let mut opponent_index = None;
            for (i, &b) in list.iter().enumerate() {
                if !avoid_repeats || !pairings_played.contains(&pair_key(a, b)) {
                    opponent_index = Some(i);
                    break;
                }
            }
            let opponent_index = match opponent_index {
                Some(i) => i,
                None => {
                    // No fresh partner in this group: carry the player down,
                    // unless this is the last group, where a rematch is the
                    // lesser evil.
                    if avoid_repeats && group_index + 1 < group_count {
                        carry.push(a);
                        continue;
                    }
                    0
                }
            };
            let b = list.remove(opponent_index);

            let (white, black) = choose_colors(a, b, color_history);
            let pairing_id = pairing_id_for(a, b);
            result.pairings.push((a, b));
            for g in 0..games_per_pairing {
                result.fixtures.push(Fixture {
                    round_index,
                    white_engine_id: if g % 2 == 0 { white } else { black },
                    black_engine_id: if g % 2 == 0 { black } else { white },
                    game_index_within_pairing: g,
                    pairing_id: pairing_id.clone(),
                });
            }
        }

        if let Some(&leftover) = list.first() {
            carry.push(leftover);
        }
    }

    if result.bye_engine_id.is_none() {
        if let Some(&leftover) = carry.first() {
            result.bye_engine_id = Some(leftover);
        }
    }

    result
}

fn color_penalty(state: &SwissColorState, color: i32) -> u32 {
    if state.last_color == 0 || state.last_color != color {
        return 0;
    }
    if state.streak >= 2 {
        100
    } else {
        10
    }
}

/// Pick the colour split with the lower history penalty; ties give white to
/// the lower id.
pub fn choose_colors(
    a: usize,
    b: usize,
    color_history: &[SwissColorState],
) -> (usize, usize) {
    let a_state = color_history.get(a).copied().unwrap_or_default();
    let b_state = color_history.get(b).copied().unwrap_or_default();

    let option1 = color_penalty(&a_state, 1) + color_penalty(&b_state, -1);
    let option2 = color_penalty(&a_state, -1) + color_penalty(&b_state, 1);

    if option1 < option2 {
        (a, b)
    } else if option2 < option1 {
        (b, a)
    } else if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Fold a finished game into an engine's colour memory.
pub fn update_color_history(state: &mut SwissColorState, color: i32) {
    if state.last_color == color {
        state.streak += 1;
    } else {
        state.last_color = color;
        state.streak = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SwissSim {
        scores: Vec<f64>,
        opponents: Vec<Vec<usize>>,
        byes: Vec<usize>,
        colors: Vec<SwissColorState>,
        played: HashSet<(usize, usize)>,
        whites: Vec<u32>,
        blacks: Vec<u32>,
    }

    impl SwissSim {
        fn new(n: usize) -> Self {
            Self {
                scores: vec![0.0; n],
                opponents: vec![Vec::new(); n],
                byes: Vec::new(),
                colors: vec![SwissColorState::default(); n],
                played: HashSet::new(),
                whites: vec![0; n],
                blacks: vec![0; n],
            }
        }

        /// Run one round with one game per pairing; every game is drawn.
        fn play_round(&mut self, round: u32) -> SwissRound {
            let swiss = build_swiss_round(
                round,
                &self.scores,
                &self.opponents,
                &self.byes,
                &self.colors,
                &self.played,
                1,
                true,
            );
            if let Some(bye) = swiss.bye_engine_id {
                self.byes.push(bye);
                self.scores[bye] += 1.0;
            }
            for f in &swiss.fixtures {
                self.scores[f.white_engine_id] += 0.5;
                self.scores[f.black_engine_id] += 0.5;
                self.whites[f.white_engine_id] += 1;
                self.blacks[f.black_engine_id] += 1;
                update_color_history(&mut self.colors[f.white_engine_id], 1);
                update_color_history(&mut self.colors[f.black_engine_id], -1);
                self.played.insert(pair_key(f.white_engine_id, f.black_engine_id));
                self.opponents[f.white_engine_id].push(f.black_engine_id);
                self.opponents[f.black_engine_id].push(f.white_engine_id);
            }
            swiss
        }
    }

    #[test]
    fn five_engines_three_rounds_no_repeat_no_double_bye() {
        let mut sim = SwissSim::new(5);
        let mut byes = Vec::new();
        for round in 0..3 {
            let swiss = sim.play_round(round);
            assert_eq!(swiss.pairings.len(), 2);
            byes.push(swiss.bye_engine_id.expect("odd field always has a bye"));
        }
        // one bye per round, all distinct engines
        let mut unique = byes.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3, "byes not distinct: {byes:?}");
        // no pair met twice
        assert_eq!(sim.played.len(), 6);
        // colour balance
        for id in 0..5 {
            assert!(
                sim.whites[id].abs_diff(sim.blacks[id]) <= 1,
                "engine {id}: {}W {}B",
                sim.whites[id],
                sim.blacks[id]
            );
        }
    }

    #[test]
    fn ranking_prefers_points_then_buchholz_then_id() {
        // engines 0 and 1 on equal points; 1 has the stronger opposition
        let scores = vec![2.0, 2.0, 1.0, 0.0];
        let mut opponents = vec![Vec::new(); 4];
        opponents[0] = vec![3];
        opponents[1] = vec![2];
        let swiss = build_swiss_round(
            0,
            &scores,
            &opponents,
            &[],
            &vec![SwissColorState::default(); 4],
            &HashSet::new(),
            1,
            true,
        );
        // top group pairs 1 (higher buchholz) with 0
        assert_eq!(swiss.pairings[0], (1, 0));
    }

    #[test]
    fn bye_goes_to_lowest_ranked_without_one() {
        let scores = vec![3.0, 2.0, 1.0];
        let opponents = vec![Vec::new(); 3];
        let swiss = build_swiss_round(
            0,
            &scores,
            &opponents,
            &[2],
            &vec![SwissColorState::default(); 3],
            &HashSet::new(),
            1,
            true,
        );
        // engine 2 already had one, so engine 1 (next lowest) sits out
        assert_eq!(swiss.bye_engine_id, Some(1));

        let all_had_byes = build_swiss_round(
            0,
            &scores,
            &opponents,
            &[0, 1, 2],
            &vec![SwissColorState::default(); 3],
            &HashSet::new(),
            1,
            true,
        );
        assert_eq!(all_had_byes.bye_engine_id, Some(2), "falls back to the last player");
    }

    #[test]
    fn rematch_allowed_only_as_last_resort() {
        // two engines that already met: rematch is forced (single group)
        let mut played = HashSet::new();
        played.insert(pair_key(0, 1));
        let swiss = build_swiss_round(
            1,
            &[1.0, 0.0],
            &[vec![1], vec![0]],
            &[],
            &vec![SwissColorState::default(); 2],
            &played,
            1,
            true,
        );
        assert_eq!(swiss.pairings.len(), 1);
    }

    #[test]
    fn carry_crosses_group_boundary_to_avoid_rematch() {
        // 0 and 1 lead and have already met; each must drop to the next
        // group rather than rematch.
        let mut played = HashSet::new();
        played.insert(pair_key(0, 1));
        let swiss = build_swiss_round(
            1,
            &[1.0, 1.0, 0.0, 0.0],
            &[vec![1], vec![0], Vec::new(), Vec::new()],
            &[],
            &vec![SwissColorState::default(); 4],
            &played,
            1,
            true,
        );
        assert_eq!(swiss.pairings.len(), 2);
        assert!(!swiss.pairings.contains(&(0, 1)));
        assert!(!swiss.pairings.contains(&(1, 0)));
    }

    #[test]
    fn color_choice_minimises_penalty() {
        let mut history = vec![SwissColorState::default(); 2];
        history[0] = SwissColorState { last_color: 1, streak: 2 };
        history[1] = SwissColorState { last_color: 1, streak: 1 };
        // 0 as white again costs 100, 1 as white again costs 10
        assert_eq!(choose_colors(0, 1, &history), (1, 0));

        // fresh engines tie; lower id takes white
        let fresh = vec![SwissColorState::default(); 2];
        assert_eq!(choose_colors(1, 0, &fresh), (0, 1));
    }

    #[test]
    fn chosen_colors_are_never_beaten_by_the_swap() {
        let streaks = [
            SwissColorState { last_color: 0, streak: 0 },
            SwissColorState { last_color: 1, streak: 1 },
            SwissColorState { last_color: 1, streak: 3 },
            SwissColorState { last_color: -1, streak: 1 },
            SwissColorState { last_color: -1, streak: 2 },
        ];
        for a_state in streaks {
            for b_state in streaks {
                let history = vec![a_state, b_state];
                let (white, black) = choose_colors(0, 1, &history);
                let chosen = color_penalty(&history[white], 1) + color_penalty(&history[black], -1);
                let swapped = color_penalty(&history[black], 1) + color_penalty(&history[white], -1);
                assert!(chosen <= swapped, "{a_state:?} vs {b_state:?}");
            }
        }
    }

    #[test]
    fn fixtures_alternate_colors_within_pairing() {
        let swiss = build_swiss_round(
            0,
            &[0.0, 0.0],
            &[Vec::new(), Vec::new()],
            &[],
            &vec![SwissColorState::default(); 2],
            &HashSet::new(),
            2,
            true,
        );
        assert_eq!(swiss.fixtures.len(), 2);
        assert_eq!(swiss.fixtures[0].white_engine_id, swiss.fixtures[1].black_engine_id);
        assert_eq!(swiss.fixtures[0].pairing_id, swiss.fixtures[1].pairing_id);
    }

    #[test]
    fn pairing_is_deterministic() {
        let scores = vec![1.5, 1.0, 1.0, 0.5, 0.0];
        let opponents = vec![vec![1], vec![0], vec![3], vec![2], Vec::new()];
        let run = || {
            build_swiss_round(
                2,
                &scores,
                &opponents,
                &[4],
                &vec![SwissColorState::default(); 5],
                &HashSet::new(),
                2,
                true,
            )
        };
        let a = run();
        let b = run();
        assert_eq!(a.fixtures, b.fixtures);
        assert_eq!(a.pairings, b.pairings);
        assert_eq!(a.bye_engine_id, b.bye_engine_id);
    }
}
