use super::{pairing_id_for, Fixture};

/// Sentinel seat used to pad an odd field; pairings against it are skipped.
const BYE: i64 = -1;

/// Circle-method round-robin. The output is deterministic: identical inputs
/// always produce the identical fixture list, so a resume can re-derive the
/// schedule instead of persisting it.
pub fn build_schedule(
    engine_count: usize,
    double_round_robin: bool,
    games_per_pairing: u32,
    repeat_count: u32,
) -> Vec<Fixture> {
    let mut fixtures = Vec::new();
    if engine_count < 2 || games_per_pairing < 1 || repeat_count < 1 {
        return fixtures;
    }

    let mut seats: Vec<i64> = (0..engine_count as i64).collect();
    if engine_count % 2 == 1 {
        seats.push(BYE);
    }
    let seat_count = seats.len();
    let rounds = seat_count - 1;

    let mut base_fixtures = Vec::with_capacity(rounds * seat_count);
    for round in 0..rounds {
        for i in 0..seat_count / 2 {
            let t1 = seats[i];
            let t2 = seats[seat_count - 1 - i];
            if t1 == BYE || t2 == BYE {
                continue;
            }

            // Alternate colours with round parity; the first pair is
            // inverted so each seat ends up with roughly half the whites.
            let mut swap_colors = round % 2 == 1;
            if i == 0 {
                swap_colors = !swap_colors;
            }
            let (white, black) = if swap_colors { (t2, t1) } else { (t1, t2) };

            for g in 0..games_per_pairing {
                let swap_for_game = g % 2 == 1;
                base_fixtures.push(Fixture {
                    round_index: round as u32,
                    white_engine_id: if swap_for_game { black } else { white } as usize,
                    black_engine_id: if swap_for_game { white } else { black } as usize,
                    game_index_within_pairing: g,
                    pairing_id: pairing_id_for(white as usize, black as usize),
                });
            }
        }
        rotate_seats(&mut seats);
    }

    let cycles: u32 = if double_round_robin { 2 } else { 1 };
    fixtures.reserve(base_fixtures.len() * (cycles * repeat_count) as usize);
    for repeat in 0..repeat_count {
        for cycle in 0..cycles {
            let round_offset = repeat * rounds as u32 * cycles + cycle * rounds as u32;
            for fixture in &base_fixtures {
                let mut next = fixture.clone();
                next.round_index += round_offset;
                // The return leg of a double round-robin reverses colours.
                if cycle % 2 == 1 {
                    std::mem::swap(&mut next.white_engine_id, &mut next.black_engine_id);
                }
                fixtures.push(next);
            }
        }
    }

    fixtures
}

/// Fixed first seat; everyone else shifts one place clockwise.
fn rotate_seats(seats: &mut [i64]) {
    if seats.len() <= 2 {
        return;
    }
    let last = seats[seats.len() - 1];
    for i in (2..seats.len()).rev() {
        seats[i] = seats[i - 1];
    }
    seats[1] = last;
}
