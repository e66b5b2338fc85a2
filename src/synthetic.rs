use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::match_store::{ServeLine, StoredMatch, Surface};

const SLAMS: [&str; 4] = [
    "Australian Open",
    "Roland Garros",
    "Wimbledon",
    "US Open",
];
const CITIES: [&str; 8] = [
    "Doha",
    "Rotterdam",
    "Acapulco",
    "Barcelona",
    "Halle",
    "Washington",
    "Basel",
    "Vienna",
];
const ROUNDS: [&str; 5] = ["R32", "R16", "QF", "SF", "F"];
const SCORES: [&str; 5] = [
    "6-4 6-4",
    "7-6(4) 6-3",
    "6-3 4-6 6-2",
    "7-5 6-7(5) 7-6(8)",
    "6-2 6-1",
];

pub struct SyntheticConfig {
    pub players: usize,
    pub matches: usize,
    pub start: NaiveDate,
    pub seed: u64,
}

// Seeded history: latent player skills drive outcomes through a logistic,
// so stronger players really do win more and the derived features carry
// signal. Same seed, same history.
pub fn generate(cfg: &SyntheticConfig) -> Vec<StoredMatch> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let players = cfg.players.max(2);

    let skill: Vec<f64> = (0..players).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut rank: Vec<i64> = (0..players).map(|_| rng.gen_range(1..=300)).collect();
    let base_age: Vec<f64> = (0..players).map(|_| rng.gen_range(18.0..34.0)).collect();

    let mut out = Vec::with_capacity(cfg.matches);
    let mut date = cfg.start;
    for idx in 0..cfg.matches {
        date += ChronoDuration::days(rng.gen_range(0..3));

        let a = rng.gen_range(0..players);
        let mut b = rng.gen_range(0..players);
        while b == a {
            b = rng.gen_range(0..players);
        }

        let surface = match rng.gen_range(0..10) {
            0..=4 => Surface::Hard,
            5..=7 => Surface::Clay,
            _ => Surface::Grass,
        };
        let level = match rng.gen_range(0..20) {
            0 => "G",
            1..=3 => "M",
            _ => "A",
        };

        let p_a = 1.0 / (1.0 + (-(skill[a] - skill[b]) * 2.0).exp());
        let (w, l) = if rng.gen_bool(p_a) { (a, b) } else { (b, a) };

        for i in [a, b] {
            rank[i] = (rank[i] + rng.gen_range(-8..=8)).clamp(1, 500);
        }

        let elapsed = (date - cfg.start).num_days() as f64 / 365.25;
        let has_stats = rng.gen_bool(0.85);
        let (winner_serve, loser_serve) = if has_stats {
            (serve_line(&mut rng), serve_line(&mut rng))
        } else {
            (ServeLine::default(), ServeLine::default())
        };

        let tournament_name = match level {
            "G" => SLAMS[rng.gen_range(0..SLAMS.len())].to_string(),
            "M" => format!("{} Masters", CITIES[rng.gen_range(0..CITIES.len())]),
            _ => format!("{} Open", CITIES[rng.gen_range(0..CITIES.len())]),
        };

        out.push(StoredMatch {
            id: (idx + 1) as i64,
            match_date: date,
            surface,
            tournament_name: Some(tournament_name),
            tournament_level: Some(level.to_string()),
            round: Some(ROUNDS[rng.gen_range(0..ROUNDS.len())].to_string()),
            best_of: Some(if level == "G" { 5 } else { 3 }),
            minutes: Some(rng.gen_range(60..=230)),
            winner_id: (w + 1) as i64,
            loser_id: (l + 1) as i64,
            winner_rank: maybe_rank(&mut rng, rank[w]),
            loser_rank: maybe_rank(&mut rng, rank[l]),
            winner_age: maybe_age(&mut rng, base_age[w] + elapsed),
            loser_age: maybe_age(&mut rng, base_age[l] + elapsed),
            score: Some(SCORES[rng.gen_range(0..SCORES.len())].to_string()),
            winner_serve,
            loser_serve,
        });
    }
    out
}

fn maybe_rank(rng: &mut impl Rng, rank: i64) -> Option<i64> {
    if rng.gen_bool(0.9) { Some(rank) } else { None }
}

fn maybe_age(rng: &mut impl Rng, age: f64) -> Option<f64> {
    if rng.gen_bool(0.95) {
        Some((age * 10.0).round() / 10.0)
    } else {
        None
    }
}

fn serve_line(rng: &mut impl Rng) -> ServeLine {
    let svpt = rng.gen_range(50..=110);
    let first_in = svpt * rng.gen_range(55..=70) / 100;
    let first_won = first_in * rng.gen_range(62..=80) / 100;
    let second_won = (svpt - first_in) * rng.gen_range(42..=60) / 100;
    let bp_faced = rng.gen_range(0..=12);
    ServeLine {
        ace: Some(rng.gen_range(0..=10)),
        df: Some(rng.gen_range(0..=8)),
        svpt: Some(svpt),
        first_in: Some(first_in),
        first_won: Some(first_won),
        second_won: Some(second_won),
        bp_saved: Some(bp_faced * rng.gen_range(50..=75) / 100),
        bp_faced: Some(bp_faced),
    }
}
