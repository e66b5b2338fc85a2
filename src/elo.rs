use std::collections::{HashMap, HashSet};

use crate::match_store::Surface;

pub const BASE_ELO: f64 = 1500.0;
pub const ELO_K: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceState {
    pub elo: f64,
    pub matches: i64,
    pub wins: i64,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            elo: BASE_ELO,
            matches: 0,
            wins: 0,
        }
    }
}

impl SurfaceState {
    pub fn win_rate(&self) -> f64 {
        if self.matches > 0 {
            self.wins as f64 / self.matches as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct SurfaceEloTracker {
    states: HashMap<(i64, Surface), SurfaceState>,
    dirty: HashSet<(i64, Surface)>,
}

impl SurfaceEloTracker {
    pub fn rating(&self, player: i64, surface: Surface) -> f64 {
        self.states
            .get(&(player, surface))
            .map(|s| s.elo)
            .unwrap_or(BASE_ELO)
    }

    pub fn win_rate(&self, player: i64, surface: Surface) -> f64 {
        self.states
            .get(&(player, surface))
            .map(|s| s.win_rate())
            .unwrap_or(0.0)
    }

    pub fn state(&self, player: i64, surface: Surface) -> SurfaceState {
        self.states
            .get(&(player, surface))
            .copied()
            .unwrap_or_default()
    }

    pub fn apply_result(&mut self, winner: i64, loser: i64, surface: Surface) {
        let rating_winner = self.rating(winner, surface);
        let rating_loser = self.rating(loser, surface);
        let expected_winner = expected_score(rating_winner, rating_loser);
        let delta = ELO_K * (1.0 - expected_winner);

        {
            let w = self.states.entry((winner, surface)).or_default();
            w.elo = rating_winner + delta;
            w.matches += 1;
            w.wins += 1;
        }
        {
            let l = self.states.entry((loser, surface)).or_default();
            l.elo = rating_loser - delta;
            l.matches += 1;
        }
        self.dirty.insert((winner, surface));
        self.dirty.insert((loser, surface));
    }

    pub fn insert_loaded(&mut self, player: i64, surface: Surface, state: SurfaceState) {
        self.states.insert((player, surface), state);
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_rows(&self) -> Vec<(i64, Surface, SurfaceState)> {
        let mut out = Vec::with_capacity(self.dirty.len());
        for key in &self.dirty {
            if let Some(state) = self.states.get(key) {
                out.push((key.0, key.1, *state));
            }
        }
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}
