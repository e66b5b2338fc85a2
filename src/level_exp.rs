use std::collections::{HashMap, HashSet};

pub const DEFAULT_LEVEL: &str = "A";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelState {
    pub matches: i64,
    pub wins: i64,
}

impl LevelState {
    pub fn win_rate(&self) -> f64 {
        if self.matches > 0 {
            self.wins as f64 / self.matches as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct LevelTracker {
    states: HashMap<(i64, String), LevelState>,
    dirty: HashSet<(i64, String)>,
}

impl LevelTracker {
    pub fn win_rate(&self, player: i64, level: &str) -> f64 {
        self.states
            .get(&(player, level.to_string()))
            .map(|s| s.win_rate())
            .unwrap_or(0.0)
    }

    pub fn state(&self, player: i64, level: &str) -> LevelState {
        self.states
            .get(&(player, level.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn apply_result(&mut self, winner: i64, loser: i64, level: &str) {
        self.bump(winner, level, true);
        self.bump(loser, level, false);
    }

    fn bump(&mut self, player: i64, level: &str, won: bool) {
        let key = (player, level.to_string());
        let state = self.states.entry(key.clone()).or_default();
        state.matches += 1;
        if won {
            state.wins += 1;
        }
        self.dirty.insert(key);
    }

    pub fn insert_loaded(&mut self, player: i64, level: String, state: LevelState) {
        self.states.insert((player, level), state);
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_rows(&self) -> Vec<(i64, String, LevelState)> {
        let mut out = Vec::with_capacity(self.dirty.len());
        for key in &self.dirty {
            if let Some(state) = self.states.get(key) {
                out.push((key.0, key.1.clone(), *state));
            }
        }
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}
