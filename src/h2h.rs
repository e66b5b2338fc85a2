use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, PartialEq)]
pub struct H2hTracker {
    wins: HashMap<(i64, i64), i64>,
    dirty: HashSet<(i64, i64)>,
}

impl H2hTracker {
    pub fn wins(&self, player: i64, opponent: i64) -> i64 {
        self.wins.get(&(player, opponent)).copied().unwrap_or(0)
    }

    // Only the winner's directed pair moves; (loser, winner) stays as-is.
    pub fn apply_result(&mut self, winner: i64, loser: i64) {
        *self.wins.entry((winner, loser)).or_insert(0) += 1;
        self.dirty.insert((winner, loser));
    }

    pub fn insert_loaded(&mut self, player: i64, opponent: i64, wins: i64) {
        self.wins.insert((player, opponent), wins);
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_rows(&self) -> Vec<(i64, i64, i64)> {
        let mut out = Vec::with_capacity(self.dirty.len());
        for key in &self.dirty {
            if let Some(wins) = self.wins.get(key) {
                out.push((key.0, key.1, *wins));
            }
        }
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}
