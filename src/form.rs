use std::collections::{HashMap, HashSet, VecDeque};

pub const FORM_CAPACITY: usize = 10;

#[derive(Debug, Default, PartialEq)]
pub struct FormTracker {
    buffers: HashMap<i64, VecDeque<u8>>,
    dirty: HashSet<i64>,
}

impl FormTracker {
    pub fn recent_mean(&self, player: i64, n: usize) -> f64 {
        let Some(buf) = self.buffers.get(&player) else {
            return 0.0;
        };
        let take = n.min(buf.len());
        if take == 0 {
            return 0.0;
        }
        let wins: u32 = buf.iter().rev().take(take).map(|&v| u32::from(v)).sum();
        wins as f64 / take as f64
    }

    pub fn buffer(&self, player: i64) -> Option<&VecDeque<u8>> {
        self.buffers.get(&player)
    }

    pub fn apply_result(&mut self, winner: i64, loser: i64) {
        self.push(winner, 1);
        self.push(loser, 0);
    }

    fn push(&mut self, player: i64, outcome: u8) {
        let buf = self.buffers.entry(player).or_default();
        buf.push_back(outcome);
        while buf.len() > FORM_CAPACITY {
            buf.pop_front();
        }
        self.dirty.insert(player);
    }

    pub fn insert_loaded(&mut self, player: i64, results: &[u8]) {
        let mut buf: VecDeque<u8> = results.iter().copied().collect();
        while buf.len() > FORM_CAPACITY {
            buf.pop_front();
        }
        self.buffers.insert(player, buf);
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_rows(&self) -> Vec<(i64, Vec<u8>)> {
        let mut out = Vec::with_capacity(self.dirty.len());
        for player in &self.dirty {
            if let Some(buf) = self.buffers.get(player) {
                out.push((*player, buf.iter().copied().collect()));
            }
        }
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

// Mean over the last min(n, len) entries, oldest first in `results`.
pub fn mean_last(results: &[u8], n: usize) -> f64 {
    let take = n.min(results.len());
    if take == 0 {
        return 0.0;
    }
    let wins: u32 = results[results.len() - take..]
        .iter()
        .map(|&v| u32::from(v))
        .sum();
    wins as f64 / take as f64
}
