use std::collections::{HashMap, HashSet};

use chrono::{Duration as ChronoDuration, NaiveDate};

// Retention must stay wider than any rolling-count window served from it.
pub const RECENT_RETENTION_DAYS: i64 = 60;
pub const WORKLOAD_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityState {
    pub last_match: Option<NaiveDate>,
    pub recent: Vec<NaiveDate>,
}

#[derive(Debug, Default, PartialEq)]
pub struct ActivityTracker {
    states: HashMap<i64, ActivityState>,
    dirty: HashSet<i64>,
}

impl ActivityTracker {
    pub fn days_since(&self, player: i64, as_of: NaiveDate) -> Option<i64> {
        self.states
            .get(&player)?
            .last_match
            .map(|d| (as_of - d).num_days())
    }

    pub fn matches_in_window(&self, player: i64, as_of: NaiveDate, days: i64) -> i64 {
        let Some(state) = self.states.get(&player) else {
            return 0;
        };
        state
            .recent
            .iter()
            .filter(|d| {
                let age = (as_of - **d).num_days();
                age >= 0 && age <= days
            })
            .count() as i64
    }

    pub fn state(&self, player: i64) -> Option<&ActivityState> {
        self.states.get(&player)
    }

    pub fn apply_result(&mut self, date: NaiveDate, player_a: i64, player_b: i64) {
        self.touch(player_a, date);
        self.touch(player_b, date);
    }

    fn touch(&mut self, player: i64, date: NaiveDate) {
        let state = self.states.entry(player).or_default();
        state.last_match = Some(date);
        state.recent.push(date);
        let cutoff = date - ChronoDuration::days(RECENT_RETENTION_DAYS);
        state.recent.retain(|d| *d > cutoff);
        self.dirty.insert(player);
    }

    pub fn insert_loaded(&mut self, player: i64, state: ActivityState) {
        self.states.insert(player, state);
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_rows(&self) -> Vec<(i64, ActivityState)> {
        let mut out = Vec::with_capacity(self.dirty.len());
        for player in &self.dirty {
            if let Some(state) = self.states.get(player) {
                out.push((*player, state.clone()));
            }
        }
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}
