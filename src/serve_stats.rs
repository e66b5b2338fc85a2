use std::collections::{HashMap, HashSet};

use crate::match_store::ServeLine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeTotals {
    pub ace: i64,
    pub df: i64,
    pub svpt: i64,
    pub first_in: i64,
    pub first_won: i64,
    pub second_won: i64,
    pub bp_faced: i64,
    pub bp_saved: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServeRatios {
    pub ace_pct: f64,
    pub df_pct: f64,
    pub first_serve_pct: f64,
    pub first_serve_won_pct: f64,
    pub second_serve_won_pct: f64,
    pub bp_save_pct: f64,
}

impl ServeTotals {
    pub fn add_line(&mut self, line: &ServeLine) {
        self.ace += line.ace.unwrap_or(0);
        self.df += line.df.unwrap_or(0);
        self.svpt += line.svpt.unwrap_or(0);
        self.first_in += line.first_in.unwrap_or(0);
        self.first_won += line.first_won.unwrap_or(0);
        self.second_won += line.second_won.unwrap_or(0);
        self.bp_faced += line.bp_faced.unwrap_or(0);
        self.bp_saved += line.bp_saved.unwrap_or(0);
    }

    pub fn ratios(&self) -> ServeRatios {
        let second_pts = if self.svpt > self.first_in {
            self.svpt - self.first_in
        } else {
            0
        };
        ServeRatios {
            ace_pct: safe_ratio(self.ace, self.svpt),
            df_pct: safe_ratio(self.df, self.svpt),
            first_serve_pct: safe_ratio(self.first_in, self.svpt),
            first_serve_won_pct: safe_ratio(self.first_won, self.first_in),
            second_serve_won_pct: safe_ratio(self.second_won, second_pts),
            bp_save_pct: safe_ratio(self.bp_saved, self.bp_faced),
        }
    }
}

pub fn safe_ratio(num: i64, den: i64) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { 0.0 }
}

#[derive(Debug, Default, PartialEq)]
pub struct ServeTracker {
    totals: HashMap<i64, ServeTotals>,
    dirty: HashSet<i64>,
}

impl ServeTracker {
    pub fn ratios(&self, player: i64) -> ServeRatios {
        self.totals
            .get(&player)
            .map(|t| t.ratios())
            .unwrap_or_default()
    }

    pub fn totals(&self, player: i64) -> Option<&ServeTotals> {
        self.totals.get(&player)
    }

    // A line without serve points leaves the totals untouched; absence is
    // missing data, not zero activity.
    pub fn apply_line(&mut self, player: i64, line: &ServeLine) {
        if !line.has_data() {
            return;
        }
        self.totals.entry(player).or_default().add_line(line);
        self.dirty.insert(player);
    }

    pub fn insert_loaded(&mut self, player: i64, totals: ServeTotals) {
        self.totals.insert(player, totals);
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_rows(&self) -> Vec<(i64, ServeTotals)> {
        let mut out = Vec::with_capacity(self.dirty.len());
        for player in &self.dirty {
            if let Some(totals) = self.totals.get(player) {
                out.push((*player, *totals));
            }
        }
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}
