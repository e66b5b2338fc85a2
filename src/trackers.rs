use chrono::NaiveDate;

use crate::activity::{ActivityTracker, WORKLOAD_WINDOW_DAYS};
use crate::elo::SurfaceEloTracker;
use crate::form::FormTracker;
use crate::h2h::H2hTracker;
use crate::level_exp::LevelTracker;
use crate::match_store::{StoredMatch, Surface};
use crate::serve_stats::{ServeRatios, ServeTracker};

// Everything the snapshot stores for one participant, absolute values only.
// Differencing against the opponent happens at the consuming layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerFeatures {
    pub elo: f64,
    pub recent_5: f64,
    pub recent_10: f64,
    pub surface_wr: f64,
    pub h2h_wins: i64,
    pub rank: Option<i64>,
    pub days_since_last_match: Option<i64>,
    pub age: Option<f64>,
    pub matches_last_30d: i64,
    pub serve: ServeRatios,
    pub level_win_rate: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct TrackerSet {
    pub elo: SurfaceEloTracker,
    pub form: FormTracker,
    pub h2h: H2hTracker,
    pub activity: ActivityTracker,
    pub serve: ServeTracker,
    pub level: LevelTracker,
}

impl TrackerSet {
    pub fn new() -> TrackerSet {
        TrackerSet::default()
    }

    pub fn player_features(
        &self,
        player: i64,
        opponent: i64,
        surface: Surface,
        as_of: NaiveDate,
        rank: Option<i64>,
        age: Option<f64>,
        level: &str,
    ) -> PlayerFeatures {
        PlayerFeatures {
            elo: self.elo.rating(player, surface),
            recent_5: self.form.recent_mean(player, 5),
            recent_10: self.form.recent_mean(player, 10),
            surface_wr: self.elo.win_rate(player, surface),
            h2h_wins: self.h2h.wins(player, opponent),
            rank,
            days_since_last_match: self.activity.days_since(player, as_of),
            age,
            matches_last_30d: self
                .activity
                .matches_in_window(player, as_of, WORKLOAD_WINDOW_DAYS),
            serve: self.serve.ratios(player),
            level_win_rate: self.level.win_rate(player, level),
        }
    }

    pub fn apply_result(&mut self, m: &StoredMatch, default_level: &str) {
        let level = m
            .tournament_level
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(default_level);
        self.elo.apply_result(m.winner_id, m.loser_id, m.surface);
        self.form.apply_result(m.winner_id, m.loser_id);
        self.h2h.apply_result(m.winner_id, m.loser_id);
        self.activity
            .apply_result(m.match_date, m.winner_id, m.loser_id);
        self.serve.apply_line(m.winner_id, &m.winner_serve);
        self.serve.apply_line(m.loser_id, &m.loser_serve);
        self.level.apply_result(m.winner_id, m.loser_id, level);
    }

    pub fn dirty_len(&self) -> usize {
        self.elo.dirty_len()
            + self.form.dirty_len()
            + self.h2h.dirty_len()
            + self.activity.dirty_len()
            + self.serve.dirty_len()
            + self.level.dirty_len()
    }

    pub fn clear_dirty(&mut self) {
        self.elo.clear_dirty();
        self.form.clear_dirty();
        self.h2h.clear_dirty();
        self.activity.clear_dirty();
        self.serve.clear_dirty();
        self.level.clear_dirty();
    }
}
