use chrono::NaiveDate;

use crate::match_store::{StoredMatch, Surface};
use crate::trackers::{PlayerFeatures, TrackerSet};

// Write-once pre-match row for one participant, keyed by (match_id, player_id).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSnapshot {
    pub match_id: i64,
    pub player_id: i64,
    pub opponent_id: i64,
    pub match_date: NaiveDate,
    pub surface: Surface,
    pub features: PlayerFeatures,
}

impl FeatureSnapshot {
    // Both perspectives of one match. Must be called before the match's
    // outcome is applied to any tracker; ranks and ages come off the match
    // record since those were published pre-match.
    pub fn pair(
        m: &StoredMatch,
        trackers: &TrackerSet,
        default_level: &str,
    ) -> [FeatureSnapshot; 2] {
        let level = m
            .tournament_level
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(default_level);
        let winner = FeatureSnapshot {
            match_id: m.id,
            player_id: m.winner_id,
            opponent_id: m.loser_id,
            match_date: m.match_date,
            surface: m.surface,
            features: trackers.player_features(
                m.winner_id,
                m.loser_id,
                m.surface,
                m.match_date,
                m.winner_rank,
                m.winner_age,
                level,
            ),
        };
        let loser = FeatureSnapshot {
            match_id: m.id,
            player_id: m.loser_id,
            opponent_id: m.winner_id,
            match_date: m.match_date,
            surface: m.surface,
            features: trackers.player_features(
                m.loser_id,
                m.winner_id,
                m.surface,
                m.match_date,
                m.loser_rank,
                m.loser_age,
                level,
            ),
        };
        [winner, loser]
    }
}
