use chrono::NaiveDate;

use atp_features::activity::ActivityTracker;
use atp_features::elo::{BASE_ELO, SurfaceEloTracker, expected_score};
use atp_features::form::{FORM_CAPACITY, FormTracker};
use atp_features::h2h::H2hTracker;
use atp_features::match_store::{ServeLine, StoredMatch, Surface};
use atp_features::serve_stats::ServeTracker;
use atp_features::snapshot::FeatureSnapshot;
use atp_features::synthetic::{self, SyntheticConfig};
use atp_features::trackers::TrackerSet;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn quick_match(id: i64, d: NaiveDate, winner: i64, loser: i64, surface: Surface) -> StoredMatch {
    StoredMatch {
        id,
        match_date: d,
        surface,
        tournament_name: None,
        tournament_level: None,
        round: None,
        best_of: None,
        minutes: None,
        winner_id: winner,
        loser_id: loser,
        winner_rank: None,
        loser_rank: None,
        winner_age: None,
        loser_age: None,
        score: None,
        winner_serve: ServeLine::default(),
        loser_serve: ServeLine::default(),
    }
}

#[test]
fn expected_score_is_symmetric() {
    assert!((expected_score(1500.0, 1500.0) - 0.5).abs() < 1e-12);
    let favorite = expected_score(1600.0, 1400.0);
    let underdog = expected_score(1400.0, 1600.0);
    assert!(favorite > 0.5);
    assert!((favorite + underdog - 1.0).abs() < 1e-12);
}

#[test]
fn debut_match_moves_ratings_sixteen_points() {
    let mut elo = SurfaceEloTracker::default();
    elo.apply_result(1, 2, Surface::Hard);

    assert!((elo.rating(1, Surface::Hard) - 1516.0).abs() < 1e-9);
    assert!((elo.rating(2, Surface::Hard) - 1484.0).abs() < 1e-9);
    // Other surfaces stay at the baseline.
    assert!((elo.rating(1, Surface::Clay) - BASE_ELO).abs() < 1e-9);

    let winner = elo.state(1, Surface::Hard);
    assert_eq!((winner.matches, winner.wins), (1, 1));
    let loser = elo.state(2, Surface::Hard);
    assert_eq!((loser.matches, loser.wins), (1, 0));
}

#[test]
fn elo_updates_stay_zero_sum() {
    let cfg = SyntheticConfig {
        players: 24,
        matches: 300,
        start: date(2019, 1, 1),
        seed: 9,
    };
    let mut elo = SurfaceEloTracker::default();
    for m in synthetic::generate(&cfg) {
        elo.apply_result(m.winner_id, m.loser_id, m.surface);
    }
    let drift: f64 = elo
        .dirty_rows()
        .iter()
        .map(|(_, _, state)| state.elo - BASE_ELO)
        .sum();
    assert!(drift.abs() < 1e-6, "rating mass drifted by {drift}");
}

#[test]
fn form_buffer_keeps_last_ten() {
    let mut form = FormTracker::default();
    for i in 0..15 {
        form.apply_result(1, 100 + i);
    }
    assert_eq!(form.buffer(1).map(|b| b.len()), Some(FORM_CAPACITY));
    assert!((form.recent_mean(1, 5) - 1.0).abs() < 1e-9);

    for i in 0..3 {
        form.apply_result(200 + i, 1);
    }
    assert_eq!(form.buffer(1).map(|b| b.len()), Some(FORM_CAPACITY));
    assert!((form.recent_mean(1, 5) - 0.4).abs() < 1e-9);
    assert!((form.recent_mean(1, 10) - 0.7).abs() < 1e-9);
    // Unknown player reads as neutral zero.
    assert!((form.recent_mean(99, 5)).abs() < 1e-9);
}

#[test]
fn h2h_counts_are_directional() {
    let mut h2h = H2hTracker::default();
    h2h.apply_result(1, 2);
    h2h.apply_result(1, 2);
    h2h.apply_result(2, 1);

    assert_eq!(h2h.wins(1, 2), 2);
    assert_eq!(h2h.wins(2, 1), 1);
    assert_eq!(h2h.wins(1, 3), 0);
}

#[test]
fn missing_serve_line_leaves_totals_untouched() {
    let mut serve = ServeTracker::default();
    serve.apply_line(1, &ServeLine::default());
    serve.apply_line(
        1,
        &ServeLine {
            svpt: Some(0),
            ace: Some(3),
            ..ServeLine::default()
        },
    );
    assert!(serve.totals(1).is_none());

    serve.apply_line(
        1,
        &ServeLine {
            ace: Some(5),
            df: Some(2),
            svpt: Some(80),
            first_in: Some(50),
            first_won: Some(38),
            second_won: Some(16),
            bp_saved: Some(4),
            bp_faced: Some(6),
        },
    );
    let ratios = serve.ratios(1);
    assert!((ratios.first_serve_pct - 50.0 / 80.0).abs() < 1e-9);
    assert!((ratios.first_serve_won_pct - 38.0 / 50.0).abs() < 1e-9);
    assert!((ratios.second_serve_won_pct - 16.0 / 30.0).abs() < 1e-9);
    assert!((ratios.bp_save_pct - 4.0 / 6.0).abs() < 1e-9);

    // Player with no recorded lines reads as all-zero ratios.
    let empty = serve.ratios(42);
    assert!(empty.ace_pct.abs() < 1e-9);
    assert!(empty.first_serve_pct.abs() < 1e-9);
}

#[test]
fn activity_window_prunes_old_dates() {
    let mut activity = ActivityTracker::default();
    let day0 = date(2021, 3, 1);
    activity.apply_result(day0, 1, 2);
    activity.apply_result(day0 + chrono::Duration::days(70), 1, 3);

    let state = activity.state(1).expect("tracked player");
    assert_eq!(state.recent.len(), 1);
    assert_eq!(state.last_match, Some(day0 + chrono::Duration::days(70)));

    let as_of = day0 + chrono::Duration::days(71);
    assert_eq!(activity.days_since(1, as_of), Some(1));
    assert_eq!(activity.matches_in_window(1, as_of, 30), 1);
    assert_eq!(activity.days_since(9, as_of), None);
}

#[test]
fn default_level_covers_unlabeled_matches() {
    let mut trackers = TrackerSet::new();
    trackers.apply_result(&quick_match(1, date(2022, 5, 1), 7, 8, Surface::Clay), "A");

    assert!((trackers.level.win_rate(7, "A") - 1.0).abs() < 1e-9);
    assert!(trackers.level.win_rate(7, "G").abs() < 1e-9);
    assert!(trackers.level.win_rate(8, "A").abs() < 1e-9);

    let loser_state = trackers.level.state(8, "A");
    assert_eq!((loser_state.matches, loser_state.wins), (1, 0));

    // A blank level code falls back the same way a missing one does.
    let mut blank = quick_match(2, date(2022, 5, 8), 7, 8, Surface::Clay);
    blank.tournament_level = Some(String::new());
    let [winner, _] = FeatureSnapshot::pair(&blank, &trackers, "A");
    assert!((winner.features.level_win_rate - 1.0).abs() < 1e-9);

    trackers.apply_result(&blank, "A");
    let winner_state = trackers.level.state(7, "A");
    assert_eq!((winner_state.matches, winner_state.wins), (2, 2));
    assert_eq!(trackers.level.state(7, "").matches, 0);
}

#[test]
fn debut_snapshot_uses_neutral_baselines() {
    let trackers = TrackerSet::new();
    let mut m = quick_match(1, date(2022, 5, 1), 7, 8, Surface::Hard);
    m.winner_rank = Some(10);
    m.loser_rank = Some(20);

    let [winner, loser] = FeatureSnapshot::pair(&m, &trackers, "A");
    assert_eq!(
        (winner.match_id, winner.player_id, winner.opponent_id),
        (1, 7, 8)
    );
    assert_eq!(
        (loser.match_id, loser.player_id, loser.opponent_id),
        (1, 8, 7)
    );

    assert!((winner.features.elo - BASE_ELO).abs() < 1e-9);
    assert!(winner.features.recent_5.abs() < 1e-9);
    assert!(winner.features.surface_wr.abs() < 1e-9);
    assert_eq!(winner.features.h2h_wins, 0);
    assert_eq!(winner.features.rank, Some(10));
    assert_eq!(winner.features.days_since_last_match, None);
    assert_eq!(winner.features.matches_last_30d, 0);
    assert!(winner.features.serve.first_serve_pct.abs() < 1e-9);
    assert!(winner.features.level_win_rate.abs() < 1e-9);
    assert_eq!(loser.features.rank, Some(20));
}

// Replaying the prefix of the history must reproduce the snapshot taken
// mid-stream: nothing from the match itself or anything later leaks in.
#[test]
fn snapshots_freeze_prematch_state() {
    let cfg = SyntheticConfig {
        players: 12,
        matches: 120,
        start: date(2019, 1, 1),
        seed: 3,
    };
    let history = synthetic::generate(&cfg);

    let mut trackers = TrackerSet::new();
    let mut streamed = Vec::with_capacity(history.len());
    for m in &history {
        streamed.push(FeatureSnapshot::pair(m, &trackers, "A"));
        trackers.apply_result(m, "A");
    }

    for k in [0usize, 1, 7, 45, 119] {
        let mut fresh = TrackerSet::new();
        for m in &history[..k] {
            fresh.apply_result(m, "A");
        }
        let expected = FeatureSnapshot::pair(&history[k], &fresh, "A");
        assert_eq!(streamed[k], expected, "snapshot at match index {k}");
    }
}
