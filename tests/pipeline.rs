use std::fs::File;

use chrono::NaiveDate;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::RowAccessor;
use rusqlite::Connection;
use tempfile::TempDir;

use atp_features::dataset::{self, DatasetRow};
use atp_features::feature_query;
use atp_features::match_store::{self, ServeLine, StoredMatch, Surface};
use atp_features::pipeline::{FeaturePipeline, Phase, PipelineConfig, RunSummary};
use atp_features::state_store;
use atp_features::synthetic::{self, SyntheticConfig};

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

fn cfg() -> PipelineConfig {
    PipelineConfig {
        snapshot_batch: 16,
        state_batch: 100_000,
        match_chunk: 4,
        flush_retries: 2,
        default_level: "A".to_string(),
        rebuild: false,
    }
}

fn seeded_conn(rows: &[StoredMatch]) -> Connection {
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    match_store::init_schema(&conn).expect("matches schema");
    match_store::insert_matches(&mut conn, rows).expect("seed matches");
    conn
}

fn run_on(conn: Connection, cfg: PipelineConfig) -> (RunSummary, Connection) {
    let mut job = FeaturePipeline::open(conn, cfg).expect("open pipeline");
    let summary = job.run().expect("run pipeline");
    assert_eq!(job.phase(), Phase::Completed);
    (summary, job.close())
}

#[test]
fn every_match_yields_two_snapshots() {
    let history = synthetic::generate(&SyntheticConfig {
        players: 10,
        matches: 30,
        start: date(2020, 1, 1),
        seed: 2,
    });
    let (summary, conn) = run_on(seeded_conn(&history), cfg());

    assert_eq!(summary.processed, 30);
    assert_eq!(summary.snapshots_written, 60);
    assert_eq!(summary.skipped, 0);

    let snaps = state_store::load_snapshots(&conn).expect("load snapshots");
    assert_eq!(snaps.len(), 60);
    for m in &history {
        let winner = state_store::read_snapshot(&conn, m.id, m.winner_id)
            .expect("read winner snapshot");
        let loser = state_store::read_snapshot(&conn, m.id, m.loser_id)
            .expect("read loser snapshot");
        assert!(winner.is_some() && loser.is_some(), "match {} missing a side", m.id);
    }
}

#[test]
fn invalid_rows_are_skipped_not_defaulted() {
    let good = vec![
        quick_match(1, date(2024, 5, 1), 1, 2, Surface::Hard),
        quick_match(2, date(2024, 5, 3), 3, 4, Surface::Clay),
        quick_match(4, date(2024, 6, 1), 1, 3, Surface::Grass),
        quick_match(6, date(2025, 1, 1), 2, 4, Surface::Hard),
    ];
    let conn = seeded_conn(&good);
    conn.execute(
        "INSERT INTO matches (id, match_date, surface, winner_id, loser_id)
         VALUES (3, '2024-05-04', 'Carpet', 9, 10)",
        [],
    )
    .expect("insert carpet row");
    conn.execute(
        "INSERT INTO matches (id, match_date, surface, winner_id, loser_id)
         VALUES (5, '2024-99-99', 'Hard', 11, 12)",
        [],
    )
    .expect("insert bad-date row");

    let (summary, conn) = run_on(conn, cfg());
    // The carpet row never leaves SQL; the undecodable date is counted.
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.skipped, 1);

    for (id, player) in [(3, 9), (5, 11)] {
        let snap = state_store::read_snapshot(&conn, id, player).expect("read snapshot");
        assert!(snap.is_none(), "match {id} must not be snapshotted");
    }
    // The stream kept going past the skipped row.
    assert!(
        state_store::read_snapshot(&conn, 6, 2)
            .expect("read snapshot")
            .is_some()
    );
}

#[test]
fn snapshot_batch_threshold_drives_flush_cadence() {
    let history = synthetic::generate(&SyntheticConfig {
        players: 8,
        matches: 25,
        start: date(2020, 1, 1),
        seed: 4,
    });
    let (summary, _conn) = run_on(
        seeded_conn(&history),
        PipelineConfig {
            snapshot_batch: 10,
            ..cfg()
        },
    );

    // Two snapshot rows per match: the buffer fills every fifth match and
    // the last flush lands exactly on the final one.
    assert_eq!(summary.processed, 25);
    assert_eq!(summary.flushes, 5);
    assert_eq!(summary.snapshots_written, 50);
}

#[test]
fn state_batch_threshold_drives_flush_cadence() {
    // Twelve distinct players, no serve lines: nine dirty rows per match
    // (two surface, two form, one h2h, two activity, two level).
    let history: Vec<StoredMatch> = (0..6)
        .map(|i| {
            quick_match(
                i + 1,
                date(2021, 2, 1) + chrono::Duration::days(i),
                2 * i + 1,
                2 * i + 2,
                Surface::Hard,
            )
        })
        .collect();
    let (summary, _conn) = run_on(
        seeded_conn(&history),
        PipelineConfig {
            snapshot_batch: 1000,
            state_batch: 30,
            ..cfg()
        },
    );

    // Dirty state hits 36 rows on the fourth match; the remaining two
    // matches go out in the final flush.
    assert_eq!(summary.processed, 6);
    assert_eq!(summary.flushes, 2);
    assert_eq!(summary.snapshots_written, 12);
}

#[test]
fn rerunning_same_pipeline_adds_nothing() {
    let history = synthetic::generate(&SyntheticConfig {
        players: 6,
        matches: 12,
        start: date(2020, 1, 1),
        seed: 13,
    });
    let mut job = FeaturePipeline::open(seeded_conn(&history), cfg()).expect("open pipeline");
    let first = job.run().expect("first run");
    assert_eq!(first.processed, 12);

    let second = job.run().expect("second run");
    assert_eq!(second.processed, 0);
    assert_eq!(second.snapshots_written, 0);
    assert_eq!(second.resumed_from, first.final_cursor);
    assert_eq!(second.final_cursor, first.final_cursor);

    let conn = job.close();
    state_store::consistency_check(&conn).expect("state and snapshots agree");
    assert_eq!(
        state_store::load_snapshots(&conn).expect("snapshots").len(),
        24
    );
}

#[test]
fn resume_cursor_tracks_newest_snapshot() {
    let history = synthetic::generate(&SyntheticConfig {
        players: 8,
        matches: 40,
        start: date(2020, 1, 1),
        seed: 6,
    });
    let (summary, conn) = run_on(seeded_conn(&history), cfg());

    let expected = history.last().expect("nonempty history").cursor_key();
    assert_eq!(summary.final_cursor, Some(expected));
    assert_eq!(
        state_store::resume_cursor(&conn).expect("resume cursor"),
        Some(expected)
    );
}

#[test]
fn dataset_export_is_symmetric_and_filtered() {
    let mut m1 = quick_match(1, date(2020, 1, 5), 1, 2, Surface::Hard);
    m1.winner_rank = Some(3);
    m1.loser_rank = Some(8);
    // Missing loser rank keeps this match out of the dataset.
    let mut m2 = quick_match(2, date(2020, 1, 20), 3, 4, Surface::Hard);
    m2.winner_rank = Some(5);
    let mut m3 = quick_match(3, date(2020, 2, 1), 2, 1, Surface::Clay);
    m3.winner_rank = Some(7);
    m3.loser_rank = Some(4);

    let (summary, conn) = run_on(seeded_conn(&[m1, m2, m3]), cfg());
    assert_eq!(summary.processed, 3);

    let rows = dataset::load_dataset_rows(&conn).expect("dataset rows");
    assert_eq!(rows.iter().map(|r| r.match_id).collect::<Vec<_>>(), vec![1, 3]);
    assert!(rows.iter().all(|r| r.target == 1));

    // Both players debut in match 1, so every tracked diff is zero.
    assert!(rows[0].elo_diff.abs() < 1e-9);
    assert!(rows[0].h2h_diff.abs() < 1e-9);
    assert!((rows[0].ranking_diff - (3.0 - 8.0)).abs() < 1e-9);

    // By match 3 player 2 carries one loss to player 1 and no head-to-head
    // wins, while player 1 carries the reverse.
    assert!((rows[1].h2h_diff - (0.0 - 1.0)).abs() < 1e-9);
    assert!((rows[1].recent_5_diff - (0.0 - 1.0)).abs() < 1e-9);
    assert!((rows[1].ranking_diff - (7.0 - 4.0)).abs() < 1e-9);
    // Clay is fresh ground for both.
    assert!(rows[1].elo_diff.abs() < 1e-9);
    assert!(rows[1].surface_diff.abs() < 1e-9);

    let all = dataset::symmetric_rows(&rows);
    assert_eq!(all.len(), 4);
    for (win, loss) in rows.iter().zip(&all[rows.len()..]) {
        assert_eq!(loss.match_id, win.match_id);
        assert_eq!(loss.target, 0);
        assert!((loss.elo_diff + win.elo_diff).abs() < 1e-9);
        assert!((loss.ranking_diff + win.ranking_diff).abs() < 1e-9);
        assert!((loss.h2h_diff + win.h2h_diff).abs() < 1e-9);
    }

    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("dataset.parquet");
    let export = dataset::export_dataset(&conn, &out).expect("export");
    assert_eq!(export.matches, 2);
    assert_eq!(export.rows, 4);
    assert!(std::fs::metadata(&out).expect("parquet file").len() > 0);
}

#[test]
fn parquet_file_reads_back() {
    let rows = vec![
        DatasetRow {
            match_id: 1,
            match_date: date(2020, 1, 5),
            elo_diff: 25.0,
            recent_5_diff: 0.2,
            recent_10_diff: 0.1,
            surface_diff: 0.05,
            h2h_diff: 2.0,
            ranking_diff: -5.0,
            target: 1,
        },
        DatasetRow {
            match_id: 1,
            match_date: date(2020, 1, 5),
            elo_diff: -25.0,
            recent_5_diff: -0.2,
            recent_10_diff: -0.1,
            surface_diff: -0.05,
            h2h_diff: -2.0,
            ranking_diff: 5.0,
            target: 0,
        },
    ];

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("roundtrip.parquet");
    dataset::write_parquet(&path, &rows).expect("write parquet");

    let file = File::open(&path).expect("open parquet");
    let reader = SerializedFileReader::new(file).expect("parquet reader");
    let meta = reader.metadata().file_metadata();
    assert_eq!(meta.num_rows(), 2);
    assert_eq!(meta.schema_descr().num_columns(), 8);

    let decoded: Vec<parquet::record::Row> = reader
        .get_row_iter(None)
        .expect("row iter")
        .collect::<Result<_, _>>()
        .expect("decode rows");
    assert_eq!(decoded.len(), 2);

    let first = &decoded[0];
    assert!((first.get_double(0).expect("elo_diff") - 25.0).abs() < 1e-9);
    assert!((first.get_double(5).expect("ranking_diff") + 5.0).abs() < 1e-9);
    assert_eq!(first.get_long(6).expect("target"), 1);
    assert_eq!(first.get_string(7).expect("match_date").as_str(), "2020-01-05");

    let second = &decoded[1];
    assert!((second.get_double(0).expect("elo_diff") + 25.0).abs() < 1e-9);
    assert_eq!(second.get_long(6).expect("target"), 0);
}

#[test]
fn feature_query_agrees_with_replayed_state() {
    let history = synthetic::generate(&SyntheticConfig {
        players: 20,
        matches: 120,
        start: date(2019, 1, 1),
        seed: 8,
    });
    let last = history.last().expect("nonempty history").clone();
    let (_summary, conn) = run_on(seeded_conn(&history), cfg());

    let trackers = state_store::load_tracker_states(&conn).expect("load state");
    let as_of = last.match_date;

    for player in [1i64, 2, 5, 9, 17] {
        for surface in Surface::ALL {
            let (elo, wr) =
                feature_query::surface_state(&conn, player, surface).expect("surface state");
            assert!((elo - trackers.elo.rating(player, surface)).abs() < 1e-12);
            assert!((wr - trackers.elo.win_rate(player, surface)).abs() < 1e-12);
        }

        let (recent_5, recent_10) = feature_query::form_means(&conn, player).expect("form");
        assert!((recent_5 - trackers.form.recent_mean(player, 5)).abs() < 1e-12);
        assert!((recent_10 - trackers.form.recent_mean(player, 10)).abs() < 1e-12);

        assert_eq!(
            feature_query::days_since_last_match(&conn, player, as_of).expect("rest"),
            trackers.activity.days_since(player, as_of)
        );
        assert_eq!(
            feature_query::matches_in_window(&conn, player, as_of, 30).expect("workload"),
            trackers.activity.matches_in_window(player, as_of, 30)
        );

        assert_eq!(
            feature_query::serve_ratios(&conn, player).expect("serve"),
            trackers.serve.ratios(player)
        );
        assert!(
            (feature_query::level_win_rate(&conn, player, "A").expect("level")
                - trackers.level.win_rate(player, "A"))
            .abs()
                < 1e-12
        );
    }

    assert_eq!(
        feature_query::h2h_wins(&conn, last.winner_id, last.loser_id).expect("h2h"),
        trackers.h2h.wins(last.winner_id, last.loser_id)
    );

    let features = feature_query::player_features(
        &conn,
        last.winner_id,
        last.loser_id,
        last.surface,
        as_of,
        "A",
    )
    .expect("assembled features");
    assert!((features.elo - trackers.elo.rating(last.winner_id, last.surface)).abs() < 1e-12);
    assert_eq!(
        features.h2h_wins,
        trackers.h2h.wins(last.winner_id, last.loser_id)
    );
    assert_eq!(features.serve, trackers.serve.ratios(last.winner_id));
}
