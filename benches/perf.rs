use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::NaiveDate;
use rusqlite::Connection;

use atp_features::match_store::{self, StoredMatch};
use atp_features::pipeline::{FeaturePipeline, PipelineConfig};
use atp_features::snapshot::FeatureSnapshot;
use atp_features::synthetic::{self, SyntheticConfig};
use atp_features::trackers::TrackerSet;

fn sample_history(matches: usize) -> Vec<StoredMatch> {
    synthetic::generate(&SyntheticConfig {
        players: 128,
        matches,
        start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
        seed: 21,
    })
}

fn bench_tracker_replay(c: &mut Criterion) {
    let history = sample_history(5_000);
    c.bench_function("tracker_replay_5k", |b| {
        b.iter(|| {
            let mut trackers = TrackerSet::new();
            for m in black_box(&history) {
                trackers.apply_result(m, "A");
            }
            black_box(trackers.dirty_len());
        })
    });
}

fn bench_snapshot_pair(c: &mut Criterion) {
    let history = sample_history(5_000);
    let mut trackers = TrackerSet::new();
    for m in &history {
        trackers.apply_result(m, "A");
    }
    let last = history.last().unwrap();
    c.bench_function("snapshot_pair", |b| {
        b.iter(|| {
            let pair = FeatureSnapshot::pair(black_box(last), black_box(&trackers), "A");
            black_box(pair[0].features.elo);
        })
    });
}

fn bench_full_build(c: &mut Criterion) {
    let history = sample_history(1_000);
    c.bench_function("full_build_1k_in_memory", |b| {
        b.iter(|| {
            let mut conn = Connection::open_in_memory().unwrap();
            match_store::init_schema(&conn).unwrap();
            match_store::insert_matches(&mut conn, &history).unwrap();
            let mut job = FeaturePipeline::open(conn, PipelineConfig::default()).unwrap();
            let summary = job.run().unwrap();
            black_box(summary.snapshots_written);
        })
    });
}

criterion_group!(perf, bench_tracker_replay, bench_snapshot_pair, bench_full_build);
criterion_main!(perf);
