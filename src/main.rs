use std::path::PathBuf;

use anyhow::Result;

use atp_features::level_exp::DEFAULT_LEVEL;
use atp_features::match_store;
use atp_features::pipeline::{self, FeaturePipeline, PipelineConfig};
use atp_features::state_store::StoreError;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = parse_db_path_arg().unwrap_or_else(match_store::default_db_path);

    let cfg = PipelineConfig {
        snapshot_batch: env_usize("FEATURE_SNAPSHOT_BATCH", pipeline::SNAPSHOT_BATCH),
        state_batch: env_usize("FEATURE_STATE_BATCH", pipeline::STATE_BATCH),
        match_chunk: env_usize("FEATURE_MATCH_CHUNK", pipeline::MATCH_CHUNK),
        flush_retries: env_u32("FEATURE_FLUSH_RETRIES", pipeline::FLUSH_RETRIES),
        default_level: std::env::var("FEATURE_DEFAULT_LEVEL")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        rebuild: has_flag("--rebuild"),
    };

    let conn = match_store::open_db(&db_path)?;
    let mut job = match FeaturePipeline::open(conn, cfg) {
        Ok(job) => job,
        Err(err) => {
            if err.downcast_ref::<StoreError>().is_some() {
                eprintln!("hint: pass --rebuild to wipe derived state and replay from scratch");
            }
            return Err(err);
        }
    };
    let summary = job.run()?;

    println!("Feature build complete");
    println!("DB: {}", db_path.display());
    match summary.resumed_from {
        Some(cursor) => println!("Resumed after: {} #{}", cursor.date, cursor.id),
        None => println!("Resumed after: start of history"),
    }
    println!("Matches processed: {}", summary.processed);
    println!("Snapshots written: {}", summary.snapshots_written);
    println!("Rows skipped: {}", summary.skipped);
    println!("Flushes: {}", summary.flushes);
    if let Some(cursor) = summary.final_cursor {
        println!("Cursor: {} #{}", cursor.date, cursor.id);
    }

    Ok(())
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db"
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == flag)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u32>().ok())
        .unwrap_or(default)
        .max(1)
}
