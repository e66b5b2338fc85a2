use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use atp_features::match_store::{self, DATE_FMT};
use atp_features::synthetic::{self, SyntheticConfig};

fn main() -> Result<()> {
    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(match_store::default_db_path);
    let cfg = SyntheticConfig {
        players: parse_arg("--players").unwrap_or(48),
        matches: parse_arg("--matches").unwrap_or(4000),
        start: parse_start_arg()?,
        seed: parse_arg("--seed").unwrap_or(7),
    };

    let rows = synthetic::generate(&cfg);
    let mut conn = match_store::open_db(&db_path)?;
    let upserted = match_store::insert_matches(&mut conn, &rows)?;

    println!("Synthetic history seeded");
    println!("DB: {}", db_path.display());
    println!("Players: {}", cfg.players);
    println!("Matches upserted: {upserted}");
    if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
        println!("Dates: {} .. {}", first.match_date, last.match_date);
    }

    Ok(())
}

fn parse_start_arg() -> Result<NaiveDate> {
    let raw = arg_value("--start").unwrap_or_else(|| "2015-01-01".to_string());
    NaiveDate::parse_from_str(&raw, DATE_FMT).with_context(|| format!("bad --start date {raw:?}"))
}

fn parse_arg<T: std::str::FromStr>(flag: &str) -> Option<T> {
    arg_value(flag).and_then(|val| val.parse::<T>().ok())
}

fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
