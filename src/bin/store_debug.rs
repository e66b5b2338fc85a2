use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension;

use atp_features::activity::WORKLOAD_WINDOW_DAYS;
use atp_features::feature_query;
use atp_features::level_exp::DEFAULT_LEVEL;
use atp_features::match_store::{self, DATE_FMT, Surface};
use atp_features::state_store;

const TABLES: &[&str] = &[
    "matches",
    "player_surface_state",
    "player_form_state",
    "h2h_state",
    "player_activity_state",
    "player_serve_state",
    "player_level_state",
    "player_match_features",
];

fn main() -> Result<()> {
    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(match_store::default_db_path);
    let conn = match_store::open_db(&db_path)?;
    state_store::init_schema(&conn)?;

    println!("DB: {}", db_path.display());
    for table in TABLES {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("count rows in {table}"))?;
        println!("{table}: {count} rows");
    }
    match state_store::resume_cursor(&conn)? {
        Some(cursor) => println!("Cursor: {} #{}", cursor.date, cursor.id),
        None => println!("Cursor: none"),
    }

    if let Some(player) = arg_value("--player").and_then(|val| val.parse::<i64>().ok()) {
        let as_of = match arg_value("--as-of") {
            Some(raw) => NaiveDate::parse_from_str(&raw, DATE_FMT)
                .with_context(|| format!("bad --as-of date {raw:?}"))?,
            None => Utc::now().date_naive(),
        };
        println!();
        println!("Player {player} as of {as_of}");
        for surface in Surface::ALL {
            let (elo, wr) = feature_query::surface_state(&conn, player, surface)?;
            println!("  {}: elo {elo:.1} win rate {wr:.3}", surface.as_str());
        }
        let (recent_5, recent_10) = feature_query::form_means(&conn, player)?;
        println!("  form: last5 {recent_5:.2} last10 {recent_10:.2}");
        match feature_query::latest_rank(&conn, player, as_of)? {
            Some(rank) => println!("  rank: {rank}"),
            None => println!("  rank: unknown"),
        }
        match feature_query::days_since_last_match(&conn, player, as_of)? {
            Some(days) => println!("  rest: {days} days"),
            None => println!("  rest: no match on record"),
        }
        let workload = feature_query::matches_in_window(&conn, player, as_of, WORKLOAD_WINDOW_DAYS)?;
        println!("  last {WORKLOAD_WINDOW_DAYS}d: {workload} matches");
        let serve = feature_query::serve_ratios(&conn, player)?;
        println!(
            "  serve: first in {:.3} first won {:.3} bp saved {:.3}",
            serve.first_serve_pct, serve.first_serve_won_pct, serve.bp_save_pct
        );
        let level_wr = feature_query::level_win_rate(&conn, player, DEFAULT_LEVEL)?;
        println!("  level {DEFAULT_LEVEL} win rate: {level_wr:.3}");

        let newest: Option<i64> = conn
            .query_row(
                r#"
                SELECT match_id FROM player_match_features
                WHERE player_id = ?1
                ORDER BY match_date DESC, match_id DESC
                LIMIT 1
                "#,
                [player],
                |row| row.get(0),
            )
            .optional()
            .context("find newest snapshot")?;
        match newest {
            Some(match_id) => {
                if let Some(snap) = state_store::read_snapshot(&conn, match_id, player)? {
                    println!(
                        "  newest snapshot: match {} on {} ({}) vs {}: elo {:.1} h2h {}",
                        snap.match_id,
                        snap.match_date,
                        snap.surface.as_str(),
                        snap.opponent_id,
                        snap.features.elo,
                        snap.features.h2h_wins
                    );
                }
            }
            None => println!("  newest snapshot: none"),
        }
    }

    Ok(())
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
