use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};

use crate::activity::WORKLOAD_WINDOW_DAYS;
use crate::elo::{BASE_ELO, SurfaceState};
use crate::form::mean_last;
use crate::level_exp::LevelState;
use crate::match_store::{DATE_FMT, Surface};
use crate::serve_stats::{ServeRatios, ServeTotals};
use crate::trackers::PlayerFeatures;

// Reads one player at a time straight off the durable tables, so a live
// caller never has to hydrate the full tracker arenas.

pub fn surface_state(conn: &Connection, player: i64, surface: Surface) -> Result<(f64, f64)> {
    let row = conn
        .query_row(
            r#"
            SELECT elo, matches_cnt, wins_cnt
            FROM player_surface_state
            WHERE player_id = ?1 AND surface = ?2
            "#,
            params![player, surface.as_str()],
            |row| {
                Ok(SurfaceState {
                    elo: row.get(0)?,
                    matches: row.get(1)?,
                    wins: row.get(2)?,
                })
            },
        )
        .optional()
        .context("read surface state")?;
    match row {
        Some(state) => Ok((state.elo, state.win_rate())),
        None => Ok((BASE_ELO, 0.0)),
    }
}

pub fn form_means(conn: &Connection, player: i64) -> Result<(f64, f64)> {
    let raw = conn
        .query_row(
            "SELECT last_results FROM player_form_state WHERE player_id = ?1",
            params![player],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .context("read form state")?;
    match raw {
        Some(raw) => {
            let results: Vec<u8> = serde_json::from_str(&raw)
                .with_context(|| format!("bad form buffer for player {player}"))?;
            Ok((mean_last(&results, 5), mean_last(&results, 10)))
        }
        None => Ok((0.0, 0.0)),
    }
}

pub fn h2h_wins(conn: &Connection, player: i64, opponent: i64) -> Result<i64> {
    let wins = conn
        .query_row(
            "SELECT wins FROM h2h_state WHERE player_id = ?1 AND opponent_id = ?2",
            params![player, opponent],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .context("read h2h state")?;
    Ok(wins.unwrap_or(0))
}

// Ranks are published pre-match, so the newest snapshot at or before the
// date carries the freshest one known then.
pub fn latest_rank(conn: &Connection, player: i64, as_of: NaiveDate) -> Result<Option<i64>> {
    conn.query_row(
        r#"
        SELECT rank FROM player_match_features
        WHERE player_id = ?1 AND rank IS NOT NULL AND match_date <= ?2
        ORDER BY match_date DESC, match_id DESC
        LIMIT 1
        "#,
        params![player, as_of.format(DATE_FMT).to_string()],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .context("read latest rank")
}

pub fn latest_age(conn: &Connection, player: i64, as_of: NaiveDate) -> Result<Option<f64>> {
    conn.query_row(
        r#"
        SELECT age FROM player_match_features
        WHERE player_id = ?1 AND age IS NOT NULL AND match_date <= ?2
        ORDER BY match_date DESC, match_id DESC
        LIMIT 1
        "#,
        params![player, as_of.format(DATE_FMT).to_string()],
        |row| row.get::<_, f64>(0),
    )
    .optional()
    .context("read latest age")
}

pub fn days_since_last_match(
    conn: &Connection,
    player: i64,
    as_of: NaiveDate,
) -> Result<Option<i64>> {
    let last = conn
        .query_row(
            "SELECT last_match_date FROM player_activity_state WHERE player_id = ?1",
            params![player],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .context("read activity state")?
        .flatten();
    match last {
        Some(s) => {
            let d = NaiveDate::parse_from_str(&s, DATE_FMT)
                .with_context(|| format!("bad last_match_date for player {player}"))?;
            Ok(Some((as_of - d).num_days()))
        }
        None => Ok(None),
    }
}

// Counts snapshot rows instead of the in-memory date window; the two agree
// because snapshots and activity state commit in the same transaction.
pub fn matches_in_window(
    conn: &Connection,
    player: i64,
    as_of: NaiveDate,
    days: i64,
) -> Result<i64> {
    let start = as_of - ChronoDuration::days(days);
    conn.query_row(
        r#"
        SELECT COUNT(*) FROM player_match_features
        WHERE player_id = ?1 AND match_date >= ?2 AND match_date <= ?3
        "#,
        params![
            player,
            start.format(DATE_FMT).to_string(),
            as_of.format(DATE_FMT).to_string()
        ],
        |row| row.get::<_, i64>(0),
    )
    .context("count matches in window")
}

pub fn serve_ratios(conn: &Connection, player: i64) -> Result<ServeRatios> {
    let totals = conn
        .query_row(
            r#"
            SELECT ace_total, df_total, svpt_total, first_in_total,
                   first_won_total, second_won_total, bp_faced_total, bp_saved_total
            FROM player_serve_state
            WHERE player_id = ?1
            "#,
            params![player],
            |row| {
                Ok(ServeTotals {
                    ace: row.get(0)?,
                    df: row.get(1)?,
                    svpt: row.get(2)?,
                    first_in: row.get(3)?,
                    first_won: row.get(4)?,
                    second_won: row.get(5)?,
                    bp_faced: row.get(6)?,
                    bp_saved: row.get(7)?,
                })
            },
        )
        .optional()
        .context("read serve state")?;
    Ok(totals.map(|t| t.ratios()).unwrap_or_default())
}

pub fn level_win_rate(conn: &Connection, player: i64, level: &str) -> Result<f64> {
    let row = conn
        .query_row(
            r#"
            SELECT matches_cnt, wins_cnt
            FROM player_level_state
            WHERE player_id = ?1 AND level = ?2
            "#,
            params![player, level],
            |row| {
                Ok(LevelState {
                    matches: row.get(0)?,
                    wins: row.get(1)?,
                })
            },
        )
        .optional()
        .context("read level state")?;
    Ok(row.map(|s| s.win_rate()).unwrap_or(0.0))
}

pub fn player_features(
    conn: &Connection,
    player: i64,
    opponent: i64,
    surface: Surface,
    as_of: NaiveDate,
    level: &str,
) -> Result<PlayerFeatures> {
    let (elo, surface_wr) = surface_state(conn, player, surface)?;
    let (recent_5, recent_10) = form_means(conn, player)?;
    Ok(PlayerFeatures {
        elo,
        recent_5,
        recent_10,
        surface_wr,
        h2h_wins: h2h_wins(conn, player, opponent)?,
        rank: latest_rank(conn, player, as_of)?,
        days_since_last_match: days_since_last_match(conn, player, as_of)?,
        age: latest_age(conn, player, as_of)?,
        matches_last_30d: matches_in_window(conn, player, as_of, WORKLOAD_WINDOW_DAYS)?,
        serve: serve_ratios(conn, player)?,
        level_win_rate: level_win_rate(conn, player, level)?,
    })
}
