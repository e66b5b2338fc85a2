use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::activity::ActivityState;
use crate::elo::SurfaceState;
use crate::level_exp::LevelState;
use crate::match_store::{CursorKey, DATE_FMT, Surface};
use crate::serve_stats::{ServeRatios, ServeTotals};
use crate::snapshot::FeatureSnapshot;
use crate::trackers::{PlayerFeatures, TrackerSet};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "tracker state covers {state_matches} player-matches but {snapshot_rows} snapshot rows are stored; rebuild or reconcile before resuming"
    )]
    ResumeInconsistency {
        state_matches: i64,
        snapshot_rows: i64,
    },
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS player_surface_state (
            player_id INTEGER NOT NULL,
            surface TEXT NOT NULL,
            elo REAL NOT NULL,
            matches_cnt INTEGER NOT NULL DEFAULT 0,
            wins_cnt INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (player_id, surface)
        );

        CREATE TABLE IF NOT EXISTS player_form_state (
            player_id INTEGER PRIMARY KEY,
            last_results TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS h2h_state (
            player_id INTEGER NOT NULL,
            opponent_id INTEGER NOT NULL,
            wins INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (player_id, opponent_id)
        );

        CREATE TABLE IF NOT EXISTS player_activity_state (
            player_id INTEGER PRIMARY KEY,
            last_match_date TEXT NULL,
            recent_dates TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS player_serve_state (
            player_id INTEGER PRIMARY KEY,
            ace_total INTEGER NOT NULL DEFAULT 0,
            df_total INTEGER NOT NULL DEFAULT 0,
            svpt_total INTEGER NOT NULL DEFAULT 0,
            first_in_total INTEGER NOT NULL DEFAULT 0,
            first_won_total INTEGER NOT NULL DEFAULT 0,
            second_won_total INTEGER NOT NULL DEFAULT 0,
            bp_faced_total INTEGER NOT NULL DEFAULT 0,
            bp_saved_total INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS player_level_state (
            player_id INTEGER NOT NULL,
            level TEXT NOT NULL,
            matches_cnt INTEGER NOT NULL DEFAULT 0,
            wins_cnt INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (player_id, level)
        );

        CREATE TABLE IF NOT EXISTS player_match_features (
            match_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            opponent_id INTEGER NOT NULL,
            match_date TEXT NOT NULL,
            surface TEXT NOT NULL,
            elo REAL NOT NULL,
            recent_5 REAL NOT NULL,
            recent_10 REAL NOT NULL,
            surface_wr REAL NOT NULL,
            h2h_wins INTEGER NOT NULL,
            rank INTEGER NULL,
            days_since_last_match INTEGER NULL,
            age REAL NULL,
            matches_last_30d INTEGER NOT NULL,
            ace_pct REAL NOT NULL,
            df_pct REAL NOT NULL,
            first_serve_pct REAL NOT NULL,
            first_serve_won_pct REAL NOT NULL,
            second_serve_won_pct REAL NOT NULL,
            bp_save_pct REAL NOT NULL,
            level_win_rate REAL NOT NULL,
            PRIMARY KEY (match_id, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_features_date ON player_match_features(match_date);
        CREATE INDEX IF NOT EXISTS idx_features_player_date
            ON player_match_features(player_id, match_date);
        "#,
    )
    .context("create feature state schema")?;
    Ok(())
}

pub fn load_tracker_states(conn: &Connection) -> Result<TrackerSet> {
    let mut trackers = TrackerSet::new();

    let mut stmt = conn
        .prepare("SELECT player_id, surface, elo, matches_cnt, wins_cnt FROM player_surface_state")
        .context("prepare surface state load")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .context("query surface state")?;
    for row in rows {
        let (player, surface, elo, matches, wins) = row.context("decode surface state row")?;
        let surface = Surface::parse(&surface)
            .with_context(|| format!("unknown surface {surface:?} in player_surface_state"))?;
        trackers
            .elo
            .insert_loaded(player, surface, SurfaceState { elo, matches, wins });
    }

    let mut stmt = conn
        .prepare("SELECT player_id, last_results FROM player_form_state")
        .context("prepare form state load")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .context("query form state")?;
    for row in rows {
        let (player, raw) = row.context("decode form state row")?;
        let results: Vec<u8> = serde_json::from_str(&raw)
            .with_context(|| format!("bad form buffer for player {player}"))?;
        trackers.form.insert_loaded(player, &results);
    }

    let mut stmt = conn
        .prepare("SELECT player_id, opponent_id, wins FROM h2h_state")
        .context("prepare h2h state load")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .context("query h2h state")?;
    for row in rows {
        let (player, opponent, wins) = row.context("decode h2h state row")?;
        trackers.h2h.insert_loaded(player, opponent, wins);
    }

    let mut stmt = conn
        .prepare("SELECT player_id, last_match_date, recent_dates FROM player_activity_state")
        .context("prepare activity state load")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .context("query activity state")?;
    for row in rows {
        let (player, last, raw_recent) = row.context("decode activity state row")?;
        let last_match = match last {
            Some(s) => Some(
                NaiveDate::parse_from_str(&s, DATE_FMT)
                    .with_context(|| format!("bad last_match_date for player {player}"))?,
            ),
            None => None,
        };
        let raw_dates: Vec<String> = serde_json::from_str(&raw_recent)
            .with_context(|| format!("bad recent_dates for player {player}"))?;
        let mut recent = Vec::with_capacity(raw_dates.len());
        for s in raw_dates {
            recent.push(
                NaiveDate::parse_from_str(&s, DATE_FMT)
                    .with_context(|| format!("bad recent date for player {player}"))?,
            );
        }
        trackers
            .activity
            .insert_loaded(player, ActivityState { last_match, recent });
    }

    let mut stmt = conn
        .prepare(
            r#"
            SELECT player_id, ace_total, df_total, svpt_total, first_in_total,
                   first_won_total, second_won_total, bp_faced_total, bp_saved_total
            FROM player_serve_state
            "#,
        )
        .context("prepare serve state load")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ServeTotals {
                    ace: row.get(1)?,
                    df: row.get(2)?,
                    svpt: row.get(3)?,
                    first_in: row.get(4)?,
                    first_won: row.get(5)?,
                    second_won: row.get(6)?,
                    bp_faced: row.get(7)?,
                    bp_saved: row.get(8)?,
                },
            ))
        })
        .context("query serve state")?;
    for row in rows {
        let (player, totals) = row.context("decode serve state row")?;
        trackers.serve.insert_loaded(player, totals);
    }

    let mut stmt = conn
        .prepare("SELECT player_id, level, matches_cnt, wins_cnt FROM player_level_state")
        .context("prepare level state load")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .context("query level state")?;
    for row in rows {
        let (player, level, matches, wins) = row.context("decode level state row")?;
        trackers
            .level
            .insert_loaded(player, level, LevelState { matches, wins });
    }

    Ok(trackers)
}

// Newest durably stored snapshot marks the last processed match.
pub fn resume_cursor(conn: &Connection) -> Result<Option<CursorKey>> {
    let row = conn
        .query_row(
            r#"
            SELECT match_date, match_id
            FROM player_match_features
            ORDER BY match_date DESC, match_id DESC
            LIMIT 1
            "#,
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .context("read resume cursor")?;
    match row {
        Some((date, id)) => {
            let date = NaiveDate::parse_from_str(&date, DATE_FMT)
                .with_context(|| format!("bad match_date {date:?} in player_match_features"))?;
            Ok(Some(CursorKey { date, id }))
        }
        None => Ok(None),
    }
}

// Every processed match adds two snapshot rows and two matches_cnt bumps,
// so the sums must agree exactly.
pub fn consistency_check(conn: &Connection) -> Result<()> {
    let state_matches: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(matches_cnt), 0) FROM player_surface_state",
            [],
            |row| row.get(0),
        )
        .context("sum surface state matches")?;
    let snapshot_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM player_match_features", [], |row| {
            row.get(0)
        })
        .context("count snapshot rows")?;
    if state_matches != snapshot_rows {
        return Err(StoreError::ResumeInconsistency {
            state_matches,
            snapshot_rows,
        }
        .into());
    }
    Ok(())
}

// One transaction covering the snapshot batch and every dirty tracker row.
// Does not clear dirty sets; the caller does that after a successful commit
// so a retry reuses the identical batch.
pub fn flush(
    conn: &mut Connection,
    trackers: &TrackerSet,
    snapshots: &[FeatureSnapshot],
) -> Result<()> {
    let tx = conn.transaction().context("begin flush transaction")?;

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_match_features (
                    match_id, player_id, opponent_id, match_date, surface,
                    elo, recent_5, recent_10, surface_wr, h2h_wins, rank,
                    days_since_last_match, age, matches_last_30d,
                    ace_pct, df_pct, first_serve_pct, first_serve_won_pct,
                    second_serve_won_pct, bp_save_pct, level_win_rate
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9, ?10, ?11,
                    ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18,
                    ?19, ?20, ?21
                )
                ON CONFLICT(match_id, player_id) DO NOTHING
                "#,
            )
            .context("prepare snapshot insert")?;
        for snap in snapshots {
            let f = &snap.features;
            stmt.execute(params![
                snap.match_id,
                snap.player_id,
                snap.opponent_id,
                snap.match_date.format(DATE_FMT).to_string(),
                snap.surface.as_str(),
                f.elo,
                f.recent_5,
                f.recent_10,
                f.surface_wr,
                f.h2h_wins,
                f.rank,
                f.days_since_last_match,
                f.age,
                f.matches_last_30d,
                f.serve.ace_pct,
                f.serve.df_pct,
                f.serve.first_serve_pct,
                f.serve.first_serve_won_pct,
                f.serve.second_serve_won_pct,
                f.serve.bp_save_pct,
                f.level_win_rate,
            ])
            .context("insert snapshot row")?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_surface_state (player_id, surface, elo, matches_cnt, wins_cnt)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(player_id, surface) DO UPDATE SET
                    elo = excluded.elo,
                    matches_cnt = excluded.matches_cnt,
                    wins_cnt = excluded.wins_cnt
                "#,
            )
            .context("prepare surface state upsert")?;
        for (player, surface, state) in trackers.elo.dirty_rows() {
            stmt.execute(params![
                player,
                surface.as_str(),
                state.elo,
                state.matches,
                state.wins
            ])
            .context("upsert surface state")?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_form_state (player_id, last_results)
                VALUES (?1, ?2)
                ON CONFLICT(player_id) DO UPDATE SET
                    last_results = excluded.last_results
                "#,
            )
            .context("prepare form state upsert")?;
        for (player, results) in trackers.form.dirty_rows() {
            let raw = serde_json::to_string(&results).context("encode form buffer")?;
            stmt.execute(params![player, raw])
                .context("upsert form state")?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO h2h_state (player_id, opponent_id, wins)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(player_id, opponent_id) DO UPDATE SET
                    wins = excluded.wins
                "#,
            )
            .context("prepare h2h state upsert")?;
        for (player, opponent, wins) in trackers.h2h.dirty_rows() {
            stmt.execute(params![player, opponent, wins])
                .context("upsert h2h state")?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_activity_state (player_id, last_match_date, recent_dates)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(player_id) DO UPDATE SET
                    last_match_date = excluded.last_match_date,
                    recent_dates = excluded.recent_dates
                "#,
            )
            .context("prepare activity state upsert")?;
        for (player, state) in trackers.activity.dirty_rows() {
            let last = state.last_match.map(|d| d.format(DATE_FMT).to_string());
            let recent: Vec<String> = state
                .recent
                .iter()
                .map(|d| d.format(DATE_FMT).to_string())
                .collect();
            let raw = serde_json::to_string(&recent).context("encode recent dates")?;
            stmt.execute(params![player, last, raw])
                .context("upsert activity state")?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_serve_state (
                    player_id, ace_total, df_total, svpt_total, first_in_total,
                    first_won_total, second_won_total, bp_faced_total, bp_saved_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(player_id) DO UPDATE SET
                    ace_total = excluded.ace_total,
                    df_total = excluded.df_total,
                    svpt_total = excluded.svpt_total,
                    first_in_total = excluded.first_in_total,
                    first_won_total = excluded.first_won_total,
                    second_won_total = excluded.second_won_total,
                    bp_faced_total = excluded.bp_faced_total,
                    bp_saved_total = excluded.bp_saved_total
                "#,
            )
            .context("prepare serve state upsert")?;
        for (player, totals) in trackers.serve.dirty_rows() {
            stmt.execute(params![
                player,
                totals.ace,
                totals.df,
                totals.svpt,
                totals.first_in,
                totals.first_won,
                totals.second_won,
                totals.bp_faced,
                totals.bp_saved
            ])
            .context("upsert serve state")?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO player_level_state (player_id, level, matches_cnt, wins_cnt)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(player_id, level) DO UPDATE SET
                    matches_cnt = excluded.matches_cnt,
                    wins_cnt = excluded.wins_cnt
                "#,
            )
            .context("prepare level state upsert")?;
        for (player, level, state) in trackers.level.dirty_rows() {
            stmt.execute(params![player, level, state.matches, state.wins])
                .context("upsert level state")?;
        }
    }

    tx.commit().context("commit flush transaction")?;
    Ok(())
}

pub fn wipe_state(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM player_surface_state;
        DELETE FROM player_form_state;
        DELETE FROM h2h_state;
        DELETE FROM player_activity_state;
        DELETE FROM player_serve_state;
        DELETE FROM player_level_state;
        DELETE FROM player_match_features;
        "#,
    )
    .context("wipe derived feature tables")?;
    Ok(())
}

const SNAPSHOT_COLUMNS: &str = r#"
    match_id, player_id, opponent_id, match_date, surface,
    elo, recent_5, recent_10, surface_wr, h2h_wins, rank,
    days_since_last_match, age, matches_last_30d,
    ace_pct, df_pct, first_serve_pct, first_serve_won_pct,
    second_serve_won_pct, bp_save_pct, level_win_rate
"#;

struct RawSnapshotRow {
    match_id: i64,
    player_id: i64,
    opponent_id: i64,
    match_date: String,
    surface: String,
    features: PlayerFeatures,
}

fn decode_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSnapshotRow> {
    Ok(RawSnapshotRow {
        match_id: row.get(0)?,
        player_id: row.get(1)?,
        opponent_id: row.get(2)?,
        match_date: row.get(3)?,
        surface: row.get(4)?,
        features: PlayerFeatures {
            elo: row.get(5)?,
            recent_5: row.get(6)?,
            recent_10: row.get(7)?,
            surface_wr: row.get(8)?,
            h2h_wins: row.get(9)?,
            rank: row.get(10)?,
            days_since_last_match: row.get(11)?,
            age: row.get(12)?,
            matches_last_30d: row.get(13)?,
            serve: ServeRatios {
                ace_pct: row.get(14)?,
                df_pct: row.get(15)?,
                first_serve_pct: row.get(16)?,
                first_serve_won_pct: row.get(17)?,
                second_serve_won_pct: row.get(18)?,
                bp_save_pct: row.get(19)?,
            },
            level_win_rate: row.get(20)?,
        },
    })
}

impl RawSnapshotRow {
    fn into_snapshot(self) -> Result<FeatureSnapshot> {
        let match_date = NaiveDate::parse_from_str(&self.match_date, DATE_FMT).with_context(|| {
            format!(
                "bad match_date {:?} in snapshot ({}, {})",
                self.match_date, self.match_id, self.player_id
            )
        })?;
        let surface = self.surface.as_str();
        let surface = Surface::parse(surface).with_context(|| {
            format!(
                "unknown surface {surface:?} in snapshot ({}, {})",
                self.match_id, self.player_id
            )
        })?;
        Ok(FeatureSnapshot {
            match_id: self.match_id,
            player_id: self.player_id,
            opponent_id: self.opponent_id,
            match_date,
            surface,
            features: self.features,
        })
    }
}

pub fn read_snapshot(
    conn: &Connection,
    match_id: i64,
    player_id: i64,
) -> Result<Option<FeatureSnapshot>> {
    let sql = format!(
        r#"
        SELECT {SNAPSHOT_COLUMNS}
        FROM player_match_features
        WHERE match_id = ?1 AND player_id = ?2
        "#
    );
    let row = conn
        .query_row(&sql, params![match_id, player_id], decode_snapshot_row)
        .optional()
        .context("read snapshot row")?;
    match row {
        Some(raw) => Ok(Some(raw.into_snapshot()?)),
        None => Ok(None),
    }
}

pub fn load_snapshots(conn: &Connection) -> Result<Vec<FeatureSnapshot>> {
    let sql = format!(
        r#"
        SELECT {SNAPSHOT_COLUMNS}
        FROM player_match_features
        ORDER BY match_date ASC, match_id ASC, player_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare snapshot load")?;
    let rows = stmt
        .query_map([], decode_snapshot_row)
        .context("query snapshots")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode snapshot row")?.into_snapshot()?);
    }
    Ok(out)
}
