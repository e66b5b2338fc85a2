use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};

pub const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Surface {
    Hard,
    Clay,
    Grass,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Hard, Surface::Clay, Surface::Grass];

    pub fn parse(raw: &str) -> Option<Surface> {
        match raw {
            "Hard" => Some(Surface::Hard),
            "Clay" => Some(Surface::Clay),
            "Grass" => Some(Surface::Grass),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Hard => "Hard",
            Surface::Clay => "Clay",
            Surface::Grass => "Grass",
        }
    }
}

// Orders by date first, id as tiebreak, matching the stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CursorKey {
    pub date: NaiveDate,
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeLine {
    pub ace: Option<i64>,
    pub df: Option<i64>,
    pub svpt: Option<i64>,
    pub first_in: Option<i64>,
    pub first_won: Option<i64>,
    pub second_won: Option<i64>,
    pub bp_saved: Option<i64>,
    pub bp_faced: Option<i64>,
}

impl ServeLine {
    pub fn has_data(&self) -> bool {
        matches!(self.svpt, Some(v) if v > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMatch {
    pub id: i64,
    pub match_date: NaiveDate,
    pub surface: Surface,
    pub tournament_name: Option<String>,
    pub tournament_level: Option<String>,
    pub round: Option<String>,
    pub best_of: Option<i64>,
    pub minutes: Option<i64>,
    pub winner_id: i64,
    pub loser_id: i64,
    pub winner_rank: Option<i64>,
    pub loser_rank: Option<i64>,
    pub winner_age: Option<f64>,
    pub loser_age: Option<f64>,
    pub score: Option<String>,
    pub winner_serve: ServeLine,
    pub loser_serve: ServeLine,
}

impl StoredMatch {
    pub fn cursor_key(&self) -> CursorKey {
        CursorKey {
            date: self.match_date,
            id: self.id,
        }
    }
}

pub fn default_db_path() -> PathBuf {
    std::env::var("FEATURE_DB_PATH")
        .ok()
        .and_then(|val| {
            let trimmed = val.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        })
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/atp_features.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            match_date TEXT NOT NULL,
            surface TEXT NOT NULL,
            tournament_name TEXT NULL,
            tournament_level TEXT NULL,
            round TEXT NULL,
            best_of INTEGER NULL,
            minutes INTEGER NULL,
            winner_id INTEGER NOT NULL,
            loser_id INTEGER NOT NULL,
            winner_rank INTEGER NULL,
            loser_rank INTEGER NULL,
            winner_age REAL NULL,
            loser_age REAL NULL,
            score TEXT NULL,
            w_ace INTEGER NULL,
            w_df INTEGER NULL,
            w_svpt INTEGER NULL,
            w_first_in INTEGER NULL,
            w_first_won INTEGER NULL,
            w_second_won INTEGER NULL,
            w_bp_saved INTEGER NULL,
            w_bp_faced INTEGER NULL,
            l_ace INTEGER NULL,
            l_df INTEGER NULL,
            l_svpt INTEGER NULL,
            l_first_in INTEGER NULL,
            l_first_won INTEGER NULL,
            l_second_won INTEGER NULL,
            l_bp_saved INTEGER NULL,
            l_bp_faced INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_date_id ON matches(match_date, id);
        CREATE INDEX IF NOT EXISTS idx_matches_surface ON matches(surface);
        "#,
    )
    .context("create matches schema")?;
    Ok(())
}

const MATCH_COLUMNS: &str = r#"
    id, match_date, surface, tournament_name, tournament_level, round,
    best_of, minutes, winner_id, loser_id, winner_rank, loser_rank,
    winner_age, loser_age, score,
    w_ace, w_df, w_svpt, w_first_in, w_first_won, w_second_won, w_bp_saved, w_bp_faced,
    l_ace, l_df, l_svpt, l_first_in, l_first_won, l_second_won, l_bp_saved, l_bp_faced
"#;

#[derive(Debug)]
struct RawMatchRow {
    id: i64,
    match_date: String,
    surface: String,
    tournament_name: Option<String>,
    tournament_level: Option<String>,
    round: Option<String>,
    best_of: Option<i64>,
    minutes: Option<i64>,
    winner_id: i64,
    loser_id: i64,
    winner_rank: Option<i64>,
    loser_rank: Option<i64>,
    winner_age: Option<f64>,
    loser_age: Option<f64>,
    score: Option<String>,
    winner_serve: ServeLine,
    loser_serve: ServeLine,
}

fn decode_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMatchRow> {
    Ok(RawMatchRow {
        id: row.get(0)?,
        match_date: row.get(1)?,
        surface: row.get(2)?,
        tournament_name: row.get(3)?,
        tournament_level: row.get(4)?,
        round: row.get(5)?,
        best_of: row.get(6)?,
        minutes: row.get(7)?,
        winner_id: row.get(8)?,
        loser_id: row.get(9)?,
        winner_rank: row.get(10)?,
        loser_rank: row.get(11)?,
        winner_age: row.get(12)?,
        loser_age: row.get(13)?,
        score: row.get(14)?,
        winner_serve: ServeLine {
            ace: row.get(15)?,
            df: row.get(16)?,
            svpt: row.get(17)?,
            first_in: row.get(18)?,
            first_won: row.get(19)?,
            second_won: row.get(20)?,
            bp_saved: row.get(21)?,
            bp_faced: row.get(22)?,
        },
        loser_serve: ServeLine {
            ace: row.get(23)?,
            df: row.get(24)?,
            svpt: row.get(25)?,
            first_in: row.get(26)?,
            first_won: row.get(27)?,
            second_won: row.get(28)?,
            bp_saved: row.get(29)?,
            bp_faced: row.get(30)?,
        },
    })
}

impl RawMatchRow {
    // Date or surface text outside the supported set makes the row unusable.
    fn into_match(self) -> Option<StoredMatch> {
        let match_date = NaiveDate::parse_from_str(&self.match_date, DATE_FMT).ok()?;
        let surface = Surface::parse(&self.surface)?;
        Some(StoredMatch {
            id: self.id,
            match_date,
            surface,
            tournament_name: self.tournament_name,
            tournament_level: self.tournament_level,
            round: self.round,
            best_of: self.best_of,
            minutes: self.minutes,
            winner_id: self.winner_id,
            loser_id: self.loser_id,
            winner_rank: self.winner_rank,
            loser_rank: self.loser_rank,
            winner_age: self.winner_age,
            loser_age: self.loser_age,
            score: self.score,
            winner_serve: self.winner_serve,
            loser_serve: self.loser_serve,
        })
    }
}

// Streams matches in strict (match_date, id) ascending order, one bounded
// chunk per call, restartable from any cursor. The position is kept as the
// raw date text so the SQL comparison always advances, even past rows whose
// date fails to decode.
#[derive(Debug)]
pub struct MatchCursor {
    after: Option<(String, i64)>,
    chunk: usize,
    skipped: usize,
}

impl MatchCursor {
    pub fn after(cursor: Option<CursorKey>, chunk: usize) -> MatchCursor {
        MatchCursor {
            after: cursor.map(|c| (c.date.format(DATE_FMT).to_string(), c.id)),
            chunk: chunk.max(1),
            skipped: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    // Empty result means the history is exhausted. A chunk whose rows all
    // fail to decode advances the cursor and keeps pulling.
    pub fn next_chunk(&mut self, conn: &Connection) -> Result<Vec<StoredMatch>> {
        loop {
            let raw_rows = self.fetch_raw(conn)?;
            if raw_rows.is_empty() {
                return Ok(Vec::new());
            }

            let mut out = Vec::with_capacity(raw_rows.len());
            for raw in raw_rows {
                self.after = Some((raw.match_date.clone(), raw.id));
                match raw.into_match() {
                    Some(m) => out.push(m),
                    None => self.skipped += 1,
                }
            }

            if !out.is_empty() {
                return Ok(out);
            }
        }
    }

    fn fetch_raw(&self, conn: &Connection) -> Result<Vec<RawMatchRow>> {
        let sql_after = format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM matches
            WHERE surface IN ('Hard', 'Clay', 'Grass')
              AND (match_date > ?1 OR (match_date = ?1 AND id > ?2))
            ORDER BY match_date ASC, id ASC
            LIMIT ?3
            "#
        );
        let sql_start = format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM matches
            WHERE surface IN ('Hard', 'Clay', 'Grass')
            ORDER BY match_date ASC, id ASC
            LIMIT ?1
            "#
        );

        let mut out = Vec::new();
        match &self.after {
            Some((date, id)) => {
                let mut stmt = conn
                    .prepare(&sql_after)
                    .context("prepare match stream query")?;
                let rows = stmt
                    .query_map(params![date, id, self.chunk as i64], decode_raw_row)
                    .context("query match stream")?;
                for row in rows {
                    out.push(row.context("decode match row")?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(&sql_start)
                    .context("prepare match stream query")?;
                let rows = stmt
                    .query_map(params![self.chunk as i64], decode_raw_row)
                    .context("query match stream")?;
                for row in rows {
                    out.push(row.context("decode match row")?);
                }
            }
        }
        Ok(out)
    }
}

pub fn insert_matches(conn: &mut Connection, rows: &[StoredMatch]) -> Result<usize> {
    let tx = conn.transaction().context("begin match insert")?;
    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO matches (
                    id, match_date, surface, tournament_name, tournament_level, round,
                    best_of, minutes, winner_id, loser_id, winner_rank, loser_rank,
                    winner_age, loser_age, score,
                    w_ace, w_df, w_svpt, w_first_in, w_first_won, w_second_won, w_bp_saved, w_bp_faced,
                    l_ace, l_df, l_svpt, l_first_in, l_first_won, l_second_won, l_bp_saved, l_bp_faced
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23,
                    ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31
                )
                ON CONFLICT(id) DO UPDATE SET
                    match_date = excluded.match_date,
                    surface = excluded.surface,
                    tournament_name = excluded.tournament_name,
                    tournament_level = excluded.tournament_level,
                    round = excluded.round,
                    best_of = excluded.best_of,
                    minutes = excluded.minutes,
                    winner_id = excluded.winner_id,
                    loser_id = excluded.loser_id,
                    winner_rank = excluded.winner_rank,
                    loser_rank = excluded.loser_rank,
                    winner_age = excluded.winner_age,
                    loser_age = excluded.loser_age,
                    score = excluded.score,
                    w_ace = excluded.w_ace,
                    w_df = excluded.w_df,
                    w_svpt = excluded.w_svpt,
                    w_first_in = excluded.w_first_in,
                    w_first_won = excluded.w_first_won,
                    w_second_won = excluded.w_second_won,
                    w_bp_saved = excluded.w_bp_saved,
                    w_bp_faced = excluded.w_bp_faced,
                    l_ace = excluded.l_ace,
                    l_df = excluded.l_df,
                    l_svpt = excluded.l_svpt,
                    l_first_in = excluded.l_first_in,
                    l_first_won = excluded.l_first_won,
                    l_second_won = excluded.l_second_won,
                    l_bp_saved = excluded.l_bp_saved,
                    l_bp_faced = excluded.l_bp_faced
                "#,
            )
            .context("prepare match upsert")?;
        for m in rows {
            stmt.execute(params![
                m.id,
                m.match_date.format(DATE_FMT).to_string(),
                m.surface.as_str(),
                m.tournament_name,
                m.tournament_level,
                m.round,
                m.best_of,
                m.minutes,
                m.winner_id,
                m.loser_id,
                m.winner_rank,
                m.loser_rank,
                m.winner_age,
                m.loser_age,
                m.score,
                m.winner_serve.ace,
                m.winner_serve.df,
                m.winner_serve.svpt,
                m.winner_serve.first_in,
                m.winner_serve.first_won,
                m.winner_serve.second_won,
                m.winner_serve.bp_saved,
                m.winner_serve.bp_faced,
                m.loser_serve.ace,
                m.loser_serve.df,
                m.loser_serve.svpt,
                m.loser_serve.first_in,
                m.loser_serve.first_won,
                m.loser_serve.second_won,
                m.loser_serve.bp_saved,
                m.loser_serve.bp_faced,
            ])
            .context("upsert match")?;
        }
    }
    tx.commit().context("commit match insert")?;
    Ok(rows.len())
}
