use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use parquet::data_type::{ByteArray, ByteArrayType, DataType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::{SerializedFileWriter, SerializedRowGroupWriter};
use parquet::schema::parser::parse_message_type;
use rusqlite::Connection;
use serde::Serialize;

use crate::match_store::DATE_FMT;
use crate::trackers::PlayerFeatures;

pub const DEFAULT_RANK: i64 = 500;
pub const DEFAULT_DAYS_REST: i64 = 7;
pub const DEFAULT_AGE: f64 = 25.0;

// Differential feature vector the live layer hands to a model. Missing rank,
// rest and age fall back to fixed constants here, never in the stored rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureDiff {
    pub elo_diff: f64,
    pub ranking_diff: f64,
    pub recent_5_diff: f64,
    pub recent_10_diff: f64,
    pub surface_diff: f64,
    pub h2h_diff: f64,
    pub fatigue_diff: f64,
    pub age_diff: f64,
    pub workload_diff: f64,
    pub ace_diff: f64,
    pub df_diff: f64,
    pub first_serve_diff: f64,
    pub first_won_diff: f64,
    pub bp_save_diff: f64,
    pub level_exp_diff: f64,
}

impl FeatureDiff {
    pub fn between(a: &PlayerFeatures, b: &PlayerFeatures) -> FeatureDiff {
        let rank_a = a.rank.unwrap_or(DEFAULT_RANK);
        let rank_b = b.rank.unwrap_or(DEFAULT_RANK);
        let rest_a = a
            .days_since_last_match
            .map(|d| d.max(0))
            .unwrap_or(DEFAULT_DAYS_REST);
        let rest_b = b
            .days_since_last_match
            .map(|d| d.max(0))
            .unwrap_or(DEFAULT_DAYS_REST);
        let age_a = a.age.unwrap_or(DEFAULT_AGE);
        let age_b = b.age.unwrap_or(DEFAULT_AGE);
        FeatureDiff {
            elo_diff: a.elo - b.elo,
            ranking_diff: (rank_a - rank_b) as f64,
            recent_5_diff: a.recent_5 - b.recent_5,
            recent_10_diff: a.recent_10 - b.recent_10,
            surface_diff: a.surface_wr - b.surface_wr,
            h2h_diff: (a.h2h_wins - b.h2h_wins) as f64,
            // Opponent minus player, unlike every other diff.
            fatigue_diff: (rest_b - rest_a) as f64,
            age_diff: age_a - age_b,
            workload_diff: (a.matches_last_30d - b.matches_last_30d) as f64,
            ace_diff: a.serve.ace_pct - b.serve.ace_pct,
            df_diff: a.serve.df_pct - b.serve.df_pct,
            first_serve_diff: a.serve.first_serve_pct - b.serve.first_serve_pct,
            first_won_diff: a.serve.first_serve_won_pct - b.serve.first_serve_won_pct,
            bp_save_diff: a.serve.bp_save_pct - b.serve.bp_save_pct,
            level_exp_diff: a.level_win_rate - b.level_win_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetRow {
    pub match_id: i64,
    pub match_date: NaiveDate,
    pub elo_diff: f64,
    pub recent_5_diff: f64,
    pub recent_10_diff: f64,
    pub surface_diff: f64,
    pub h2h_diff: f64,
    pub ranking_diff: f64,
    pub target: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetSummary {
    pub matches: usize,
    pub rows: usize,
}

// Winner-perspective rows, one per match with both pre-match ranks on file.
pub fn load_dataset_rows(conn: &Connection) -> Result<Vec<DatasetRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT m.id, m.match_date,
                   w.elo - l.elo,
                   w.recent_5 - l.recent_5,
                   w.recent_10 - l.recent_10,
                   w.surface_wr - l.surface_wr,
                   CAST(w.h2h_wins - l.h2h_wins AS REAL),
                   CAST(w.rank - l.rank AS REAL)
            FROM matches m
            JOIN player_match_features w ON w.match_id = m.id AND w.player_id = m.winner_id
            JOIN player_match_features l ON l.match_id = m.id AND l.player_id = m.loser_id
            WHERE w.rank IS NOT NULL AND l.rank IS NOT NULL
              AND m.surface IN ('Hard', 'Clay', 'Grass')
            ORDER BY m.match_date ASC, m.id ASC
            "#,
        )
        .context("prepare dataset join")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, f64>(7)?,
            ))
        })
        .context("query dataset join")?;

    let mut out = Vec::new();
    for row in rows {
        let (id, date, elo, r5, r10, surf, h2h, rank) = row.context("decode dataset row")?;
        let match_date = NaiveDate::parse_from_str(&date, DATE_FMT)
            .with_context(|| format!("bad match_date {date:?} for match {id}"))?;
        out.push(DatasetRow {
            match_id: id,
            match_date,
            elo_diff: elo,
            recent_5_diff: r5,
            recent_10_diff: r10,
            surface_diff: surf,
            h2h_diff: h2h,
            ranking_diff: rank,
            target: 1,
        });
    }
    Ok(out)
}

// The loser-perspective block: every diff negated, target 0, appended after
// the winner block as one balanced set.
pub fn symmetric_rows(rows: &[DatasetRow]) -> Vec<DatasetRow> {
    let mut out = Vec::with_capacity(rows.len() * 2);
    out.extend_from_slice(rows);
    for r in rows {
        out.push(DatasetRow {
            match_id: r.match_id,
            match_date: r.match_date,
            elo_diff: -r.elo_diff,
            recent_5_diff: -r.recent_5_diff,
            recent_10_diff: -r.recent_10_diff,
            surface_diff: -r.surface_diff,
            h2h_diff: -r.h2h_diff,
            ranking_diff: -r.ranking_diff,
            target: 0,
        });
    }
    out
}

const DATASET_SCHEMA: &str = r#"
    message dataset {
        REQUIRED DOUBLE elo_diff;
        REQUIRED DOUBLE recent_5_diff;
        REQUIRED DOUBLE recent_10_diff;
        REQUIRED DOUBLE surface_diff;
        REQUIRED DOUBLE h2h_diff;
        REQUIRED DOUBLE ranking_diff;
        REQUIRED INT64 target;
        REQUIRED BYTE_ARRAY match_date (UTF8);
    }
"#;

fn write_column<T: DataType>(
    rg: &mut SerializedRowGroupWriter<'_, File>,
    values: &[T::T],
) -> Result<()> {
    let mut col = rg
        .next_column()
        .context("open parquet column")?
        .ok_or_else(|| anyhow!("parquet schema has fewer columns than written"))?;
    col.typed::<T>()
        .write_batch(values, None, None)
        .context("write parquet column")?;
    col.close().context("close parquet column")?;
    Ok(())
}

// Single row group; the export is small enough that one batch per column
// keeps the file layout trivial to read back.
pub fn write_parquet(path: &Path, rows: &[DatasetRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let schema = Arc::new(parse_message_type(DATASET_SCHEMA).context("parse dataset schema")?);
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path)
        .with_context(|| format!("create parquet file {}", path.display()))?;
    let mut writer =
        SerializedFileWriter::new(file, schema, props).context("open parquet writer")?;

    let elo: Vec<f64> = rows.iter().map(|r| r.elo_diff).collect();
    let r5: Vec<f64> = rows.iter().map(|r| r.recent_5_diff).collect();
    let r10: Vec<f64> = rows.iter().map(|r| r.recent_10_diff).collect();
    let surf: Vec<f64> = rows.iter().map(|r| r.surface_diff).collect();
    let h2h: Vec<f64> = rows.iter().map(|r| r.h2h_diff).collect();
    let rank: Vec<f64> = rows.iter().map(|r| r.ranking_diff).collect();
    let target: Vec<i64> = rows.iter().map(|r| r.target).collect();
    let dates: Vec<ByteArray> = rows
        .iter()
        .map(|r| ByteArray::from(r.match_date.format(DATE_FMT).to_string().as_str()))
        .collect();

    let mut rg = writer.next_row_group().context("open parquet row group")?;
    write_column::<DoubleType>(&mut rg, &elo)?;
    write_column::<DoubleType>(&mut rg, &r5)?;
    write_column::<DoubleType>(&mut rg, &r10)?;
    write_column::<DoubleType>(&mut rg, &surf)?;
    write_column::<DoubleType>(&mut rg, &h2h)?;
    write_column::<DoubleType>(&mut rg, &rank)?;
    write_column::<Int64Type>(&mut rg, &target)?;
    write_column::<ByteArrayType>(&mut rg, &dates)?;
    rg.close().context("close parquet row group")?;
    writer.close().context("close parquet file")?;
    Ok(())
}

pub fn export_dataset(conn: &Connection, out: &Path) -> Result<DatasetSummary> {
    let winner_rows = load_dataset_rows(conn)?;
    let rows = symmetric_rows(&winner_rows);
    write_parquet(out, &rows)?;
    Ok(DatasetSummary {
        matches: winner_rows.len(),
        rows: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_AGE, DEFAULT_DAYS_REST, DEFAULT_RANK, FeatureDiff};
    use crate::serve_stats::ServeRatios;
    use crate::trackers::PlayerFeatures;

    fn features(rank: Option<i64>, rest: Option<i64>, age: Option<f64>) -> PlayerFeatures {
        PlayerFeatures {
            elo: 1500.0,
            recent_5: 0.0,
            recent_10: 0.0,
            surface_wr: 0.0,
            h2h_wins: 0,
            rank,
            days_since_last_match: rest,
            age,
            matches_last_30d: 0,
            serve: ServeRatios::default(),
            level_win_rate: 0.0,
        }
    }

    #[test]
    fn between_fills_missing_rank_rest_and_age() {
        let a = features(Some(10), Some(2), Some(24.0));
        let b = features(None, None, None);

        let diff = FeatureDiff::between(&a, &b);
        assert!((diff.ranking_diff - (10 - DEFAULT_RANK) as f64).abs() < 1e-9);
        assert!((diff.age_diff - (24.0 - DEFAULT_AGE)).abs() < 1e-9);
        // Rest runs opponent minus player, unlike every other column.
        assert!((diff.fatigue_diff - (DEFAULT_DAYS_REST - 2) as f64).abs() < 1e-9);
    }

    #[test]
    fn between_clamps_negative_rest() {
        let a = features(None, Some(-3), None);
        let b = features(None, Some(4), None);

        let diff = FeatureDiff::between(&a, &b);
        assert!((diff.fatigue_diff - 4.0).abs() < 1e-9);
    }
}
