use std::path::PathBuf;

use anyhow::Result;

use atp_features::dataset;
use atp_features::match_store;
use atp_features::state_store;

fn main() -> Result<()> {
    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(match_store::default_db_path);
    let out_path = arg_value("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/atp_dataset.parquet"));

    let conn = match_store::open_db(&db_path)?;
    state_store::init_schema(&conn)?;
    let summary = dataset::export_dataset(&conn, &out_path)?;

    println!("Dataset export complete");
    println!("DB: {}", db_path.display());
    println!("Out: {}", out_path.display());
    println!("Matches joined: {}", summary.matches);
    println!("Rows written: {}", summary.rows);

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
