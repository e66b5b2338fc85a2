use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::match_store::{CursorKey, MatchCursor};
use crate::snapshot::FeatureSnapshot;
use crate::state_store;
use crate::trackers::TrackerSet;

pub const SNAPSHOT_BATCH: usize = 2000;
pub const STATE_BATCH: usize = 5000;
pub const MATCH_CHUNK: usize = 500;
pub const FLUSH_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Streaming,
    Flushing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub snapshot_batch: usize,
    pub state_batch: usize,
    pub match_chunk: usize,
    pub flush_retries: u32,
    pub default_level: String,
    pub rebuild: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            snapshot_batch: SNAPSHOT_BATCH,
            state_batch: STATE_BATCH,
            match_chunk: MATCH_CHUNK,
            flush_retries: FLUSH_RETRIES,
            default_level: crate::level_exp::DEFAULT_LEVEL.to_string(),
            rebuild: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub snapshots_written: usize,
    pub skipped: usize,
    pub flushes: usize,
    pub resumed_from: Option<CursorKey>,
    pub final_cursor: Option<CursorKey>,
}

pub struct FeaturePipeline {
    conn: Connection,
    cfg: PipelineConfig,
    trackers: TrackerSet,
    pending: Vec<FeatureSnapshot>,
    resumed_from: Option<CursorKey>,
    phase: Phase,
}

impl FeaturePipeline {
    // Restores tracker state and the resume cursor from the store. A rebuild
    // wipes every derived table first, so the replay starts from scratch.
    pub fn open(conn: Connection, cfg: PipelineConfig) -> Result<Self> {
        state_store::init_schema(&conn)?;
        if cfg.rebuild {
            state_store::wipe_state(&conn)?;
        }
        state_store::consistency_check(&conn)?;
        let trackers = state_store::load_tracker_states(&conn)?;
        let resumed_from = state_store::resume_cursor(&conn)?;
        Ok(Self {
            conn,
            cfg,
            trackers,
            pending: Vec::new(),
            resumed_from,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn close(self) -> Connection {
        self.conn
    }

    // Replays every stored match after the cursor in (date, id) order,
    // snapshotting both participants before the outcome touches any tracker.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.phase = Phase::Loading;
        let mut cursor = MatchCursor::after(self.resumed_from, self.cfg.match_chunk);
        let mut summary = RunSummary {
            resumed_from: self.resumed_from,
            final_cursor: self.resumed_from,
            ..RunSummary::default()
        };

        self.phase = Phase::Streaming;
        loop {
            let chunk = match cursor.next_chunk(&self.conn) {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.phase = Phase::Failed;
                    return Err(err).context("stream match chunk");
                }
            };
            if chunk.is_empty() {
                break;
            }
            for m in &chunk {
                let pair = FeatureSnapshot::pair(m, &self.trackers, &self.cfg.default_level);
                self.pending.extend(pair);
                self.trackers.apply_result(m, &self.cfg.default_level);
                summary.processed += 1;
                summary.final_cursor = Some(m.cursor_key());

                if self.pending.len() >= self.cfg.snapshot_batch
                    || self.trackers.dirty_len() >= self.cfg.state_batch
                {
                    self.flush_with_retry(&mut summary)?;
                }
            }
        }

        if !self.pending.is_empty() || self.trackers.dirty_len() > 0 {
            self.flush_with_retry(&mut summary)?;
        }
        summary.skipped = cursor.skipped();
        // A later run on this pipeline continues after what this one
        // processed instead of replaying it into the live trackers.
        self.resumed_from = summary.final_cursor;
        self.phase = Phase::Completed;
        Ok(summary)
    }

    // Retries the whole batch; a failed transaction leaves the store
    // untouched, so the same snapshots and dirty rows go out again.
    fn flush_with_retry(&mut self, summary: &mut RunSummary) -> Result<()> {
        self.phase = Phase::Flushing;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match state_store::flush(&mut self.conn, &self.trackers, &self.pending) {
                Ok(()) => break,
                Err(_) if attempt < self.cfg.flush_retries => continue,
                Err(err) => {
                    self.phase = Phase::Failed;
                    return Err(err).context("flush feature batch");
                }
            }
        }
        summary.flushes += 1;
        summary.snapshots_written += self.pending.len();
        self.pending.clear();
        self.trackers.clear_dirty();
        self.phase = Phase::Streaming;
        Ok(())
    }
}
