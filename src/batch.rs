//! Resumable batch processing over the professor list.
//!
//! In batch mode a persisted cursor marks where the next slice starts. In full
//! mode every professor is regenerated, but a good summary is never replaced by
//! the fallback sentinel. Results and cursor are written once, after the whole
//! selection has been processed.

use crate::config::RunMode;
use crate::record::ProfessorRecord;
use crate::storage::{CursorState, StateStore, StoreError};
use crate::summary::{is_good_summary, Summarizer};
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to persist results: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: RunMode,
    pub batch_size: usize,
    /// Pause between consecutive summary requests within a run
    pub request_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Batch,
            batch_size: 50,
            request_delay: Duration::from_secs(4),
        }
    }
}

/// What a run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub range: Range<usize>,
    pub total: usize,
    /// Records handed to the summarizer
    pub requested: usize,
    /// Records left alone because a good summary already existed
    pub skipped: usize,
    pub generated: usize,
    pub fallbacks: usize,
    /// Fallbacks discarded in favour of an earlier good summary
    pub retained: usize,
    pub next_cursor: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Pick the slice to process and the cursor to persist afterwards
pub fn select_range(
    mode: RunMode,
    cursor: usize,
    batch_size: usize,
    len: usize,
) -> (Range<usize>, usize) {
    match mode {
        RunMode::Full => (0..len, 0),
        RunMode::Batch => {
            // A list that shrank below the cursor starts over.
            let start = if cursor >= len { 0 } else { cursor };
            let end = start.saturating_add(batch_size).min(len);
            let next = if end >= len { 0 } else { end };
            (start..end, next)
        }
    }
}

pub struct BatchController<S, P> {
    summarizer: S,
    store: P,
    options: BatchOptions,
}

impl<S: Summarizer, P: StateStore> BatchController<S, P> {
    pub fn new(summarizer: S, store: P, options: BatchOptions) -> Self {
        Self {
            summarizer,
            store,
            options,
        }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Process one selection of `records` and persist the outcome
    pub async fn run(&self, records: &[ProfessorRecord]) -> Result<RunReport, BatchError> {
        let started_at = Utc::now();
        let mode = self.options.mode;
        let mut results = self.store.load_results();
        let cursor = self.store.load_cursor();

        let (range, next_cursor) =
            select_range(mode, cursor.last_index, self.options.batch_size, records.len());
        info!(
            "{} run over records {}..{} of {} (cursor was {})",
            mode,
            range.start,
            range.end,
            records.len(),
            cursor.last_index
        );

        let mut report = RunReport {
            mode,
            range: range.clone(),
            total: records.len(),
            requested: 0,
            skipped: 0,
            generated: 0,
            fallbacks: 0,
            retained: 0,
            next_cursor,
            started_at,
            finished_at: started_at,
        };

        for (offset, record) in records[range.clone()].iter().enumerate() {
            let position = range.start + offset;

            if mode == RunMode::Batch && results.good_summary(&record.name).is_some() {
                debug!("[{}] {} already summarised, skipping", position, record.name);
                report.skipped += 1;
                continue;
            }

            if report.requested > 0 && !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
            report.requested += 1;

            info!("[{}/{}] summarising {}", position + 1, records.len(), record.name);
            let summary = self.summarizer.summarize(record).await;

            if is_good_summary(&summary) {
                report.generated += 1;
                results.insert(record.name.clone(), summary);
            } else if results.good_summary(&record.name).is_some() {
                debug!("keeping previous summary for {}", record.name);
                report.retained += 1;
            } else {
                report.fallbacks += 1;
                results.insert(record.name.clone(), summary);
            }
        }

        self.store.save_results(&results)?;
        self.store.save_cursor(&CursorState {
            last_index: next_cursor,
        })?;

        report.finished_at = Utc::now();
        info!(
            "run finished: {} generated, {} fallbacks, {} skipped, next cursor {}",
            report.generated, report.fallbacks, report.skipped, report.next_cursor
        );
        Ok(report)
    }
}
