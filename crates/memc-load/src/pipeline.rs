//! Run orchestration
//!
//! Wires the stages together:
//!
//! ```text
//! files -> FileIngestor (one per file) -> lines -> RecordParser -> records -> WriterPool -> shard
//! ```
//!
//! Shutdown follows the channels: once every ingestor returns, the last line
//! sender is dropped, the parser drains and drops the record sender, and the
//! writer workers drain and exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::ingestor::{FileIngestor, FileState, IngestError};
use crate::parser::{RecordParser, RunStats, Verdict};
use crate::retry::{FixedBackoff, RetryStrategy};
use crate::shard::ShardTable;
use crate::writer::{Writer, WriterPool, WriterStats};

/// Errors that end a run early
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("pipeline task failed: {0}")]
    Task(#[from] JoinError),
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub files: usize,
    pub completed: usize,
    pub aborted: usize,
    pub stats: RunStats,
    pub verdict: Verdict,
    pub writes: WriterStats,
    pub elapsed: Duration,
}

/// Runs the loader over a set of files
pub struct Orchestrator {
    config: RunConfig,
    shards: Arc<ShardTable>,
    retry: Arc<dyn RetryStrategy>,
}

impl Orchestrator {
    /// Retries use [`FixedBackoff`] built from `config`.
    pub fn new(config: RunConfig, shards: Arc<ShardTable>) -> Self {
        let retry = Arc::new(FixedBackoff::new(config.retry_attempts, config.retry_backoff));
        Self {
            config,
            shards,
            retry,
        }
    }

    pub fn with_retry_strategy(mut self, retry: Arc<dyn RetryStrategy>) -> Self {
        self.retry = retry;
        self
    }

    /// Load every file in `files`.
    ///
    /// Returns an error only for fatal conditions: a file that cannot be
    /// opened or has no valid gzip header. In that case the parser and
    /// writers are stopped without draining.
    pub async fn run(&self, files: Vec<PathBuf>) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let file_count = files.len();
        info!(
            files = file_count,
            workers = self.config.workers,
            shards = ?self.shards.device_types(),
            dry_run = self.config.dry_run,
            "Starting load"
        );

        let (line_tx, line_rx) = mpsc::channel::<String>(self.config.channel_capacity);
        let (record_tx, record_rx) = mpsc::channel(self.config.channel_capacity);

        let parser = tokio::spawn(RecordParser::new(line_rx, record_tx).run());

        let writer = Writer::new(self.shards.clone(), self.retry.clone(), self.config.dry_run);
        let pool = WriterPool::spawn(self.config.workers, record_rx, writer);

        let mut ingestors = JoinSet::new();
        for path in files {
            let ingestor = FileIngestor::new(path, self.config.dry_run);
            let lines = line_tx.clone();
            ingestors.spawn_blocking(move || ingestor.run(lines));
        }
        drop(line_tx);

        let mut completed = 0;
        let mut aborted = 0;
        while let Some(joined) = ingestors.join_next().await {
            match joined {
                Ok(Ok(outcome)) => match outcome.state {
                    FileState::Completed => completed += 1,
                    _ => aborted += 1,
                },
                Ok(Err(e)) => {
                    error!(file = %e.path().display(), error = %e, "Fatal input error, stopping");
                    parser.abort();
                    pool.abort();
                    return Err(e.into());
                },
                Err(e) => {
                    error!(error = %e, "Ingestor task failed");
                    aborted += 1;
                },
            }
        }

        let summary = match parser.await {
            Ok(summary) => summary,
            Err(e) => {
                pool.abort();
                return Err(e.into());
            },
        };
        let writes = pool.join().await;

        let elapsed = start.elapsed();
        info!(
            elapsed = ?elapsed,
            written = writes.written,
            failed = writes.failed,
            "Execution time"
        );

        Ok(RunReport {
            files: file_count,
            completed,
            aborted,
            stats: summary.stats,
            verdict: summary.verdict,
            writes,
            elapsed,
        })
    }
}
