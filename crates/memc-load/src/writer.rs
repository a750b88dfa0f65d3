//! Writer pool
//!
//! A fixed set of workers drains the shared record channel. Each record is
//! handled by exactly one worker: resolve the shard, serialize, then write
//! with retries (or log it under dry-run). Failures never stop a worker.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::record::DeviceRecord;
use crate::retry::{set_with_retry, RetryStrategy};
use crate::shard::ShardTable;

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Written { attempts: u32 },
    Failed { attempts: u32 },
    DryRun,
    UnknownShard,
}

/// Per-outcome record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
    pub dry_run: u64,
    pub unknown_shard: u64,
}

impl WriterStats {
    pub fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Written { .. } => self.written += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
            RecordOutcome::DryRun => self.dry_run += 1,
            RecordOutcome::UnknownShard => self.unknown_shard += 1,
        }
    }

    pub fn merge(&mut self, other: WriterStats) {
        self.written += other.written;
        self.failed += other.failed;
        self.dry_run += other.dry_run;
        self.unknown_shard += other.unknown_shard;
    }

    pub fn total(&self) -> u64 {
        self.written + self.failed + self.dry_run + self.unknown_shard
    }
}

/// Per-record write logic shared by all workers
#[derive(Clone)]
pub struct Writer {
    shards: Arc<ShardTable>,
    retry: Arc<dyn RetryStrategy>,
    dry_run: bool,
}

impl Writer {
    pub fn new(shards: Arc<ShardTable>, retry: Arc<dyn RetryStrategy>, dry_run: bool) -> Self {
        Self {
            shards,
            retry,
            dry_run,
        }
    }

    pub async fn write(&self, record: DeviceRecord) -> RecordOutcome {
        let Some(client) = self.shards.get(&record.dev_type) else {
            warn!(dev_type = %record.dev_type, dev_id = %record.dev_id, "Unknown device type");
            return RecordOutcome::UnknownShard;
        };

        let payload = codec::encode(&record);
        let key = record.store_key();

        if self.dry_run {
            info!(key = %key, record = ?record, "Dry run, skipping write");
            return RecordOutcome::DryRun;
        }

        match set_with_retry(client.as_ref(), &key, &payload, self.retry.as_ref()).await {
            Ok(attempts) => {
                debug!(key = %key, attempts, "Record written");
                RecordOutcome::Written { attempts }
            },
            Err(e) => {
                error!(
                    key = %key,
                    dev_type = %record.dev_type,
                    attempts = e.attempts,
                    error = %e.last_error,
                    "Failed to write record to store"
                );
                RecordOutcome::Failed {
                    attempts: e.attempts,
                }
            },
        }
    }
}

/// Running writer workers
pub struct WriterPool {
    workers: Vec<JoinHandle<WriterStats>>,
}

impl WriterPool {
    /// Start `size` workers sharing `records` as a work queue.
    pub fn spawn(size: usize, records: mpsc::Receiver<DeviceRecord>, writer: Writer) -> Self {
        let queue = Arc::new(Mutex::new(records));
        let workers = (0..size)
            .map(|id| tokio::spawn(run_worker(id, queue.clone(), writer.clone())))
            .collect();

        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait until the record channel is closed and drained.
    pub async fn join(self) -> WriterStats {
        let mut total = WriterStats::default();
        for (id, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => total.merge(stats),
                Err(e) => error!(worker = id, error = %e, "Writer worker failed"),
            }
        }
        total
    }

    /// Stop all workers without draining.
    pub fn abort(&self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<DeviceRecord>>>,
    writer: Writer,
) -> WriterStats {
    let mut stats = WriterStats::default();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };
        stats.record(writer.write(record).await);
    }

    debug!(worker = id, written = stats.written, failed = stats.failed, "Writer worker finished");
    stats
}
