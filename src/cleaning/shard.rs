//! Sequential processing of one shard against shared run state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::cleaner::RecordCleaner;
use super::progress::ProgressCounters;
use super::types::{ClassifiedResult, CleanedRecord, Record};
use crate::error::CleanError;
use crate::storage::{CheckpointStore, Stage};

/// State shared by every shard of one run.
///
/// Created by the orchestrator at run start and dropped when the run ends;
/// nothing here outlives a run. The accumulator lock covers both the append
/// and the `cleaning` checkpoint write, so the on-disk checkpoint always
/// equals a prefix-complete view of the accumulator.
#[derive(Debug)]
pub struct RunState {
    run_id: String,
    store: CheckpointStore,
    accumulator: Mutex<Vec<CleanedRecord>>,
    counters: ProgressCounters,
    aborted: AtomicBool,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, store: CheckpointStore) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            accumulator: Mutex::new(Vec::new()),
            counters: ProgressCounters::new(),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    /// Whether a shard hit a run-fatal error.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Copy of the accepted records so far.
    pub async fn accepted(&self) -> Vec<CleanedRecord> {
        self.accumulator.lock().await.clone()
    }

    /// Append an accepted record and checkpoint the whole accumulator.
    ///
    /// On a persistence failure the run is marked aborted.
    pub async fn accept(&self, record: CleanedRecord) -> Result<usize, CleanError> {
        let mut accumulator = self.accumulator.lock().await;
        accumulator.push(record);

        if let Err(e) = self
            .store
            .persist(&self.run_id, Stage::Cleaning, accumulator.as_slice())
            .await
        {
            self.abort();
            error!(run_id = %self.run_id, error = %e, "Checkpoint write failed, aborting run");
            return Err(e.into());
        }
        Ok(accumulator.len())
    }
}

/// Cleans the records of one shard, in order.
pub struct ShardProcessor {
    cleaner: Arc<RecordCleaner>,
    request_delay: Duration,
}

impl ShardProcessor {
    pub fn new(cleaner: Arc<RecordCleaner>, request_delay: Duration) -> Self {
        Self {
            cleaner,
            request_delay,
        }
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Process every record of `records` sequentially.
    ///
    /// Each record waits the request delay, goes through the cleaner, bumps
    /// the shared counters, and on acceptance is appended and checkpointed.
    /// Returns the number of records this shard accepted.
    ///
    /// # Errors
    ///
    /// `CleanError::Checkpoint` if persisting failed here, and
    /// `CleanError::Aborted` if another shard aborted the run first.
    pub async fn process_shard(
        &self,
        shard_index: usize,
        records: Vec<Record>,
        state: Arc<RunState>,
    ) -> Result<usize, CleanError> {
        let total = records.len();
        let mut accepted = 0;
        debug!(run_id = %state.run_id(), shard = shard_index, records = total, "Shard started");

        for record in records {
            if state.is_aborted() {
                return Err(CleanError::Aborted(state.run_id().to_string()));
            }

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            let outcome = self.cleaner.clean_with_attempts(&record).await;
            let counters = state.counters();
            counters
                .retries
                .fetch_add(outcome.attempts.saturating_sub(1) as usize, Ordering::Relaxed);
            counters.record(&outcome.result);

            if let ClassifiedResult::Accepted(cleaned) = outcome.result {
                state.accept(cleaned).await?;
                accepted += 1;
            }
        }

        info!(
            run_id = %state.run_id(),
            shard = shard_index,
            records = total,
            accepted = accepted,
            "Shard finished"
        );
        Ok(accepted)
    }
}
