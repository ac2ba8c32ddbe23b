//! Fan-out of a dataset over concurrent shard tasks.
//!
//! The input is split into contiguous shards of `ceil(len / workers)`
//! records, one tokio task per shard, all sharing one [`RunState`]. The
//! orchestrator waits for every shard before writing the `cleaned` stage;
//! there is no work stealing and no cancellation beyond the checkpoint-failure
//! abort.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use super::progress::{ProgressMonitor, ProgressSnapshot};
use super::shard::{RunState, ShardProcessor};
use super::types::{CleanedRecord, Record};
use crate::error::CleanError;
use crate::storage::{CheckpointStore, Stage};

/// Split `items` into at most `workers` contiguous shards.
///
/// Every shard except the last holds `ceil(len / workers)` items; concatenating
/// the shards in order gives back `items`. Empty input yields no shards, and
/// `workers == 0` is treated as one worker.
pub fn partition<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk_size = items.len().div_ceil(workers.max(1));

    let mut shards = Vec::new();
    let mut iter = items.into_iter();
    loop {
        let shard: Vec<T> = iter.by_ref().take(chunk_size).collect();
        if shard.is_empty() {
            break;
        }
        shards.push(shard);
    }
    shards
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    /// Number of input records.
    pub total: usize,
    /// Accepted records, in accumulator order.
    pub records: Vec<CleanedRecord>,
    /// Final counter values.
    pub progress: ProgressSnapshot,
    /// Location of the `cleaned` checkpoint.
    pub checkpoint: PathBuf,
}

/// Runs a whole dataset through concurrent shard processors.
pub struct CleaningOrchestrator {
    processor: Arc<ShardProcessor>,
    store: CheckpointStore,
    progress_interval: Duration,
}

impl CleaningOrchestrator {
    pub fn new(processor: Arc<ShardProcessor>, store: CheckpointStore) -> Self {
        Self {
            processor,
            store,
            progress_interval: Duration::from_secs(10),
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Clean `records` with `worker_count` concurrent shards and return the
    /// accepted set, also persisted under the `cleaned` stage.
    pub async fn run_all(
        &self,
        records: Vec<Record>,
        run_id: &str,
        worker_count: usize,
    ) -> Result<Vec<CleanedRecord>, CleanError> {
        self.run(records, run_id, worker_count)
            .await
            .map(|report| report.records)
    }

    /// Like [`run_all`](Self::run_all), returning counters and the checkpoint path too.
    pub async fn run(
        &self,
        records: Vec<Record>,
        run_id: &str,
        worker_count: usize,
    ) -> Result<RunReport, CleanError> {
        if worker_count == 0 {
            return Err(CleanError::InvalidWorkerCount);
        }

        let total = records.len();
        let started = Instant::now();
        let state = Arc::new(RunState::new(run_id, self.store.clone()));
        let shards = partition(records, worker_count);

        info!(
            run_id = run_id,
            records = total,
            workers = worker_count,
            shards = shards.len(),
            "Starting cleaning run"
        );

        let monitor = ProgressMonitor::start(
            run_id,
            state.counters().clone(),
            total,
            self.progress_interval,
        );

        let handles: Vec<_> = shards
            .into_iter()
            .enumerate()
            .map(|(index, shard)| {
                let processor = Arc::clone(&self.processor);
                let state = Arc::clone(&state);
                tokio::spawn(async move { processor.process_shard(index, shard, state).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        monitor.stop().await;

        let mut failure: Option<CleanError> = None;
        for (index, joined) in results.into_iter().enumerate() {
            let err = match joined {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => e,
                Err(join_error) => CleanError::ShardPanicked {
                    shard: index,
                    message: join_error.to_string(),
                },
            };
            error!(run_id = run_id, shard = index, error = %err, "Shard failed");
            // The abort notices from sibling shards are less useful than the cause.
            let replace = match (&failure, &err) {
                (None, _) => true,
                (Some(CleanError::Aborted(_)), e) => !matches!(e, CleanError::Aborted(_)),
                _ => false,
            };
            if replace {
                failure = Some(err);
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let accepted = state.accepted().await;
        let checkpoint = self
            .store
            .persist(run_id, Stage::Cleaned, accepted.as_slice())
            .await?;
        let progress = state.counters().snapshot(started);

        info!(
            run_id = run_id,
            records = total,
            accepted = accepted.len(),
            rejected = progress.rejected,
            dropped = progress.dropped,
            elapsed_secs = progress.elapsed.as_secs(),
            "Cleaning run finished"
        );

        Ok(RunReport {
            run_id: run_id.to_string(),
            total,
            records: accepted,
            progress,
            checkpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::classifier::RecordClassifier;
    use crate::cleaning::cleaner::RecordCleaner;
    use crate::cleaning::testing::{response_with, MockLlmProvider};
    use crate::storage::AuditLog;
    use tempfile::TempDir;

    fn orchestrator(provider: Arc<MockLlmProvider>, dir: &TempDir) -> CleaningOrchestrator {
        let classifier = RecordClassifier::new(provider, Arc::new(AuditLog::disabled()), "");
        let cleaner = Arc::new(RecordCleaner::new(Arc::new(classifier)));
        let processor = Arc::new(ShardProcessor::new(cleaner, Duration::ZERO));
        CleaningOrchestrator::new(processor, CheckpointStore::new(dir.path()))
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::with_id(format!("r{}", i), format!("in {}", i), format!("out {}", i)))
            .collect()
    }

    #[test]
    fn test_partition_sizes() {
        let sizes: Vec<usize> = partition((0..10).collect::<Vec<_>>(), 3)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_partition_reconstructs_input() {
        for len in 0..25usize {
            for workers in 1..8usize {
                let items: Vec<usize> = (0..len).collect();
                let shards = partition(items.clone(), workers);
                assert!(shards.len() <= workers);
                assert!(shards.iter().all(|s| !s.is_empty()));
                let flat: Vec<usize> = shards.into_iter().flatten().collect();
                assert_eq!(flat, items, "len={} workers={}", len, workers);
            }
        }
    }

    #[test]
    fn test_partition_more_workers_than_items() {
        let shards = partition(vec!['a', 'b'], 5);
        assert_eq!(shards, vec![vec!['a'], vec!['b']]);
    }

    #[tokio::test]
    async fn test_run_all_rejects_zero_workers() {
        let dir = TempDir::new().expect("tempdir");
        let result = orchestrator(Arc::new(MockLlmProvider::echo()), &dir)
            .run_all(records(3), "run1", 0)
            .await;
        assert!(matches!(result, Err(CleanError::InvalidWorkerCount)));
    }

    #[tokio::test]
    async fn test_run_all_echo_accepts_everything() {
        let dir = TempDir::new().expect("tempdir");
        let orchestrator = orchestrator(Arc::new(MockLlmProvider::echo()), &dir);

        let cleaned = orchestrator
            .run_all(records(10), "run1", 3)
            .await
            .expect("run succeeds");

        assert_eq!(cleaned.len(), 10);
        let mut ids: Vec<String> = cleaned.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        let mut expected: Vec<String> = (0..10).map(|i| format!("r{}", i)).collect();
        expected.sort();
        assert_eq!(ids, expected);

        let stored: Vec<CleanedRecord> = orchestrator
            .store()
            .load("run1", Stage::Cleaned)
            .await
            .expect("cleaned checkpoint");
        assert_eq!(stored, cleaned);
    }

    #[tokio::test]
    async fn test_run_all_preserves_intra_shard_order() {
        let dir = TempDir::new().expect("tempdir");
        let cleaned = orchestrator(Arc::new(MockLlmProvider::echo()), &dir)
            .run_all(records(10), "run1", 3)
            .await
            .expect("run succeeds");

        let position = |id: &str| cleaned.iter().position(|r| r.id == id).expect("present");
        for shard in [vec!["r0", "r1", "r2", "r3"], vec!["r4", "r5", "r6", "r7"], vec!["r8", "r9"]] {
            for pair in shard.windows(2) {
                assert!(position(pair[0]) < position(pair[1]));
            }
        }
    }

    #[tokio::test]
    async fn test_run_all_drops_rejected_records() {
        let dir = TempDir::new().expect("tempdir");
        // Odd-numbered records are rejected.
        let provider = Arc::new(MockLlmProvider::new(|_, request| {
            let payload = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let odd = ["r1\"", "r3\"", "r5\""].iter().any(|id| payload.contains(id));
            if odd {
                Ok(response_with(r#"{"reason":"irrelevant"}"#, "stop"))
            } else {
                Ok(response_with(&payload, "stop"))
            }
        }));

        let report = orchestrator(provider, &dir)
            .run(records(6), "run1", 2)
            .await
            .expect("run succeeds");

        assert_eq!(report.total, 6);
        assert_eq!(report.records.len(), 3);
        assert!(report.records.len() <= report.total);
        assert_eq!(report.progress.processed, 6);
        assert_eq!(report.progress.rejected, 3);
        assert!(report.checkpoint.ends_with("run1/cleaned/data.json"));
    }

    #[tokio::test]
    async fn test_run_all_empty_input() {
        let dir = TempDir::new().expect("tempdir");
        let orchestrator = orchestrator(Arc::new(MockLlmProvider::echo()), &dir);

        let cleaned = orchestrator.run_all(Vec::new(), "run1", 4).await.expect("run succeeds");

        assert!(cleaned.is_empty());
        let stored: Vec<CleanedRecord> =
            orchestrator.store().load("run1", Stage::Cleaned).await.expect("persisted");
        assert!(stored.is_empty());
    }
}
