//! Progress counters and background progress logging for cleaning runs.
//!
//! Shard tasks bump shared atomic counters as records reach a terminal
//! outcome; a background monitor periodically logs them so operators can
//! follow long runs without parsing per-record log lines.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use super::types::ClassifiedResult;

/// Snapshot of run counters at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Records whose cleaning finished (any outcome).
    pub processed: usize,
    /// Records accepted into the run accumulator.
    pub accepted: usize,
    /// Records the classifier rejected with a reason.
    pub rejected: usize,
    /// Records dropped because of an empty, unparseable or failed response.
    pub dropped: usize,
    /// Classifier calls repeated after a remote failure.
    pub retries: usize,
    /// Wall-clock elapsed time since the snapshot origin.
    pub elapsed: Duration,
}

/// Shared atomic counters for one run.
///
/// Cloned into every shard task; `processed` moves exactly once per record,
/// never per retry.
#[derive(Debug, Clone)]
pub struct ProgressCounters {
    pub processed: Arc<AtomicUsize>,
    pub accepted: Arc<AtomicUsize>,
    pub rejected: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicUsize>,
    pub retries: Arc<AtomicUsize>,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    /// Create a new set of zeroed counters.
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicUsize::new(0)),
            accepted: Arc::new(AtomicUsize::new(0)),
            rejected: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
            retries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Count one terminal outcome.
    pub fn record(&self, result: &ClassifiedResult) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let bucket = match result {
            ClassifiedResult::Accepted(_) => &self.accepted,
            ClassifiedResult::Rejected(_) => &self.rejected,
            ClassifiedResult::Malformed(_) => &self.dropped,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs run progress.
///
/// Call [`ProgressMonitor::stop`] to end it.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a monitor that logs every `interval`.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Run the counters belong to
    /// * `counters` - Shared counters incremented by shard tasks
    /// * `total` - Number of records in the run (used for the percentage)
    /// * `interval` - How often to emit progress logs
    pub fn start(
        run_id: impl Into<String>,
        counters: ProgressCounters,
        total: usize,
        interval: Duration,
    ) -> Self {
        let run_id = run_id.into();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval.max(Duration::from_millis(1)));
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let pct = if total > 0 {
                    (snap.processed as f64 / total as f64 * 100.0).min(100.0)
                } else {
                    100.0
                };
                let elapsed_secs = snap.elapsed.as_secs_f64();
                let per_sec = if elapsed_secs > 0.0 {
                    snap.processed as f64 / elapsed_secs
                } else {
                    0.0
                };

                tracing::info!(
                    run_id = %run_id,
                    processed = snap.processed,
                    total = total,
                    accepted = snap.accepted,
                    rejected = snap.rejected,
                    dropped = snap.dropped,
                    retries = snap.retries,
                    progress_pct = format!("{:.1}%", pct),
                    elapsed_secs = snap.elapsed.as_secs(),
                    records_per_sec = format!("{:.2}", per_sec),
                    "Cleaning progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Stop the monitor and wait for its task to end.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
