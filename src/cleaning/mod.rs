//! The cleaning engine.
//!
//! Records flow leaf to root through these components:
//!
//! - **normalizer**: raw table rows into canonical [`Record`]s
//! - **classifier**: one chat-completion call per record, with audit logging
//!   and response repair
//! - **cleaner**: classify, parse, accept/reject, bounded retry on remote
//!   failures
//! - **shard**: sequential processing of one shard against the shared
//!   [`RunState`]
//! - **orchestrator**: static partitioning, one task per shard, join, final
//!   `cleaned` checkpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dataset_cleaner::cleaning::*;
//! use dataset_cleaner::storage::{AuditLog, CheckpointStore};
//!
//! let classifier = RecordClassifier::new(provider, Arc::new(AuditLog::new("log.txt")), "");
//! let cleaner = Arc::new(RecordCleaner::new(Arc::new(classifier)));
//! let processor = Arc::new(ShardProcessor::new(cleaner, Duration::from_millis(500)));
//! let orchestrator = CleaningOrchestrator::new(processor, CheckpointStore::new("./steps"));
//!
//! let cleaned = orchestrator.run_all(records, &new_run_id(), 4).await?;
//! ```

pub mod classifier;
pub mod cleaner;
pub mod normalizer;
pub mod orchestrator;
pub mod progress;
pub mod shard;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{RecordClassifier, CLEANING_SYSTEM_PROMPT};
pub use cleaner::{interpret_response, CleanOutcome, RecordCleaner, DEFAULT_MAX_RETRIES};
pub use normalizer::{normalize, normalize_all, NormalizePolicy, Table};
pub use orchestrator::{partition, CleaningOrchestrator, RunReport};
pub use progress::{ProgressCounters, ProgressMonitor, ProgressSnapshot};
pub use shard::{RunState, ShardProcessor};
pub use types::{
    new_run_id, ClassifiedResult, ClassifierOutput, CleanedRecord, MalformedKind, Record,
    RejectionReason,
};
