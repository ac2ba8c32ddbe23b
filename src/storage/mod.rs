//! Durable storage for cleaning runs.
//!
//! This module provides:
//! - **Checkpoints**: one JSON array per `(run_id, stage)`, fully rewritten on
//!   every persist
//! - **Audit log**: append-only, timestamped record of raw classifier output
//!
//! # Usage
//!
//! ```rust,ignore
//! use dataset_cleaner::storage::{CheckpointStore, Stage};
//!
//! let store = CheckpointStore::new("./steps");
//! store.persist("1a2b3c4d", Stage::Raw, &rows).await?;
//! let cleaned: Vec<CleanedRecord> = store.load("1a2b3c4d", Stage::Cleaned).await?;
//! ```

pub mod audit;
pub mod checkpoint;

pub use audit::AuditLog;
pub use checkpoint::{CheckpointStore, Stage, StageSummary};
