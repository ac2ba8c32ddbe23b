//! Error types for dataset-cleaner operations.
//!
//! Defines error types for the major subsystems:
//! - Source record normalization
//! - Chat-completion API interactions
//! - Checkpoint persistence
//! - Record sources (remote table store, CSV files)
//! - Cleaning runs

use thiserror::Error;

/// Errors that can occur while normalizing a raw source record.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Malformed source record from table '{table}': missing or invalid field '{field}'")]
    MalformedSourceRecord { table: String, field: String },

    #[error("Malformed source record from table '{table}': field '{field}' is not valid JSON: {message}")]
    EmbeddedJson {
        table: String,
        field: String,
        message: String,
    },
}

impl NormalizeError {
    pub(crate) fn missing(table: &str, field: &str) -> Self {
        Self::MalformedSourceRecord {
            table: table.to_string(),
            field: field.to_string(),
        }
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Invalid proxy configuration: {0}")]
    InvalidProxy(String),
}

/// Errors that can occur while reading or writing checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint '{run_id}/{stage}' not found")]
    NotFound { run_id: String, stage: String },

    #[error("Invalid checkpoint stage '{0}': must be 'raw', 'formatted', 'cleaning' or 'cleaned'")]
    InvalidStage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while fetching raw records from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Table store request failed: {0}")]
    RequestFailed(String),

    #[error("Table store error ({code}) for table '{table}': {message}")]
    TableStore {
        table: String,
        code: u16,
        message: String,
    },

    #[error("Unexpected row shape in table '{table}': {message}")]
    UnexpectedRow { table: String, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a cleaning run.
///
/// Per-record failures never surface here; they are contained in the
/// record cleaner and only show up in the audit log.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("Checkpoint persistence failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Shard {shard} task failed: {message}")]
    ShardPanicked { shard: usize, message: String },

    #[error("Run '{0}' was aborted by a failure in another shard")]
    Aborted(String),
}
