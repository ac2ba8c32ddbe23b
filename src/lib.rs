//! dataset-cleaner: LLM-assisted cleaning of fine-tuning datasets.
//!
//! Raw rows are fetched from a CSV file or a remote table, normalized into
//! `{input, output}` records, and sent concurrently through a chat-completion
//! classifier that either returns a scrubbed record or rejects it. Every
//! stage is checkpointed to disk so partial progress survives a crash.

pub mod cleaning;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod source;
pub mod storage;
pub mod utils;

// Re-export commonly used error types
pub use config::ConfigError;
pub use error::{CheckpointError, CleanError, LlmError, NormalizeError, SourceError};
