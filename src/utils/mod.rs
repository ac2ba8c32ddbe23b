//! Shared utility functions for dataset-cleaner.
//!
//! This module provides the pre-parse repair applied to classifier output.

pub mod response_repair;

pub use response_repair::repair_response;
