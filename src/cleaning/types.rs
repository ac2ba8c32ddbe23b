//! Core data types for the cleaning pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A canonical dataset record.
///
/// Records are immutable once built. The `model` column only travels as far
/// as the `formatted` checkpoint; the cleaner always works on a copy
/// without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Record {
    /// Creates a record with a fresh unique id.
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input: input.into(),
            output: output.into(),
            model,
        }
    }

    /// Creates a record with an explicit id.
    pub fn with_id(
        id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            output: output.into(),
            model: None,
        }
    }

    /// Builds a record from a row that is already in canonical shape,
    /// bypassing table-specific normalization.
    ///
    /// Top-level `input`, `output` and `model` string columns are read as-is;
    /// missing or non-string columns become empty (or `None` for `model`).
    /// A fresh id is always assigned.
    pub fn from_raw(raw: &serde_json::Value) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Self::new(
            text("input").unwrap_or_default(),
            text("output").unwrap_or_default(),
            text("model"),
        )
    }

    /// Copy of this record with the `model` field stripped.
    pub fn without_model(&self) -> Self {
        Self {
            model: None,
            ..self.clone()
        }
    }
}

/// A record the classifier accepted, with its original id reattached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub input: String,
    pub output: String,
    pub id: String,
}

/// Why the classifier refused a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionReason {
    /// Continues or refers to an earlier conversation turn.
    Conversational,
    /// Refers to an attachment or image.
    Images,
    /// Not useful as training data.
    Irrelevant,
}

impl RejectionReason {
    pub const ALL: [RejectionReason; 3] = [
        RejectionReason::Conversational,
        RejectionReason::Images,
        RejectionReason::Irrelevant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Conversational => "conversational",
            RejectionReason::Images => "images",
            RejectionReason::Irrelevant => "irrelevant",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversational" => Ok(RejectionReason::Conversational),
            "images" => Ok(RejectionReason::Images),
            "irrelevant" => Ok(RejectionReason::Irrelevant),
            other => Err(format!("unknown rejection reason '{}'", other)),
        }
    }
}

/// Why a record was dropped without a usable classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MalformedKind {
    /// No choices, content-filtered, or blank content.
    EmptyResponse,
    /// The repaired text was not a JSON object.
    Unparseable,
    /// A JSON object without non-empty `input`/`output` and without a known `reason`.
    MissingFields,
    /// Every classifier call failed, including all retries.
    RetriesExhausted,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MalformedKind::EmptyResponse => "empty response",
            MalformedKind::Unparseable => "unparseable response",
            MalformedKind::MissingFields => "missing input/output",
            MalformedKind::RetriesExhausted => "retries exhausted",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of cleaning one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedResult {
    Accepted(CleanedRecord),
    Rejected(RejectionReason),
    Malformed(MalformedKind),
}

impl ClassifiedResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ClassifiedResult::Accepted(_))
    }

    /// The accepted record, if any.
    pub fn into_accepted(self) -> Option<CleanedRecord> {
        match self {
            ClassifiedResult::Accepted(record) => Some(record),
            _ => None,
        }
    }
}

/// Raw text from one classifier call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierOutput {
    /// Repaired response text, ready for parsing.
    Text(String),
    /// No usable completion (no choices, content filter, blank content).
    Empty,
}

/// Generates a short run identifier (first 8 hex chars of a v4 UUID).
pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
