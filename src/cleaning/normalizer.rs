//! Table-specific normalization of raw rows into [`Record`]s.
//!
//! | table              | input                    | output                  | model                       |
//! |--------------------|--------------------------|-------------------------|-----------------------------|
//! | `results`          | `prompt`                 | `result.text`           | `provider`                  |
//! | `interactions_new` | `input` (JSON) `.content` | `output` (JSON) `.text` | `tone` tokens 2 and 3       |
//! | anything else      | empty                    | empty                   | empty                       |

use std::fmt;

use serde_json::Value;
use tracing::warn;

use super::types::Record;
use crate::error::NormalizeError;

/// Source table a raw row came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Table {
    /// Already canonical rows (`input`, `output`, `model` columns).
    Dataset,
    /// Provider benchmark results.
    Results,
    /// Logged chat interactions with JSON-encoded payloads.
    InteractionsNew,
    /// Any other table; normalizes to empty records.
    Other(String),
}

impl Table {
    pub fn parse(name: &str) -> Self {
        match name {
            "dataset" => Table::Dataset,
            "results" => Table::Results,
            "interactions_new" => Table::InteractionsNew,
            other => Table::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Table::Dataset => "dataset",
            Table::Results => "results",
            Table::InteractionsNew => "interactions_new",
            Table::Other(name) => name,
        }
    }

    /// Column the table store filters on when selecting one model's rows.
    pub fn model_column(&self) -> &'static str {
        match self {
            Table::Dataset => "model",
            Table::Results => "provider",
            Table::InteractionsNew => "tone",
            Table::Other(_) => "model",
        }
    }

    /// Whether rows of this table are already canonical and skip normalization.
    pub fn is_canonical(&self) -> bool {
        matches!(self, Table::Dataset)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with rows that fail normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizePolicy {
    /// Log the failure and leave the row out.
    #[default]
    Skip,
    /// Stop at the first failing row.
    Abort,
}

/// Normalizes one raw row into a canonical record with a fresh id.
///
/// # Errors
///
/// Returns `NormalizeError::MalformedSourceRecord` when a required field is
/// absent or not a string, and `NormalizeError::EmbeddedJson` when a
/// JSON-encoded column does not parse.
pub fn normalize(table: &Table, raw: &Value) -> Result<Record, NormalizeError> {
    let name = table.name();
    match table {
        Table::Results => {
            let input = required_str(raw, "prompt", name)?;
            let result = embedded_object(raw, "result", name)?;
            let output = required_str(&result, "text", name)
                .map_err(|_| NormalizeError::missing(name, "result.text"))?;
            let model = raw
                .get("provider")
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(Record::new(input, output, model))
        }
        Table::InteractionsNew => {
            let input_doc = embedded_object(raw, "input", name)?;
            let input = required_str(&input_doc, "content", name)
                .map_err(|_| NormalizeError::missing(name, "input.content"))?;
            let output_doc = embedded_object(raw, "output", name)?;
            let output = required_str(&output_doc, "text", name)
                .map_err(|_| NormalizeError::missing(name, "output.text"))?;
            let model = raw.get("tone").and_then(Value::as_str).map(model_from_tone);
            Ok(Record::new(input, output, model))
        }
        Table::Dataset | Table::Other(_) => Ok(Record::new("", "", Some(String::new()))),
    }
}

/// Normalizes a sequence of rows according to `policy`.
///
/// Canonical tables go through [`Record::from_raw`] instead.
pub fn normalize_all(
    table: &Table,
    raws: &[Value],
    policy: NormalizePolicy,
) -> Result<Vec<Record>, NormalizeError> {
    if table.is_canonical() {
        return Ok(raws.iter().map(Record::from_raw).collect());
    }

    let mut records = Vec::with_capacity(raws.len());
    for (index, raw) in raws.iter().enumerate() {
        match normalize(table, raw) {
            Ok(record) => records.push(record),
            Err(e) if policy == NormalizePolicy::Skip => {
                warn!(table = %table, row = index, error = %e, "Skipping malformed source row");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

/// `tone` values look like `"<style>-<family>-<version>"`; the model is the
/// family and version joined by a space.
fn model_from_tone(tone: &str) -> String {
    let tokens: Vec<&str> = tone.split('-').collect();
    format!(
        "{} {}",
        tokens.get(1).copied().unwrap_or(""),
        tokens.get(2).copied().unwrap_or("")
    )
}

fn required_str(value: &Value, field: &str, table: &str) -> Result<String, NormalizeError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NormalizeError::missing(table, field))
}

/// Reads a column that holds a JSON object, either inline or as a JSON
/// string (CSV exports encode nested columns as text).
fn embedded_object(raw: &Value, field: &str, table: &str) -> Result<Value, NormalizeError> {
    match raw.get(field) {
        Some(Value::Object(_)) => Ok(raw[field].clone()),
        Some(Value::String(text)) => {
            let parsed: Value =
                serde_json::from_str(text).map_err(|e| NormalizeError::EmbeddedJson {
                    table: table.to_string(),
                    field: field.to_string(),
                    message: e.to_string(),
                })?;
            if parsed.is_object() {
                Ok(parsed)
            } else {
                Err(NormalizeError::missing(table, field))
            }
        }
        _ => Err(NormalizeError::missing(table, field)),
    }
}
