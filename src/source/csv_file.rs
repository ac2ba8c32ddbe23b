//! Header-keyed CSV rows as JSON objects.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::SourceError;

/// Read a CSV file whose first line is a header.
///
/// Every data row becomes a JSON object mapping header names to string
/// values. Rows where every cell is empty are skipped; rows shorter than the
/// header leave the missing columns out.
pub fn read_csv_records(path: impl AsRef<Path>) -> Result<Vec<Value>, SourceError> {
    let path = path.as_ref();
    let rows = parse_csv_records(File::open(path)?)?;
    info!(path = %path.display(), rows = rows.len(), "Read CSV rows");
    Ok(rows)
}

/// Parse header-keyed CSV from any reader.
pub fn parse_csv_records<R: Read>(reader: R) -> Result<Vec<Value>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in csv_reader.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }

    Ok(rows)
}
