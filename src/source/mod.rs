//! Raw record sources.
//!
//! Both sources yield a flat, ordered `Vec<serde_json::Value>` of raw rows;
//! normalization into records happens in [`crate::cleaning::normalizer`].
//!
//! - **table**: paged reads from a PostgREST-style table store
//! - **csv_file**: header-keyed rows from a local CSV file

pub mod csv_file;
pub mod table;

pub use csv_file::{parse_csv_records, read_csv_records};
pub use table::{TableSource, DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE};
