//! Append-only audit log.
//!
//! Raw classifier responses and per-record drop reasons are written here with
//! a UTC timestamp. The cleaned checkpoint only holds accepted records, so
//! this file is the only place that distinguishes a legitimate rejection from
//! a garbage response.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Append-only, line-oriented audit log shared by all shards of a run.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    // Serializes appends so lines from concurrent shards never interleave.
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Creates a log that appends to `path`, creating it on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a log that discards every entry.
    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the log path, if enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one timestamped entry.
    ///
    /// Audit failures are logged and swallowed: losing an audit line must not
    /// drop the record it describes.
    pub async fn append(&self, kind: &str, message: &str) {
        let Some(ref path) = self.path else {
            return;
        };

        let line = format!("{} {}: {}\n", Utc::now().to_rfc3339(), kind, message);

        let _guard = self.write_lock.lock().await;
        let result = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to append audit entry");
        }
    }
}
