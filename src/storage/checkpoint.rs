//! Per-run checkpoint storage.
//!
//! Every pipeline stage of a run is stored as one JSON array at
//! `{root}/{run_id}/{stage}/data.json`. Writes are full overwrites that go
//! through a temporary file and a rename, so readers (and a restarted run)
//! only ever see a complete array.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::CheckpointError;

/// File name of a stage artifact inside its stage directory.
const DATA_FILE: &str = "data.json";

/// Named snapshot point of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Rows exactly as fetched from the source.
    Raw,
    /// Rows after normalization into records.
    Formatted,
    /// Accepted records of a run that is still in progress.
    Cleaning,
    /// Accepted records of a finished run.
    Cleaned,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Raw, Stage::Formatted, Stage::Cleaning, Stage::Cleaned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Formatted => "formatted",
            Stage::Cleaning => "cleaning",
            Stage::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(Stage::Raw),
            "formatted" => Ok(Stage::Formatted),
            "cleaning" => Ok(Stage::Cleaning),
            "cleaned" => Ok(Stage::Cleaned),
            other => Err(CheckpointError::InvalidStage(other.to_string())),
        }
    }
}

/// Row count and modification time of one stored stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub stage: Stage,
    pub rows: usize,
    pub modified: Option<DateTime<Utc>>,
}

/// Filesystem-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Creates a store rooted at `root`. Nothing is created on disk until
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `(run_id, stage)`.
    pub fn stage_path(&self, run_id: &str, stage: Stage) -> PathBuf {
        self.root.join(run_id).join(stage.as_str()).join(DATA_FILE)
    }

    /// Overwrites the `(run_id, stage)` artifact with `items` as a JSON array.
    ///
    /// Persisting the same items twice produces byte-identical files.
    pub async fn persist<T: Serialize>(
        &self,
        run_id: &str,
        stage: Stage,
        items: &[T],
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.stage_path(run_id, stage);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).await?;

        let bytes = serde_json::to_vec(items)?;
        let tmp_path = dir.join(format!("{}.tmp", DATA_FILE));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;

        debug!(
            run_id = run_id,
            stage = %stage,
            rows = items.len(),
            bytes = bytes.len(),
            "Checkpoint written"
        );
        Ok(path)
    }

    /// Loads the `(run_id, stage)` artifact.
    pub async fn load<T: DeserializeOwned>(
        &self,
        run_id: &str,
        stage: Stage,
    ) -> Result<Vec<T>, CheckpointError> {
        let path = self.stage_path(run_id, stage);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound {
                    run_id: run_id.to_string(),
                    stage: stage.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Whether an artifact exists for `(run_id, stage)`.
    pub async fn exists(&self, run_id: &str, stage: Stage) -> bool {
        fs::try_exists(self.stage_path(run_id, stage))
            .await
            .unwrap_or(false)
    }

    /// Lists run ids that have at least a directory under the root, sorted.
    pub async fn list_runs(&self) -> Result<Vec<String>, CheckpointError> {
        let mut runs = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                runs.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Row count and modification time of a stored stage.
    pub async fn stage_summary(
        &self,
        run_id: &str,
        stage: Stage,
    ) -> Result<StageSummary, CheckpointError> {
        let rows: Vec<serde_json::Value> = self.load(run_id, stage).await?;
        let modified = fs::metadata(self.stage_path(run_id, stage))
            .await
            .and_then(|m| m.modified())
            .ok()
            .map(|t: SystemTime| DateTime::<Utc>::from(t));

        Ok(StageSummary {
            stage,
            rows: rows.len(),
            modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        n: u32,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                id: "a".to_string(),
                n: 1,
            },
            Row {
                id: "b".to_string(),
                n: 2,
            },
        ]
    }

    #[test]
    fn test_stage_round_trip_names() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().expect("parses"), stage);
        }
        assert!("final".parse::<Stage>().is_err());
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path());

        let path = store
            .persist("run1", Stage::Cleaning, &rows())
            .await
            .expect("persist");
        assert_eq!(path, dir.path().join("run1/cleaning/data.json"));

        let loaded: Vec<Row> = store.load("run1", Stage::Cleaning).await.expect("load");
        assert_eq!(loaded, rows());
        assert!(!dir.path().join("run1/cleaning/data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_persist_twice_is_byte_identical() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path());

        let path = store.persist("run1", Stage::Cleaned, &rows()).await.expect("persist");
        let first = std::fs::read(&path).expect("read");
        store.persist("run1", Stage::Cleaned, &rows()).await.expect("persist");
        let second = std::fs::read(&path).expect("read");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_persist_overwrites() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path());

        store.persist("run1", Stage::Raw, &rows()).await.expect("persist");
        store
            .persist("run1", Stage::Raw, &rows()[..1])
            .await
            .expect("persist");

        let loaded: Vec<Row> = store.load("run1", Stage::Raw).await.expect("load");
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_stage() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path());

        let result: Result<Vec<Row>, _> = store.load("nope", Stage::Cleaned).await;
        assert!(matches!(result, Err(CheckpointError::NotFound { .. })));
        assert!(!store.exists("nope", Stage::Cleaned).await);
    }

    #[tokio::test]
    async fn test_list_runs_and_summary() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path().join("steps"));

        assert!(store.list_runs().await.expect("list").is_empty());

        store.persist("bbb", Stage::Raw, &rows()).await.expect("persist");
        store.persist("aaa", Stage::Cleaned, &rows()[..1]).await.expect("persist");

        assert_eq!(store.list_runs().await.expect("list"), vec!["aaa", "bbb"]);

        let summary = store.stage_summary("aaa", Stage::Cleaned).await.expect("summary");
        assert_eq!(summary.rows, 1);
        assert!(summary.modified.is_some());
    }
}
