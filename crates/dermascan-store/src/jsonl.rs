//! JSON-lines document store
//!
//! One prediction document per line in `<data_dir>/predictions.jsonl`,
//! append-only. Reads scan the file, so every query sees every completed
//! write. Lines that fail to parse are skipped.

use crate::repository::{sort_newest_first, Page, PredictionRepository};
use async_trait::async_trait;
use dermascan_core::{Error, NewPrediction, PredictionRecord, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name of the history inside the data directory
pub const HISTORY_FILE: &str = "predictions.jsonl";

/// Append-only JSON-lines store
#[derive(Debug, Clone)]
pub struct JsonlRepository {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    dir: PathBuf,
    path: PathBuf,
    // Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonlRepository {
    /// Open a store in `dir`, creating the directory if needed.
    ///
    /// A directory that cannot be created is logged, not fatal: the store
    /// then reports connectivity errors until it becomes usable.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(HISTORY_FILE);

        match std::fs::create_dir_all(&dir) {
            Ok(()) => info!(path = %path.display(), "Opened prediction store"),
            Err(e) => warn!(
                dir = %dir.display(),
                error = %e,
                "Data directory unavailable; prediction history disabled"
            ),
        }

        Self {
            inner: Arc::new(Inner {
                dir,
                path,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Fail when the data directory has gone away
    fn ensure_reachable(dir: &Path) -> Result<()> {
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::connectivity(format!(
                "{} is not a directory",
                dir.display()
            ))),
            Err(e) => Err(Error::connectivity(format!(
                "data directory {} unavailable: {}",
                dir.display(),
                e
            ))),
        }
    }

    fn append(dir: &Path, path: &Path, record: &PredictionRecord) -> Result<()> {
        Self::ensure_reachable(dir)?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::persistence(format!("cannot open {}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::persistence(format!("write to {} failed: {}", path.display(), e)))
    }

    fn read_all(dir: &Path, path: &Path) -> Result<Vec<PredictionRecord>> {
        Self::ensure_reachable(dir)?;

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::persistence(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| Error::persistence(format!("read failed: {}", e)))?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<PredictionRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = number + 1, error = %e, "Skipping unreadable prediction document"),
            }
        }

        Ok(records)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &Path) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner.dir, &inner.path))
            .await
            .map_err(|e| Error::internal(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl PredictionRepository for JsonlRepository {
    async fn save(&self, input: NewPrediction) -> Result<PredictionRecord> {
        let _guard = self.inner.write_lock.lock().await;
        let record = PredictionRecord::create(input);

        let written = record.clone();
        self.blocking(move |dir, path| Self::append(dir, path, &written))
            .await?;

        debug!(id = %record.id, "Prediction stored");
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PredictionRecord>> {
        let records = self.blocking(Self::read_all).await?;
        Ok(records.into_iter().find(|r| r.id == id))
    }

    async fn list(&self, page: Page) -> Result<Vec<PredictionRecord>> {
        let mut records = self.blocking(Self::read_all).await?;
        sort_newest_first(&mut records);
        Ok(page.slice(records))
    }

    async fn ping(&self) -> Result<()> {
        self.blocking(|dir, _| Self::ensure_reachable(dir)).await
    }

    fn backend(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dermascan_core::LabelScore;
    use tempfile::TempDir;

    fn sample(name: &str) -> NewPrediction {
        NewPrediction::new(
            name,
            vec![
                LabelScore::new("Melanocytic nevi (Melanositik nevüs)", 0.91),
                LabelScore::new("Melanoma (Melanom)", 0.05),
            ],
        )
    }

    #[tokio::test]
    async fn test_save_writes_one_line() {
        let dir = TempDir::new().unwrap();
        let repo = JsonlRepository::open(dir.path());

        let record = repo.save(sample("lesion.jpg")).await.unwrap();

        let contents = std::fs::read_to_string(repo.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);

        let doc: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(doc["id"], record.id.to_string());
        assert_eq!(doc["filename"], "lesion.jpg");
        assert_eq!(doc["predictions"][0]["label"], "Melanocytic nevi (Melanositik nevüs)");
        assert!(doc["created_at"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let saved = {
            let repo = JsonlRepository::open(dir.path());
            repo.save(sample("a.jpg")).await.unwrap()
        };

        let repo = JsonlRepository::open(dir.path());
        let found = repo.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(found.filename, "a.jpg");
        assert_eq!(found.created_at, saved.created_at);
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = JsonlRepository::open(dir.path());
        assert!(repo.list(Page::first()).await.unwrap().is_empty());
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let repo = JsonlRepository::open(dir.path());
        repo.save(sample("good.jpg")).await.unwrap();

        let mut file = OpenOptions::new().append(true).open(repo.path()).unwrap();
        writeln!(file, "{{not json").unwrap();

        let listed = repo.list(Page::first()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_connectivity_error() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let repo = JsonlRepository::open(&data);
        std::fs::remove_dir_all(&data).unwrap();

        let err = repo.save(sample("x.jpg")).await.unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));

        let err = repo.list(Page::first()).await.unwrap_err();
        assert!(err.is_store_failure());
        assert!(repo.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_uncreatable_directory_degrades() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let repo = JsonlRepository::open(blocker.join("data"));
        let err = repo.save(sample("x.jpg")).await.unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
    }
}
