//! Persistent file-backed repository.
//!
//! Each entry is a JSON envelope compressed with zstd, written under a
//! two-level directory layout derived from the SHA-256 of the key:
//! `ab/abcdef....entry`. Uses tokio's async file I/O.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::error::RepositoryError;
use crate::repository::Repository;

const ZSTD_LEVEL: i32 = 3;

/// On-disk record.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: Value,
    /// Unix seconds; `None` never expires.
    expires_at: Option<i64>,
}

impl Envelope {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// I/O counters.
#[derive(Debug, Default)]
pub struct FileIoStats {
    pub total_writes: AtomicU64,
    pub total_reads: AtomicU64,
    pub total_bytes_written: AtomicU64,
    pub total_bytes_read: AtomicU64,
}

/// Durable store rooted at a directory.
pub struct FileRepository {
    root: PathBuf,
    stats: FileIoStats,
}

impl FileRepository {
    /// Directories are created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stats: FileIoStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> &FileIoStats {
        &self.stats
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(&digest[..2]).join(format!("{digest}.entry"))
    }

    async fn read_envelope(&self, path: &Path) -> Result<Option<Envelope>, RepositoryError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.stats.total_reads.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_bytes_read
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        let raw = zstd::decode_all(data.as_slice())?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Read a live envelope for `key`, deleting it if expired.
    async fn load(&self, key: &str) -> Result<Option<Envelope>, RepositoryError> {
        let path = self.entry_path(key);
        let Some(envelope) = self.read_envelope(&path).await? else {
            return Ok(None);
        };

        if envelope.is_live(now_secs()) {
            Ok(Some(envelope))
        } else {
            remove_if_exists(&path).await?;
            Ok(None)
        }
    }

    /// Walk every entry file under the root.
    async fn entry_files(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        let mut files = Vec::new();
        let mut shards = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.metadata().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "entry") {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl Repository for FileRepository {
    fn driver(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.load(key).await?.map(|e| e.value))
    }

    async fn has(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.load(key).await?.is_some())
    }

    async fn put(&self, key: &str, value: Value, ttl: u64) -> Result<bool, RepositoryError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let envelope = Envelope {
            key: key.to_string(),
            value,
            expires_at: (ttl > 0).then(|| now_secs() + ttl as i64),
        };
        let raw = serde_json::to_vec(&envelope)?;
        let data = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)?;

        fs::write(&path, &data).await?;

        debug!(
            key,
            path = %path.display(),
            size = data.len(),
            "Wrote cache entry to disk"
        );

        self.stats.total_writes.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        Ok(true)
    }

    async fn forget(&self, key: &str) -> Result<bool, RepositoryError> {
        remove_if_exists(&self.entry_path(key)).await
    }

    async fn flush(&self) -> Result<bool, RepositoryError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(root = %self.root.display(), "Flushed file repository");
        Ok(true)
    }

    async fn keys(&self) -> Result<Option<Vec<String>>, RepositoryError> {
        let now = now_secs();
        let mut keys = Vec::new();
        for path in self.entry_files().await? {
            if let Some(envelope) = self.read_envelope(&path).await? {
                if envelope.is_live(now) {
                    keys.push(envelope.key);
                }
            }
        }
        keys.sort();
        Ok(Some(keys))
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool, RepositoryError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read_entry() {
        let tmp = TempDir::new().unwrap();
        let repo = FileRepository::new(tmp.path().join("db"));

        repo.put("ip:1.2.3.4", json!({"score": 10}), 3600).await.unwrap();
        assert_eq!(
            repo.get("ip:1.2.3.4").await.unwrap(),
            Some(json!({"score": 10}))
        );
        assert_eq!(repo.stats().total_writes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_null_and_missing() {
        let tmp = TempDir::new().unwrap();
        let repo = FileRepository::new(tmp.path());

        repo.put("k", Value::Null, 0).await.unwrap();
        assert!(repo.has("k").await.unwrap());
        assert!(!repo.has("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_forget_and_flush() {
        let tmp = TempDir::new().unwrap();
        let repo = FileRepository::new(tmp.path().join("db"));

        repo.put("a", json!(1), 0).await.unwrap();
        repo.put("b", json!(2), 0).await.unwrap();
        assert!(repo.forget("a").await.unwrap());
        assert!(!repo.forget("a").await.unwrap());
        assert_eq!(repo.keys().await.unwrap(), Some(vec!["b".to_string()]));

        repo.flush().await.unwrap();
        assert!(!repo.has("b").await.unwrap());
        assert_eq!(repo.keys().await.unwrap(), Some(vec![]));
    }
}
