//! In-process repository with lazy expiry and native tags.
//!
//! Serves both the request tier (`array` driver, never expires) and the
//! shared memory tier.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::repository::Repository;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    tags: BTreeSet<String>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    fn carries(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

/// A map guarded by an async RwLock.
pub struct MemoryRepository {
    driver: String,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryRepository {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    async fn lookup(&self, tags: &[String], key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|e| e.is_live(now) && e.carries(tags))
            .map(|e| e.value.clone())
    }

    async fn store(&self, tags: &[String], key: &str, value: Value, ttl: u64) -> bool {
        let expires_at = (ttl > 0).then(|| Instant::now() + Duration::from_secs(ttl));
        let entry = Entry {
            value,
            expires_at,
            tags: tags.iter().cloned().collect(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        true
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn driver(&self) -> &str {
        &self.driver
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.lookup(&[], key).await)
    }

    async fn has(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.lookup(&[], key).await.is_some())
    }

    async fn put(&self, key: &str, value: Value, ttl: u64) -> Result<bool, RepositoryError> {
        Ok(self.store(&[], key, value, ttl).await)
    }

    async fn forget(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn flush(&self) -> Result<bool, RepositoryError> {
        self.entries.write().await.clear();
        Ok(true)
    }

    fn supports_tags(&self) -> bool {
        true
    }

    async fn has_tagged(&self, tags: &[String], key: &str) -> Result<bool, RepositoryError> {
        Ok(self.lookup(tags, key).await.is_some())
    }

    async fn get_tagged(&self, tags: &[String], key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.lookup(tags, key).await)
    }

    async fn put_tagged(
        &self,
        tags: &[String],
        key: &str,
        value: Value,
        ttl: u64,
    ) -> Result<bool, RepositoryError> {
        Ok(self.store(tags, key, value, ttl).await)
    }

    async fn flush_tags(&self, tags: &[String]) -> Result<Option<usize>, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !tags.iter().any(|t| e.tags.contains(t)));
        Ok(Some(before - entries.len()))
    }

    async fn keys(&self) -> Result<Option<Vec<String>>, RepositoryError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(Some(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_null_is_present() {
        let repo = MemoryRepository::new("memory");
        repo.put("k", Value::Null, 60).await.unwrap();
        assert!(repo.has("k").await.unwrap());
        assert_eq!(repo.get("k").await.unwrap(), Some(Value::Null));
        assert!(!repo.has("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry() {
        let repo = MemoryRepository::new("memory");
        repo.put("k", json!(1), 1).await.unwrap();
        assert!(repo.has("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!repo.has("k").await.unwrap());
        assert_eq!(repo.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let repo = MemoryRepository::new("array");
        repo.put("k", json!("v"), 0).await.unwrap();
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_tag_scoping_and_flush() {
        let repo = MemoryRepository::new("memory");
        let ip = vec!["ip".to_string()];
        repo.put_tagged(&ip, "a", json!(1), 60).await.unwrap();
        repo.put("b", json!(2), 60).await.unwrap();

        assert!(repo.has_tagged(&ip, "a").await.unwrap());
        assert!(!repo.has_tagged(&ip, "b").await.unwrap());

        assert_eq!(repo.flush_tags(&ip).await.unwrap(), Some(1));
        assert!(!repo.has("a").await.unwrap());
        assert!(repo.has("b").await.unwrap());
    }
}
