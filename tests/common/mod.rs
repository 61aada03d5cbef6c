//! Shared fixtures: a repository that can be told to fail, and a coordinator
//! wired to one of them per tier.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use tiered_cache::cache::CacheCoordinator;
use tiered_cache::config::Config;
use tiered_cache::error::RepositoryError;
use tiered_cache::repository::{MemoryRepository, Repository};
use tiered_cache::CacheLevel;

/// In-memory repository with switchable failures, call counting and TTL capture.
pub struct FlakyRepository {
    inner: MemoryRepository,
    failing: AtomicBool,
    calls: AtomicUsize,
    last_ttl: Mutex<Option<u64>>,
}

impl FlakyRepository {
    pub fn new(driver: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRepository::new(driver),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_ttl: Mutex::new(None),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_ttl(&self) -> Option<u64> {
        *self.last_ttl.lock().unwrap()
    }

    /// Whether the underlying map holds `key`, bypassing failure injection.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.has(key).await.unwrap()
    }

    /// Write straight into the underlying map.
    pub async fn seed(&self, key: &str, value: Value) {
        self.inner.put(key, value, 0).await.unwrap();
    }

    fn check(&self) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::Backend("injected failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn record_ttl(&self, ttl: u64) {
        *self.last_ttl.lock().unwrap() = Some(ttl);
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    fn driver(&self) -> &str {
        self.inner.driver()
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn has(&self, key: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        self.inner.has(key).await
    }

    async fn put(&self, key: &str, value: Value, ttl: u64) -> Result<bool, RepositoryError> {
        self.check()?;
        self.record_ttl(ttl);
        self.inner.put(key, value, ttl).await
    }

    async fn forget(&self, key: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        self.inner.forget(key).await
    }

    async fn flush(&self) -> Result<bool, RepositoryError> {
        self.check()?;
        self.inner.flush().await
    }

    fn supports_tags(&self) -> bool {
        self.inner.supports_tags()
    }

    async fn has_tagged(&self, tags: &[String], key: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        self.inner.has_tagged(tags, key).await
    }

    async fn get_tagged(&self, tags: &[String], key: &str) -> Result<Option<Value>, RepositoryError> {
        self.check()?;
        self.inner.get_tagged(tags, key).await
    }

    async fn put_tagged(
        &self,
        tags: &[String],
        key: &str,
        value: Value,
        ttl: u64,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        self.record_ttl(ttl);
        self.inner.put_tagged(tags, key, value, ttl).await
    }

    async fn forget_tagged(&self, tags: &[String], key: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        self.inner.forget_tagged(tags, key).await
    }

    async fn flush_tags(&self, tags: &[String]) -> Result<Option<usize>, RepositoryError> {
        self.check()?;
        self.inner.flush_tags(tags).await
    }

    async fn keys(&self) -> Result<Option<Vec<String>>, RepositoryError> {
        self.check()?;
        self.inner.keys().await
    }
}

/// One flaky repository per tier.
pub struct Tiers {
    pub request: Arc<FlakyRepository>,
    pub memory: Arc<FlakyRepository>,
    pub database: Arc<FlakyRepository>,
}

impl Tiers {
    pub fn get(&self, level: CacheLevel) -> &Arc<FlakyRepository> {
        match level {
            CacheLevel::Request => &self.request,
            CacheLevel::Memory => &self.memory,
            CacheLevel::Database => &self.database,
        }
    }
}

/// Defaults with the database tier on an in-memory driver, so re-enabling
/// it through the factory never touches disk.
pub fn test_config() -> Config {
    let mut config = Config::default();
    if let Some(database) = config.levels.get_mut(&CacheLevel::Database) {
        database.driver = "memory".to_string();
        database.path = None;
    }
    config
}

pub fn coordinator_with(config: Config) -> (CacheCoordinator, Tiers) {
    let tiers = Tiers {
        request: FlakyRepository::new("array"),
        memory: FlakyRepository::new("memory"),
        database: FlakyRepository::new("file"),
    };
    let cache = CacheCoordinator::builder(config)
        .repository(CacheLevel::Request, tiers.request.clone())
        .repository(CacheLevel::Memory, tiers.memory.clone())
        .repository(CacheLevel::Database, tiers.database.clone())
        .build()
        .unwrap();
    (cache, tiers)
}

pub fn coordinator() -> (CacheCoordinator, Tiers) {
    coordinator_with(test_config())
}
