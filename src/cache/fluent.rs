//! Chainable per-call options.
//!
//! ```ignore
//! cache.tags(["ip", "reputation"]).levels(&[CacheLevel::Memory]).ttl(600)
//!     .put("ip:1.2.3.4", json!({"score": 12})).await?;
//! ```
//!
//! Each handle is consumed by its terminal call, so options never leak into
//! later operations.

use std::future::Future;

use serde_json::Value;

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::key::IntoCacheKey;
use crate::cache::level::CacheLevel;
use crate::error::Result;

/// Options gathered before a single cache operation.
pub struct FluentCache<'a> {
    cache: &'a CacheCoordinator,
    tags: Vec<String>,
    prefix: Option<String>,
    levels: Option<Vec<CacheLevel>>,
    ttl: Option<u64>,
}

impl<'a> FluentCache<'a> {
    fn new(cache: &'a CacheCoordinator) -> Self {
        Self {
            cache,
            tags: Vec::new(),
            prefix: None,
            levels: None,
            ttl: None,
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn levels(mut self, levels: &[CacheLevel]) -> Self {
        self.levels = Some(levels.to_vec());
        self
    }

    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn key(&self, key: impl IntoCacheKey) -> Result<crate::cache::key::CacheKey> {
        let mut key = key.into_cache_key()?;
        if let Some(prefix) = &self.prefix {
            key = key.with_prefix(prefix);
        }
        key.with_tags(self.tags.iter().cloned()).validate()
    }

    pub async fn get(self, key: impl IntoCacheKey, default: Value) -> Result<Value> {
        let key = self.key(key)?;
        Ok(self
            .cache
            .lookup_key(&key, self.levels.as_deref())
            .await
            .unwrap_or(default))
    }

    pub async fn put(self, key: impl IntoCacheKey, value: Value) -> Result<bool> {
        let key = self.key(key)?;
        Ok(self
            .cache
            .write_key(&key, &value, self.ttl, self.levels.as_deref())
            .await
            .succeeded())
    }

    pub async fn remember<F, Fut, E>(self, key: impl IntoCacheKey, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let key = self.key(key)?;
        self.cache
            .remember_key(&key, self.ttl, self.levels.as_deref(), producer)
            .await
    }

    pub async fn forget(self, key: impl IntoCacheKey) -> Result<bool> {
        let key = self.key(key)?;
        Ok(self.cache.forget_key(&key, self.levels.as_deref()).await)
    }

    /// Flush the selected tiers, or drop the selected tags when tags are set.
    pub async fn flush(self) -> Result<bool> {
        if self.tags.is_empty() {
            return Ok(self.cache.flush_targets(self.levels.as_deref()).await);
        }
        self.cache
            .invalidate_by_tags(self.tags.as_slice(), self.levels.as_deref())
            .await?;
        Ok(true)
    }
}

impl CacheCoordinator {
    /// Start a call with no options set.
    pub fn fluent(&self) -> FluentCache<'_> {
        FluentCache::new(self)
    }

    /// Start a call scoped to `tags`.
    pub fn tags<I, S>(&self, tags: I) -> FluentCache<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FluentCache::new(self).tags(tags)
    }

    /// Start a call whose keys are rendered under `prefix`.
    pub fn prefix(&self, prefix: impl Into<String>) -> FluentCache<'_> {
        FluentCache::new(self).prefix(prefix)
    }

    /// Start a call limited to `levels`.
    pub fn levels(&self, levels: &[CacheLevel]) -> FluentCache<'_> {
        FluentCache::new(self).levels(levels)
    }

    pub fn ttl(&self, ttl: u64) -> FluentCache<'_> {
        FluentCache::new(self).ttl(ttl)
    }
}
