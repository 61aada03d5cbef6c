//! Cache coordinator: orchestrates reads and writes across tiers.
//!
//! The coordinator is the central entry point for the tiered cache. It:
//! - Walks tiers closest-first on reads and backfills faster tiers on a hit
//! - Fans writes out to every target tier with a per-tier TTL
//! - Tracks written keys and tags for invalidation
//! - Wraps every repository call in retry, circuit breaker and error hooks
//!
//! Invalidation, tier lifecycle and the error/event surface live in sibling
//! modules as further `impl CacheCoordinator` blocks.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::key::{CacheKey, IntoCacheKey};
use crate::cache::level::{self, CacheLevel};
use crate::cache::stats::OperationStats;
use crate::cache::tracker::{KeyIndex, TrackedIndex};
use crate::cache::ttl;
use crate::config::Config;
use crate::error::{CacheError, RepositoryError, Result};
use crate::events::{EventBus, CACHE_FLUSH};
use crate::metrics::CacheMetrics;
use crate::repository::{DefaultRepositoryFactory, MemoryRepository, Repository, RepositoryFactory};
use crate::resilience::{CacheOperation, FallbackContext, Resilience, TierFailure};

/// A tier's enabled flag and live repository handle.
#[derive(Clone)]
pub(crate) struct LevelSlot {
    pub(crate) enabled: bool,
    pub(crate) repository: Option<Arc<dyn Repository>>,
}

/// What happened at one tier during a fan-out write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum TierOutcome {
    Written,
    Failed(String),
}

/// Per-tier results of a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub outcomes: BTreeMap<CacheLevel, TierOutcome>,
}

impl WriteReport {
    /// At least one tier was attempted and none failed.
    pub fn succeeded(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .values()
                .all(|outcome| *outcome == TierOutcome::Written)
    }

    pub fn any_written(&self) -> bool {
        self.outcomes
            .values()
            .any(|outcome| *outcome == TierOutcome::Written)
    }

    pub fn failed_levels(&self) -> Vec<CacheLevel> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TierOutcome::Failed(_)))
            .map(|(level, _)| *level)
            .collect()
    }
}

/// Result of walking tiers for a key.
struct ReadOutcome {
    hit: Option<(CacheLevel, Value)>,
    failed: Vec<CacheLevel>,
}

/// The multi-tier cache coordinator.
pub struct CacheCoordinator {
    pub(crate) config: RwLock<Config>,
    pub(crate) levels: RwLock<BTreeMap<CacheLevel, LevelSlot>>,
    pub(crate) factory: Arc<dyn RepositoryFactory>,
    pub(crate) index: Mutex<Box<dyn KeyIndex>>,
    pub(crate) stats: Mutex<OperationStats>,
    pub(crate) resilience: Mutex<Resilience>,
    pub(crate) events: EventBus,
    pub(crate) metrics: CacheMetrics,
}

/// Assembles a [`CacheCoordinator`].
pub struct CacheCoordinatorBuilder {
    config: Config,
    factory: Arc<dyn RepositoryFactory>,
    index: Box<dyn KeyIndex>,
    repositories: BTreeMap<CacheLevel, Arc<dyn Repository>>,
    event_store: Option<Arc<dyn Repository>>,
}

impl CacheCoordinatorBuilder {
    /// Factory used for tiers without an explicit repository and on re-enable.
    pub fn factory(mut self, factory: Arc<dyn RepositoryFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `repository` for `level` instead of building one.
    pub fn repository(mut self, level: CacheLevel, repository: Arc<dyn Repository>) -> Self {
        self.repositories.insert(level, repository);
        self
    }

    /// Replace the default key/tag index.
    pub fn index(mut self, index: Box<dyn KeyIndex>) -> Self {
        self.index = index;
        self
    }

    /// Where queued events are persisted (defaults to an in-process map).
    pub fn event_store(mut self, store: Arc<dyn Repository>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn build(mut self) -> Result<CacheCoordinator> {
        let mut levels = BTreeMap::new();
        for level in CacheLevel::by_priority() {
            let level_config = self.config.level(level);
            let repository = match self.repositories.remove(&level) {
                Some(repository) => Some(repository),
                None if level_config.enabled => match self.factory.create(level, &level_config) {
                    Ok(repository) => Some(repository),
                    Err(e) => {
                        warn!(level = %level, error = %e, "Failed to create repository, tier disabled");
                        None
                    }
                },
                None => None,
            };
            let enabled = level_config.enabled && repository.is_some();
            levels.insert(level, LevelSlot { enabled, repository });
        }

        let metrics = CacheMetrics::new()
            .map_err(|e| CacheError::Configuration(format!("metrics registry: {e}")))?;
        let event_store = self
            .event_store
            .unwrap_or_else(|| Arc::new(MemoryRepository::new("memory")));

        info!(
            enabled = ?levels.iter().filter(|(_, s)| s.enabled).map(|(l, _)| l.name()).collect::<Vec<_>>(),
            "Cache coordinator ready"
        );

        Ok(CacheCoordinator {
            levels: RwLock::new(levels),
            factory: self.factory,
            index: Mutex::new(self.index),
            stats: Mutex::new(OperationStats::default()),
            resilience: Mutex::new(Resilience::new(self.config.error_handling.clone())),
            events: EventBus::new(self.config.integration.clone(), event_store),
            metrics,
            config: RwLock::new(self.config),
        })
    }
}

impl CacheCoordinator {
    /// Coordinator with the built-in repositories.
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> CacheCoordinatorBuilder {
        CacheCoordinatorBuilder {
            config,
            factory: Arc::new(DefaultRepositoryFactory),
            index: Box::new(TrackedIndex::new()),
            repositories: BTreeMap::new(),
            event_store: None,
        }
    }

    // ─── Tier plumbing ─────────────────────────────────────────────────────

    /// Repository for `level` if the tier is enabled.
    pub(crate) async fn active_repository(&self, level: CacheLevel) -> Option<Arc<dyn Repository>> {
        let levels = self.levels.read().await;
        levels
            .get(&level)
            .filter(|slot| slot.enabled)
            .and_then(|slot| slot.repository.clone())
    }

    /// Whether tag-scoped calls should be used at `level`.
    pub(crate) async fn tagging_enabled(&self, level: CacheLevel) -> bool {
        level.supports_tagging() && self.config.read().await.level(level).supports_tagging
    }

    pub(crate) fn targets(levels: Option<&[CacheLevel]>) -> Vec<CacheLevel> {
        match levels {
            Some(levels) => level::ordered(levels),
            None => CacheLevel::by_priority(),
        }
    }

    /// Run a repository call with breaker check, retries and failure reporting.
    pub(crate) async fn call<T, F, Fut>(
        &self,
        level: CacheLevel,
        operation: CacheOperation,
        key: Option<&str>,
        f: F,
    ) -> std::result::Result<T, RepositoryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, RepositoryError>>,
    {
        let attempts = {
            let mut resilience = self.resilience.lock().await;
            if !resilience.allow(level, Instant::now()) {
                let error = RepositoryError::CircuitOpen(level);
                drop(resilience);
                self.report_failure(level, operation, key, &error).await;
                return Err(error);
            }
            resilience.attempts()
        };

        let mut attempt = 1;
        let error = loop {
            match f().await {
                Ok(value) => {
                    self.resilience.lock().await.record_success(level);
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    debug!(level = %level, operation = %operation, attempt, error = %e, "Retrying tier call");
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        let opened = self
            .resilience
            .lock()
            .await
            .record_failure(level, Instant::now());
        if opened {
            warn!(level = %level, "Circuit opened after repeated failures");
        }
        self.report_failure(level, operation, key, &error).await;
        Err(error)
    }

    async fn report_failure(
        &self,
        level: CacheLevel,
        operation: CacheOperation,
        key: Option<&str>,
        error: &RepositoryError,
    ) {
        if matches!(error, RepositoryError::CircuitOpen(_)) {
            debug!(level = %level, operation = %operation, "Skipping tier with open circuit");
        } else {
            warn!(level = %level, operation = %operation, key, error = %error, "Tier call failed");
        }
        self.metrics.tier_error(level, error.kind());

        let handlers = self.resilience.lock().await.handlers_for(error.kind());
        let failure = TierFailure {
            level,
            operation,
            key,
            error,
        };
        for handler in handlers {
            handler(&failure);
        }
    }

    async fn record_stats<F: FnOnce(&mut OperationStats)>(&self, f: F) {
        if self.config.read().await.features.statistics_tracking {
            f(&mut *self.stats.lock().await);
        }
    }

    // ─── Read path ─────────────────────────────────────────────────────────

    /// Walk `levels` in order; stop at the first tier holding the key.
    async fn read(&self, key: &CacheKey, levels: &[CacheLevel], backfill: bool) -> ReadOutcome {
        let rendered = key.as_str();
        let tags = key.tag_list();
        let mut failed = Vec::new();

        for &level in levels {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };
            let tagged = key.has_tags() && self.tagging_enabled(level).await;

            let found = if tagged {
                self.call(level, CacheOperation::Get, Some(rendered), || {
                    repo.get_tagged(&tags, rendered)
                })
                .await
            } else {
                self.call(level, CacheOperation::Get, Some(rendered), || repo.get(rendered))
                    .await
            };

            match found {
                Ok(Some(value)) => {
                    debug!(level = %level, key = rendered, "Cache hit");
                    self.metrics.hit(level);
                    if backfill {
                        self.backfill(key, &value, level).await;
                    }
                    return ReadOutcome {
                        hit: Some((level, value)),
                        failed,
                    };
                }
                Ok(None) => continue,
                Err(_) => failed.push(level),
            }
        }

        ReadOutcome { hit: None, failed }
    }

    /// Copy a value into every enabled tier closer than `found_at`.
    async fn backfill(&self, key: &CacheKey, value: &Value, found_at: CacheLevel) {
        for level in found_at.faster() {
            if self.active_repository(level).await.is_none() {
                continue;
            }
            let outcome = self.write_level(key, value, None, level).await;
            if outcome == TierOutcome::Written {
                self.metrics.backfill(level);
                debug!(from = %found_at, to = %level, key = key.as_str(), "Backfilled value");
            }
        }
    }

    /// Look a key up, distinguishing a stored `null` (`Some(Value::Null)`)
    /// from absence (`None`).
    pub async fn lookup(
        &self,
        key: impl IntoCacheKey,
        levels: Option<&[CacheLevel]>,
    ) -> Result<Option<Value>> {
        let key = key.into_cache_key()?;
        Ok(self.lookup_key(&key, levels).await)
    }

    pub(crate) async fn lookup_key(&self, key: &CacheKey, levels: Option<&[CacheLevel]>) -> Option<Value> {
        let started = Instant::now();
        let targets = Self::targets(levels);
        let outcome = self.read(key, &targets, true).await;
        let hit = outcome.hit.is_some();

        self.record_stats(|stats| {
            stats.gets += 1;
            if hit {
                stats.record_hit();
            } else {
                stats.record_miss();
            }
            stats.record_operation(started.elapsed());
        })
        .await;

        if let Some((_, value)) = outcome.hit {
            return Some(value);
        }

        self.metrics.miss();
        if outcome.failed.is_empty() {
            return None;
        }

        let fallback = self
            .resilience
            .lock()
            .await
            .fallback_for(CacheOperation::Get);
        fallback.and_then(|fallback| {
            fallback(&FallbackContext {
                operation: CacheOperation::Get,
                key: Some(key.as_str()),
                failed_levels: &outcome.failed,
            })
        })
    }

    /// Value for `key`, or `default` when no tier holds it.
    pub async fn get(&self, key: impl IntoCacheKey, default: Value) -> Result<Value> {
        Ok(self.lookup(key, None).await?.unwrap_or(default))
    }

    pub async fn get_with_levels(
        &self,
        key: impl IntoCacheKey,
        default: Value,
        levels: &[CacheLevel],
    ) -> Result<Value> {
        Ok(self.lookup(key, Some(levels)).await?.unwrap_or(default))
    }

    /// Read a single tier by numeric id. No fallback, no backfill.
    pub async fn get_from_level(&self, level_id: u8, key: impl IntoCacheKey) -> Result<Option<Value>> {
        let level = level_from_id(level_id)?;
        let key = key.into_cache_key()?;
        Ok(self.read(&key, &[level], false).await.hit.map(|(_, value)| value))
    }

    /// Whether any target tier holds the key.
    pub async fn has(&self, key: impl IntoCacheKey) -> Result<bool> {
        self.has_with_levels(key, &CacheLevel::by_priority()).await
    }

    pub async fn has_with_levels(&self, key: impl IntoCacheKey, levels: &[CacheLevel]) -> Result<bool> {
        let key = key.into_cache_key()?;
        let rendered = key.as_str();
        let tags = key.tag_list();

        for level in level::ordered(levels) {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };
            let tagged = key.has_tags() && self.tagging_enabled(level).await;
            let present = if tagged {
                self.call(level, CacheOperation::Has, Some(rendered), || {
                    repo.has_tagged(&tags, rendered)
                })
                .await
            } else {
                self.call(level, CacheOperation::Has, Some(rendered), || repo.has(rendered))
                    .await
            };
            if matches!(present, Ok(true)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ─── Write path ────────────────────────────────────────────────────────

    /// Write one tier and track the key on success.
    async fn write_level(
        &self,
        key: &CacheKey,
        value: &Value,
        explicit_ttl: Option<u64>,
        level: CacheLevel,
    ) -> TierOutcome {
        let Some(repo) = self.active_repository(level).await else {
            return TierOutcome::Failed(RepositoryError::Detached(level).to_string());
        };
        let rendered = key.as_str();
        let ttl = {
            let config = self.config.read().await;
            ttl::resolve(&config, level, key, explicit_ttl)
        };
        let tags = key.tag_list();
        let tagged = key.has_tags() && self.tagging_enabled(level).await;

        let result = if tagged {
            self.call(level, CacheOperation::Put, Some(rendered), || {
                repo.put_tagged(&tags, rendered, value.clone(), ttl)
            })
            .await
        } else {
            self.call(level, CacheOperation::Put, Some(rendered), || {
                repo.put(rendered, value.clone(), ttl)
            })
            .await
        };

        let outcome = match result {
            Ok(true) => {
                self.index.lock().await.track(level, rendered, key.tags());
                TierOutcome::Written
            }
            Ok(false) => TierOutcome::Failed("repository rejected the write".to_string()),
            Err(e) => TierOutcome::Failed(e.to_string()),
        };
        self.metrics.write(level, outcome == TierOutcome::Written);
        outcome
    }

    /// Fan a write out and report every tier's outcome.
    ///
    /// Disabled tiers are not attempted and do not appear in the report.
    pub async fn put_detailed(
        &self,
        key: impl IntoCacheKey,
        value: Value,
        ttl: Option<u64>,
        levels: Option<&[CacheLevel]>,
    ) -> Result<WriteReport> {
        let key = key.into_cache_key()?;
        Ok(self.write_key(&key, &value, ttl, levels).await)
    }

    pub(crate) async fn write_key(
        &self,
        key: &CacheKey,
        value: &Value,
        ttl: Option<u64>,
        levels: Option<&[CacheLevel]>,
    ) -> WriteReport {
        let started = Instant::now();
        let mut report = WriteReport::default();

        for level in Self::targets(levels) {
            if self.active_repository(level).await.is_none() {
                continue;
            }
            let outcome = self.write_level(key, value, ttl, level).await;
            report.outcomes.insert(level, outcome);
        }

        if !report.succeeded() {
            warn!(
                key = key.as_str(),
                failed = ?report.failed_levels(),
                "Write did not reach every tier"
            );
        }

        let index_bytes = self.index.lock().await.approximate_bytes();
        let any_written = report.any_written();
        self.record_stats(|stats| {
            if any_written {
                stats.puts += 1;
            }
            stats.sample_memory(index_bytes);
            stats.record_operation(started.elapsed());
        })
        .await;

        report
    }

    /// Write to every enabled tier. `true` only when no tier failed.
    pub async fn put(&self, key: impl IntoCacheKey, value: Value, ttl: Option<u64>) -> Result<bool> {
        Ok(self.put_detailed(key, value, ttl, None).await?.succeeded())
    }

    pub async fn put_with_levels(
        &self,
        key: impl IntoCacheKey,
        value: Value,
        ttl: Option<u64>,
        levels: &[CacheLevel],
    ) -> Result<bool> {
        Ok(self.put_detailed(key, value, ttl, Some(levels)).await?.succeeded())
    }

    /// Write a single tier by numeric id.
    pub async fn put_to_level(
        &self,
        level_id: u8,
        key: impl IntoCacheKey,
        value: Value,
        ttl: Option<u64>,
    ) -> Result<bool> {
        let level = level_from_id(level_id)?;
        self.put_with_levels(key, value, ttl, &[level]).await
    }

    /// Return the cached value or compute, store and return it.
    pub async fn remember<F, Fut, E>(&self, key: impl IntoCacheKey, ttl: Option<u64>, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let key = key.into_cache_key()?;
        self.remember_key(&key, ttl, None, producer).await
    }

    /// `remember` with the longest TTL each tier allows.
    pub async fn remember_forever<F, Fut, E>(&self, key: impl IntoCacheKey, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.remember(key, Some(u64::MAX), producer).await
    }

    pub(crate) async fn remember_key<F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Option<u64>,
        levels: Option<&[CacheLevel]>,
        producer: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(value) = self.lookup_key(key, levels).await {
            return Ok(value);
        }

        let value = producer().await.map_err(|e| CacheError::Producer(e.into()))?;
        self.write_key(key, &value, ttl, levels).await;
        Ok(value)
    }

    // ─── Deletes and flushes ───────────────────────────────────────────────

    pub async fn forget(&self, key: impl IntoCacheKey) -> Result<bool> {
        let key = key.into_cache_key()?;
        Ok(self.forget_key(&key, None).await)
    }

    pub async fn forget_with_levels(&self, key: impl IntoCacheKey, levels: &[CacheLevel]) -> Result<bool> {
        let key = key.into_cache_key()?;
        Ok(self.forget_key(&key, Some(levels)).await)
    }

    /// Remove a key from every target tier. `true` when no tier failed.
    pub(crate) async fn forget_key(&self, key: &CacheKey, levels: Option<&[CacheLevel]>) -> bool {
        let started = Instant::now();
        let rendered = key.as_str();
        let tags = key.tag_list();
        let mut all_ok = true;
        let mut any_ok = false;

        for level in Self::targets(levels) {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };
            let tagged = key.has_tags() && self.tagging_enabled(level).await;
            let result = if tagged {
                self.call(level, CacheOperation::Forget, Some(rendered), || {
                    repo.forget_tagged(&tags, rendered)
                })
                .await
            } else {
                self.call(level, CacheOperation::Forget, Some(rendered), || repo.forget(rendered))
                    .await
            };

            match result {
                Ok(_) => {
                    any_ok = true;
                    self.index.lock().await.untrack(level, rendered);
                }
                Err(_) => all_ok = false,
            }
        }

        self.record_stats(|stats| {
            if any_ok {
                stats.deletes += 1;
            }
            stats.record_operation(started.elapsed());
        })
        .await;

        all_ok
    }

    /// Flush every tier.
    pub async fn flush(&self) -> Result<bool> {
        Ok(self.flush_targets(None).await)
    }

    pub async fn flush_levels(&self, levels: &[CacheLevel]) -> Result<bool> {
        Ok(self.flush_targets(Some(levels)).await)
    }

    pub(crate) async fn flush_targets(&self, levels: Option<&[CacheLevel]>) -> bool {
        let (all_ok, flushed) = self.flush_tiers(levels).await;

        info!(levels = ?flushed, ok = all_ok, "Flushed cache tiers");
        self.events
            .emit(CACHE_FLUSH, serde_json::json!({ "levels": flushed, "ok": all_ok }))
            .await;
        all_ok
    }

    /// Close a request scope: drop everything the Request tier holds.
    ///
    /// Same as `flush_levels(&[CacheLevel::Request])` but without the
    /// `cache.flush` event, since hosts call it once per request.
    pub async fn end_request_scope(&self) -> bool {
        let (ok, _) = self.flush_tiers(Some(&[CacheLevel::Request][..])).await;
        debug!(ok, "Closed request scope");
        ok
    }

    async fn flush_tiers(&self, levels: Option<&[CacheLevel]>) -> (bool, Vec<&'static str>) {
        let mut all_ok = true;
        let mut flushed = Vec::new();

        for level in Self::targets(levels) {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };
            match self.call(level, CacheOperation::Flush, None, || repo.flush()).await {
                Ok(true) => {
                    self.index.lock().await.clear_level(level);
                    flushed.push(level.name());
                }
                Ok(false) | Err(_) => all_ok = false,
            }
        }
        (all_ok, flushed)
    }

    /// Flush every tier and drop all tracking, including for disabled tiers.
    pub async fn clear(&self) -> Result<bool> {
        let ok = self.flush_targets(None).await;
        let mut index = self.index.lock().await;
        for level in CacheLevel::by_priority() {
            index.clear_level(level);
        }
        Ok(ok)
    }

    /// Flush a single tier by numeric id.
    pub async fn invalidate_level(&self, level_id: u8) -> Result<bool> {
        let level = level_from_id(level_id)?;
        self.flush_levels(&[level]).await
    }

    // ─── Statistics ────────────────────────────────────────────────────────

    pub async fn operation_stats(&self) -> crate::cache::stats::StatsSnapshot {
        self.stats.lock().await.snapshot()
    }

    pub async fn reset_stats(&self) {
        self.stats.lock().await.reset();
    }

    /// Prometheus text exposition of tier counters.
    pub fn metrics_text(&self) -> std::result::Result<String, prometheus::Error> {
        self.metrics.render()
    }

    /// Snapshot of the active configuration.
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Keys tracked at `level`.
    pub async fn tracked_keys(&self, level: CacheLevel) -> Vec<String> {
        self.index.lock().await.keys(level)
    }
}

pub(crate) fn level_from_id(id: u8) -> Result<CacheLevel> {
    CacheLevel::from_id(id).ok_or_else(|| CacheError::UnknownLevel(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_only() -> Config {
        let mut config = Config::default();
        config
            .levels
            .entry(CacheLevel::Database)
            .or_default()
            .enabled = false;
        config
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = CacheCoordinator::new(memory_only()).unwrap();
        assert!(cache.put("ip:1.2.3.4", json!({"score": 10}), Some(3600)).await.unwrap());
        assert_eq!(
            cache.get("ip:1.2.3.4", Value::Null).await.unwrap(),
            json!({"score": 10})
        );
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let cache = CacheCoordinator::new(memory_only()).unwrap();
        let err = cache.put("bad key", json!(1), None).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
        assert!(cache.get("", json!(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_write_report_only_lists_enabled_tiers() {
        let cache = CacheCoordinator::new(memory_only()).unwrap();
        let report = cache.put_detailed("k", json!(1), None, None).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(
            report.outcomes.keys().copied().collect::<Vec<_>>(),
            vec![CacheLevel::Request, CacheLevel::Memory]
        );
    }

    #[tokio::test]
    async fn test_unknown_level_id() {
        let cache = CacheCoordinator::new(memory_only()).unwrap();
        assert!(matches!(
            cache.get_from_level(7, "k").await,
            Err(CacheError::UnknownLevel(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let cache = CacheCoordinator::new(memory_only()).unwrap();
        cache.put("a", json!(1), None).await.unwrap();
        cache.get("a", Value::Null).await.unwrap();
        cache.get("b", Value::Null).await.unwrap();
        cache.forget("a").await.unwrap();

        let stats = cache.operation_stats().await;
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.operations_count, 4);

        cache.reset_stats().await;
        assert_eq!(cache.operation_stats().await.gets, 0);
    }
}
