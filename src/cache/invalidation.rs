//! Bulk invalidation: by glob pattern, by tag and by namespace.

use serde_json::json;
use tracing::{debug, info};

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::level::CacheLevel;
use crate::cache::pattern::glob_to_regex;
use crate::error::{CacheError, Result};
use crate::events::CACHE_INVALIDATED;
use crate::resilience::CacheOperation;

impl CacheCoordinator {
    /// Remove every key matching a glob (`*`, `?`, `[..]`).
    ///
    /// Tiers that can enumerate keys are matched against their live key set;
    /// the rest only see keys the coordinator tracked. Returns the number of
    /// successful removals across tiers.
    pub async fn invalidate_by_pattern(&self, pattern: &str, levels: Option<&[CacheLevel]>) -> Result<usize> {
        if !self.config.read().await.features.pattern_invalidation {
            return Err(CacheError::FeatureDisabled("pattern_invalidation"));
        }
        let matcher = glob_to_regex(pattern)?;
        let mut removed = 0;

        for level in Self::targets(levels) {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };

            let enumerated = if level.supports_pattern_matching() {
                self.call(level, CacheOperation::Invalidate, None, || repo.keys())
                    .await
                    .ok()
                    .flatten()
            } else {
                None
            };
            let candidates = match enumerated {
                Some(keys) => keys,
                None => self.index.lock().await.keys(level),
            };

            for key in candidates.iter().filter(|key| matcher.is_match(key)) {
                let key = key.as_str();
                if self
                    .call(level, CacheOperation::Invalidate, Some(key), || repo.forget(key))
                    .await
                    .is_ok()
                {
                    self.index.lock().await.untrack(level, key);
                    removed += 1;
                }
            }
            debug!(level = %level, pattern, "Pattern invalidation pass done");
        }

        info!(pattern, removed, "Invalidated keys by pattern");
        self.events
            .emit(
                CACHE_INVALIDATED,
                json!({ "kind": "pattern", "pattern": pattern, "removed": removed }),
            )
            .await;
        Ok(removed)
    }

    /// Remove every key carrying any of `tags`.
    ///
    /// Tracked keys are forgotten individually; tiers with native tag support
    /// additionally get a tag flush for entries written elsewhere.
    pub async fn invalidate_by_tags<S: AsRef<str>>(
        &self,
        tags: &[S],
        levels: Option<&[CacheLevel]>,
    ) -> Result<usize> {
        if !self.config.read().await.features.tag_invalidation {
            return Err(CacheError::FeatureDisabled("tag_invalidation"));
        }
        let mut tags: Vec<String> = tags
            .iter()
            .map(|tag| tag.as_ref().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        if tags.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        for level in Self::targets(levels) {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };

            let keys = self.index.lock().await.keys_for_tags(level, &tags);
            for key in &keys {
                let key = key.as_str();
                if self
                    .call(level, CacheOperation::Invalidate, Some(key), || repo.forget(key))
                    .await
                    .is_ok()
                {
                    self.index.lock().await.untrack(level, key);
                    removed += 1;
                }
            }

            if self.tagging_enabled(level).await && repo.supports_tags() {
                if let Ok(Some(extra)) = self
                    .call(level, CacheOperation::Invalidate, None, || repo.flush_tags(&tags))
                    .await
                {
                    removed += extra;
                }
            }
            self.index.lock().await.remove_tags(level, &tags);
        }

        info!(tags = ?tags, removed, "Invalidated keys by tag");
        self.events
            .emit(
                CACHE_INVALIDATED,
                json!({ "kind": "tags", "tags": tags, "removed": removed }),
            )
            .await;
        Ok(removed)
    }

    /// Remove every tracked key rendered under `namespace`, prefixed or not.
    pub async fn invalidate_by_namespace(&self, namespace: &str, levels: Option<&[CacheLevel]>) -> Result<usize> {
        let namespace = namespace.trim().trim_end_matches(':');
        if namespace.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: namespace.to_string(),
                reason: "namespace must not be empty".to_string(),
            });
        }
        let marker = format!("{namespace}:");
        let nested = format!(":{marker}");
        let mut removed = 0;

        for level in Self::targets(levels) {
            let Some(repo) = self.active_repository(level).await else {
                continue;
            };
            let keys: Vec<String> = self
                .index
                .lock()
                .await
                .keys(level)
                .into_iter()
                .filter(|key| key.starts_with(&marker) || key.contains(&nested))
                .collect();

            for key in &keys {
                let key = key.as_str();
                if self
                    .call(level, CacheOperation::Invalidate, Some(key), || repo.forget(key))
                    .await
                    .is_ok()
                {
                    self.index.lock().await.untrack(level, key);
                    removed += 1;
                }
            }
        }

        info!(namespace, removed, "Invalidated namespace");
        self.events
            .emit(
                CACHE_INVALIDATED,
                json!({ "kind": "namespace", "namespace": namespace, "removed": removed }),
            )
            .await;
        Ok(removed)
    }
}
