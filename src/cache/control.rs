//! Runtime control surface: error hooks, event listeners, configuration
//! updates and cache warming.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cache::coordinator::{CacheCoordinator, LevelSlot};
use crate::cache::key::IntoCacheKey;
use crate::cache::level::CacheLevel;
use crate::config::{ErrorHandlingConfig, IntegrationConfig};
use crate::error::{CacheError, RepositoryError, Result};
use crate::events::{CacheEvent, IntegrationStatus, QueueReport, CACHE_WARMED};
use crate::resilience::{
    CacheOperation, ErrorHandlingReport, ErrorHandlingStatus, FallbackContext, TierFailure,
};

/// Outcome of [`CacheCoordinator::warm`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub written: usize,
    pub failed: usize,
    pub batches: usize,
}

impl CacheCoordinator {
    // ─── Error handling ────────────────────────────────────────────────────

    /// Run `handler` for tier failures of `kind` (`io`, `backend`, ... or `*`).
    pub async fn register_error_handler<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&TierFailure<'_>) + Send + Sync + 'static,
    {
        self.resilience.lock().await.register_handler(kind, handler);
    }

    /// Substitute for `operation` when every tier that could serve it failed.
    pub async fn register_fallback_strategy<F>(&self, operation: CacheOperation, fallback: F)
    where
        F: Fn(&FallbackContext<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.resilience.lock().await.register_fallback(operation, fallback);
    }

    pub async fn configure_error_handling(&self, config: ErrorHandlingConfig) {
        self.config.write().await.error_handling = config.clone();
        self.resilience.lock().await.configure(config);
        info!("Error handling reconfigured");
    }

    pub async fn error_handling_status(&self) -> ErrorHandlingStatus {
        self.resilience.lock().await.status(Instant::now())
    }

    /// Exercise handlers and fallbacks with a synthetic failure, then probe
    /// every tier.
    pub async fn test_error_handling(&self) -> ErrorHandlingReport {
        let error = RepositoryError::Backend("synthetic failure".to_string());
        let (handlers, fallback) = {
            let resilience = self.resilience.lock().await;
            (
                resilience.handlers_for(error.kind()),
                resilience.fallback_for(CacheOperation::Get),
            )
        };

        let failure = TierFailure {
            level: CacheLevel::Request,
            operation: CacheOperation::Probe,
            key: Some("__error_handling_test"),
            error: &error,
        };
        for handler in &handlers {
            handler(&failure);
        }

        let fallback_value = fallback.and_then(|fallback| {
            fallback(&FallbackContext {
                operation: CacheOperation::Get,
                key: Some("__error_handling_test"),
                failed_levels: &[CacheLevel::Request],
            })
        });

        let unhealthy_levels: Vec<CacheLevel> = self
            .level_status_summary()
            .await
            .into_iter()
            .filter(|status| status.enabled && !status.healthy)
            .map(|status| status.level)
            .collect();
        let open_circuits: Vec<CacheLevel> = self
            .error_handling_status()
            .await
            .breakers
            .into_iter()
            .filter(|(_, report)| report.state == "open")
            .map(|(level, _)| level)
            .collect();

        let report = ErrorHandlingReport {
            handlers_invoked: handlers.len(),
            fallback_value,
            passed: unhealthy_levels.is_empty(),
            unhealthy_levels,
            open_circuits,
        };
        info!(passed = report.passed, handlers = report.handlers_invoked, "Error handling self-test");
        report
    }

    // ─── Events ────────────────────────────────────────────────────────────

    /// Listen for `event` (`cache.flush`, `cache.warmed`, `cache.invalidated` or `*`).
    pub async fn add_event_listener<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&CacheEvent) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.events.add_listener(event, listener).await;
    }

    /// Deliver the current hour's queued events.
    pub async fn process_queued_events(&self) -> QueueReport {
        self.events.process_queued().await
    }

    pub async fn configure_integration(&self, config: IntegrationConfig) {
        self.config.write().await.integration = config.clone();
        self.events.configure(config).await;
    }

    pub async fn integration_status(&self) -> IntegrationStatus {
        self.events.status().await
    }

    /// Live feed of every emitted event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // ─── Configuration ─────────────────────────────────────────────────────

    /// Merge a partial configuration and apply it.
    ///
    /// Repositories needed by the new settings are built before anything is
    /// committed, so a rejected update leaves the previous configuration
    /// fully in place.
    pub async fn update_configuration(&self, update: &Map<String, Value>) -> Result<()> {
        let (current, merged) = {
            let config = self.config.read().await;
            (config.clone(), config.merged(update)?)
        };

        let mut slots = BTreeMap::new();
        for level in CacheLevel::by_priority() {
            let before = current.level(level);
            let after = merged.level(level);
            let existing = self
                .levels
                .read()
                .await
                .get(&level)
                .and_then(|slot| slot.repository.clone());

            let slot = if !after.enabled {
                LevelSlot {
                    enabled: false,
                    repository: None,
                }
            } else {
                let backend_changed = before.driver != after.driver || before.path != after.path;
                let repository = match existing {
                    Some(repository) if !backend_changed => repository,
                    _ => self.factory.create(level, &after)?,
                };
                LevelSlot {
                    enabled: true,
                    repository: Some(repository),
                }
            };
            slots.insert(level, slot);
        }

        {
            let mut levels = self.levels.write().await;
            let mut index = self.index.lock().await;
            for (level, slot) in slots {
                let replaced = levels
                    .get(&level)
                    .and_then(|old| old.repository.as_ref())
                    .zip(slot.repository.as_ref())
                    .map_or(true, |(old, new)| !std::sync::Arc::ptr_eq(old, new));
                if replaced {
                    index.clear_level(level);
                }
                levels.insert(level, slot);
            }
        }

        if current.error_handling != merged.error_handling {
            self.resilience
                .lock()
                .await
                .configure(merged.error_handling.clone());
        }
        if current.integration != merged.integration {
            self.events.configure(merged.integration.clone()).await;
        }

        *self.config.write().await = merged;
        info!(sections = ?update.keys().collect::<Vec<_>>(), "Configuration updated");
        Ok(())
    }

    // ─── Warming ───────────────────────────────────────────────────────────

    /// Preload entries in batches of `features.warming_batch_size`.
    ///
    /// Every key is validated before the first write.
    pub async fn warm<K, I>(&self, entries: I, ttl: Option<u64>) -> Result<WarmReport>
    where
        K: IntoCacheKey,
        I: IntoIterator<Item = (K, Value)>,
    {
        let batch_size = {
            let config = self.config.read().await;
            if !config.features.cache_warming {
                return Err(CacheError::FeatureDisabled("cache_warming"));
            }
            config.features.warming_batch_size.max(1)
        };

        let entries = entries
            .into_iter()
            .map(|(key, value)| Ok((key.into_cache_key()?, value)))
            .collect::<Result<Vec<_>>>()?;

        let mut report = WarmReport::default();
        for batch in entries.chunks(batch_size) {
            for (key, value) in batch {
                let written = self.write_key(key, value, ttl, None).await;
                if written.succeeded() {
                    report.written += 1;
                } else {
                    report.failed += 1;
                    debug!(
                        key = key.as_str(),
                        failed = ?written.failed_levels(),
                        "Warm entry not fully written"
                    );
                }
            }
            report.batches += 1;
        }

        info!(written = report.written, failed = report.failed, batches = report.batches, "Cache warmed");
        self.events
            .emit(
                CACHE_WARMED,
                json!({ "written": report.written, "failed": report.failed, "batches": report.batches }),
            )
            .await;
        Ok(report)
    }
}
