//! Enabling, disabling and probing tiers at runtime.

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::coordinator::{CacheCoordinator, LevelSlot};
use crate::cache::level::CacheLevel;
use crate::error::{RepositoryError, Result};
use crate::resilience::CacheOperation;

/// TTL for probe entries, in case the cleanup delete fails.
const PROBE_TTL: u64 = 10;

/// Health of one tier as seen by a probe round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelStatus {
    pub level: CacheLevel,
    pub id: u8,
    pub enabled: bool,
    pub healthy: bool,
    pub driver: Option<String>,
    pub tracked_keys: usize,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl CacheCoordinator {
    /// Turn a tier on (building its repository) or off (dropping it).
    ///
    /// Disabling a tier also drops its tracked keys and resets its breaker.
    pub async fn toggle_level(&self, level: CacheLevel, enabled: bool) -> Result<()> {
        let level_config = self.config.read().await.level(level);

        let repository = if enabled {
            let existing = self
                .levels
                .read()
                .await
                .get(&level)
                .and_then(|slot| slot.repository.clone());
            match existing {
                Some(repository) => Some(repository),
                None => Some(self.factory.create(level, &level_config)?),
            }
        } else {
            None
        };

        self.levels
            .write()
            .await
            .insert(level, LevelSlot { enabled, repository });
        self.config
            .write()
            .await
            .levels
            .entry(level)
            .or_insert(level_config)
            .enabled = enabled;

        if !enabled {
            self.index.lock().await.clear_level(level);
            self.resilience.lock().await.reset_breaker(level);
        }

        info!(level = %level, enabled, "Toggled cache tier");
        Ok(())
    }

    /// Enable every tier. Continues past failures and returns the first one.
    pub async fn enable_all_levels(&self) -> Result<()> {
        let mut first_error = None;
        for level in CacheLevel::by_priority() {
            if let Err(e) = self.toggle_level(level, true).await {
                warn!(level = %level, error = %e, "Failed to enable tier");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn disable_all_levels(&self) -> Result<()> {
        for level in CacheLevel::by_priority() {
            self.toggle_level(level, false).await?;
        }
        Ok(())
    }

    /// Probe every tier with a write/read/delete round-trip.
    pub async fn level_status_summary(&self) -> Vec<LevelStatus> {
        let mut summary = Vec::new();
        for level in CacheLevel::by_priority() {
            summary.push(self.probe_level(level).await);
        }
        summary
    }

    async fn probe_level(&self, level: CacheLevel) -> LevelStatus {
        let (enabled, repository) = {
            let levels = self.levels.read().await;
            levels
                .get(&level)
                .map(|slot| (slot.enabled, slot.repository.clone()))
                .unwrap_or((false, None))
        };
        let tracked_keys = self.index.lock().await.key_count(level);

        let mut status = LevelStatus {
            level,
            id: level.id(),
            enabled,
            healthy: false,
            driver: repository.as_ref().map(|repo| repo.driver().to_string()),
            tracked_keys,
            latency_ms: None,
            error: None,
        };
        let Some(repo) = repository.filter(|_| enabled) else {
            return status;
        };

        let key = format!("__probe:{}", Uuid::new_v4());
        let expected = json!({ "probe": level.name() });
        let started = Instant::now();

        let round_trip = async {
            self.call(level, CacheOperation::Probe, Some(&key), || {
                repo.put(&key, expected.clone(), PROBE_TTL)
            })
            .await?;
            let read: Option<Value> = self
                .call(level, CacheOperation::Probe, Some(&key), || repo.get(&key))
                .await?;
            self.call(level, CacheOperation::Probe, Some(&key), || repo.forget(&key))
                .await?;
            if read.as_ref() == Some(&expected) {
                Ok::<(), RepositoryError>(())
            } else {
                Err(RepositoryError::Backend("probe value did not round-trip".to_string()))
            }
        };

        match round_trip.await {
            Ok(()) => {
                status.healthy = true;
                status.latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
            }
            Err(e) => status.error = Some(e.to_string()),
        }
        status
    }
}
