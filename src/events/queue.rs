//! Hourly-bucketed event queue persisted through a repository.
//!
//! Events queued during hour `H` land under `cache_events:queue:YYYY-MM-DD-HH`;
//! draining reads and removes the current bucket in one step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RepositoryError;
use crate::events::CacheEvent;
use crate::repository::Repository;

const BUCKET_PREFIX: &str = "cache_events:queue:";

/// Bucket suffix for an instant.
pub fn bucket_for(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d-%H").to_string()
}

pub struct EventQueue {
    store: Arc<dyn Repository>,
    // Serializes read-modify-write of a bucket.
    lock: Mutex<()>,
}

impl EventQueue {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn bucket_key(bucket: &str) -> String {
        format!("{BUCKET_PREFIX}{bucket}")
    }

    async fn load(&self, key: &str) -> Result<Vec<CacheEvent>, RepositoryError> {
        match self.store.get(key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Append an event to the bucket of its own timestamp.
    pub async fn push(&self, event: CacheEvent, ttl: u64) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let key = Self::bucket_key(&bucket_for(event.occurred_at));

        let mut items = self.load(&key).await?;
        items.push(event);
        let len = items.len();
        self.store.put(&key, serde_json::to_value(items)?, ttl).await?;

        debug!(bucket = %key, queued = len, "Queued cache event");
        Ok(())
    }

    /// Remove and return every event in the bucket for `at`.
    pub async fn drain(&self, at: DateTime<Utc>) -> Result<Vec<CacheEvent>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let key = Self::bucket_key(&bucket_for(at));

        let items = self.load(&key).await?;
        if !items.is_empty() {
            self.store.forget(&key).await?;
        }
        Ok(items)
    }

    /// Events waiting in the bucket for `at`.
    pub async fn pending(&self, at: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let key = Self::bucket_key(&bucket_for(at));
        Ok(self.load(&key).await?.len())
    }
}
