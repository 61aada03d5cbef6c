//! Cache lifecycle events.
//!
//! - [`queue`]: hourly-bucketed durable queue for deferred processing
//!
//! Events go to a broadcast feed (for live subscribers such as the SSE
//! endpoint) and then either straight to listeners or into the queue,
//! depending on [`IntegrationConfig::queue_events`].

pub mod queue;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::IntegrationConfig;
use crate::repository::Repository;

pub use queue::{bucket_for, EventQueue};

pub const CACHE_WARMED: &str = "cache.warmed";
pub const CACHE_FLUSH: &str = "cache.flush";
pub const CACHE_INVALIDATED: &str = "cache.invalidated";

/// Listener key that receives every event.
pub const ANY_EVENT: &str = "*";

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEvent {
    pub id: String,
    pub name: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl CacheEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// A listener returns `Err` with a message to mark the event as failed.
pub type EventListener = Arc<dyn Fn(&CacheEvent) -> Result<(), String> + Send + Sync>;

/// Per-item failure from [`EventBus::process_queued`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedEventError {
    pub event_id: String,
    pub event: String,
    pub error: String,
}

/// Outcome of draining the current hour's queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueReport {
    pub bucket: String,
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<QueuedEventError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationStatus {
    pub config: IntegrationConfig,
    pub listeners: BTreeMap<String, usize>,
    pub queued_this_hour: usize,
    pub events_emitted: u64,
    pub feed_subscribers: usize,
}

pub struct EventBus {
    listeners: RwLock<BTreeMap<String, Vec<EventListener>>>,
    config: RwLock<IntegrationConfig>,
    queue: EventQueue,
    feed: broadcast::Sender<CacheEvent>,
    emitted: AtomicU64,
}

impl EventBus {
    pub fn new(config: IntegrationConfig, store: Arc<dyn Repository>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            config: RwLock::new(config),
            queue: EventQueue::new(store),
            feed,
            emitted: AtomicU64::new(0),
        }
    }

    pub async fn add_listener<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&CacheEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .await
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.feed.subscribe()
    }

    pub async fn configure(&self, config: IntegrationConfig) {
        *self.config.write().await = config;
    }

    /// Publish an event; queue or dispatch it according to configuration.
    pub async fn emit(&self, name: &str, payload: Value) {
        let event = CacheEvent::new(name, payload);
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine.
        let _ = self.feed.send(event.clone());

        let config = self.config.read().await.clone();
        if config.queue_events {
            if let Err(e) = self.queue.push(event.clone(), config.queue_ttl).await {
                warn!(event = %event.name, error = %e, "Failed to queue event, dispatching inline");
                self.dispatch(&event).await;
            }
        } else {
            self.dispatch(&event).await;
        }
    }

    async fn listeners_for(&self, name: &str) -> Vec<EventListener> {
        let listeners = self.listeners.read().await;
        let specific = listeners.get(name).into_iter().flatten();
        let wildcard = listeners.get(ANY_EVENT).into_iter().flatten();
        specific.chain(wildcard).cloned().collect()
    }

    /// Run every listener; the first error is returned after all have run.
    async fn run_listeners(&self, event: &CacheEvent) -> Result<(), String> {
        let mut first_error = None;
        for listener in self.listeners_for(&event.name).await {
            if let Err(e) = listener(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn dispatch(&self, event: &CacheEvent) {
        if let Err(e) = self.run_listeners(event).await {
            warn!(event = %event.name, id = %event.id, error = %e, "Event listener failed");
        }
    }

    /// Drain the current hour's bucket and run listeners for each item.
    pub async fn process_queued(&self) -> QueueReport {
        let now = Utc::now();
        let mut report = QueueReport {
            bucket: bucket_for(now),
            ..Default::default()
        };

        let items = match self.queue.drain(now).await {
            Ok(items) => items,
            Err(e) => {
                warn!(bucket = %report.bucket, error = %e, "Failed to read event queue");
                report.errors.push(QueuedEventError {
                    event_id: String::new(),
                    event: String::new(),
                    error: e.to_string(),
                });
                return report;
            }
        };

        for event in items {
            match self.run_listeners(&event).await {
                Ok(()) => report.processed += 1,
                Err(error) => {
                    report.failed += 1;
                    report.errors.push(QueuedEventError {
                        event_id: event.id.clone(),
                        event: event.name.clone(),
                        error,
                    });
                }
            }
        }

        debug!(
            bucket = %report.bucket,
            processed = report.processed,
            failed = report.failed,
            "Processed queued events"
        );
        report
    }

    pub async fn status(&self) -> IntegrationStatus {
        let queued_this_hour = self.queue.pending(Utc::now()).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to inspect event queue");
            0
        });
        IntegrationStatus {
            config: self.config.read().await.clone(),
            listeners: self
                .listeners
                .read()
                .await
                .iter()
                .map(|(name, l)| (name.clone(), l.len()))
                .collect(),
            queued_this_hour,
            events_emitted: self.emitted.load(Ordering::Relaxed),
            feed_subscribers: self.feed.receiver_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn bus(queue_events: bool) -> EventBus {
        EventBus::new(
            IntegrationConfig {
                queue_events,
                ..Default::default()
            },
            Arc::new(MemoryRepository::new("memory")),
        )
    }

    #[tokio::test]
    async fn test_inline_dispatch() {
        let bus = bus(false);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.add_listener(CACHE_FLUSH, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        bus.emit(CACHE_FLUSH, json!({})).await;
        bus.emit(CACHE_WARMED, json!({})).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queued_processing_reports_failures() {
        let bus = bus(true);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.add_listener(ANY_EVENT, move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if event.name == CACHE_INVALIDATED {
                Err("index offline".to_string())
            } else {
                Ok(())
            }
        })
        .await;

        bus.emit(CACHE_WARMED, json!({"count": 3})).await;
        bus.emit(CACHE_INVALIDATED, json!({"tags": ["ip"]})).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(bus.status().await.queued_this_hour, 2);

        let report = bus.process_queued().await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].event, CACHE_INVALIDATED);
        assert_eq!(report.errors[0].error, "index offline");
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        let again = bus.process_queued().await;
        assert_eq!(again.processed + again.failed, 0);
    }

    #[tokio::test]
    async fn test_feed_receives_events() {
        let bus = bus(false);
        let mut rx = bus.subscribe();
        bus.emit(CACHE_FLUSH, json!({"levels": []})).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, CACHE_FLUSH);
    }
}
