//! Tiered cache coordination.
//!
//! This module contains the core cache types and algorithms:
//! - [`level`]: CacheLevel, the three tiers and their capabilities
//! - [`key`]: CacheKey with namespace, tags and validation
//! - [`coordinator`]: read fallback with backfill, fan-out writes, deletes
//! - [`invalidation`]: pattern, tag and namespace invalidation
//! - [`lifecycle`]: enabling, disabling and probing tiers
//! - [`control`]: error hooks, events, configuration updates, warming
//! - [`fluent`]: per-call options (tags, prefix, levels, ttl)
//! - [`tracker`]: key/tag index for tiers that cannot enumerate
//! - [`ttl`]: per-tier TTL resolution
//! - [`pattern`]: glob matching for invalidation
//! - [`stats`]: operation counters and timing samples

pub mod control;
pub mod coordinator;
pub mod fluent;
pub mod invalidation;
pub mod key;
pub mod level;
pub mod lifecycle;
pub mod pattern;
pub mod stats;
pub mod tracker;
pub mod ttl;

pub use control::WarmReport;
pub use coordinator::{CacheCoordinator, CacheCoordinatorBuilder, TierOutcome, WriteReport};
pub use fluent::FluentCache;
pub use key::{CacheKey, IntoCacheKey};
pub use level::CacheLevel;
pub use lifecycle::LevelStatus;
pub use stats::StatsSnapshot;
