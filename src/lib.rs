//! tiered-cache: multi-tier cache coordination.
//!
//! Reads and writes flow through a hierarchy of storage tiers:
//!   Request (per-process, no expiry) → Memory (shared) → Database (persistent)
//!
//! Reads fall back tier by tier and backfill faster tiers on a hit; writes
//! fan out to every enabled tier with a tier-appropriate TTL. An admin HTTP
//! API exposes stats, tier health, entries, invalidation and an event feed.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod repository;
pub mod resilience;
pub mod server;

pub use cache::{CacheCoordinator, CacheKey, CacheLevel};
pub use config::Config;
pub use error::{CacheError, RepositoryError};
pub use repository::{Repository, RepositoryFactory};
