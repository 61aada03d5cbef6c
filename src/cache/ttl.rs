//! TTL resolution.
//!
//! Precedence per tier: request scope, explicit argument, key TTL, namespace
//! default, tier default. Everything except the request tier is capped by
//! the tier's ceiling and the global ceiling.

use crate::cache::key::CacheKey;
use crate::cache::level::CacheLevel;
use crate::config::Config;

/// Effective TTL in seconds for writing `key` to `level`.
///
/// Zero is only ever returned for the request tier, where it means the entry
/// lives until the request scope is flushed.
pub fn resolve(config: &Config, level: CacheLevel, key: &CacheKey, explicit: Option<u64>) -> u64 {
    if level == CacheLevel::Request {
        return 0;
    }

    let wanted = explicit
        .or_else(|| key.ttl())
        .or_else(|| namespace_default(config, key))
        .unwrap_or_else(|| tier_default(config, level));

    cap(config, level, wanted)
}

fn namespace_default(config: &Config, key: &CacheKey) -> Option<u64> {
    config
        .cache
        .namespace_ttls
        .iter()
        .find(|ns| key.as_str().contains(ns.marker.as_str()))
        .map(|ns| ns.ttl)
}

fn tier_default(config: &Config, level: CacheLevel) -> u64 {
    config
        .level(level)
        .default_ttl
        .filter(|ttl| *ttl > 0)
        .unwrap_or(config.cache.default_ttl)
}

fn cap(config: &Config, level: CacheLevel, ttl: u64) -> u64 {
    let mut ceiling = level.max_ttl();
    if config.cache.max_ttl > 0 {
        ceiling = ceiling.min(config.cache.max_ttl);
    }
    ttl.clamp(1, ceiling.max(1))
}
