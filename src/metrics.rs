//! Prometheus counters for tier traffic.
//!
//! Each coordinator owns its own registry so several instances can live in
//! one process.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::cache::level::CacheLevel;

pub struct CacheMetrics {
    registry: Registry,
    hits: IntCounterVec,
    misses: IntCounter,
    writes: IntCounterVec,
    backfills: IntCounterVec,
    tier_errors: IntCounterVec,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tiered_cache".to_string()), None)?;

        let hits = IntCounterVec::new(Opts::new("hits_total", "Reads served per tier"), &["level"])?;
        let misses = IntCounter::new("misses_total", "Reads not found in any tier")?;
        let writes = IntCounterVec::new(
            Opts::new("writes_total", "Tier writes by outcome"),
            &["level", "outcome"],
        )?;
        let backfills = IntCounterVec::new(
            Opts::new("backfills_total", "Values copied into faster tiers"),
            &["level"],
        )?;
        let tier_errors = IntCounterVec::new(
            Opts::new("tier_errors_total", "Failed repository calls"),
            &["level", "kind"],
        )?;

        registry.register(Box::new(hits.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(writes.clone()))?;
        registry.register(Box::new(backfills.clone()))?;
        registry.register(Box::new(tier_errors.clone()))?;

        Ok(Self {
            registry,
            hits,
            misses,
            writes,
            backfills,
            tier_errors,
        })
    }

    pub fn hit(&self, level: CacheLevel) {
        self.hits.with_label_values(&[level.name()]).inc();
    }

    pub fn miss(&self) {
        self.misses.inc();
    }

    pub fn write(&self, level: CacheLevel, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        self.writes.with_label_values(&[level.name(), outcome]).inc();
    }

    pub fn backfill(&self, level: CacheLevel) {
        self.backfills.with_label_values(&[level.name()]).inc();
    }

    pub fn tier_error(&self, level: CacheLevel, kind: &str) {
        self.tier_errors.with_label_values(&[level.name(), kind]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
