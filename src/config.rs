//! Runtime configuration for tiered-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All tier-related knobs (drivers, default TTLs, feature toggles, resilience
//! thresholds) live here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::level::CacheLevel;
use crate::error::CacheError;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiered-cache", about = "Multi-tier cache coordinator with an admin HTTP API")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global TTL policy.
    pub cache: CacheSettings,

    /// Per-tier settings keyed by level name.
    pub levels: BTreeMap<CacheLevel, LevelConfig>,

    /// Feature toggles.
    pub features: FeatureConfig,

    /// Circuit breaker, retry and fallback behaviour.
    pub error_handling: ErrorHandlingConfig,

    /// Event dispatch and queueing.
    pub integration: IntegrationConfig,

    /// Admin HTTP server.
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            levels: CacheLevel::by_priority()
                .into_iter()
                .map(|level| (level, LevelConfig::for_level(level)))
                .collect(),
            features: FeatureConfig::default(),
            error_handling: ErrorHandlingConfig::default(),
            integration: IntegrationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Sections accepted at the top level of a configuration update.
const SECTIONS: &[&str] = &[
    "cache",
    "levels",
    "features",
    "error_handling",
    "integration",
    "server",
];

/// Global TTL policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL in seconds used when neither the caller, the key nor the tier says otherwise.
    pub default_ttl: u64,

    /// Hard ceiling applied after the per-tier cap.
    pub max_ttl: u64,

    /// Key substring → default TTL. Checked in order; first match wins.
    pub namespace_ttls: Vec<NamespaceTtl>,
}

/// A namespace-sensitive default TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceTtl {
    /// Substring searched for in the rendered key.
    pub marker: String,
    /// TTL in seconds.
    pub ttl: u64,
}

impl NamespaceTtl {
    fn new(marker: &str, ttl: u64) -> Self {
        Self {
            marker: marker.to_string(),
            ttl,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: 3600,
            max_ttl: 604_800,
            namespace_ttls: vec![
                NamespaceTtl::new("ip-reputation", 14_400),
                NamespaceTtl::new("ip_reputation", 14_400),
                NamespaceTtl::new("geolocation", 43_200),
                NamespaceTtl::new("geo:", 43_200),
                NamespaceTtl::new("session", 900),
                NamespaceTtl::new("pattern", 7_200),
            ],
        }
    }
}

/// Settings for a single tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Whether the tier participates in reads and writes.
    pub enabled: bool,

    /// Repository driver name (`array`, `memory`, `file`).
    pub driver: String,

    /// Whether tag-scoped repository calls are used for this tier.
    pub supports_tagging: bool,

    /// Tier default TTL in seconds (falls back to `cache.default_ttl`).
    pub default_ttl: Option<u64>,

    /// Storage directory for file-backed drivers.
    pub path: Option<PathBuf>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: "memory".to_string(),
            supports_tagging: true,
            default_ttl: None,
            path: None,
        }
    }
}

impl LevelConfig {
    /// Built-in settings for a tier.
    pub fn for_level(level: CacheLevel) -> Self {
        match level {
            CacheLevel::Request => Self {
                driver: level.backend_name().to_string(),
                default_ttl: Some(0),
                ..Default::default()
            },
            CacheLevel::Memory => Self {
                driver: level.backend_name().to_string(),
                default_ttl: Some(1800),
                ..Default::default()
            },
            CacheLevel::Database => Self {
                driver: level.backend_name().to_string(),
                supports_tagging: false,
                default_ttl: Some(86_400),
                path: Some(PathBuf::from("/tmp/tiered-cache")),
                ..Default::default()
            },
        }
    }
}

/// Feature toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Record hit/miss counters and timing samples.
    pub statistics_tracking: bool,

    /// Allow `warm()`.
    pub cache_warming: bool,

    /// Entries written per warming batch.
    pub warming_batch_size: usize,

    /// Allow `invalidate_by_pattern()`.
    pub pattern_invalidation: bool,

    /// Allow `invalidate_by_tags()`.
    pub tag_invalidation: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            statistics_tracking: true,
            cache_warming: true,
            warming_batch_size: 100,
            pattern_invalidation: true,
            tag_invalidation: true,
        }
    }
}

/// Resilience settings wrapped around every repository call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    /// Skip a tier after repeated failures.
    pub circuit_breaker_enabled: bool,

    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a half-open trial.
    pub cooldown_secs: u64,

    /// Consult registered fallback strategies when tiers fail.
    pub fallback_enabled: bool,

    /// Extra attempts made for a failing repository call.
    pub retry_attempts: u32,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_enabled: true,
            failure_threshold: 5,
            cooldown_secs: 30,
            fallback_enabled: true,
            retry_attempts: 0,
        }
    }
}

/// Event dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Queue lifecycle events into hourly buckets instead of dispatching inline.
    pub queue_events: bool,

    /// Lifetime of a queue bucket in seconds.
    pub queue_ttl: u64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            queue_events: false,
            queue_ttl: 7200,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let Value::Object(update) = serde_json::from_str::<Value>(&data)? else {
                anyhow::bail!("configuration root in {:?} must be a JSON object", path);
            };
            Ok(Config::default().merged(&update)?)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Settings for a tier, falling back to the built-in ones.
    pub fn level(&self, level: CacheLevel) -> LevelConfig {
        self.levels
            .get(&level)
            .cloned()
            .unwrap_or_else(|| LevelConfig::for_level(level))
    }

    /// Apply a partial update expressed as a JSON map.
    ///
    /// The update is validated and merged into a copy; `self` is only replaced
    /// when the merged result is a valid configuration.
    pub fn merged(&self, update: &Map<String, Value>) -> Result<Config, CacheError> {
        validate_update(update)?;

        let mut current = serde_json::to_value(self)
            .map_err(|e| CacheError::Configuration(format!("cannot serialize current config: {e}")))?;
        merge(&mut current, &Value::Object(update.clone()));

        serde_json::from_value(current)
            .map_err(|e| CacheError::Configuration(format!("invalid configuration: {e}")))
    }
}

fn validate_update(update: &Map<String, Value>) -> Result<(), CacheError> {
    for (section, value) in update {
        if !SECTIONS.contains(&section.as_str()) {
            return Err(CacheError::Configuration(format!(
                "unknown configuration section '{section}'"
            )));
        }
        if (section == "cache" || section == "levels") && !value.is_object() {
            return Err(CacheError::Configuration(format!(
                "'{section}' must be a map"
            )));
        }
    }

    if let Some(Value::Object(levels)) = update.get("levels") {
        for (name, level) in levels {
            // Only the serialized names; aliases accepted by `FromStr` would
            // fail later during deserialization.
            if !CacheLevel::by_priority().iter().any(|level| level.name() == name) {
                return Err(CacheError::Configuration(format!(
                    "unknown cache level '{name}' (expected request, memory or database)"
                )));
            }
            if !level.is_object() {
                return Err(CacheError::Configuration(format!(
                    "settings for level '{name}' must be a map"
                )));
            }
        }
    }

    Ok(())
}

/// Deep-merge `patch` into `target`; objects merge key-wise, everything else replaces.
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.default_ttl, 3600);
        assert!(cfg.features.statistics_tracking);
        assert_eq!(cfg.level(CacheLevel::Database).driver, "file");
        assert_eq!(cfg.level(CacheLevel::Request).default_ttl, Some(0));
    }

    #[test]
    fn test_load_partial_file_keeps_level_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cache": {"default_ttl": 60}, "levels": {"database": {"enabled": false}}}"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.cache.default_ttl, 60);
        assert_eq!(cfg.cache.max_ttl, 604_800);
        let database = cfg.level(CacheLevel::Database);
        assert!(!database.enabled);
        assert_eq!(database.driver, "file");
        assert!(cfg.level(CacheLevel::Request).enabled);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/tiered-cache.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_merge_update() {
        let cfg = Config::default();
        let merged = cfg
            .merged(&as_map(json!({
                "cache": {"max_ttl": 1000},
                "levels": {"database": {"enabled": false}},
                "error_handling": {"retry_attempts": 2}
            })))
            .unwrap();

        assert_eq!(merged.cache.max_ttl, 1000);
        assert_eq!(merged.cache.default_ttl, 3600);
        assert!(!merged.level(CacheLevel::Database).enabled);
        assert_eq!(merged.error_handling.retry_attempts, 2);
    }

    #[test]
    fn test_rejects_unknown_level() {
        let cfg = Config::default();
        let err = cfg
            .merged(&as_map(json!({"levels": {"redis_cluster": {"enabled": true}}})))
            .unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_level_aliases_are_not_config_keys() {
        let cfg = Config::default();
        for name in ["l2", "Memory", "DATABASE"] {
            let err = cfg
                .merged(&as_map(json!({"levels": {name: {"enabled": false}}})))
                .unwrap_err();
            assert!(err.to_string().contains("unknown cache level"), "{name}: {err}");
        }
    }

    #[test]
    fn test_rejects_non_map_cache_section() {
        let cfg = Config::default();
        assert!(cfg.merged(&as_map(json!({"cache": 5}))).is_err());
        assert!(cfg.merged(&as_map(json!({"bogus": {}}))).is_err());
    }

    #[test]
    fn test_rejects_bad_types() {
        let cfg = Config::default();
        assert!(cfg
            .merged(&as_map(json!({"cache": {"default_ttl": "soon"}})))
            .is_err());
    }
}
