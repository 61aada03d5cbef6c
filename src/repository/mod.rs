//! Per-tier storage backends.
//!
//! - [`memory`]: in-process map with expiry, native tags and key enumeration
//! - [`file`]: persistent zstd-compressed file store
//!
//! The coordinator only talks to the [`Repository`] trait; a
//! [`RepositoryFactory`] builds handles when a tier is (re)enabled.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::level::CacheLevel;
use crate::config::LevelConfig;
use crate::error::RepositoryError;

pub use file::FileRepository;
pub use memory::MemoryRepository;

/// Storage contract for a single tier.
///
/// `ttl` is in seconds; zero means no time-based expiry. Tag-scoped variants
/// default to their plain counterparts for backends without tag support.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Driver name for status reporting.
    fn driver(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError>;

    /// Whether the key is present, including entries holding JSON `null`.
    async fn has(&self, key: &str) -> Result<bool, RepositoryError>;

    async fn put(&self, key: &str, value: Value, ttl: u64) -> Result<bool, RepositoryError>;

    async fn forget(&self, key: &str) -> Result<bool, RepositoryError>;

    async fn flush(&self) -> Result<bool, RepositoryError>;

    /// Whether the `*_tagged` methods and `flush_tags` are native.
    fn supports_tags(&self) -> bool {
        false
    }

    async fn has_tagged(&self, _tags: &[String], key: &str) -> Result<bool, RepositoryError> {
        self.has(key).await
    }

    async fn get_tagged(&self, _tags: &[String], key: &str) -> Result<Option<Value>, RepositoryError> {
        self.get(key).await
    }

    async fn put_tagged(
        &self,
        _tags: &[String],
        key: &str,
        value: Value,
        ttl: u64,
    ) -> Result<bool, RepositoryError> {
        self.put(key, value, ttl).await
    }

    async fn forget_tagged(&self, _tags: &[String], key: &str) -> Result<bool, RepositoryError> {
        self.forget(key).await
    }

    /// Remove every entry carrying any of `tags`. `None` when unsupported.
    async fn flush_tags(&self, _tags: &[String]) -> Result<Option<usize>, RepositoryError> {
        Ok(None)
    }

    /// Enumerate live keys. `None` when the backend cannot enumerate.
    async fn keys(&self) -> Result<Option<Vec<String>>, RepositoryError> {
        Ok(None)
    }
}

/// Builds repository handles for tiers being enabled.
pub trait RepositoryFactory: Send + Sync {
    fn create(
        &self,
        level: CacheLevel,
        config: &LevelConfig,
    ) -> Result<Arc<dyn Repository>, RepositoryError>;
}

/// Maps driver names to the built-in repositories.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRepositoryFactory;

impl RepositoryFactory for DefaultRepositoryFactory {
    fn create(
        &self,
        level: CacheLevel,
        config: &LevelConfig,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        match config.driver.as_str() {
            "array" | "memory" => Ok(Arc::new(MemoryRepository::new(config.driver.clone()))),
            "file" => {
                let path = config.path.clone().ok_or_else(|| {
                    RepositoryError::Unavailable(format!("tier {level} uses the file driver without a path"))
                })?;
                Ok(Arc::new(FileRepository::new(path)))
            }
            other => Err(RepositoryError::Unavailable(format!(
                "unknown driver '{other}' for tier {level}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_drivers() {
        let factory = DefaultRepositoryFactory;
        let request = factory
            .create(CacheLevel::Request, &LevelConfig::for_level(CacheLevel::Request))
            .unwrap();
        assert_eq!(request.driver(), "array");
        assert!(request.supports_tags());

        let database = factory
            .create(CacheLevel::Database, &LevelConfig::for_level(CacheLevel::Database))
            .unwrap();
        assert_eq!(database.driver(), "file");
    }

    #[test]
    fn test_factory_rejects_unknown_driver() {
        let config = LevelConfig {
            driver: "memcached".to_string(),
            ..Default::default()
        };
        let result = DefaultRepositoryFactory.create(CacheLevel::Memory, &config);
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
    }
}
