//! Error handling wrapped around tier access.
//!
//! - [`circuit_breaker`]: per-tier failure counter with cool-down
//!
//! [`Resilience`] keeps the breakers together with the registered error
//! handlers and fallback strategies. The coordinator consults it on every
//! repository call.

pub mod circuit_breaker;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::level::CacheLevel;
use crate::config::ErrorHandlingConfig;
use crate::error::RepositoryError;

pub use circuit_breaker::{BreakerReport, BreakerState, CircuitBreaker};

/// Handler key that matches every error kind.
pub const ANY_ERROR: &str = "*";

/// Coordinator operations that touch repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    Get,
    Has,
    Put,
    Forget,
    Flush,
    Invalidate,
    Probe,
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheOperation::Get => "get",
            CacheOperation::Has => "has",
            CacheOperation::Put => "put",
            CacheOperation::Forget => "forget",
            CacheOperation::Flush => "flush",
            CacheOperation::Invalidate => "invalidate",
            CacheOperation::Probe => "probe",
        };
        f.write_str(name)
    }
}

/// What an error handler is told about a failed tier call.
#[derive(Debug)]
pub struct TierFailure<'a> {
    pub level: CacheLevel,
    pub operation: CacheOperation,
    pub key: Option<&'a str>,
    pub error: &'a RepositoryError,
}

/// What a fallback strategy is told when an operation could not be served.
#[derive(Debug)]
pub struct FallbackContext<'a> {
    pub operation: CacheOperation,
    pub key: Option<&'a str>,
    pub failed_levels: &'a [CacheLevel],
}

pub type ErrorHandler = Arc<dyn Fn(&TierFailure<'_>) + Send + Sync>;

/// Returns a substitute value for reads; the return is ignored for writes.
pub type FallbackStrategy = Arc<dyn Fn(&FallbackContext<'_>) -> Option<Value> + Send + Sync>;

/// Breakers, handlers and fallbacks.
pub struct Resilience {
    config: ErrorHandlingConfig,
    breakers: HashMap<CacheLevel, CircuitBreaker>,
    handlers: BTreeMap<String, Vec<ErrorHandler>>,
    fallbacks: BTreeMap<CacheOperation, FallbackStrategy>,
}

impl Resilience {
    pub fn new(config: ErrorHandlingConfig) -> Self {
        let breakers = build_breakers(&config);
        Self {
            config,
            breakers,
            handlers: BTreeMap::new(),
            fallbacks: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ErrorHandlingConfig {
        &self.config
    }

    /// Total attempts for one repository call.
    pub fn attempts(&self) -> u32 {
        self.config.retry_attempts + 1
    }

    /// Replace the settings. Breakers restart closed.
    pub fn configure(&mut self, config: ErrorHandlingConfig) {
        self.breakers = build_breakers(&config);
        self.config = config;
    }

    pub fn allow(&mut self, level: CacheLevel, now: Instant) -> bool {
        if !self.config.circuit_breaker_enabled {
            return true;
        }
        self.breakers
            .get_mut(&level)
            .map_or(true, |breaker| breaker.allow(now))
    }

    pub fn record_success(&mut self, level: CacheLevel) {
        if let Some(breaker) = self.breakers.get_mut(&level) {
            breaker.record_success();
        }
    }

    /// Returns `true` when this failure opened the tier's circuit.
    pub fn record_failure(&mut self, level: CacheLevel, now: Instant) -> bool {
        if !self.config.circuit_breaker_enabled {
            return false;
        }
        self.breakers
            .get_mut(&level)
            .is_some_and(|breaker| breaker.record_failure(now))
    }

    pub fn reset_breaker(&mut self, level: CacheLevel) {
        if let Some(breaker) = self.breakers.get_mut(&level) {
            breaker.reset();
        }
    }

    pub fn register_handler<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&TierFailure<'_>) + Send + Sync + 'static,
    {
        self.handlers
            .entry(kind.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Replaces any fallback already registered for `operation`.
    pub fn register_fallback<F>(&mut self, operation: CacheOperation, fallback: F)
    where
        F: Fn(&FallbackContext<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.fallbacks.insert(operation, Arc::new(fallback));
    }

    /// Handlers for `kind` followed by the catch-all ones.
    pub fn handlers_for(&self, kind: &str) -> Vec<ErrorHandler> {
        let specific = self.handlers.get(kind).into_iter().flatten();
        let wildcard = self.handlers.get(ANY_ERROR).into_iter().flatten();
        specific.chain(wildcard).cloned().collect()
    }

    /// The fallback for `operation`, if fallbacks are enabled.
    pub fn fallback_for(&self, operation: CacheOperation) -> Option<FallbackStrategy> {
        if !self.config.fallback_enabled {
            return None;
        }
        self.fallbacks.get(&operation).cloned()
    }

    pub fn status(&self, now: Instant) -> ErrorHandlingStatus {
        ErrorHandlingStatus {
            config: self.config.clone(),
            handler_kinds: self
                .handlers
                .iter()
                .map(|(kind, handlers)| (kind.clone(), handlers.len()))
                .collect(),
            fallback_operations: self.fallbacks.keys().copied().collect(),
            breakers: self
                .breakers
                .iter()
                .map(|(level, breaker)| (*level, breaker.report(now)))
                .collect(),
        }
    }
}

fn build_breakers(config: &ErrorHandlingConfig) -> HashMap<CacheLevel, CircuitBreaker> {
    CacheLevel::by_priority()
        .into_iter()
        .map(|level| {
            (
                level,
                CircuitBreaker::new(config.failure_threshold, Duration::from_secs(config.cooldown_secs)),
            )
        })
        .collect()
}

/// Snapshot returned by `error_handling_status()`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorHandlingStatus {
    pub config: ErrorHandlingConfig,
    pub handler_kinds: BTreeMap<String, usize>,
    pub fallback_operations: Vec<CacheOperation>,
    pub breakers: BTreeMap<CacheLevel, BreakerReport>,
}

/// Result of `test_error_handling()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorHandlingReport {
    /// Handlers that ran for the synthetic failure.
    pub handlers_invoked: usize,
    /// Whether a read fallback produced a value.
    pub fallback_value: Option<Value>,
    /// Tiers whose probe round-trip failed.
    pub unhealthy_levels: Vec<CacheLevel>,
    /// Tiers currently skipped by their breaker.
    pub open_circuits: Vec<CacheLevel>,
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handlers_include_wildcard() {
        let mut resilience = Resilience::new(ErrorHandlingConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        resilience.register_handler("io", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = calls.clone();
        resilience.register_handler(ANY_ERROR, move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        let error = RepositoryError::Backend("boom".into());
        let failure = TierFailure {
            level: CacheLevel::Memory,
            operation: CacheOperation::Get,
            key: Some("k"),
            error: &error,
        };
        for handler in resilience.handlers_for("io") {
            handler(&failure);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(resilience.handlers_for("backend").len(), 1);
    }

    #[test]
    fn test_disabled_breaker_always_allows() {
        let config = ErrorHandlingConfig {
            circuit_breaker_enabled: false,
            failure_threshold: 1,
            ..Default::default()
        };
        let mut resilience = Resilience::new(config);
        let now = Instant::now();
        assert!(!resilience.record_failure(CacheLevel::Memory, now));
        assert!(resilience.allow(CacheLevel::Memory, now));
    }

    #[test]
    fn test_fallback_respects_toggle() {
        let mut resilience = Resilience::new(ErrorHandlingConfig::default());
        resilience.register_fallback(CacheOperation::Get, |_| Some(Value::Bool(true)));
        assert!(resilience.fallback_for(CacheOperation::Get).is_some());

        resilience.configure(ErrorHandlingConfig {
            fallback_enabled: false,
            ..Default::default()
        });
        assert!(resilience.fallback_for(CacheOperation::Get).is_none());
    }
}
