//! Operation statistics owned by the coordinator.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Samples kept per series.
const SAMPLE_CAPACITY: usize = 1000;

/// Counters and bounded sample series.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub gets: u64,
    pub deletes: u64,
    pub operations_count: u64,
    response_times_ms: VecDeque<f64>,
    memory_usage: VecDeque<usize>,
}

impl OperationStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Count one finished operation and sample its duration.
    pub fn record_operation(&mut self, elapsed: Duration) {
        self.operations_count += 1;
        push_bounded(&mut self.response_times_ms, elapsed.as_secs_f64() * 1000.0);
    }

    /// Sample approximate bytes held by the key/tag index.
    pub fn sample_memory(&mut self, bytes: usize) {
        push_bounded(&mut self.memory_usage, bytes);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut sorted: Vec<f64> = self.response_times_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let avg_response_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        let p95_response_ms = if sorted.is_empty() {
            0.0
        } else {
            let idx = ((sorted.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
            sorted[idx.min(sorted.len() - 1)]
        };

        StatsSnapshot {
            hits: self.hits,
            misses: self.misses,
            puts: self.puts,
            gets: self.gets,
            deletes: self.deletes,
            operations_count: self.operations_count,
            hit_ratio: self.hit_ratio(),
            avg_response_ms,
            p95_response_ms,
            response_samples: sorted.len(),
            memory_usage_bytes: self.memory_usage.back().copied().unwrap_or(0),
            peak_memory_usage_bytes: self.memory_usage.iter().copied().max().unwrap_or(0),
        }
    }
}

fn push_bounded<T>(series: &mut VecDeque<T>, value: T) {
    if series.len() == SAMPLE_CAPACITY {
        series.pop_front();
    }
    series.push_back(value);
}

/// Serializable view of [`OperationStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub gets: u64,
    pub deletes: u64,
    pub operations_count: u64,
    pub hit_ratio: f64,
    pub avg_response_ms: f64,
    pub p95_response_ms: f64,
    pub response_samples: usize,
    pub memory_usage_bytes: usize,
    pub peak_memory_usage_bytes: usize,
}
