//! Cache tier descriptors.
//!
//! A level is the unit of fallback: reads walk levels from the lowest
//! priority number (closest, fastest) to the highest, writes fan out to all
//! of them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    /// Tier 1: per-request scratch map. Cleared by the host at the end of a request.
    Request,
    /// Tier 2: shared in-process store with time-based expiry.
    Memory,
    /// Tier 3: persistent store.
    Database,
}

impl CacheLevel {
    /// All levels, closest first.
    pub fn by_priority() -> Vec<CacheLevel> {
        vec![CacheLevel::Request, CacheLevel::Memory, CacheLevel::Database]
    }

    /// Numeric tier id used by the tier-specific API.
    pub fn id(&self) -> u8 {
        match self {
            CacheLevel::Request => 1,
            CacheLevel::Memory => 2,
            CacheLevel::Database => 3,
        }
    }

    /// Look up a level by its numeric id.
    pub fn from_id(id: u8) -> Option<CacheLevel> {
        match id {
            1 => Some(CacheLevel::Request),
            2 => Some(CacheLevel::Memory),
            3 => Some(CacheLevel::Database),
            _ => None,
        }
    }

    /// Lower = checked first.
    pub fn priority(&self) -> u8 {
        self.id()
    }

    /// Longest TTL this tier accepts, in seconds. Zero means the tier is
    /// scope-bound rather than time-bound.
    pub fn max_ttl(&self) -> u64 {
        match self {
            CacheLevel::Request => 0,
            CacheLevel::Memory => 86_400,
            CacheLevel::Database => 604_800,
        }
    }

    pub fn supports_tagging(&self) -> bool {
        !matches!(self, CacheLevel::Database)
    }

    pub fn supports_pattern_matching(&self) -> bool {
        !matches!(self, CacheLevel::Database)
    }

    /// Default repository driver for this tier.
    pub fn backend_name(&self) -> &'static str {
        match self {
            CacheLevel::Request => "array",
            CacheLevel::Memory => "memory",
            CacheLevel::Database => "file",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CacheLevel::Request => "request",
            CacheLevel::Memory => "memory",
            CacheLevel::Database => "database",
        }
    }

    /// Levels strictly closer than `self`, closest first.
    pub fn faster(&self) -> Vec<CacheLevel> {
        Self::by_priority()
            .into_iter()
            .filter(|level| level.priority() < self.priority())
            .collect()
    }
}

impl std::fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CacheLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request" | "l1" => Ok(CacheLevel::Request),
            "memory" | "l2" => Ok(CacheLevel::Memory),
            "database" | "l3" => Ok(CacheLevel::Database),
            other => Err(format!("unknown cache level '{other}'")),
        }
    }
}

/// Sort and dedup an explicit level list into fallback order.
pub fn ordered(levels: &[CacheLevel]) -> Vec<CacheLevel> {
    let mut levels = levels.to_vec();
    levels.sort_by_key(|level| level.priority());
    levels.dedup();
    levels
}
