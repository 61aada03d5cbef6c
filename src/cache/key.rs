//! Cache key value type.
//!
//! A key is built once per operation and never mutated; layering a prefix or
//! extra tags produces a new key.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::CacheError;

/// Longest rendered key accepted by any tier.
pub const MAX_KEY_LEN: usize = 250;

/// A normalized cache identifier plus optional tags and TTL.
#[derive(Debug, Clone)]
pub struct CacheKey {
    raw: String,
    namespace: String,
    tags: BTreeSet<String>,
    ttl: Option<u64>,
    rendered: String,
}

impl CacheKey {
    /// Build a key from a plain string. Surrounding whitespace is dropped.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into().trim().to_string();
        Self {
            rendered: raw.clone(),
            raw,
            namespace: String::new(),
            tags: BTreeSet::new(),
            ttl: None,
        }
    }

    /// Place the key under `namespace` (rendered as `namespace:raw`).
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into().trim().trim_end_matches(':').to_string();
        self.rendered = render(&self.namespace, &self.raw);
        self
    }

    /// Prepend `prefix` in front of any existing namespace.
    pub fn with_prefix(self, prefix: &str) -> Self {
        let prefix = prefix.trim().trim_end_matches(':');
        if prefix.is_empty() {
            return self;
        }
        let namespace = if self.namespace.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}:{}", self.namespace)
        };
        self.with_namespace(namespace)
    }

    /// Merge tags into the key. Blank tags are ignored, duplicates collapse.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags.extend(
            tags.into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty()),
        );
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Tags as an owned list, in sorted order.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    pub fn has_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    /// The string handed to repositories.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Whether the rendered form is usable as a storage key.
    pub fn is_valid(&self) -> bool {
        is_valid_key(&self.rendered)
    }

    /// Return the key if valid, otherwise an `InvalidKey` error.
    pub fn validate(self) -> Result<Self, CacheError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(CacheError::InvalidKey(self.rendered))
        }
    }
}

fn render(namespace: &str, raw: &str) -> String {
    if namespace.is_empty() {
        raw.to_string()
    } else {
        format!("{namespace}:{raw}")
    }
}

/// Non-empty, bounded, restricted charset.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':' | b'@' | b'/'))
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.rendered == other.rendered
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rendered.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Conversion into a validated key at the coordinator boundary.
pub trait IntoCacheKey {
    fn into_cache_key(self) -> Result<CacheKey, CacheError>;
}

impl IntoCacheKey for CacheKey {
    fn into_cache_key(self) -> Result<CacheKey, CacheError> {
        self.validate()
    }
}

impl IntoCacheKey for &CacheKey {
    fn into_cache_key(self) -> Result<CacheKey, CacheError> {
        self.clone().validate()
    }
}

impl IntoCacheKey for &str {
    fn into_cache_key(self) -> Result<CacheKey, CacheError> {
        CacheKey::new(self).validate()
    }
}

impl IntoCacheKey for String {
    fn into_cache_key(self) -> Result<CacheKey, CacheError> {
        CacheKey::new(self).validate()
    }
}

impl IntoCacheKey for &String {
    fn into_cache_key(self) -> Result<CacheKey, CacheError> {
        CacheKey::new(self.as_str()).validate()
    }
}
