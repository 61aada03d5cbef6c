//! Side index of keys and tags written through the coordinator.
//!
//! Backends that cannot enumerate keys or invalidate by tag are served from
//! this index. It only knows about keys the coordinator wrote itself.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::cache::level::CacheLevel;

/// Key and tag bookkeeping for one or more tiers.
pub trait KeyIndex: Send + Sync {
    /// Record a key as present at `level`, carrying exactly `tags`.
    fn track(&mut self, level: CacheLevel, key: &str, tags: &BTreeSet<String>);

    /// Forget a key at `level`, including every tag reference to it.
    fn untrack(&mut self, level: CacheLevel, key: &str);

    /// All keys known at `level`.
    fn keys(&self, level: CacheLevel) -> Vec<String>;

    /// Union of keys carrying any of `tags` at `level`, deduplicated.
    fn keys_for_tags(&self, level: CacheLevel, tags: &[String]) -> Vec<String>;

    /// Drop the tag entries themselves (the keys stay tracked until untracked).
    fn remove_tags(&mut self, level: CacheLevel, tags: &[String]);

    /// Forget everything known at `level`.
    fn clear_level(&mut self, level: CacheLevel);

    /// Number of keys known at `level`.
    fn key_count(&self, level: CacheLevel) -> usize;

    /// Rough bytes held by the index.
    fn approximate_bytes(&self) -> usize;
}

/// Hash-map-of-sets implementation of [`KeyIndex`].
#[derive(Debug, Default)]
pub struct TrackedIndex {
    keys: HashMap<CacheLevel, HashSet<String>>,
    tags: HashMap<CacheLevel, HashMap<String, HashSet<String>>>,
}

impl TrackedIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyIndex for TrackedIndex {
    fn track(&mut self, level: CacheLevel, key: &str, tags: &BTreeSet<String>) {
        self.keys.entry(level).or_default().insert(key.to_string());

        // A rewrite replaces the entry's tags at the backend, so drop links
        // to tags the key no longer carries.
        let tag_map = self.tags.entry(level).or_default();
        tag_map.retain(|tag, keys| {
            if !tags.contains(tag) {
                keys.remove(key);
            }
            !keys.is_empty()
        });
        for tag in tags {
            tag_map
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn untrack(&mut self, level: CacheLevel, key: &str) {
        if let Some(keys) = self.keys.get_mut(&level) {
            keys.remove(key);
        }
        if let Some(tag_map) = self.tags.get_mut(&level) {
            tag_map.retain(|_, keys| {
                keys.remove(key);
                !keys.is_empty()
            });
        }
    }

    fn keys(&self, level: CacheLevel) -> Vec<String> {
        let mut keys: Vec<String> = self
            .keys
            .get(&level)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn keys_for_tags(&self, level: CacheLevel, tags: &[String]) -> Vec<String> {
        let Some(tag_map) = self.tags.get(&level) else {
            return Vec::new();
        };
        let union: BTreeSet<&String> = tags
            .iter()
            .filter_map(|tag| tag_map.get(tag))
            .flatten()
            .collect();
        union.into_iter().cloned().collect()
    }

    fn remove_tags(&mut self, level: CacheLevel, tags: &[String]) {
        if let Some(tag_map) = self.tags.get_mut(&level) {
            for tag in tags {
                tag_map.remove(tag);
            }
        }
    }

    fn clear_level(&mut self, level: CacheLevel) {
        self.keys.remove(&level);
        self.tags.remove(&level);
    }

    fn key_count(&self, level: CacheLevel) -> usize {
        self.keys.get(&level).map(HashSet::len).unwrap_or(0)
    }

    fn approximate_bytes(&self) -> usize {
        let keys: usize = self.keys.values().flatten().map(String::len).sum();
        let tags: usize = self
            .tags
            .values()
            .flat_map(|tag_map| tag_map.iter())
            .map(|(tag, keys)| tag.len() + keys.iter().map(String::len).sum::<usize>())
            .sum();
        keys + tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_track_and_lookup_by_tag() {
        let mut index = TrackedIndex::new();
        index.track(CacheLevel::Memory, "ip:1", &tags(&["ip", "hot"]));
        index.track(CacheLevel::Memory, "ip:2", &tags(&["ip"]));
        index.track(CacheLevel::Request, "ip:3", &tags(&["ip"]));

        assert_eq!(index.key_count(CacheLevel::Memory), 2);
        assert_eq!(
            index.keys_for_tags(CacheLevel::Memory, &["ip".into(), "hot".into()]),
            vec!["ip:1".to_string(), "ip:2".to_string()]
        );
        assert_eq!(
            index.keys_for_tags(CacheLevel::Request, &["ip".into()]),
            vec!["ip:3".to_string()]
        );
    }

    #[test]
    fn test_untrack_removes_tag_references() {
        let mut index = TrackedIndex::new();
        index.track(CacheLevel::Memory, "a", &tags(&["t"]));
        index.untrack(CacheLevel::Memory, "a");

        assert!(index.keys(CacheLevel::Memory).is_empty());
        assert!(index.keys_for_tags(CacheLevel::Memory, &["t".into()]).is_empty());
        assert_eq!(index.approximate_bytes(), 0);
    }

    #[test]
    fn test_retrack_replaces_tags() {
        let mut index = TrackedIndex::new();
        index.track(CacheLevel::Memory, "a", &tags(&["old", "both"]));
        index.track(CacheLevel::Memory, "b", &tags(&["old"]));
        index.track(CacheLevel::Memory, "a", &tags(&["both", "new"]));

        assert_eq!(
            index.keys_for_tags(CacheLevel::Memory, &["old".into()]),
            vec!["b".to_string()]
        );
        assert_eq!(
            index.keys_for_tags(CacheLevel::Memory, &["new".into(), "both".into()]),
            vec!["a".to_string()]
        );

        index.track(CacheLevel::Memory, "a", &tags(&[]));
        assert!(index.keys_for_tags(CacheLevel::Memory, &["both".into(), "new".into()]).is_empty());
        assert_eq!(index.key_count(CacheLevel::Memory), 2);
    }

    #[test]
    fn test_clear_level_is_scoped() {
        let mut index = TrackedIndex::new();
        index.track(CacheLevel::Memory, "a", &tags(&[]));
        index.track(CacheLevel::Database, "a", &tags(&[]));
        index.clear_level(CacheLevel::Memory);

        assert_eq!(index.key_count(CacheLevel::Memory), 0);
        assert_eq!(index.key_count(CacheLevel::Database), 1);
    }
}
