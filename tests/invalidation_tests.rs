//! Integration tests for pattern, tag and namespace invalidation and the
//! fluent call options.

mod common;

use serde_json::{json, Value};

use tiered_cache::cache::CacheKey;
use tiered_cache::repository::Repository;
use tiered_cache::{CacheError, CacheLevel};

use common::{coordinator, coordinator_with, test_config};

#[tokio::test]
async fn test_tag_invalidation_removes_every_tagged_key() {
    let (cache, tiers) = coordinator();
    cache
        .tags(["ip", "reputation"])
        .put("a", json!(1))
        .await
        .unwrap();
    cache.tags(["ip"]).put("b", json!(2)).await.unwrap();
    cache.tags(["geo"]).put("c", json!(3)).await.unwrap();

    let removed = cache.invalidate_by_tags(&["ip"], None).await.unwrap();
    assert_eq!(removed, 6);

    for level in CacheLevel::by_priority() {
        assert!(!tiers.get(level).contains("a").await, "a left at {level}");
        assert!(!tiers.get(level).contains("b").await, "b left at {level}");
        assert!(tiers.get(level).contains("c").await, "c missing at {level}");
    }
    assert_eq!(cache.lookup("a", None).await.unwrap(), None);
    assert_eq!(cache.tracked_keys(CacheLevel::Database).await, vec!["c".to_string()]);
}

#[tokio::test]
async fn test_tag_invalidation_reaches_untracked_native_entries() {
    let (cache, tiers) = coordinator();
    // Written behind the coordinator's back, so only the native tag flush sees it.
    tiers
        .memory
        .put_tagged(&["ip".to_string()], "stray", json!(0), 60)
        .await
        .unwrap();

    let removed = cache
        .invalidate_by_tags(&["ip"], Some(&[CacheLevel::Memory][..]))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(!tiers.memory.contains("stray").await);
}

#[tokio::test]
async fn test_blank_tags_are_a_no_op() {
    let (cache, _tiers) = coordinator();
    assert_eq!(cache.invalidate_by_tags(&["", "  "], None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pattern_invalidation() {
    let (cache, tiers) = coordinator();
    for key in ["user:1", "user:2", "order:1"] {
        cache.put(key, json!(key), None).await.unwrap();
    }

    let removed = cache.invalidate_by_pattern("user:*", None).await.unwrap();
    assert_eq!(removed, 6);
    for level in CacheLevel::by_priority() {
        assert!(!tiers.get(level).contains("user:1").await);
        assert!(tiers.get(level).contains("order:1").await);
    }
}

#[tokio::test]
async fn test_pattern_invalidation_enumerates_where_supported() {
    let (cache, tiers) = coordinator();
    tiers.memory.seed("user:9", json!(9)).await;
    tiers.database.seed("user:8", json!(8)).await;

    let removed = cache.invalidate_by_pattern("user:?", None).await.unwrap();
    assert_eq!(removed, 1);
    assert!(!tiers.memory.contains("user:9").await);
    // The database tier only knows keys the coordinator wrote.
    assert!(tiers.database.contains("user:8").await);
}

#[tokio::test]
async fn test_invalid_pattern() {
    let (cache, _tiers) = coordinator();
    assert!(matches!(
        cache.invalidate_by_pattern("", None).await,
        Err(CacheError::InvalidPattern { .. })
    ));
    assert!(matches!(
        cache.invalidate_by_pattern("user:[a-", None).await,
        Err(CacheError::InvalidPattern { .. })
    ));
}

#[tokio::test]
async fn test_disabled_tag_invalidation() {
    let mut config = test_config();
    config.features.tag_invalidation = false;
    let (cache, _tiers) = coordinator_with(config);

    assert!(matches!(
        cache.invalidate_by_tags(&["ip"], None).await,
        Err(CacheError::FeatureDisabled("tag_invalidation"))
    ));
}

#[tokio::test]
async fn test_namespace_invalidation() {
    let (cache, tiers) = coordinator();
    cache
        .put(CacheKey::new("1.2.3.4").with_namespace("ip"), json!(1), None)
        .await
        .unwrap();
    cache
        .put(CacheKey::new("5.6.7.8").with_namespace("ip").with_prefix("app"), json!(2), None)
        .await
        .unwrap();
    cache.put("ship:x", json!(3), None).await.unwrap();

    let removed = cache.invalidate_by_namespace("ip", None).await.unwrap();
    assert_eq!(removed, 6);
    assert!(!tiers.memory.contains("ip:1.2.3.4").await);
    assert!(!tiers.memory.contains("app:ip:5.6.7.8").await);
    assert!(tiers.memory.contains("ship:x").await);

    assert!(cache.invalidate_by_namespace(" ", None).await.is_err());
}

#[tokio::test]
async fn test_fluent_options_do_not_leak() {
    let (cache, tiers) = coordinator();
    cache.tags(["t"]).ttl(60).put("x", json!(1)).await.unwrap();
    assert_eq!(tiers.memory.last_ttl(), Some(60));

    cache.put("y", json!(2), None).await.unwrap();
    assert_eq!(tiers.memory.last_ttl(), Some(1800));

    cache.invalidate_by_tags(&["t"], None).await.unwrap();
    assert_eq!(cache.get("x", Value::Null).await.unwrap(), Value::Null);
    assert_eq!(cache.get("y", Value::Null).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_fluent_levels_and_prefix() {
    let (cache, tiers) = coordinator();
    cache
        .levels(&[CacheLevel::Memory])
        .put("only-memory", json!(true))
        .await
        .unwrap();
    assert!(!tiers.request.contains("only-memory").await);
    assert!(tiers.memory.contains("only-memory").await);
    assert!(!tiers.database.contains("only-memory").await);

    cache.prefix("app").put("k", json!("v")).await.unwrap();
    assert_eq!(cache.get("app:k", Value::Null).await.unwrap(), json!("v"));
    assert_eq!(
        cache.prefix("app").get("k", Value::Null).await.unwrap(),
        json!("v")
    );

    assert!(cache.prefix("app").forget("k").await.unwrap());
    assert!(!cache.has("app:k").await.unwrap());
}

#[tokio::test]
async fn test_fluent_tagged_reads_and_flush() {
    let (cache, tiers) = coordinator();
    cache.tags(["ip"]).put("tagged", json!(1)).await.unwrap();

    assert_eq!(cache.tags(["ip"]).get("tagged", Value::Null).await.unwrap(), json!(1));
    assert!(cache.tags(["ip"]).flush().await.unwrap());
    for level in CacheLevel::by_priority() {
        assert!(!tiers.get(level).contains("tagged").await);
    }
}

#[tokio::test]
async fn test_tagged_read_misses_tag_aware_tiers_and_retags_backfill() {
    let (cache, tiers) = coordinator();
    cache.tags(["ip"]).put("tagged", json!(1)).await.unwrap();

    // The database tier ignores tags, so the value is found there and copied
    // up under the tags of the read.
    assert_eq!(cache.tags(["geo"]).get("tagged", Value::Null).await.unwrap(), json!(1));

    assert!(cache.tags(["ip"]).flush().await.unwrap());
    assert!(!tiers.database.contains("tagged").await);
    assert!(tiers.memory.contains("tagged").await);

    assert!(cache.tags(["geo"]).flush().await.unwrap());
    for level in CacheLevel::by_priority() {
        assert!(!tiers.get(level).contains("tagged").await);
    }
}

#[tokio::test]
async fn test_rewrite_with_new_tags_drops_old_tag() {
    let (cache, tiers) = coordinator();
    cache.tags(["old"]).put("k", json!(1)).await.unwrap();
    cache.tags(["new"]).put("k", json!(2)).await.unwrap();

    assert_eq!(cache.invalidate_by_tags(&["old"], None).await.unwrap(), 0);
    for level in CacheLevel::by_priority() {
        assert!(tiers.get(level).contains("k").await, "k lost at {level}");
    }

    assert_eq!(cache.invalidate_by_tags(&["new"], None).await.unwrap(), 3);
    assert_eq!(cache.get("k", Value::Null).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_fluent_remember_scoped_to_levels() {
    let (cache, tiers) = coordinator();
    let value = cache
        .levels(&[CacheLevel::Database])
        .ttl(120)
        .remember("slow", || async { Ok::<_, std::io::Error>(json!("computed")) })
        .await
        .unwrap();

    assert_eq!(value, json!("computed"));
    assert!(tiers.database.contains("slow").await);
    assert!(!tiers.memory.contains("slow").await);
    assert_eq!(tiers.database.last_ttl(), Some(120));
}
