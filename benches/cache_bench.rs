//! Benchmarks for the tiered cache.

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use tokio::runtime::Runtime;

use tiered_cache::cache::pattern::glob_to_regex;
use tiered_cache::cache::tracker::{KeyIndex, TrackedIndex};
use tiered_cache::cache::CacheCoordinator;
use tiered_cache::config::Config;
use tiered_cache::CacheLevel;

fn memory_only() -> Config {
    let mut config = Config::default();
    if let Some(database) = config.levels.get_mut(&CacheLevel::Database) {
        database.enabled = false;
    }
    config
}

fn bench_get_hit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = CacheCoordinator::new(memory_only()).unwrap();
    rt.block_on(async {
        cache
            .put("ip:1.2.3.4", json!({"score": 87, "country": "DE"}), None)
            .await
            .unwrap();
    });

    c.bench_function("get_request_tier_hit", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cache.get("ip:1.2.3.4", Value::Null).await.unwrap());
        })
    });
}

fn bench_put_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = CacheCoordinator::new(memory_only()).unwrap();

    c.bench_function("put_two_tiers", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cache.put("session:abc", json!([1, 2, 3]), Some(60)).await.unwrap());
        })
    });
}

fn bench_tag_lookup(c: &mut Criterion) {
    let mut index = TrackedIndex::new();
    for i in 0..10_000 {
        let tags: BTreeSet<String> = [format!("t{}", i % 100)].into_iter().collect();
        index.track(CacheLevel::Memory, &format!("key:{i}"), &tags);
    }
    let wanted = vec!["t7".to_string(), "t42".to_string()];

    c.bench_function("keys_for_tags_10k", |b| {
        b.iter(|| black_box(index.keys_for_tags(CacheLevel::Memory, black_box(&wanted))))
    });
}

fn bench_glob_match(c: &mut Criterion) {
    let re = glob_to_regex("ip:192.168.*").unwrap();
    let keys: Vec<String> = (0..10_000).map(|i| format!("ip:192.{}.0.{}", i % 256, i % 7)).collect();

    c.bench_function("glob_match_10k", |b| {
        b.iter(|| black_box(keys.iter().filter(|k| re.is_match(k)).count()))
    });
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_put_fan_out,
    bench_tag_lookup,
    bench_glob_match,
);
criterion_main!(benches);
