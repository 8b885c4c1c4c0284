//! Behaviour every adapter shares, exercised through `dyn Cacher`

use async_trait::async_trait;
use cacher::prelude::*;
use cache_system::{MemcacheClient, TtlNormalizer};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-process stand-in for a memcached server
#[derive(Debug, Default)]
struct MemoryMemcache {
    entries: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
}

#[async_trait]
impl MemcacheClient for MemoryMemcache {
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, key: &str, value: &Value, _expiration: u32) -> Result<bool, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(true)
    }

    async fn set_multi(&self, entries: &[(String, Value)], expiration: u32) -> Result<bool, CacheError> {
        for (key, value) in entries {
            self.set(key, value, expiration).await?;
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

fn storing_caches() -> Vec<(&'static str, Arc<dyn Cacher>)> {
    let shared_memory: Arc<dyn Cacher> = Arc::new(SharedMemoryCacher::new(
        SharedSegment::new(None),
        Namespace::new("contract:"),
        0,
    ));
    let memcached: Arc<dyn Cacher> = Arc::new(MemcachedCacher::new(
        MemoryMemcache::default(),
        Namespace::new("contract:"),
        0,
    ));
    vec![("shared_memory", shared_memory), ("memcached", memcached)]
}

#[tokio::test]
async fn test_round_trip_and_falsy_values() {
    for (backend, cache) in storing_caches() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([])] {
            assert!(cache.set("falsy", value.clone(), Ttl::Default).await, "{backend}");
            assert_eq!(cache.get("falsy", json!("miss")).await, value, "{backend}");
            assert!(cache.has("falsy").await, "{backend}");
        }

        let nested = json!({"user": {"id": 7, "tags": ["a", "b"]}});
        assert!(cache.set("nested", nested.clone(), Ttl::seconds(60)).await);
        assert_eq!(cache.get("nested", Value::Null).await, nested, "{backend}");
    }
}

#[tokio::test]
async fn test_miss_returns_default() {
    for (backend, cache) in storing_caches() {
        assert_eq!(cache.get("absent", json!("fallback")).await, json!("fallback"), "{backend}");
        assert!(!cache.has("absent").await, "{backend}");
    }
}

#[tokio::test]
async fn test_delete_then_miss() {
    for (backend, cache) in storing_caches() {
        cache.set("gone", json!(1), Ttl::Default).await;
        assert!(cache.delete("gone").await, "{backend}");
        assert!(!cache.has("gone").await, "{backend}");
        assert_eq!(cache.get("gone", json!("d")).await, json!("d"), "{backend}");
    }
}

#[tokio::test]
async fn test_clear_never_supported() {
    for (backend, cache) in storing_caches() {
        cache.set("kept", json!(1), Ttl::Default).await;
        assert!(!cache.clear().await, "{backend}");
        assert!(cache.has("kept").await, "{backend}");
    }
    assert!(!NullCacher::new().clear().await);
}

#[tokio::test]
async fn test_get_multiple_order_and_defaults() {
    for (backend, cache) in storing_caches() {
        let written = cache
            .set_multiple(
                vec![(json!("b"), json!(2)), (json!(10), json!("ten"))],
                Ttl::Default,
            )
            .await
            .unwrap();
        assert!(written, "{backend}");

        let result = cache
            .get_multiple(vec![json!("z"), json!(10), json!("b")], json!(false))
            .await
            .unwrap();
        let keys: Vec<&String> = result.keys().collect();
        assert_eq!(keys, vec!["z", "10", "b"], "{backend}");
        assert_eq!(result["z"], json!(false));
        assert_eq!(result["10"], json!("ten"));
        assert_eq!(result["b"], json!(2));
    }
}

#[tokio::test]
async fn test_delete_multiple_ignores_absent_keys() {
    for (backend, cache) in storing_caches() {
        cache.set("one", json!(1), Ttl::Default).await;
        let ok = cache
            .delete_multiple(vec![json!("one"), json!("never-set")])
            .await
            .unwrap();
        assert!(ok, "{backend}");
        assert!(!cache.has("one").await, "{backend}");
    }
}

#[tokio::test]
async fn test_invalid_keys_rejected_everywhere() {
    let mut caches = storing_caches();
    let null: Arc<dyn Cacher> = Arc::new(NullCacher::new());
    caches.push(("null", null));

    for (backend, cache) in caches {
        for bad in [json!(1.5), json!(true), json!(null), json!(["a"]), json!({"k": 1})] {
            let err = cache.get_multiple(vec![bad.clone()], Value::Null).await;
            assert!(matches!(err, Err(CacheError::Validation(_))), "{backend} {bad}");

            let err = cache.set_multiple(vec![(bad.clone(), json!(1))], Ttl::Default).await;
            assert!(matches!(err, Err(CacheError::Validation(_))), "{backend} {bad}");

            let err = cache.delete_multiple(vec![bad.clone()]).await;
            assert!(matches!(err, Err(CacheError::Validation(_))), "{backend} {bad}");
        }
    }
}

#[tokio::test]
async fn test_invalid_batch_touches_no_backend() {
    let cache = MemcachedCacher::new(MemoryMemcache::default(), Namespace::new("spy:"), 0);

    let result = cache
        .set_multiple(
            vec![(json!("good"), json!(1)), (json!(2.5), json!(2))],
            Ttl::Default,
        )
        .await;
    assert!(result.is_err());
    assert_eq!(cache.client().calls.load(Ordering::SeqCst), 0);
    assert!(cache.client().entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_namespaces_isolate_on_shared_segment() {
    let segment = SharedSegment::new(None);
    let first = SharedMemoryCacher::new(segment.clone(), Namespace::new("first:"), 0);
    let second = SharedMemoryCacher::new(segment.clone(), Namespace::new("second:"), 0);

    assert!(first.set("k", json!("from first"), Ttl::Default).await);
    assert!(!second.has("k").await);
    assert_eq!(second.get("k", json!("miss")).await, json!("miss"));

    assert!(second.set("k", json!("from second"), Ttl::Default).await);
    assert_eq!(first.get("k", Value::Null).await, json!("from first"));
    assert_eq!(segment.len(), 2);
}

#[tokio::test]
async fn test_seeded_namespaces_share_entries() {
    let segment = SharedSegment::new(None);
    let writer = SharedMemoryCacher::new(segment.clone(), Namespace::from_seed("orders"), 0);
    let reader = SharedMemoryCacher::new(segment, Namespace::from_seed("orders"), 0);

    writer.set("42", json!({"total": 10}), Ttl::Default).await;
    assert_eq!(reader.get("42", Value::Null).await, json!({"total": 10}));
}

#[tokio::test]
async fn test_null_cache_always_misses() {
    let cache: Arc<dyn Cacher> = Arc::new(NullCacher::new());

    assert!(!cache.set("k", json!(1), Ttl::Default).await);
    assert_eq!(cache.get("k", json!("d")).await, json!("d"));
    assert!(!cache.has("k").await);
    assert!(!cache.delete("k").await);

    let result = cache
        .get_multiple(vec![json!("a"), json!(1)], json!(0))
        .await
        .unwrap();
    assert_eq!(Value::Object(result), json!({"a": 0, "1": 0}));
}

#[tokio::test]
async fn test_ext_helpers_drain_iterators() {
    for (backend, cache) in storing_caches() {
        let pairs = (1..=3).map(|i| (json!(i), json!(i * 10)));
        assert!(cache.set_many(pairs, Ttl::Default).await.unwrap(), "{backend}");

        let values = cache.get_many((1..=3).map(|i| json!(i)), Value::Null).await.unwrap();
        assert_eq!(Value::Object(values), json!({"1": 10, "2": 20, "3": 30}), "{backend}");

        assert!(cache.delete_many(["1", "2"].map(|k| json!(k))).await.unwrap());
        assert!(!cache.has("1").await, "{backend}");
        assert!(cache.has("3").await, "{backend}");
    }
}

#[test]
fn test_month_interval_is_calendar_month() {
    let normalizer = TtlNormalizer::new(0);
    assert_eq!(
        normalizer.normalize(&Ttl::Interval(Interval::months(1))),
        31 * 24 * 60 * 60
    );
    assert_eq!(normalizer.normalize(&Ttl::seconds(-5)), 0);
    assert_eq!(TtlNormalizer::new(90).normalize(&Ttl::Default), 90);
}
