/*!
 * Tests for the tiered cache
 */

use bytes::Bytes;
use std::time::Duration;

use panelglot::cache::{CacheConfig, DataClass, Lookup, MemoryTier, TieredCache};
use panelglot::fingerprint::Fingerprint;
use panelglot::TranslateOptions;

fn config(max_items: usize, max_bytes: usize) -> CacheConfig {
    CacheConfig {
        max_items,
        max_bytes,
        translation_ttl: Duration::from_secs(60),
        detection_ttl: Duration::from_secs(600),
        configuration_ttl: Duration::from_secs(3600),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_ttlBoundary_shouldHitJustBeforeAndMissJustAfter() {
    let cache = TieredCache::new(config(10, 1024));
    cache
        .put_bytes("tr:boundary", Bytes::from_static(b"bonjour"), DataClass::Translation)
        .await;

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(
        cache.get_bytes("tr:boundary").await,
        Some(Bytes::from_static(b"bonjour"))
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get_bytes("tr:boundary").await, None);

    let stats = cache.stats();
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_detectionClass_shouldOutliveTranslationClass() {
    let cache = TieredCache::new(config(10, 1024));
    cache.put("tr:a", &"x".to_string(), DataClass::Translation).await;
    cache.put("ocr:a", &"y".to_string(), DataClass::Detection).await;

    tokio::time::advance(Duration::from_secs(120)).await;

    assert_eq!(cache.get::<String>("tr:a").await, None);
    assert_eq!(cache.get::<String>("ocr:a").await, Some("y".to_string()));
}

#[tokio::test]
async fn test_cache_overItemBound_shouldEvictLeastRecentlyUsed() {
    let cache = TieredCache::new(config(2, 1024));
    cache.put("k1", &1u32, DataClass::Translation).await;
    cache.put("k2", &2u32, DataClass::Translation).await;

    // Touch k1 so k2 becomes the eviction candidate.
    assert_eq!(cache.get::<u32>("k1").await, Some(1));
    cache.put("k3", &3u32, DataClass::Translation).await;

    assert_eq!(cache.get::<u32>("k2").await, None);
    assert_eq!(cache.get::<u32>("k1").await, Some(1));
    assert_eq!(cache.get::<u32>("k3").await, Some(3));
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_cache_overByteBound_shouldEvictUntilWithinBudget() {
    let cache = TieredCache::new(config(100, 10));
    cache.put_bytes("a", Bytes::from(vec![0u8; 6]), DataClass::Translation).await;
    cache.put_bytes("b", Bytes::from(vec![0u8; 6]), DataClass::Translation).await;

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert!(stats.bytes <= 10);
    assert_eq!(cache.get_bytes("a").await, None);
}

#[tokio::test]
async fn test_cache_oversizedPayload_shouldBeRejected() {
    let cache = TieredCache::new(config(100, 4));
    cache.put_bytes("big", Bytes::from(vec![0u8; 5]), DataClass::Translation).await;

    assert_eq!(cache.get_bytes("big").await, None);
    assert_eq!(cache.stats().rejected, 1);
}

#[tokio::test]
async fn test_cache_undecodableEntry_shouldCountAsMissAndBeDropped() {
    let cache = TieredCache::new(config(10, 1024));
    cache.put_bytes("k", Bytes::from_static(b"not json"), DataClass::Translation).await;

    assert_eq!(cache.get::<Vec<String>>("k").await, None);
    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test]
async fn test_cache_hitRate_shouldReflectLookups() {
    let cache = TieredCache::new(config(10, 1024));
    cache.put("k", &"v".to_string(), DataClass::Translation).await;
    let _ = cache.get::<String>("k").await;
    let _ = cache.get::<String>("missing").await;

    let stats = cache.stats();
    assert_eq!(stats.hits(), 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_cache_sweeper_shouldDropExpiredEntries() {
    let cache = TieredCache::new(config(10, 1024));
    let token = tokio_util::sync::CancellationToken::new();
    cache.put("tr:old", &"v".to_string(), DataClass::Translation).await;
    let handle = cache.spawn_sweeper(Duration::from_secs(30), token.clone());

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(cache.stats().entries, 0);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_memoryTier_get_shouldCountAccesses() {
    let mut tier = MemoryTier::new(4, 1024);
    tier.insert("k", Bytes::from_static(b"v"), Duration::from_secs(10));

    assert!(matches!(tier.get("k"), Lookup::Hit(_)));
    assert!(matches!(tier.get("k"), Lookup::Hit(_)));
    assert_eq!(tier.access_count("k"), Some(2));
    assert!(matches!(tier.get("other"), Lookup::Miss));
}

#[test]
fn test_dataClass_key_shouldPrefixFingerprint() {
    let fingerprint = Fingerprint::translation("mock", "Hello", "fr", &TranslateOptions::default());
    let key = DataClass::Translation.key(fingerprint);

    assert!(key.starts_with("tr:"));
    assert_eq!(key.len(), "tr:".len() + 16);
    assert!(DataClass::Detection.key(fingerprint).starts_with("ocr:"));
}
