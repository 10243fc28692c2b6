use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recall_cache::{ManualClock, SemanticCache};
use recall_core::config::CacheConfig;
use recall_core::types::{HitKind, RankedResult, ResultSet, SourceKind};
use tokio_util::sync::CancellationToken;

const DIM: usize = 8;

fn basis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

/// Unit vector whose cosine with `basis(0)` is `cos`.
fn tilted(cos: f32) -> Vec<f32> {
    tilted_along(&[1], cos)
}

/// Like [`tilted`], with the remainder spread evenly over `axes`.
fn tilted_along(axes: &[usize], cos: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[0] = cos;
    let rest = ((1.0 - cos * cos) / axes.len() as f32).sqrt();
    for &i in axes {
        v[i] = rest;
    }
    v
}

/// With 4 bucket bits over `DIM` components, bits sample components 0, 2, 4 and 6.
fn four_bit_config() -> CacheConfig {
    CacheConfig { bucket_bits: 4, similarity_threshold: 0.97, ..CacheConfig::default() }
}

fn result_set(tag: &str) -> ResultSet {
    ResultSet {
        generation: 1,
        depth: 5,
        results: vec![RankedResult {
            chunk_id: tag.to_string(),
            score: 1.0,
            rank: 1,
            sources: vec![SourceKind::Lexical],
            lexical_score: Some(2.5),
            vector_score: None,
        }],
    }
}

fn tag(hit: &recall_cache::CacheHit) -> &str {
    &hit.value.results[0].chunk_id
}

fn cache_with(config: CacheConfig) -> (SemanticCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let cache = SemanticCache::new(config, clock.clone()).unwrap();
    (cache, clock)
}

#[test]
fn put_then_get_is_an_exact_hit() {
    let (cache, _) = cache_with(CacheConfig::default());
    cache.put("What is the VPN policy?", &basis(0), result_set("vpn")).unwrap();

    let hit = cache.get("  what is the vpn POLICY? ", &basis(0)).unwrap().unwrap();
    assert_eq!(hit.kind, HitKind::Exact);
    assert_eq!(hit.similarity, 1.0);
    assert_eq!(tag(&hit), "vpn");
    assert_eq!(hit.hits, 1);
    assert_eq!(cache.get("what is the vpn policy?", &basis(0)).unwrap().unwrap().hits, 2);
}

#[test]
fn near_duplicate_embedding_is_a_semantic_hit_above_threshold() {
    let (cache, _) = cache_with(CacheConfig { similarity_threshold: 0.97, ..CacheConfig::default() });
    cache.put("what is the vpn policy", &basis(0), result_set("vpn")).unwrap();

    let hit = cache.get("vpn policy rules", &tilted(0.99)).unwrap().unwrap();
    assert_eq!(hit.kind, HitKind::Semantic);
    assert!((hit.similarity - 0.99).abs() < 1e-4, "similarity {}", hit.similarity);
    assert_eq!(tag(&hit), "vpn");
}

#[test]
fn near_duplicate_below_threshold_misses() {
    let (cache, _) = cache_with(CacheConfig { similarity_threshold: 0.995, ..CacheConfig::default() });
    cache.put("what is the vpn policy", &basis(0), result_set("vpn")).unwrap();
    assert!(cache.get("vpn policy rules", &tilted(0.99)).unwrap().is_none());
}

#[test]
fn neighbour_buckets_are_scanned_up_to_the_configured_radius() {
    let one_bit_away = tilted_along(&[2], 0.99);
    let two_bits_away = tilted_along(&[2, 4], 0.99);
    let home = |cache: &SemanticCache, v: &[f32]| cache.fingerprint("x", v).bucket();

    for (radius, one, two) in [(0, false, false), (1, true, false), (2, true, true)] {
        let (cache, _) = cache_with(CacheConfig { scan_radius: radius, ..four_bit_config() });
        assert_eq!((home(&cache, &basis(0)) ^ home(&cache, &one_bit_away)).count_ones(), 1);
        assert_eq!((home(&cache, &basis(0)) ^ home(&cache, &two_bits_away)).count_ones(), 2);

        cache.put("what is the vpn policy", &basis(0), result_set("vpn")).unwrap();
        assert_eq!(cache.get("vpn policy rules", &one_bit_away).unwrap().is_some(), one, "radius {radius}");
        assert_eq!(cache.get("vpn access rules", &two_bits_away).unwrap().is_some(), two, "radius {radius}");
    }
}

/// Random unit vector plus a second one at exactly `cos` to it.
fn random_pair(rng: &mut StdRng, dim: usize, cos: f32) -> (Vec<f32>, Vec<f32>) {
    let unit = |v: Vec<f32>| {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect::<Vec<f32>>()
    };
    let a = unit((0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect());
    let w: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let along: f32 = w.iter().zip(&a).map(|(x, y)| x * y).sum();
    let w = unit(w.iter().zip(&a).map(|(x, y)| x - along * y).collect());
    let sin = (1.0 - cos * cos).sqrt();
    let b = a.iter().zip(&w).map(|(x, y)| cos * x + sin * y).collect();
    (a, b)
}

fn semantic_hits_over_random_pairs(config: CacheConfig, pairs: usize) -> usize {
    let (cache, _) = cache_with(config);
    let mut rng = StdRng::seed_from_u64(7);
    let mut hits = 0;
    for i in 0..pairs {
        let (stored, asked) = random_pair(&mut rng, 768, 0.99);
        cache.put(&format!("stored {i}"), &stored, result_set(&i.to_string())).unwrap();
        if let Some(hit) = cache.get(&format!("asked {i}"), &asked).unwrap() {
            assert_eq!(hit.kind, HitKind::Semantic);
            if tag(&hit) == i.to_string() {
                hits += 1;
            }
        }
    }
    hits
}

#[test]
fn default_bucketing_finds_high_dimensional_near_duplicates() {
    let config = CacheConfig::default();
    assert!(config.similarity_threshold <= 0.99);
    // each pair misses with probability well under 0.1%
    let hits = semantic_hits_over_random_pairs(config, 200);
    assert!(hits >= 198, "only {hits}/200 near duplicates found");
}

#[test]
fn full_radius_finds_every_high_dimensional_near_duplicate() {
    let config = CacheConfig { scan_radius: CacheConfig::default().bucket_bits, ..CacheConfig::default() };
    assert_eq!(semantic_hits_over_random_pairs(config, 200), 200);
}

#[test]
fn most_similar_entry_wins() {
    let (cache, _) = cache_with(CacheConfig { bucket_bits: 0, similarity_threshold: 0.9, ..CacheConfig::default() });
    cache.put("far", &tilted(0.95), result_set("far")).unwrap();
    cache.put("near", &tilted(0.99), result_set("near")).unwrap();
    let hit = cache.get("query", &basis(0)).unwrap().unwrap();
    assert_eq!(tag(&hit), "near");

    // equal similarity: the earlier entry wins
    let (cache, _) = cache_with(CacheConfig { bucket_bits: 0, similarity_threshold: 0.9, ..CacheConfig::default() });
    cache.put("first", &tilted(0.98), result_set("first")).unwrap();
    cache.put("second", &tilted(0.98), result_set("second")).unwrap();
    let hit = cache.get("query", &basis(0)).unwrap().unwrap();
    assert_eq!(tag(&hit), "first");
}

#[test]
fn entries_expire_at_ttl() {
    let (cache, clock) = cache_with(CacheConfig { ttl_secs: 60, ..CacheConfig::default() });
    cache.put("leave policy", &basis(2), result_set("leave")).unwrap();

    clock.advance(Duration::from_secs(59));
    assert!(cache.get("leave policy", &basis(2)).unwrap().is_some());

    clock.advance(Duration::from_secs(1));
    assert!(cache.get("leave policy", &basis(2)).unwrap().is_none());
    assert_eq!(cache.len(), 0);
    let stats = cache.stats();
    assert_eq!((stats.exact_hits, stats.misses, stats.ttl_evictions), (1, 1, 1));
}

#[test]
fn sweep_removes_expired_entries() {
    let (cache, clock) = cache_with(CacheConfig { ttl_secs: 60, ..CacheConfig::default() });
    cache.put("a", &basis(0), result_set("a")).unwrap();
    cache.put("b", &basis(3), result_set("b")).unwrap();
    clock.advance(Duration::from_secs(30));
    cache.put("c", &basis(5), result_set("c")).unwrap();

    clock.advance(Duration::from_secs(30));
    assert_eq!(cache.sweep_expired().unwrap(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("c", &basis(5)).unwrap().is_some());
}

#[test]
fn over_capacity_evicts_least_recently_used() {
    let (cache, _) = cache_with(CacheConfig { capacity: 2, ..CacheConfig::default() });
    cache.put("a", &basis(0), result_set("a")).unwrap();
    cache.put("b", &basis(3), result_set("b")).unwrap();
    assert!(cache.get("a", &basis(0)).unwrap().is_some());

    cache.put("c", &basis(5), result_set("c")).unwrap();
    assert_eq!(cache.len(), 2);
    assert!(cache.get("b", &basis(3)).unwrap().is_none());
    assert!(cache.get("a", &basis(0)).unwrap().is_some());
    assert!(cache.get("c", &basis(5)).unwrap().is_some());
    assert_eq!(cache.stats().lru_evictions, 1);
}

#[test]
fn over_capacity_reclaims_expired_entries_first() {
    let (cache, clock) = cache_with(CacheConfig { capacity: 2, ttl_secs: 60, ..CacheConfig::default() });
    cache.put("old", &basis(0), result_set("old")).unwrap();
    clock.advance(Duration::from_secs(61));
    cache.put("b", &basis(3), result_set("b")).unwrap();
    cache.put("c", &basis(5), result_set("c")).unwrap();

    let stats = cache.stats();
    assert_eq!((stats.entries, stats.ttl_evictions, stats.lru_evictions), (2, 1, 0));
    assert!(cache.get("b", &basis(3)).unwrap().is_some());
}

#[test]
fn invalid_config_is_rejected() {
    let clock = Arc::new(ManualClock::starting_now());
    let err = SemanticCache::new(CacheConfig { similarity_threshold: 0.0, ..CacheConfig::default() }, clock)
        .err()
        .map(|e| e.kind());
    assert_eq!(err, Some(recall_core::ErrorKind::Configuration));
}

#[tokio::test]
async fn background_sweeper_drops_expired_entries_until_cancelled() {
    let (cache, clock) = cache_with(CacheConfig { ttl_secs: 60, sweep_interval_secs: 1, ..CacheConfig::default() });
    let cache = Arc::new(cache);
    cache.put("a", &basis(0), result_set("a")).unwrap();
    clock.advance(Duration::from_secs(120));

    let cancel = CancellationToken::new();
    let handle = cache.spawn_sweeper(cancel.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cache.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("sweeper removed the expired entry");

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(cache.stats().ttl_evictions, 1);
}
