use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use recall_core::config::CacheConfig;
use recall_core::error::{Error, Result};
use recall_core::types::{HitKind, ResultSet};
use recall_core::vecmath::{dot, l2_normalized};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::fingerprint::{neighbours, Fingerprint, Key};
use crate::stats::{CacheStats, Counters};

type Bucket = HashMap<Key, Arc<Entry>>;

struct Entry {
    /// Unit-length copy of the query embedding.
    embedding: Vec<f32>,
    value: Arc<ResultSet>,
    created_ms: i64,
    inserted_seq: u64,
    last_access_seq: AtomicU64,
    hits: AtomicU64,
}

impl Entry {
    fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.created_ms) >= ttl_ms
    }
}

/// A cached result set plus how it was matched.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub kind: HitKind,
    pub value: Arc<ResultSet>,
    /// 1.0 for exact hits, the cosine similarity for semantic ones.
    pub similarity: f32,
    pub fingerprint: Fingerprint,
    /// Times the entry has been served, this hit included.
    pub hits: u64,
}

/// Query-result cache matched by exact query text or embedding similarity.
///
/// Entries live in `2^bucket_bits` buckets, each behind its own `RwLock`.
/// Lookups only take shared locks and record recency through atomics, so
/// concurrent readers never serialize on each other. Every lock acquisition is
/// bounded by `lock_timeout_ms`; running out of time surfaces as
/// [`Error::CacheUnavailable`] rather than blocking the caller.
///
/// `len` only changes while the write lock of the bucket being modified is
/// held, so it always equals the sum of the bucket sizes once writers finish.
pub struct SemanticCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    buckets: Vec<RwLock<Bucket>>,
    len: AtomicUsize,
    seq: AtomicU64,
    eviction: Mutex<()>,
    counters: Counters,
}

impl SemanticCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let buckets = (0..1usize << config.bucket_bits).map(|_| RwLock::new(HashMap::new())).collect();
        Ok(Self {
            config,
            clock,
            buckets,
            len: AtomicUsize::new(0),
            seq: AtomicU64::new(0),
            eviction: Mutex::new(()),
            counters: Counters::default(),
        })
    }

    pub fn with_system_clock(config: CacheConfig) -> Result<Self> {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.config.capacity)
    }

    /// Fingerprint `put` would assign to this query/embedding pair.
    pub fn fingerprint(&self, query: &str, embedding: &[f32]) -> Fingerprint {
        Fingerprint::new(query, &l2_normalized(embedding), self.config.bucket_bits)
    }

    pub fn get(&self, query: &str, embedding: &[f32]) -> Result<Option<CacheHit>> {
        self.get_matching(query, embedding, |_| true)
    }

    /// Like [`Self::get`], but only entries whose result set passes `accept`
    /// can match. Rejected entries count as neither hits nor recent use; when
    /// nothing acceptable matches the lookup is a miss.
    pub fn get_matching<F>(&self, query: &str, embedding: &[f32], accept: F) -> Result<Option<CacheHit>>
    where
        F: Fn(&ResultSet) -> bool,
    {
        let normalized = l2_normalized(embedding);
        let fp = Fingerprint::new(query, &normalized, self.config.bucket_bits);
        let (now, ttl) = (self.now_ms(), self.ttl_ms());
        let mut expired: Vec<(u32, Key)> = Vec::new();

        {
            let home = self.read(fp.bucket())?;
            if let Some(entry) = home.get(fp.key()) {
                if entry.is_expired(now, ttl) {
                    expired.push((fp.bucket(), *fp.key()));
                } else if accept(entry.value.as_ref()) {
                    let hits = self.touch(entry);
                    Counters::bump(&self.counters.exact_hits, 1);
                    debug!(fingerprint = ?fp, hits, "exact cache hit");
                    return Ok(Some(CacheHit {
                        kind: HitKind::Exact,
                        value: Arc::clone(&entry.value),
                        similarity: 1.0,
                        fingerprint: fp,
                        hits,
                    }));
                } else {
                    debug!(fingerprint = ?fp, "exact entry rejected by caller");
                }
            }
        }

        let threshold = self.config.similarity_threshold;
        let mut best: Option<(f32, Fingerprint, Arc<Entry>)> = None;
        let nearby = neighbours(fp.bucket(), self.config.bucket_bits, self.config.scan_radius);
        for b in std::iter::once(fp.bucket()).chain(nearby) {
            let bucket = self.read(b)?;
            for (key, entry) in bucket.iter() {
                if entry.is_expired(now, ttl) {
                    expired.push((b, *key));
                    continue;
                }
                if entry.embedding.len() != normalized.len() {
                    continue;
                }
                let similarity = dot(&normalized, &entry.embedding).clamp(-1.0, 1.0);
                if similarity < threshold || !accept(entry.value.as_ref()) {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((s, _, e)) => similarity > *s || (similarity == *s && entry.inserted_seq < e.inserted_seq),
                };
                if better {
                    best = Some((similarity, Fingerprint::from_parts(*key, b), Arc::clone(entry)));
                }
            }
        }
        self.remove_expired(expired, now, ttl);

        match best {
            Some((similarity, fingerprint, entry)) => {
                let hits = self.touch(&entry);
                Counters::bump(&self.counters.semantic_hits, 1);
                debug!(fingerprint = ?fingerprint, similarity, "semantic cache hit");
                Ok(Some(CacheHit { kind: HitKind::Semantic, value: Arc::clone(&entry.value), similarity, fingerprint, hits }))
            }
            None => {
                Counters::bump(&self.counters.misses, 1);
                Ok(None)
            }
        }
    }

    /// Stores `value` under the query's fingerprint, replacing any previous
    /// entry for the same query, and evicts if the cache is now over capacity.
    pub fn put(&self, query: &str, embedding: &[f32], value: ResultSet) -> Result<Fingerprint> {
        let normalized = l2_normalized(embedding);
        let fp = Fingerprint::new(query, &normalized, self.config.bucket_bits);
        let seq = self.next_seq();
        let entry = Arc::new(Entry {
            embedding: normalized,
            value: Arc::new(value),
            created_ms: self.now_ms(),
            inserted_seq: seq,
            last_access_seq: AtomicU64::new(seq),
            hits: AtomicU64::new(0),
        });
        let replaced = {
            let mut bucket = self.write(fp.bucket())?;
            let replaced = bucket.insert(*fp.key(), entry).is_some();
            if !replaced {
                self.len.fetch_add(1, Ordering::AcqRel);
            }
            replaced
        };
        if !replaced && self.len() > self.config.capacity {
            self.evict()?;
        }
        debug!(fingerprint = ?fp, replaced, "cached result set");
        Ok(fp)
    }

    pub fn invalidate(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let mut bucket = self.write(fingerprint.bucket())?;
        let removed = bucket.remove(fingerprint.key()).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        for b in 0..self.bucket_count() {
            let mut bucket = self.write(b)?;
            self.len.fetch_sub(bucket.len(), Ordering::AcqRel);
            bucket.clear();
        }
        debug!("cache cleared");
        Ok(())
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep_expired(&self) -> Result<usize> {
        let (now, ttl) = (self.now_ms(), self.ttl_ms());
        let mut removed = 0;
        for b in 0..self.bucket_count() {
            let mut bucket = self.write(b)?;
            let before = bucket.len();
            bucket.retain(|_, e| !e.is_expired(now, ttl));
            let gone = before - bucket.len();
            if gone > 0 {
                self.len.fetch_sub(gone, Ordering::AcqRel);
                removed += gone;
            }
        }
        Counters::bump(&self.counters.ttl_evictions, removed as u64);
        Ok(removed)
    }

    /// Runs [`Self::sweep_expired`] every `sweep_interval_secs` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match cache.sweep_expired() {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "swept expired cache entries"),
                        Err(e) => warn!(error = %e, "cache sweep skipped"),
                    },
                }
            }
            debug!("cache sweeper stopped");
        })
    }

    /// Holds the exclusive lock of one bucket until the returned guard drops.
    #[cfg(any(test, feature = "test-util"))]
    pub fn hold_bucket(&self, bucket: u32) -> Result<BucketHold<'_>> {
        Ok(BucketHold { _guard: self.write(bucket)? })
    }

    fn evict(&self) -> Result<()> {
        let _serialized = self
            .eviction
            .try_lock_for(self.config.lock_timeout())
            .ok_or_else(|| Error::CacheUnavailable("timed out waiting for eviction".into()))?;
        if self.len() <= self.config.capacity {
            return Ok(());
        }
        let reclaimed = self.sweep_expired()?;
        let len = self.len();
        if len <= self.config.capacity {
            debug!(reclaimed, "capacity restored from expired entries");
            return Ok(());
        }

        let mut by_recency: Vec<(u64, u32, Key)> = Vec::with_capacity(len);
        for b in 0..self.bucket_count() {
            let bucket = self.read(b)?;
            by_recency.extend(bucket.iter().map(|(k, e)| (e.last_access_seq.load(Ordering::Acquire), b, *k)));
        }
        by_recency.sort_unstable_by_key(|(seq, _, _)| *seq);

        let mut evicted = 0u64;
        for (_, b, key) in by_recency.into_iter().take(len.saturating_sub(self.config.capacity)) {
            let mut bucket = self.write(b)?;
            if bucket.remove(&key).is_some() {
                self.len.fetch_sub(1, Ordering::AcqRel);
                evicted += 1;
            }
        }
        Counters::bump(&self.counters.lru_evictions, evicted);
        debug!(reclaimed, evicted, "evicted least recently used entries");
        Ok(())
    }

    fn remove_expired(&self, mut expired: Vec<(u32, Key)>, now: i64, ttl: i64) {
        expired.sort_unstable();
        expired.dedup();
        for (b, key) in expired {
            // opportunistic; the sweeper catches whatever a busy bucket keeps
            let Some(mut bucket) = self.buckets[b as usize].try_write_for(self.config.lock_timeout()) else {
                continue;
            };
            if bucket.get(&key).is_some_and(|e| e.is_expired(now, ttl)) {
                bucket.remove(&key);
                self.len.fetch_sub(1, Ordering::AcqRel);
                Counters::bump(&self.counters.ttl_evictions, 1);
            }
        }
    }

    fn touch(&self, entry: &Entry) -> u64 {
        entry.last_access_seq.store(self.next_seq(), Ordering::Release);
        entry.hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn bucket_count(&self) -> u32 {
        self.buckets.len() as u32
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.config.ttl().as_millis()).unwrap_or(i64::MAX)
    }

    fn lock(&self, bucket: u32) -> Result<&RwLock<Bucket>> {
        self.buckets
            .get(bucket as usize)
            .ok_or_else(|| Error::config(format!("bucket {bucket} out of range for {} buckets", self.buckets.len())))
    }

    fn read(&self, bucket: u32) -> Result<RwLockReadGuard<'_, Bucket>> {
        self.lock(bucket)?
            .try_read_for(self.config.lock_timeout())
            .ok_or_else(|| Error::CacheUnavailable(format!("timed out reading bucket {bucket}")))
    }

    fn write(&self, bucket: u32) -> Result<RwLockWriteGuard<'_, Bucket>> {
        self.lock(bucket)?
            .try_write_for(self.config.lock_timeout())
            .ok_or_else(|| Error::CacheUnavailable(format!("timed out writing bucket {bucket}")))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub struct BucketHold<'a> {
    _guard: RwLockWriteGuard<'a, Bucket>,
}
