use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use recall_cache::{CacheStats, Clock, SemanticCache, SystemClock};
use recall_core::config::{LexicalConfig, RecallConfig, VectorConfig};
use recall_core::error::{Error, Result, Stage};
use recall_core::tokenize::{tokenize, QueryPreprocessor};
use recall_core::traits::{Embedder, LexicalIndex, VectorIndex};
use recall_core::types::{Chunk, ChunkId, HitKind, RankedResult, ResultSet};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fusion::{fuse, FusionWeights};

/// One immutable build of both indexes plus the chunks they were built from.
pub struct IndexGeneration<L, V> {
    version: u64,
    lexical: L,
    vector: V,
    chunks: HashMap<ChunkId, Arc<Chunk>>,
}

impl<L, V> IndexGeneration<L, V> {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Wall-clock time spent in each stage of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchTimings {
    pub embed: Duration,
    pub cache: Duration,
    pub lexical: Duration,
    pub vector: Duration,
    pub fusion: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    pub hit: HitKind,
    pub latency: Duration,
    /// Index generation the results were ranked against.
    pub generation: u64,
    pub timings: SearchTimings,
}

/// A ranked result joined back to the chunk it came from.
#[derive(Debug, Clone)]
pub struct Attribution {
    pub rank: usize,
    pub score: f32,
    pub chunk: Arc<Chunk>,
    /// Query terms that also occur in the chunk text, in query order.
    pub matched_terms: Vec<String>,
}

/// Façade tying the embedder, both indexes, the fusion ranker and the cache
/// together.
///
/// Index generations are built off to the side and swapped in atomically, so
/// searches in flight keep the generation they started with. Cached results are
/// tagged with the generation and depth they were computed for and are only
/// reused when both still fit the request.
pub struct HybridSearchService<L: LexicalIndex, V: VectorIndex> {
    config: RecallConfig,
    lexical_params: L::Params,
    vector_params: V::Params,
    weights: FusionWeights,
    preprocessor: Option<QueryPreprocessor>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<SemanticCache>,
    current: ArcSwapOption<IndexGeneration<L, V>>,
    versions: AtomicU64,
    rebuild_lock: Mutex<()>,
}

impl<L, V> HybridSearchService<L, V>
where
    L: LexicalIndex<Params = LexicalConfig>,
    V: VectorIndex<Params = VectorConfig>,
{
    /// Service whose index parameters come straight from `config`, on the system clock.
    pub fn from_config(config: RecallConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let (lexical, vector) = (config.lexical, config.vector.clone());
        Self::new(config, lexical, vector, embedder, Arc::new(SystemClock))
    }
}

impl<L: LexicalIndex, V: VectorIndex> HybridSearchService<L, V> {
    pub fn new(
        config: RecallConfig,
        lexical_params: L::Params,
        vector_params: V::Params,
        embedder: Arc<dyn Embedder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dim() != config.vector.dim {
            return Err(Error::DimensionMismatch { expected: config.vector.dim, actual: embedder.dim() });
        }
        let weights = FusionWeights::from_config(&config.fusion)?;
        let cache = Arc::new(SemanticCache::new(config.cache, clock)?);
        let preprocessor = config.search.expand_abbreviations.then(QueryPreprocessor::default);
        Ok(Self {
            config,
            lexical_params,
            vector_params,
            weights,
            preprocessor,
            embedder,
            cache,
            current: ArcSwapOption::empty(),
            versions: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Version of the generation currently serving searches.
    pub fn generation(&self) -> Option<u64> {
        self.current.load().as_ref().map(|g| g.version)
    }

    pub fn chunk_count(&self) -> usize {
        self.current.load().as_ref().map_or(0, |g| g.chunk_count())
    }

    pub fn chunk(&self, id: &str) -> Option<Arc<Chunk>> {
        self.current.load().as_ref().and_then(|g| g.chunks.get(id).cloned())
    }

    /// Joins results for `query` to their chunks in the current generation;
    /// results whose chunk is no longer indexed are skipped.
    pub fn attribute(&self, query: &str, results: &[RankedResult]) -> Vec<Attribution> {
        let guard = self.current.load();
        let Some(generation) = guard.as_ref() else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(&self.prepare(query)).into_iter().filter(|t| seen.insert(t.clone())).collect();
        results
            .iter()
            .filter_map(|r| {
                let chunk = generation.chunks.get(&r.chunk_id)?;
                let words: HashSet<String> = tokenize(&chunk.text).into_iter().collect();
                let matched_terms = terms.iter().filter(|t| words.contains(*t)).cloned().collect();
                Some(Attribution { rank: r.rank, score: r.score, chunk: Arc::clone(chunk), matched_terms })
            })
            .collect()
    }

    /// Builds both indexes over `chunks` and swaps them in as the new
    /// generation. Returns the new generation's version.
    pub async fn rebuild(&self, chunks: Vec<Chunk>) -> Result<u64> {
        let _serialized = self.rebuild_lock.lock().await;
        validate_batch(&chunks, self.config.vector.dim)?;
        let started = Instant::now();
        let chunks: Arc<[Chunk]> = chunks.into();

        let lexical = {
            let (params, chunks) = (self.lexical_params.clone(), Arc::clone(&chunks));
            tokio::task::spawn_blocking(move || L::build(&params, &chunks))
        };
        let vector = {
            let (params, chunks) = (self.vector_params.clone(), Arc::clone(&chunks));
            tokio::task::spawn_blocking(move || V::build(&params, &chunks))
        };
        let (lexical, vector) =
            futures::future::try_join(lexical, vector).await.map_err(|e| Error::index(format!("index build task failed: {e}")))?;
        let (lexical, vector) = (lexical?, vector?);

        let version = self.versions.fetch_add(1, Ordering::AcqRel) + 1;
        let chunks = chunks.iter().map(|c| (c.id.clone(), Arc::new(c.clone()))).collect::<HashMap<_, _>>();
        let count = chunks.len();
        self.current.store(Some(Arc::new(IndexGeneration { version, lexical, vector, chunks })));

        // stale entries carry the old generation and would be skipped anyway
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "failed to clear cache after rebuild");
        }
        info!(generation = version, chunks = count, elapsed_ms = started.elapsed().as_millis() as u64, "index generation swapped in");
        Ok(version)
    }

    pub async fn search(&self, query: &str, k: usize, cache_enabled: bool) -> Result<SearchResponse> {
        self.search_with_cancel(query, k, cache_enabled, &CancellationToken::new()).await
    }

    /// Searches with `search.default_k` results.
    pub async fn search_default(&self, query: &str, cache_enabled: bool) -> Result<SearchResponse> {
        self.search(query, self.config.search.default_k, cache_enabled).await
    }

    /// Runs a search that stops with [`Error::Cancelled`] as soon as `cancel`
    /// fires. A cancelled search never writes to the cache.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        k: usize,
        cache_enabled: bool,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        if k == 0 {
            return Err(Error::config("k must be > 0"));
        }
        let generation = self
            .current
            .load_full()
            .ok_or_else(|| Error::IndexUnavailable("no index generation has been built yet".into()))?;
        let query = self.prepare(query);
        let mut timings = SearchTimings::default();

        let (embedding, embed_time) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(&query)),
            embedded = self.embed_query(&query) => embedded?,
        };
        timings.embed = embed_time;

        let mut write_back = cache_enabled;
        if cache_enabled {
            let lookup = Instant::now();
            let fits = |set: &ResultSet| set.generation == generation.version && set.depth >= k;
            match self.cache.get_matching(&query, &embedding, fits) {
                Ok(Some(hit)) => {
                    timings.cache = lookup.elapsed();
                    let results: Vec<RankedResult> = hit.value.results.iter().take(k).cloned().collect();
                    info!(
                        hit = hit.kind.as_str(),
                        similarity = hit.similarity,
                        results = results.len(),
                        latency_ms = started.elapsed().as_millis() as u64,
                        "served from cache"
                    );
                    return Ok(SearchResponse {
                        results,
                        hit: hit.kind,
                        latency: started.elapsed(),
                        generation: generation.version,
                        timings,
                    });
                }
                Ok(None) => debug!(generation = generation.version, k, "no cached results fit this request"),
                Err(e) => {
                    warn!(error = %e, "cache lookup failed, serving live results");
                    write_back = false;
                }
            }
            timings.cache = lookup.elapsed();
        }

        let pool = k.saturating_mul(self.config.fusion.candidate_multiplier);
        let limit = self.config.search.lookup_timeout();
        let lexical = {
            let (generation, query) = (Arc::clone(&generation), query.clone());
            bounded(Stage::Lexical, limit, move || generation.lexical.search(&query, pool))
        };
        let vector = {
            let (generation, embedding) = (Arc::clone(&generation), embedding.clone());
            bounded(Stage::Vector, limit, move || generation.vector.search(&embedding, pool))
        };
        let ((lexical_hits, lexical_time), (vector_hits, vector_time)) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(&query)),
            joined = async { tokio::try_join!(lexical, vector) } => joined?,
        };
        timings.lexical = lexical_time;
        timings.vector = vector_time;
        debug!(lexical = lexical_hits.len(), vector = vector_hits.len(), pool, "lookups complete");

        let fusion = Instant::now();
        let results = fuse(&lexical_hits, &vector_hits, self.weights, k);
        timings.fusion = fusion.elapsed();

        if write_back && !cancel.is_cancelled() {
            let set = ResultSet { generation: generation.version, depth: k, results: results.clone() };
            if let Err(e) = self.cache.put(&query, &embedding, set) {
                warn!(error = %e, "cache write skipped");
            }
        }

        info!(
            results = results.len(),
            generation = generation.version,
            latency_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(SearchResponse { results, hit: HitKind::None, latency: started.elapsed(), generation: generation.version, timings })
    }

    fn prepare(&self, query: &str) -> String {
        match &self.preprocessor {
            Some(p) => p.expand(query),
            None => query.to_string(),
        }
    }

    async fn embed_query(&self, query: &str) -> Result<(Vec<f32>, Duration)> {
        let embedder = Arc::clone(&self.embedder);
        let texts = vec![query.to_string()];
        let (mut vectors, elapsed) =
            bounded(Stage::Embedding, self.config.search.lookup_timeout(), move || embedder.embed_batch(&texts)).await?;
        if vectors.len() != 1 {
            return Err(Error::Embedding(format!("expected one query vector, got {}", vectors.len())));
        }
        let embedding = vectors.pop().unwrap_or_default();
        if embedding.len() != self.config.vector.dim {
            return Err(Error::DimensionMismatch { expected: self.config.vector.dim, actual: embedding.len() });
        }
        Ok((embedding, elapsed))
    }
}

fn cancelled(query: &str) -> Error {
    info!(query, "search cancelled");
    Error::Cancelled
}

/// Runs blocking work on the blocking pool and gives up after `limit`.
///
/// Work that overruns is detached; its result is discarded when it finishes.
async fn bounded<T, F>(stage: Stage, limit: Duration, work: F) -> Result<(T, Duration)>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let started = Instant::now();
    let mut task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => {
            let out = joined.map_err(|e| Error::index(format!("{stage} task failed: {e}")))??;
            Ok((out, started.elapsed()))
        }
        Err(_) => {
            task.abort();
            warn!(%stage, limit_ms = limit.as_millis() as u64, "stage timed out");
            Err(Error::LookupTimeout { stage, limit })
        }
    }
}

fn validate_batch(chunks: &[Chunk], dim: usize) -> Result<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for c in chunks {
        if c.id.trim().is_empty() {
            return Err(Error::config("chunk id must not be empty"));
        }
        if !seen.insert(c.id.as_str()) {
            return Err(Error::config(format!("duplicate chunk id: {}", c.id)));
        }
        if c.embedding.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: c.embedding.len() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::ErrorKind;

    #[test]
    fn batch_validation() {
        let ok = vec![Chunk::new("a", "doc", "x", vec![1.0, 0.0]), Chunk::new("b", "doc", "y", vec![0.0, 1.0])];
        assert!(validate_batch(&ok, 2).is_ok());

        let dup = vec![Chunk::new("a", "doc", "x", vec![1.0, 0.0]), Chunk::new("a", "doc", "y", vec![0.0, 1.0])];
        assert_eq!(validate_batch(&dup, 2).unwrap_err().kind(), ErrorKind::Configuration);

        let blank = vec![Chunk::new(" ", "doc", "x", vec![1.0, 0.0])];
        assert!(validate_batch(&blank, 2).is_err());

        let short = vec![Chunk::new("a", "doc", "x", vec![1.0])];
        assert!(matches!(validate_batch(&short, 2), Err(Error::DimensionMismatch { expected: 2, actual: 1 })));
    }

    #[tokio::test]
    async fn bounded_work_times_out() {
        let err = bounded(Stage::Vector, Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::LookupTimeout { stage: Stage::Vector, .. }));
    }

    #[tokio::test]
    async fn bounded_work_passes_errors_through() {
        let err = bounded::<(), _>(Stage::Lexical, Duration::from_secs(1), || Err(Error::index("boom"))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }
}
