//! Typed configuration for the retrieval core and path helpers.
//!
//! Uses Figment to merge built-in defaults + `recall.toml` + `recall.<env>.toml`
//! + `RECALL_*` env vars (`__` separates sections, e.g. `RECALL_CACHE__CAPACITY`).
//! Everything is validated once, up front, by [`RecallConfig::validate`].

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "RECALL_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalBackend {
    Bm25,
    Tantivy,
}

/// Lexical backend and BM25 scoring constants.
///
/// `k1` and `b` only apply to the in-memory BM25 index; tantivy scores with
/// its own fixed constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub backend: LexicalBackend,
    pub k1: f32,
    pub b: f32,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self { backend: LexicalBackend::Bm25, k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    BruteForce,
    Ivf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Embedding dimensionality every chunk and query must match.
    pub dim: usize,
    pub backend: VectorBackend,
    /// IVF list count; 0 derives it from the corpus size.
    pub nlist: usize,
    /// IVF lists scanned per query.
    pub nprobe: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { dim: 768, backend: VectorBackend::BruteForce, nlist: 0, nprobe: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Relative weight of the normalized lexical score. Both weights are
    /// divided by their sum before fusing, so only the ratio matters:
    /// 0.2/0.2 ranks and scores exactly like 0.5/0.5.
    pub lexical_weight: f32,
    /// Relative weight of the normalized vector score; see `lexical_weight`.
    pub vector_weight: f32,
    /// Each index is asked for `k * candidate_multiplier` candidates before fusion.
    pub candidate_multiplier: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { lexical_weight: 0.5, vector_weight: 0.5, candidate_multiplier: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
    /// Minimum cosine similarity for a semantic hit.
    pub similarity_threshold: f32,
    /// Number of sign bits in a semantic bucket id (0 = one bucket).
    pub bucket_bits: u32,
    /// Semantic lookups scan every bucket within this Hamming distance of the
    /// query's own bucket; `>= bucket_bits` scans them all.
    ///
    /// With the defaults (4 bits, radius 2) a pair of 768-dim embeddings at
    /// cosine 0.99 lands more than two bits apart in well under 0.1% of
    /// cases, and under 0.2% at cosine 0.97. Only a full scan guarantees that
    /// every entry above the threshold is found.
    pub scan_radius: u32,
    pub sweep_interval_secs: u64,
    pub lock_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            capacity: 1000,
            similarity_threshold: 0.97,
            bucket_bits: 4,
            scan_radius: 2,
            sweep_interval_secs: 60,
            lock_timeout_ms: 50,
        }
    }
}

impl CacheConfig {
    pub const MAX_BUCKET_BITS: u32 = 16;

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(Error::config("cache.ttl_secs must be > 0"));
        }
        if self.capacity == 0 {
            return Err(Error::config("cache.capacity must be > 0"));
        }
        let t = self.similarity_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(Error::config(format!("cache.similarity_threshold must be in (0, 1], got {t}")));
        }
        if self.bucket_bits > Self::MAX_BUCKET_BITS {
            return Err(Error::config(format!(
                "cache.bucket_bits must be <= {}, got {}",
                Self::MAX_BUCKET_BITS,
                self.bucket_bits
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::config("cache.sweep_interval_secs must be > 0"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(Error::config("cache.lock_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub lookup_timeout_ms: u64,
    pub expand_abbreviations: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_k: 10, lookup_timeout_ms: 2_000, expand_abbreviations: false }
    }
}

impl SearchConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub lexical: LexicalConfig,
    pub vector: VectorConfig,
    pub fusion: FusionConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
}

impl RecallConfig {
    /// Loads `recall.toml`, `recall.<env>.toml` and `RECALL_*` overrides from
    /// the working directory, where `<env>` comes from `RECALL_ENV` (default `dev`).
    pub fn load() -> Result<Self> {
        let env_name = env::var("RECALL_ENV").unwrap_or_else(|_| "dev".to_string());
        let env_file = match env_name.as_str() {
            "dev" | "development" => Some("recall.dev.toml"),
            "prod" | "production" => Some("recall.prod.toml"),
            "test" | "testing" => Some("recall.test.toml"),
            _ => None,
        };
        let mut figment = Figment::new().merge(Toml::file("recall.toml"));
        if let Some(file) = env_file {
            figment = figment.merge(Toml::file(file));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Loads a single TOML file plus `RECALL_*` overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(format!("config file not found: {}", path.display())));
        }
        Self::extract(Figment::new().merge(Toml::file(path)).merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let LexicalConfig { k1, b, .. } = self.lexical;
        if !k1.is_finite() || k1 < 0.0 {
            return Err(Error::config(format!("lexical.k1 must be a finite value >= 0, got {k1}")));
        }
        if !b.is_finite() || !(0.0..=1.0).contains(&b) {
            return Err(Error::config(format!("lexical.b must be in [0, 1], got {b}")));
        }
        if self.vector.dim == 0 {
            return Err(Error::config("vector.dim must be > 0"));
        }
        if self.vector.nprobe == 0 {
            return Err(Error::config("vector.nprobe must be > 0"));
        }
        let FusionConfig { lexical_weight, vector_weight, candidate_multiplier } = self.fusion;
        for (name, w) in [("fusion.lexical_weight", lexical_weight), ("fusion.vector_weight", vector_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::config(format!("{name} must be a finite value >= 0, got {w}")));
            }
        }
        if lexical_weight + vector_weight <= 0.0 {
            return Err(Error::config("fusion weights must not both be zero"));
        }
        if candidate_multiplier == 0 {
            return Err(Error::config("fusion.candidate_multiplier must be > 0"));
        }
        self.cache.validate()?;
        if self.search.default_k == 0 {
            return Err(Error::config("search.default_k must be > 0"));
        }
        if self.search.lookup_timeout_ms == 0 {
            return Err(Error::config("search.lookup_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
