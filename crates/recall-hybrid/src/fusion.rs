//! Weighted min-max fusion of lexical and vector candidate lists.
//!
//! Each list is min-max normalized on its own, so BM25's unbounded scale and
//! cosine's `[-1, 1]` become comparable. The fused score is the weighted sum of
//! the normalized scores with the weights rescaled to sum to one, which keeps
//! every fused score within `[0, 1]`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use recall_core::config::FusionConfig;
use recall_core::error::{Error, Result};
use recall_core::types::{Candidate, ChunkId, RankedResult, SourceKind};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    lexical: f32,
    vector: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { lexical: 0.5, vector: 0.5 }
    }
}

impl FusionWeights {
    pub fn new(lexical: f32, vector: f32) -> Result<Self> {
        for (name, w) in [("lexical", lexical), ("vector", vector)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::config(format!("{name} weight must be a finite value >= 0, got {w}")));
            }
        }
        if lexical + vector <= 0.0 {
            return Err(Error::config("fusion weights must not both be zero"));
        }
        Ok(Self { lexical, vector })
    }

    pub fn from_config(config: &FusionConfig) -> Result<Self> {
        Self::new(config.lexical_weight, config.vector_weight)
    }

    pub fn lexical(&self) -> f32 {
        self.lexical
    }

    pub fn vector(&self) -> f32 {
        self.vector
    }

    fn rescaled(self) -> (f32, f32) {
        let total = self.lexical + self.vector;
        (self.lexical / total, self.vector / total)
    }
}

#[derive(Default)]
struct Contribution {
    lexical: Option<(f32, f32)>,
    vector: Option<(f32, f32)>,
}

/// Returns `(raw, normalized)` per chunk id, dropping non-finite scores and
/// keeping the best raw score when an id repeats.
fn normalize(list: &[Candidate]) -> BTreeMap<&str, (f32, f32)> {
    let mut best: BTreeMap<&str, f32> = BTreeMap::new();
    for c in list.iter().filter(|c| c.score.is_finite()) {
        best.entry(c.chunk_id.as_str()).and_modify(|s| *s = s.max(c.score)).or_insert(c.score);
    }
    let (min, max) = best.values().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| (lo.min(*s), hi.max(*s)));
    let range = max - min;
    best.into_iter()
        .map(|(id, raw)| {
            let norm = if range > 0.0 { (raw - min) / range } else { 1.0 };
            (id, (raw, norm))
        })
        .collect()
}

/// Merges both candidate lists into at most `k` ranked results.
///
/// Ties on the fused score go to the higher raw vector score (any vector score
/// beats none), then to the smaller chunk id.
pub fn fuse(lexical: &[Candidate], vector: &[Candidate], weights: FusionWeights, k: usize) -> Vec<RankedResult> {
    if k == 0 {
        return Vec::new();
    }
    let (w_lex, w_vec) = weights.rescaled();

    let mut merged: BTreeMap<&str, Contribution> = BTreeMap::new();
    for (id, scores) in normalize(lexical) {
        merged.entry(id).or_default().lexical = Some(scores);
    }
    for (id, scores) in normalize(vector) {
        merged.entry(id).or_default().vector = Some(scores);
    }

    let mut results: Vec<RankedResult> = merged
        .into_iter()
        .map(|(id, c)| {
            let lex = c.lexical.map_or(0.0, |(_, n)| n);
            let vec = c.vector.map_or(0.0, |(_, n)| n);
            let mut sources = Vec::with_capacity(2);
            if c.lexical.is_some() {
                sources.push(SourceKind::Lexical);
            }
            if c.vector.is_some() {
                sources.push(SourceKind::Vector);
            }
            RankedResult {
                chunk_id: ChunkId::from(id),
                score: (w_lex * lex + w_vec * vec).clamp(0.0, 1.0),
                rank: 0,
                sources,
                lexical_score: c.lexical.map(|(raw, _)| raw),
                vector_score: c.vector.map(|(raw, _)| raw),
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| cmp_vector_desc(a.vector_score, b.vector_score))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(k);
    for (rank, r) in results.iter_mut().enumerate() {
        r.rank = rank;
    }
    debug!(lexical = lexical.len(), vector = vector.len(), fused = results.len(), "fused candidates");
    results
}

fn cmp_vector_desc(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
