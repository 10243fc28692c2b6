//! Inverted-file (IVF) approximate index.
//!
//! Vectors are partitioned with spherical k-means into `nlist` lists; a query
//! scans only the `nprobe` lists whose centroids are most similar to it.
//!
//! Recall relative to [`crate::BruteForceIndex`]: with `nprobe >= nlist` every
//! list is scanned and the results are identical. With fewer probes a true
//! neighbour is missed only when it lives in a list whose centroid ranks below
//! the probe cut-off; every returned score is still the exact cosine.

use std::cmp::Ordering;

use recall_core::config::VectorConfig;
use recall_core::error::Result;
use recall_core::traits::VectorIndex;
use recall_core::types::{Candidate, Chunk};
use recall_core::vecmath::{dot, l2_normalized};
use tracing::debug;

use crate::store::VectorStore;

const KMEANS_ITERATIONS: usize = 10;

pub struct IvfIndex {
    store: VectorStore,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
    nprobe: usize,
}

/// List count used when the configuration leaves it at 0: `2 * sqrt(n)`, clamped to `[1, n]`.
pub fn default_nlist(total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let sqrt_n = (total as f64).sqrt() as usize;
    (2 * sqrt_n).clamp(1, total)
}

fn nearest(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let s = dot(c, v);
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}

fn assign(store: &VectorStore, centroids: &[Vec<f32>]) -> Vec<Vec<usize>> {
    let mut lists = vec![Vec::new(); centroids.len()];
    for row in 0..store.len() {
        lists[nearest(centroids, store.row(row))].push(row);
    }
    lists
}

fn train(store: &VectorStore, nlist: usize) -> (Vec<Vec<f32>>, Vec<Vec<usize>>) {
    let n = store.len();
    // evenly spaced rows as initial centroids keep training deterministic
    let mut centroids: Vec<Vec<f32>> = (0..nlist).map(|i| store.row(i * n / nlist).to_vec()).collect();
    let mut lists = assign(store, &centroids);
    for _ in 0..KMEANS_ITERATIONS {
        for (centroid, members) in centroids.iter_mut().zip(&lists) {
            if members.is_empty() {
                continue;
            }
            let mut sum = vec![0f32; store.dim()];
            for &row in members {
                for (s, x) in sum.iter_mut().zip(store.row(row)) {
                    *s += x;
                }
            }
            let updated = l2_normalized(&sum);
            if updated.iter().any(|x| *x != 0.0) {
                *centroid = updated;
            }
        }
        let next = assign(store, &centroids);
        if next == lists {
            break;
        }
        lists = next;
    }
    (centroids, lists)
}

impl IvfIndex {
    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }

    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    fn probe_order(&self, query: &[f32]) -> Vec<usize> {
        let mut order: Vec<(usize, f32)> = self.centroids.iter().enumerate().map(|(i, c)| (i, dot(c, query))).collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        order.into_iter().take(self.nprobe).map(|(i, _)| i).collect()
    }
}

impl VectorIndex for IvfIndex {
    type Params = VectorConfig;

    fn build(params: &VectorConfig, chunks: &[Chunk]) -> Result<Self> {
        let store = VectorStore::from_chunks(params.dim, chunks)?;
        let nlist = if params.nlist == 0 { default_nlist(store.len()) } else { params.nlist.min(store.len()) };
        let (centroids, lists) = if nlist == 0 { (Vec::new(), Vec::new()) } else { train(&store, nlist) };
        debug!(vectors = store.len(), nlist, nprobe = params.nprobe, "built ivf vector index");
        Ok(Self { store, centroids, lists, nprobe: params.nprobe.max(1) })
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>> {
        let q = self.store.prepare_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let scored = self
            .probe_order(&q)
            .into_iter()
            .flat_map(|list| self.lists[list].iter().copied())
            .map(|row| (row, self.store.score(&q, row)))
            .collect();
        Ok(self.store.top_k(scored, k))
    }

    fn dim(&self) -> usize {
        self.store.dim()
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
