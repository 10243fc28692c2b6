use std::cmp::Ordering;

use recall_core::error::{Error, Result};
use recall_core::types::{Candidate, Chunk, ChunkId};
use recall_core::vecmath::{dot, l2_normalized};

/// Row-major block of unit-length embeddings plus the chunk id of each row.
pub(crate) struct VectorStore {
    dim: usize,
    ids: Vec<ChunkId>,
    data: Vec<f32>,
}

impl VectorStore {
    pub(crate) fn from_chunks(dim: usize, chunks: &[Chunk]) -> Result<Self> {
        if dim == 0 {
            return Err(Error::config("vector dimension must be > 0"));
        }
        let mut ids = Vec::with_capacity(chunks.len());
        let mut data = Vec::with_capacity(chunks.len() * dim);
        for c in chunks {
            if c.embedding.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: c.embedding.len() });
            }
            ids.push(c.id.clone());
            data.extend(l2_normalized(&c.embedding));
        }
        Ok(Self { dim, ids, data })
    }

    pub(crate) fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Validates and normalizes a query vector.
    pub(crate) fn prepare_query(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        Ok(l2_normalized(query))
    }

    pub(crate) fn score(&self, query: &[f32], row: usize) -> f32 {
        dot(query, self.row(row))
    }

    /// Sorts `(row, score)` pairs by score desc then chunk id asc and keeps `k`.
    pub(crate) fn top_k(&self, mut scored: Vec<(usize, f32)>, k: usize) -> Vec<Candidate> {
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| self.ids[a.0].cmp(&self.ids[b.0]))
        });
        scored.truncate(k);
        scored.into_iter().map(|(row, score)| Candidate::vector(self.ids[row].clone(), score)).collect()
    }
}
