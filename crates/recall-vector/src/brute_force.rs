use recall_core::config::VectorConfig;
use recall_core::error::Result;
use recall_core::traits::VectorIndex;
use recall_core::types::{Candidate, Chunk};
use tracing::debug;

use crate::store::VectorStore;

/// Exact cosine search: scores every stored vector against the query.
pub struct BruteForceIndex {
    store: VectorStore,
}

impl VectorIndex for BruteForceIndex {
    type Params = VectorConfig;

    fn build(params: &VectorConfig, chunks: &[Chunk]) -> Result<Self> {
        let store = VectorStore::from_chunks(params.dim, chunks)?;
        debug!(vectors = store.len(), dim = store.dim(), "built brute-force vector index");
        Ok(Self { store })
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>> {
        let q = self.store.prepare_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let scored = (0..self.store.len()).map(|row| (row, self.store.score(&q, row))).collect();
        Ok(self.store.top_k(scored, k))
    }

    fn dim(&self) -> usize {
        self.store.dim()
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
