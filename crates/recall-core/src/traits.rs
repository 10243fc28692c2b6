use crate::error::Result;
use crate::types::{Candidate, Chunk};

/// Embedding collaborator: turns text into vectors of a fixed dimensionality.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Sparse lexical index, rebuilt from scratch for every corpus version.
///
/// Implementations are read-only once built so a single instance can serve
/// concurrent queries without locking.
pub trait LexicalIndex: Send + Sync + Sized + 'static {
    type Params: Clone + Send + Sync + 'static;

    fn build(params: &Self::Params, chunks: &[Chunk]) -> Result<Self>;
    fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense similarity index over chunk embeddings.
///
/// `search` must return at most `k` candidates ordered by descending cosine
/// similarity and must reject query vectors of the wrong dimensionality.
pub trait VectorIndex: Send + Sync + Sized + 'static {
    type Params: Clone + Send + Sync + 'static;

    fn build(params: &Self::Params, chunks: &[Chunk]) -> Result<Self>;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>>;
    fn dim(&self) -> usize;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
