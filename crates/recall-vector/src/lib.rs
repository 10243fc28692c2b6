//! recall-vector
//!
//! Dense cosine-similarity indexes behind the `VectorIndex` trait:
//! [`BruteForceIndex`] (exact) and [`IvfIndex`] (approximate, inverted file).
//! [`ConfiguredVectorIndex`] picks one at build time from `vector.backend`.

mod brute_force;
mod ivf;
mod store;

pub use brute_force::BruteForceIndex;
pub use ivf::{default_nlist, IvfIndex};

use recall_core::config::{VectorBackend, VectorConfig};
use recall_core::error::Result;
use recall_core::traits::VectorIndex;
use recall_core::types::{Candidate, Chunk};

pub enum ConfiguredVectorIndex {
    BruteForce(BruteForceIndex),
    Ivf(IvfIndex),
}

impl VectorIndex for ConfiguredVectorIndex {
    type Params = VectorConfig;

    fn build(params: &VectorConfig, chunks: &[Chunk]) -> Result<Self> {
        Ok(match params.backend {
            VectorBackend::BruteForce => Self::BruteForce(BruteForceIndex::build(params, chunks)?),
            VectorBackend::Ivf => Self::Ivf(IvfIndex::build(params, chunks)?),
        })
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>> {
        match self {
            Self::BruteForce(idx) => idx.search(query, k),
            Self::Ivf(idx) => idx.search(query, k),
        }
    }

    fn dim(&self) -> usize {
        match self {
            Self::BruteForce(idx) => idx.dim(),
            Self::Ivf(idx) => idx.dim(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::BruteForce(idx) => idx.len(),
            Self::Ivf(idx) => idx.len(),
        }
    }
}
