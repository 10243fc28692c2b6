//! recall-embed
//!
//! Stand-ins for the external embedding collaborator. [`HashEmbedder`] hashes
//! tokens into a fixed number of dimensions and L2-normalizes the result: fast,
//! deterministic and good enough to exercise the pipeline offline. It captures
//! token overlap only, not meaning.

use std::hash::Hasher;

use recall_core::error::{Error, Result};
use recall_core::tokenize::tokenize;
use recall_core::traits::Embedder;
use recall_core::vecmath::l2_normalized;
use tracing::debug;
use twox_hash::XxHash64;

pub struct HashEmbedder {
    dim: usize,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        Self::with_seed(dim, 0)
    }

    pub fn with_seed(dim: usize, seed: u64) -> Result<Self> {
        if dim == 0 {
            return Err(Error::config("embedding dimension must be > 0"));
        }
        Ok(Self { dim, seed })
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokenize(text).iter().enumerate() {
            let mut hasher = XxHash64::with_seed(self.seed);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        l2_normalized(&v)
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(batch = texts.len(), dim = self.dim, "hash embedding batch");
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
