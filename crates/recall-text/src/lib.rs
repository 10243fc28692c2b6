//! recall-text
//!
//! Lexical indexes. [`Bm25Index`] is the in-memory default with tunable
//! `k1`/`b`; [`TantivyIndex`] runs the same contract on tantivy, in RAM or on disk.
//! [`ConfiguredLexicalIndex`] picks one at build time from `lexical.backend`.

pub mod bm25;
pub mod tantivy_index;
pub mod tantivy_utils;

pub use bm25::{Bm25Index, Posting};
pub use tantivy_index::{TantivyIndex, TantivyParams};

use recall_core::config::{LexicalBackend, LexicalConfig};
use recall_core::error::Result;
use recall_core::traits::LexicalIndex;
use recall_core::types::{Candidate, Chunk};

pub enum ConfiguredLexicalIndex {
    Bm25(Bm25Index),
    /// Always built in RAM.
    Tantivy(TantivyIndex),
}

impl LexicalIndex for ConfiguredLexicalIndex {
    type Params = LexicalConfig;

    fn build(params: &LexicalConfig, chunks: &[Chunk]) -> Result<Self> {
        Ok(match params.backend {
            LexicalBackend::Bm25 => Self::Bm25(Bm25Index::build(params, chunks)?),
            LexicalBackend::Tantivy => Self::Tantivy(TantivyIndex::build(&TantivyParams::default(), chunks)?),
        })
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        match self {
            Self::Bm25(idx) => idx.search(query, k),
            Self::Tantivy(idx) => idx.search(query, k),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Bm25(idx) => idx.len(),
            Self::Tantivy(idx) => idx.len(),
        }
    }
}
