//! In-memory inverted index scored with BM25.

use std::cmp::Ordering;
use std::collections::HashMap;

use recall_core::config::LexicalConfig;
use recall_core::error::{Error, Result};
use recall_core::tokenize::tokenize;
use recall_core::traits::LexicalIndex;
use recall_core::types::{Candidate, Chunk, ChunkId};
use tracing::debug;

/// One (term, chunk, term frequency) entry; the term is the postings map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc: u32,
    pub tf: u32,
}

pub struct Bm25Index {
    params: LexicalConfig,
    ids: Vec<ChunkId>,
    doc_lens: Vec<u32>,
    avgdl: f32,
    postings: HashMap<String, Vec<Posting>>,
}

impl Bm25Index {
    pub fn avgdl(&self) -> f32 {
        self.avgdl
    }

    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    /// Number of chunks containing `term` (already tokenized form).
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// Non-negative BM25 IDF: `ln(1 + (N - n + 0.5) / (n + 0.5))`.
    fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.ids.len() as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn term_score(&self, idf: f32, posting: Posting) -> f32 {
        let LexicalConfig { k1, b, .. } = self.params;
        let tf = posting.tf as f32;
        let dl = self.doc_lens[posting.doc as usize] as f32;
        let norm = k1 * (1.0 - b + b * dl / self.avgdl);
        idf * (tf * (k1 + 1.0)) / (tf + norm)
    }
}

fn validate(params: &LexicalConfig) -> Result<()> {
    if !params.k1.is_finite() || params.k1 < 0.0 {
        return Err(Error::config(format!("k1 must be a finite value >= 0, got {}", params.k1)));
    }
    if !params.b.is_finite() || !(0.0..=1.0).contains(&params.b) {
        return Err(Error::config(format!("b must be in [0, 1], got {}", params.b)));
    }
    Ok(())
}

impl LexicalIndex for Bm25Index {
    type Params = LexicalConfig;

    fn build(params: &LexicalConfig, chunks: &[Chunk]) -> Result<Self> {
        validate(params)?;
        let doc_count = u32::try_from(chunks.len()).map_err(|_| Error::config("corpus too large for the lexical index"))?;

        let mut ids = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut total_len = 0u64;

        for (doc, chunk) in (0..doc_count).zip(chunks) {
            let tokens = tokenize(&chunk.text);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push(Posting { doc, tf: count });
            }
            let len = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
            total_len += u64::from(len);
            doc_lens.push(len);
            ids.push(chunk.id.clone());
        }

        let avgdl = if total_len == 0 { 1.0 } else { total_len as f32 / chunks.len() as f32 };
        debug!(chunks = ids.len(), terms = postings.len(), avgdl, "built bm25 index");
        Ok(Self { params: *params, ids, doc_lens, avgdl, postings })
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scores: HashMap<u32, f32> = HashMap::new();
        for term in &terms {
            let Some(list) = self.postings.get(term) else { continue };
            let idf = self.idf(list.len());
            for &posting in list {
                *scores.entry(posting.doc).or_insert(0.0) += self.term_score(idf, posting);
            }
        }

        let mut ranked: Vec<(u32, f32)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.ids[a.0 as usize].cmp(&self.ids[b.0 as usize]))
        });
        ranked.truncate(k);
        Ok(ranked.into_iter().map(|(doc, score)| Candidate::lexical(self.ids[doc as usize].clone(), score)).collect())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
