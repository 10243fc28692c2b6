//! Domain types shared by the lexical index, vector index, cache and service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// A chunk of a source document that is independently indexed.
///
/// - `id`: globally unique chunk identifier
/// - `source`: name of the document the chunk was cut from (used for attribution)
/// - `text`: the text payload of the chunk
/// - `token_count`: token count reported by the ingestion side
/// - `metadata`: free-form key/value pairs carried through untouched
/// - `embedding`: dense vector of the corpus' configured dimensionality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub text: String,
    #[serde(default)]
    pub token_count: usize,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let text = text.into();
        let token_count = text.split_whitespace().count();
        Self { id: id.into(), source: source.into(), text, token_count, metadata: Meta::new(), embedding }
    }
}

/// Indicates which index produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Lexical,
    Vector,
}

/// The minimal surface returned by both indexes for a single query.
///
/// `score` is index-specific but higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

impl Candidate {
    pub fn lexical(chunk_id: impl Into<String>, score: f32) -> Self {
        Self { chunk_id: chunk_id.into(), score, source: SourceKind::Lexical }
    }

    pub fn vector(chunk_id: impl Into<String>, score: f32) -> Self {
        Self { chunk_id: chunk_id.into(), score, source: SourceKind::Vector }
    }
}

/// One row of the fused ranking. `score` is always within `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub rank: usize,
    pub sources: Vec<SourceKind>,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
}

/// A ranked result list together with the context it was computed in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    /// Index generation the results were ranked against.
    pub generation: u64,
    /// Number of results requested (`k`) when the list was produced.
    pub depth: usize,
    pub results: Vec<RankedResult>,
}

/// How a search was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    None,
    Exact,
    Semantic,
}

impl HitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HitKind::None => "none",
            HitKind::Exact => "exact",
            HitKind::Semantic => "semantic",
        }
    }
}
