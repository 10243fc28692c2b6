//! recall-hybrid
//!
//! The hybrid search service: embeds the query, consults the semantic cache,
//! runs the lexical and vector lookups concurrently, and fuses the two
//! candidate lists into a single ranking.

pub mod fusion;
pub mod service;

pub use fusion::{fuse, FusionWeights};
pub use service::{Attribution, HybridSearchService, IndexGeneration, SearchResponse, SearchTimings};

use recall_text::ConfiguredLexicalIndex;
use recall_vector::ConfiguredVectorIndex;

/// Service wired to the lexical and vector backends named in the config.
pub type DefaultSearchService = HybridSearchService<ConfiguredLexicalIndex, ConfiguredVectorIndex>;
