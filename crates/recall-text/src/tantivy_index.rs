use std::cmp::Ordering;
use std::path::PathBuf;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use recall_core::error::{Error, Result};
use recall_core::tokenize::tokenize;
use recall_core::traits::LexicalIndex;
use recall_core::types::{Candidate, Chunk};

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// Where the tantivy index lives and how much memory its writer may use.
#[derive(Debug, Clone)]
pub struct TantivyParams {
	/// `None` keeps the index in RAM; a directory is wiped and recreated on build.
	pub dir: Option<PathBuf>,
	pub writer_memory: usize,
}

impl Default for TantivyParams {
	fn default() -> Self { Self { dir: None, writer_memory: 50_000_000 } }
}

/// Lexical backend on tantivy. Scoring is tantivy's own BM25 with its fixed
/// constants; the query side uses the shared tokenizer so empty and
/// out-of-vocabulary queries behave like [`crate::Bm25Index`].
pub struct TantivyIndex {
	reader: IndexReader,
	id_field: Field,
	text_field: Field,
	doc_count: usize,
}

impl TantivyIndex {
	fn open(params: &TantivyParams) -> Result<Index> {
		let schema = build_schema();
		let index = match &params.dir {
			Some(dir) => {
				if dir.exists() { std::fs::remove_dir_all(dir).map_err(Error::index)?; }
				std::fs::create_dir_all(dir).map_err(Error::index)?;
				Index::create_in_dir(dir, schema).map_err(Error::index)?
			}
			None => Index::create_in_ram(schema),
		};
		register_tokenizer(&index);
		Ok(index)
	}
}

impl LexicalIndex for TantivyIndex {
	type Params = TantivyParams;

	fn build(params: &TantivyParams, chunks: &[Chunk]) -> Result<Self> {
		let index = Self::open(params)?;
		let schema = index.schema();
		let id_field = schema.get_field("id").map_err(Error::index)?;
		let source_field = schema.get_field("source").map_err(Error::index)?;
		let text_field = schema.get_field("text").map_err(Error::index)?;

		let mut index_writer: IndexWriter = index.writer_with_num_threads(1, params.writer_memory).map_err(Error::index)?;
		for c in chunks {
			let doc = doc!(
				id_field => c.id.clone(),
				source_field => c.source.clone(),
				text_field => c.text.clone(),
			);
			index_writer.add_document(doc).map_err(Error::index)?;
		}
		index_writer.commit().map_err(Error::index)?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::index)?;
		debug!(chunks = chunks.len(), in_ram = params.dir.is_none(), "built tantivy index");
		Ok(Self { reader, id_field, text_field, doc_count: chunks.len() })
	}

	fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
		let mut terms = tokenize(query);
		terms.sort();
		terms.dedup();
		if terms.is_empty() || k == 0 { return Ok(Vec::new()); }

		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(self.text_field, t), IndexRecordOption::WithFreqs));
				(Occur::Should, q)
			})
			.collect();
		let q = BooleanQuery::new(clauses);

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k)).map_err(Error::index)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(Error::index)?;
			let id = doc
				.get_first(self.id_field)
				.and_then(|v| v.as_str())
				.ok_or_else(|| Error::index(format!("document {addr:?} has no stored id")))?
				.to_string();
			hits.push(Candidate::lexical(id, score));
		}
		hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
		Ok(hits)
	}

	fn len(&self) -> usize { self.doc_count }
}
