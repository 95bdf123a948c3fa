use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use retrieval_core::error::{Error, Result};
use retrieval_core::filter::QueryFilter;
use retrieval_core::store::OrderedStore;
use retrieval_core::traits::Backend;
use retrieval_core::types::{Chunk, Hit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer, ID_FIELD, TEXT_FIELD};

const WRITER_HEAP_BYTES: usize = 50_000_000;

fn index_err(e: tantivy::TantivyError) -> Error { Error::Operation(format!("tantivy: {e}")) }

/// BM25 keyword backend over an in-RAM tantivy index.
///
/// Same contract as [`crate::KeywordBackend`] with real-valued BM25 scores.
/// Each upsert/delete is a single commit; if it fails the writer is dropped
/// uncommitted and both the index and the chunk store keep their prior state.
pub struct Bm25Backend {
	index: Index,
	reader: IndexReader,
	id_field: Field,
	text_field: Field,
	docs: OrderedStore<Chunk>,
}

impl Bm25Backend {
	pub fn new() -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(index_err)?;
		let id_field = schema.get_field(ID_FIELD).map_err(index_err)?;
		let text_field = schema.get_field(TEXT_FIELD).map_err(index_err)?;
		Ok(Self { index, reader, id_field, text_field, docs: OrderedStore::new() })
	}

	fn writer(&self) -> Result<IndexWriter> { self.index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(index_err) }

	fn commit(&self, mut writer: IndexWriter) -> Result<()> {
		writer.commit().map_err(index_err)?;
		self.reader.reload().map_err(index_err)
	}
}

impl Backend for Bm25Backend {
	fn name(&self) -> &'static str { "bm25" }

	fn upsert(&mut self, chunks: &[Chunk]) -> Result<usize> {
		if chunks.is_empty() {
			return Ok(0);
		}
		let writer = self.writer()?;
		for c in chunks {
			writer.delete_term(Term::from_field_text(self.id_field, &c.id));
			writer
				.add_document(doc!(self.id_field => c.id.clone(), self.text_field => c.text.clone()))
				.map_err(index_err)?;
		}
		self.commit(writer)?;
		for c in chunks {
			self.docs.insert(c.id.clone(), c.clone());
		}
		Ok(chunks.len())
	}

	fn delete(&mut self, ids: &[String]) -> Result<usize> {
		let present: Vec<&String> = ids.iter().filter(|id| self.docs.contains(id)).collect();
		if present.is_empty() {
			return Ok(0);
		}
		let writer = self.writer()?;
		for id in &present {
			writer.delete_term(Term::from_field_text(self.id_field, id));
		}
		self.commit(writer)?;
		Ok(self.docs.remove_many(ids))
	}

	fn query(&self, texts: &[String], _k: usize, filter: &QueryFilter) -> Result<Vec<Hit>> {
		let Some(text) = texts.first().filter(|t| !t.trim().is_empty()) else { return Ok(Vec::new()) };
		if self.docs.is_empty() {
			return Ok(Vec::new());
		}
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (q, errors) = qp.parse_query_lenient(text);
		if !errors.is_empty() {
			tracing::debug!(?errors, "lenient bm25 query parse");
		}
		// Filters run after scoring, so collect every match.
		let top_docs = searcher.search(&q, &TopDocs::with_limit(self.docs.len())).map_err(index_err)?;
		let mut hits = Vec::new();
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(index_err)?;
			let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) else { continue };
			match self.docs.get(id) {
				Some(chunk) if filter.accepts(chunk) => hits.push(Hit::from_chunk(chunk, f64::from(score), SourceKind::Keyword)),
				_ => {}
			}
		}
		Ok(hits)
	}

	fn len(&self) -> usize { self.docs.len() }

	fn chunks(&self) -> Vec<Chunk> { self.docs.values().cloned().collect() }
}
