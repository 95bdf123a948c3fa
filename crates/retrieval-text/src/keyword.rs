use regex::{Regex, RegexBuilder};

use retrieval_core::error::{Error, Result};
use retrieval_core::filter::QueryFilter;
use retrieval_core::store::OrderedStore;
use retrieval_core::traits::Backend;
use retrieval_core::types::{Chunk, Hit, SourceKind};

/// Term-frequency keyword scorer.
///
/// Each whitespace-separated term of the query becomes a case-insensitive
/// literal pattern; a chunk scores the total number of non-overlapping
/// occurrences of all patterns in its text. No IDF weighting and no length
/// normalization.
#[derive(Debug, Default)]
pub struct KeywordBackend {
	docs: OrderedStore<Chunk>,
}

impl KeywordBackend {
	pub fn new() -> Self { Self::default() }

	fn patterns(query: &str) -> Result<Vec<Regex>> {
		query
			.split_whitespace()
			.map(|term| {
				RegexBuilder::new(&regex::escape(term))
					.case_insensitive(true)
					.build()
					.map_err(|e| Error::InvalidQuery(format!("term '{term}': {e}")))
			})
			.collect()
	}
}

impl Backend for KeywordBackend {
	fn name(&self) -> &'static str { "keyword" }

	fn upsert(&mut self, chunks: &[Chunk]) -> Result<usize> {
		for chunk in chunks {
			self.docs.insert(chunk.id.clone(), chunk.clone());
		}
		Ok(chunks.len())
	}

	fn delete(&mut self, ids: &[String]) -> Result<usize> { Ok(self.docs.remove_many(ids)) }

	fn query(&self, texts: &[String], _k: usize, filter: &QueryFilter) -> Result<Vec<Hit>> {
		let Some(query) = texts.first() else { return Ok(Vec::new()) };
		let patterns = Self::patterns(query)?;
		if patterns.is_empty() {
			return Ok(Vec::new());
		}
		let hits: Vec<Hit> = self
			.docs
			.values()
			.filter(|chunk| filter.accepts(chunk))
			.filter_map(|chunk| {
				let count: usize = patterns.iter().map(|p| p.find_iter(&chunk.text).count()).sum();
				(count > 0).then(|| Hit::from_chunk(chunk, count as f64, SourceKind::Keyword))
			})
			.collect();
		tracing::debug!(candidates = self.docs.len(), hits = hits.len(), "keyword query");
		Ok(hits)
	}

	fn len(&self) -> usize { self.docs.len() }

	fn chunks(&self) -> Vec<Chunk> { self.docs.values().cloned().collect() }
}
