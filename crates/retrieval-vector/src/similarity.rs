use std::collections::HashSet;

use retrieval_core::error::Result;
use retrieval_core::filter::QueryFilter;
use retrieval_core::store::OrderedStore;
use retrieval_core::traits::Backend;
use retrieval_core::types::{Chunk, Hit, SourceKind};

struct Entry {
	chunk: Chunk,
	tokens: HashSet<String>,
}

/// Token-overlap stand-in for an embedding index.
///
/// Scores are the Jaccard similarity between the whitespace token sets of
/// the query and the chunk text, in `(0, 1]`. Tokens are compared exactly.
#[derive(Default)]
pub struct SimilarityBackend {
	docs: OrderedStore<Entry>,
}

impl SimilarityBackend {
	pub fn new() -> Self { Self::default() }
}

fn tokenize(text: &str) -> HashSet<String> { text.split_whitespace().map(str::to_string).collect() }

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
	let shared = a.intersection(b).count();
	if shared == 0 {
		return 0.0;
	}
	shared as f64 / (a.len() + b.len() - shared) as f64
}

impl Backend for SimilarityBackend {
	fn name(&self) -> &'static str { "similarity" }

	fn upsert(&mut self, chunks: &[Chunk]) -> Result<usize> {
		for chunk in chunks {
			let entry = Entry { tokens: tokenize(&chunk.text), chunk: chunk.clone() };
			self.docs.insert(chunk.id.clone(), entry);
		}
		Ok(chunks.len())
	}

	fn delete(&mut self, ids: &[String]) -> Result<usize> { Ok(self.docs.remove_many(ids)) }

	fn query(&self, texts: &[String], _k: usize, filter: &QueryFilter) -> Result<Vec<Hit>> {
		let Some(query) = texts.first() else { return Ok(Vec::new()) };
		let q_tokens = tokenize(query);
		if q_tokens.is_empty() {
			return Ok(Vec::new());
		}
		let hits: Vec<Hit> = self
			.docs
			.values()
			.filter(|e| !e.tokens.is_empty() && filter.accepts(&e.chunk))
			.filter_map(|e| {
				let score = jaccard(&q_tokens, &e.tokens);
				(score > 0.0).then(|| Hit::from_chunk(&e.chunk, score, SourceKind::Similarity))
			})
			.collect();
		tracing::debug!(candidates = self.docs.len(), hits = hits.len(), "similarity query");
		Ok(hits)
	}

	fn len(&self) -> usize { self.docs.len() }

	fn chunks(&self) -> Vec<Chunk> { self.docs.values().map(|e| e.chunk.clone()).collect() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn q(b: &SimilarityBackend, text: &str) -> Vec<(String, f64)> {
		b.query(&[text.to_string()], 10, &QueryFilter::default()).unwrap().into_iter().map(|h| (h.id, h.score)).collect()
	}

	#[test]
	fn jaccard_over_token_sets() {
		let mut b = SimilarityBackend::new();
		b.upsert(&[
			Chunk::new("c1", "d", "apple banana"),
			Chunk::new("c2", "d", "banana cherry"),
			Chunk::new("c3", "d", "car truck"),
		])
		.unwrap();
		let got = q(&b, "apple banana cherry");
		assert_eq!(got.len(), 2);
		assert_eq!(got[0].0, "c1");
		assert_eq!(got[1].0, "c2");
		assert!(got.iter().all(|(_, s)| (s - 2.0 / 3.0).abs() < 1e-12));
	}

	#[test]
	fn duplicate_tokens_count_once_and_case_matters() {
		let mut b = SimilarityBackend::new();
		b.upsert(&[Chunk::new("a", "d", "Rain rain rain")]).unwrap();
		assert_eq!(q(&b, "rain"), vec![("a".to_string(), 0.5)]);
		assert!(q(&b, "RAIN").is_empty());
	}

	#[test]
	fn empty_texts_never_match() {
		let mut b = SimilarityBackend::new();
		b.upsert(&[Chunk::new("blank", "d", "   ")]).unwrap();
		assert!(q(&b, "anything").is_empty());
		assert!(q(&b, "").is_empty());
		assert_eq!(b.chunks().len(), 1);
	}
}
