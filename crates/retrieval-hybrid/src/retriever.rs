use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use retrieval_core::config::KeywordBackendKind;
use retrieval_core::error::Result;
use retrieval_core::filter::QueryFilter;
use retrieval_core::traits::Backend;
use retrieval_core::types::{Chunk, Hit, SearchType, SourceKind};
use retrieval_text::{Bm25Backend, KeywordBackend};
use retrieval_vector::SimilarityBackend;

/// One keyword and one similarity backend over the same chunk set.
///
/// Nothing keeps the two backends transactionally in step: a failure in the
/// second backend of an upsert leaves the first one updated.
pub struct HybridRetriever {
    keyword: Box<dyn Backend>,
    similarity: Box<dyn Backend>,
}

impl Default for HybridRetriever {
    fn default() -> Self { Self::new() }
}

impl HybridRetriever {
    /// Term-frequency keyword backend plus Jaccard similarity backend.
    pub fn new() -> Self { Self::with_backends(Box::new(KeywordBackend::new()), Box::new(SimilarityBackend::new())) }

    pub fn with_backends(keyword: Box<dyn Backend>, similarity: Box<dyn Backend>) -> Self { Self { keyword, similarity } }

    pub fn with_keyword_backend(kind: KeywordBackendKind) -> Result<Self> {
        let keyword: Box<dyn Backend> = match kind {
            KeywordBackendKind::TermFrequency => Box::new(KeywordBackend::new()),
            KeywordBackendKind::Bm25 => Box::new(Bm25Backend::new()?),
        };
        Ok(Self::with_backends(keyword, Box::new(SimilarityBackend::new())))
    }

    /// Returns the number of chunks presented, not the number that changed.
    pub fn upsert(&mut self, chunks: &[Chunk]) -> Result<usize> {
        self.similarity.upsert(chunks)?;
        self.keyword.upsert(chunks)?;
        Ok(chunks.len())
    }

    /// Returns the larger of the two per-backend removal counts.
    pub fn delete(&mut self, ids: &[String]) -> Result<usize> {
        let removed_similarity = self.similarity.delete(ids)?;
        let removed_keyword = self.keyword.delete(ids)?;
        Ok(removed_similarity.max(removed_keyword))
    }

    pub fn query(
        &self,
        texts: &[String],
        k: usize,
        where_filter: Option<&Value>,
        where_document: Option<&Value>,
        search_type: SearchType,
    ) -> Result<Vec<Hit>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let filter = QueryFilter::compile(where_filter, where_document);
        if let Err(e) = filter.validate() {
            tracing::debug!(error = %e, "filter can never match");
        }
        self.query_with(texts, k, &filter, search_type)
    }

    /// Like [`Self::query`] with an already compiled filter.
    pub fn query_with(&self, texts: &[String], k: usize, filter: &QueryFilter, search_type: SearchType) -> Result<Vec<Hit>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let hits = match search_type {
            SearchType::Keyword => self.keyword.query(texts, k, filter)?,
            SearchType::Vector => self.similarity.query(texts, k, filter)?,
            SearchType::Hybrid => {
                let similarity_hits = self.similarity.query(texts, k, filter)?;
                let keyword_hits = self.keyword.query(texts, k, filter)?;
                tracing::debug!(similarity = similarity_hits.len(), keyword = keyword_hits.len(), "fusing hits");
                fuse(similarity_hits, keyword_hits)
            }
        };
        Ok(rank(hits, k))
    }

    pub fn len(&self) -> usize { self.similarity.len().max(self.keyword.len()) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Every chunk held, in insertion order.
    pub fn chunks(&self) -> Vec<Chunk> {
        if self.similarity.len() >= self.keyword.len() { self.similarity.chunks() } else { self.keyword.chunks() }
    }
}

/// Similarity hits first, in order; a keyword hit for an id already present
/// raises that entry's score to the max of the two in place, otherwise it is
/// appended. Scores are not normalized across backends.
fn fuse(similarity_hits: Vec<Hit>, keyword_hits: Vec<Hit>) -> Vec<Hit> {
    let mut fused = similarity_hits;
    let mut position: HashMap<String, usize> = fused.iter().enumerate().map(|(i, h)| (h.id.clone(), i)).collect();
    for hit in keyword_hits {
        match position.get(&hit.id) {
            Some(&i) => {
                let existing = &mut fused[i];
                if hit.score > existing.score {
                    existing.score = hit.score;
                    existing.source = SourceKind::Keyword;
                }
            }
            None => {
                position.insert(hit.id.clone(), fused.len());
                fused.push(hit);
            }
        }
    }
    fused
}

/// Stable descending sort, then truncate to `k`.
fn rank(mut hits: Vec<Hit>, k: usize) -> Vec<Hit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64, source: SourceKind) -> Hit {
        Hit::from_chunk(&Chunk::new(id, "d", id), score, source)
    }

    #[test]
    fn fuse_keeps_similarity_position_and_takes_max() {
        let fused = fuse(
            vec![hit("a", 0.5, SourceKind::Similarity), hit("b", 0.9, SourceKind::Similarity)],
            vec![hit("c", 1.0, SourceKind::Keyword), hit("a", 2.0, SourceKind::Keyword), hit("b", 0.1, SourceKind::Keyword)],
        );
        let got: Vec<_> = fused.iter().map(|h| (h.id.as_str(), h.score, h.source)).collect();
        assert_eq!(
            got,
            vec![("a", 2.0, SourceKind::Keyword), ("b", 0.9, SourceKind::Similarity), ("c", 1.0, SourceKind::Keyword)]
        );
    }

    #[test]
    fn rank_is_stable_on_ties() {
        let ranked = rank(
            vec![hit("x", 1.0, SourceKind::Similarity), hit("y", 3.0, SourceKind::Keyword), hit("z", 1.0, SourceKind::Keyword)],
            2,
        );
        let ids: Vec<_> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x"]);
    }

    #[test]
    fn empty_texts_short_circuit() {
        let mut r = HybridRetriever::new();
        r.upsert(&[Chunk::new("a", "d", "apple")]).unwrap();
        assert!(r.query(&[], 10, None, None, SearchType::Hybrid).unwrap().is_empty());
    }

    #[test]
    fn bm25_variant_is_selectable() {
        let mut r = HybridRetriever::with_keyword_backend(KeywordBackendKind::Bm25).unwrap();
        r.upsert(&[Chunk::new("a", "d", "granite quarry"), Chunk::new("b", "d", "sand")]).unwrap();
        let hits = r.query(&["granite".to_string()], 5, None, None, SearchType::Keyword).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }
}
