//! Domain types shared by the keyword and similarity backends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;
pub type Metadata = BTreeMap<String, MetaValue>;

/// Metadata keys that may carry a precomputed embedding for `vec.index`.
pub const EMBEDDING_KEYS: &[&str] = &["embedding", "clip_vector"];

/// A single metadata value: a JSON scalar or a list of them.
///
/// `Null` is kept so extractor output with null fields still loads; filters
/// treat a null field as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<MetaValue>),
}

impl MetaValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret a numeric list as an embedding vector.
    pub fn as_embedding(&self) -> Option<Vec<f32>> {
        let MetaValue::List(items) = self else { return None };
        items.iter().map(|v| v.as_f64().map(|x| x as f32)).collect()
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => f.write_str("null"),
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Str(s) => f.write_str(s),
            MetaValue::List(_) => f.write_str(&serde_json::to_string(self).unwrap_or_default()),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self { MetaValue::Str(s.to_string()) }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self { MetaValue::Str(s) }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self { MetaValue::Int(i) }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self { MetaValue::Float(x) }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self { MetaValue::Bool(b) }
}

impl From<Vec<f32>> for MetaValue {
    fn from(v: Vec<f32>) -> Self { MetaValue::List(v.into_iter().map(|x| MetaValue::Float(f64::from(x))).collect()) }
}

/// A unit of retrievable content produced by an external extractor.
///
/// - `id`: unique within a collection; re-inserting an id replaces the record
/// - `doc_id`: identity of the source document
/// - `page`: 1-indexed page when the source is paginated
/// - `section_path`: hierarchical headings leading to this chunk
/// - `span`: `(start, end)` character offsets within the source document
/// - `metadata`: open-ended extractor metadata; the target of `where` filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub section_path: Vec<String>,
    #[serde(default)]
    pub span: Option<(usize, usize)>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_id: doc_id.into(),
            text: text.into(),
            page: None,
            section_path: Vec::new(),
            span: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self { self.page = Some(page); self }

    #[must_use]
    pub fn with_section_path<S: Into<String>>(mut self, path: impl IntoIterator<Item = S>) -> Self {
        self.section_path = path.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_span(mut self, start: usize, end: usize) -> Self { self.span = Some((start, end)); self }

    /// The first embedding found under one of [`EMBEDDING_KEYS`].
    pub fn embedding(&self) -> Option<Vec<f32>> {
        EMBEDDING_KEYS.iter().find_map(|key| self.metadata.get(*key).and_then(MetaValue::as_embedding))
    }
}

/// Indicates which backend produced (or last raised) a hit's score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Keyword,
    Similarity,
}

/// A scored chunk returned from a query. Never persisted.
///
/// `score` is backend-specific and higher is better: keyword scores are
/// unbounded occurrence counts, similarity scores lie in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: ChunkId,
    pub document: String,
    pub metadata: Metadata,
    pub score: f64,
    pub source: SourceKind,
    pub chunk: Option<Chunk>,
}

impl Hit {
    pub fn from_chunk(chunk: &Chunk, score: f64, source: SourceKind) -> Self {
        Self {
            id: chunk.id.clone(),
            document: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            score,
            source,
            chunk: Some(chunk.clone()),
        }
    }

    pub fn distance(&self) -> f64 { 1.0 - self.score }
}

/// Which backend(s) a query is routed to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Keyword,
    Vector,
    #[default]
    Hybrid,
}

impl FromStr for SearchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(SearchType::Keyword),
            "vector" => Ok(SearchType::Vector),
            "hybrid" => Ok(SearchType::Hybrid),
            other => Err(Error::InvalidQuery(format!("unknown search_type '{other}'"))),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchType::Keyword => "keyword",
            SearchType::Vector => "vector",
            SearchType::Hybrid => "hybrid",
        })
    }
}

fn default_collection() -> String { "default".to_string() }

/// A query as received from the API layer.
///
/// `k` and `search_type` fall back to the configured defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default, rename = "where")]
    pub where_filter: Option<serde_json::Value>,
    #[serde(default)]
    pub where_document: Option<serde_json::Value>,
    #[serde(default)]
    pub search_type: Option<SearchType>,
}

/// The response shape handed back to the API layer: parallel sequences,
/// one entry per hit, with `distances[i] == 1 - score`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitBundle {
    pub ids: Vec<ChunkId>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f64>,
    pub chunks: Vec<Option<Chunk>>,
}

impl HitBundle {
    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }
}

impl From<Vec<Hit>> for HitBundle {
    fn from(hits: Vec<Hit>) -> Self {
        let mut bundle = HitBundle::default();
        for hit in hits {
            bundle.distances.push(hit.distance());
            bundle.ids.push(hit.id);
            bundle.documents.push(hit.document);
            bundle.metadatas.push(hit.metadata);
            bundle.chunks.push(hit.chunk);
        }
        bundle
    }
}
