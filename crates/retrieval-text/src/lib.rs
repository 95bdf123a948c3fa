//! retrieval-text
//!
//! Keyword backends: the term-frequency `KeywordBackend` and a tantivy-based
//! `Bm25Backend` with the same `Backend` contract.
pub mod bm25;
pub mod keyword;
pub mod tantivy_utils;

pub use bm25::Bm25Backend;
pub use keyword::KeywordBackend;
