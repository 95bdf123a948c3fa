//! retrieval-vector
//!
//! The similarity backend plus the on-disk artifacts of a collection: the
//! chunk table (`chunks.parquet`, or `chunks.jsonl` as fallback) and the
//! `vec.index` embedding map.
pub mod schema;
pub mod similarity;
pub mod vec_index;
pub mod writer;

pub use similarity::SimilarityBackend;
pub use vec_index::{VectorIndex, VEC_INDEX};
pub use writer::{chunk_table_path, load_chunks, persist_chunks, CHUNKS_JSONL, CHUNKS_PARQUET};

/// Id-map artifact name. Never written here, but archived when present.
pub const IDMAP_PARQUET: &str = "idmap.parquet";
