use std::path::Path;

use retrieval_core::error::Result;
use retrieval_core::types::Chunk;
use retrieval_vector::{persist_chunks, VectorIndex};

use crate::retriever::HybridRetriever;

/// Upsert `chunks` into `retriever` (when given) and persist them to `dir`.
///
/// The chunk table and `vec.index` are rewritten to describe exactly the
/// chunks passed to this call. `vec.index` is written even when no chunk
/// carries an embedding. Returns the number of chunks processed.
pub fn index_chunks(chunks: &[Chunk], retriever: Option<&mut HybridRetriever>, dir: &Path) -> Result<usize> {
    if let Some(retriever) = retriever {
        retriever.upsert(chunks)?;
    }
    let table = persist_chunks(dir, chunks)?;
    let vec_index = VectorIndex::from_chunks(chunks);
    vec_index.save(dir)?;
    tracing::info!(
        chunks = chunks.len(),
        embeddings = vec_index.len(),
        table = %table.display(),
        "persisted chunks"
    );
    Ok(chunks.len())
}
