use crate::error::Result;
use crate::filter::QueryFilter;
use crate::types::{Chunk, Hit};

/// An index over chunks that can score them against query texts.
///
/// Implementations keep records in insertion order and apply the compiled
/// filter before scoring. Results come back unsorted and untruncated unless
/// the backend needs `k` to bound its own candidate search; ranking is the
/// retriever's job.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Insert or replace by id. Returns the number of chunks received.
    fn upsert(&mut self, chunks: &[Chunk]) -> Result<usize>;

    /// Remove by id. Returns the number of ids that were present.
    fn delete(&mut self, ids: &[String]) -> Result<usize>;

    /// Score every record passing `filter` against `texts[0]`.
    fn query(&self, texts: &[String], k: usize, filter: &QueryFilter) -> Result<Vec<Hit>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool { self.len() == 0 }

    /// All held records, in insertion order.
    fn chunks(&self) -> Vec<Chunk>;
}
