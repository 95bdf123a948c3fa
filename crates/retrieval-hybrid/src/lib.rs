//! retrieval-hybrid
//!
//! Fuses the keyword and similarity backends into one ranked hit list and
//! manages named collections: lazy creation, persistence through
//! `index_chunks`, and zip snapshots with rollback.
pub mod collection;
pub mod indexing;
pub mod retriever;
pub mod snapshot;

pub use collection::{Collection, CollectionManager};
pub use indexing::index_chunks;
pub use retriever::HybridRetriever;
pub use snapshot::{export_snapshot, rollback_snapshot, snapshot_file_name};
