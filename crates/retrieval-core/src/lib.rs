//! Shared model for the retrieval workspace.
//!
//! Chunks and hits, the `Backend` trait every index implements, the
//! `where` / `where_document` filter compiler, the error type, and the
//! Figment configuration loader with its path helpers.
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use filter::{Filter, QueryFilter};
pub use store::OrderedStore;
pub use traits::Backend;
pub use types::{Chunk, ChunkId, Hit, HitBundle, MetaValue, Metadata, QueryRequest, SearchType, SourceKind};
