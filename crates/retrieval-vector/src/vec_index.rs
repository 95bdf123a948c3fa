use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use retrieval_core::error::{Error, Result};
use retrieval_core::types::{Chunk, ChunkId};

pub const VEC_INDEX: &str = "vec.index";

/// Precomputed embeddings keyed by chunk id, persisted as a JSON object.
///
/// Only chunks whose metadata carries an embedding (see
/// [`retrieval_core::types::EMBEDDING_KEYS`]) have an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorIndex {
	entries: BTreeMap<ChunkId, Vec<f32>>,
}

impl VectorIndex {
	pub fn from_chunks(chunks: &[Chunk]) -> Self {
		let entries = chunks.iter().filter_map(|c| c.embedding().map(|e| (c.id.clone(), e))).collect();
		Self { entries }
	}

	pub fn get(&self, id: &str) -> Option<&[f32]> { self.entries.get(id).map(Vec::as_slice) }

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }

	pub fn ids(&self) -> impl Iterator<Item = &ChunkId> + '_ { self.entries.keys() }

	/// Write `<dir>/vec.index`, replacing the previous file atomically.
	pub fn save(&self, dir: &Path) -> Result<PathBuf> {
		fs::create_dir_all(dir)?;
		let path = dir.join(VEC_INDEX);
		let mut tmp = NamedTempFile::new_in(dir)?;
		{
			let mut out = BufWriter::new(tmp.as_file_mut());
			serde_json::to_writer(&mut out, self)?;
			out.flush()?;
		}
		tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
		Ok(path)
	}

	/// Read `<dir>/vec.index`; an empty index when the file is absent.
	pub fn load(dir: &Path) -> Result<Self> {
		let path = dir.join(VEC_INDEX);
		if !path.is_file() {
			return Ok(Self::default());
		}
		Ok(serde_json::from_slice(&fs::read(path)?)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn only_chunks_with_embeddings_are_indexed() {
		let chunks = vec![
			Chunk::new("a", "d", "t").with_meta("clip_vector", vec![0.5f32, 1.0]),
			Chunk::new("b", "d", "t"),
			Chunk::new("c", "d", "t").with_meta("embedding", vec![0.25f32]),
		];
		let index = VectorIndex::from_chunks(&chunks);
		assert_eq!(index.len(), 2);
		assert_eq!(index.get("a"), Some(&[0.5f32, 1.0][..]));
		assert_eq!(index.get("b"), None);
		assert_eq!(index.ids().collect::<Vec<_>>(), vec!["a", "c"]);
	}

	#[test]
	fn save_then_load_round_trips_and_empty_is_written() {
		let tmp = TempDir::new().unwrap();
		let index = VectorIndex::from_chunks(&[Chunk::new("a", "d", "t").with_meta("embedding", vec![0.125f32])]);
		index.save(tmp.path()).unwrap();
		assert_eq!(VectorIndex::load(tmp.path()).unwrap(), index);

		VectorIndex::default().save(tmp.path()).unwrap();
		assert_eq!(fs::read_to_string(tmp.path().join(VEC_INDEX)).unwrap(), "{}");
		assert!(VectorIndex::load(&tmp.path().join("missing")).unwrap().is_empty());
	}
}
