use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{Array, ArrayRef, ListArray, RecordBatch, StringArray, UInt32Array, UInt64Array};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use retrieval_core::error::{Error, Result};
use retrieval_core::types::Chunk;

use crate::schema::build_chunk_schema;

pub const CHUNKS_PARQUET: &str = "chunks.parquet";
pub const CHUNKS_JSONL: &str = "chunks.jsonl";

fn arrow_err(e: arrow_schema::ArrowError) -> Error { Error::Persistence(format!("arrow: {e}")) }

#[cfg(feature = "parquet")]
fn parquet_err(e: parquet::errors::ParquetError) -> Error { Error::Persistence(format!("parquet: {e}")) }

pub fn chunks_to_record_batch(chunks: &[Chunk]) -> Result<RecordBatch> {
	let n = chunks.len();
	let mut ids = Vec::with_capacity(n);
	let mut doc_ids = Vec::with_capacity(n);
	let mut texts = Vec::with_capacity(n);
	let mut pages = Vec::with_capacity(n);
	let mut sections = ListBuilder::new(StringBuilder::new());
	let mut span_starts = Vec::with_capacity(n);
	let mut span_ends = Vec::with_capacity(n);
	let mut metadata = Vec::with_capacity(n);
	for c in chunks {
		ids.push(c.id.as_str());
		doc_ids.push(c.doc_id.as_str());
		texts.push(c.text.as_str());
		pages.push(c.page);
		for s in &c.section_path {
			sections.values().append_value(s);
		}
		sections.append(true);
		span_starts.push(c.span.map(|(start, _)| start as u64));
		span_ends.push(c.span.map(|(_, end)| end as u64));
		metadata.push(serde_json::to_string(&c.metadata)?);
	}
	let columns: Vec<ArrayRef> = vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(doc_ids)),
		Arc::new(StringArray::from(texts)),
		Arc::new(UInt32Array::from(pages)),
		Arc::new(sections.finish()),
		Arc::new(UInt64Array::from(span_starts)),
		Arc::new(UInt64Array::from(span_ends)),
		Arc::new(StringArray::from(metadata)),
	];
	RecordBatch::try_new(build_chunk_schema(), columns).map_err(arrow_err)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::Persistence(format!("chunk table column '{name}' is missing or mistyped")))
}

pub fn record_batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let ids = column::<StringArray>(batch, "id")?;
	let doc_ids = column::<StringArray>(batch, "doc_id")?;
	let texts = column::<StringArray>(batch, "text")?;
	let pages = column::<UInt32Array>(batch, "page")?;
	let sections = column::<ListArray>(batch, "section_path")?;
	let span_starts = column::<UInt64Array>(batch, "span_start")?;
	let span_ends = column::<UInt64Array>(batch, "span_end")?;
	let metadata = column::<StringArray>(batch, "metadata")?;

	let mut chunks = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let section_path = if sections.is_null(i) {
			Vec::new()
		} else {
			let values = sections.value(i);
			let strings = values
				.as_any()
				.downcast_ref::<StringArray>()
				.ok_or_else(|| Error::Persistence("section_path items are not strings".to_string()))?;
			strings.iter().flatten().map(str::to_string).collect()
		};
		let span = if span_starts.is_null(i) || span_ends.is_null(i) {
			None
		} else {
			Some((span_starts.value(i) as usize, span_ends.value(i) as usize))
		};
		chunks.push(Chunk {
			id: ids.value(i).to_string(),
			doc_id: doc_ids.value(i).to_string(),
			text: texts.value(i).to_string(),
			page: (!pages.is_null(i)).then(|| pages.value(i)),
			section_path,
			span,
			metadata: serde_json::from_str(metadata.value(i))?,
		});
	}
	Ok(chunks)
}

fn persist(tmp: NamedTempFile, path: PathBuf) -> Result<PathBuf> {
	tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
	Ok(path)
}

fn remove_stale(path: &Path) -> Result<()> {
	match fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e.into()),
	}
}

#[cfg(feature = "parquet")]
fn write_parquet(dir: &Path, chunks: &[Chunk]) -> Result<PathBuf> {
	use parquet::arrow::ArrowWriter;

	let batch = chunks_to_record_batch(chunks)?;
	let mut tmp = NamedTempFile::new_in(dir)?;
	let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), batch.schema(), None).map_err(parquet_err)?;
	writer.write(&batch).map_err(parquet_err)?;
	writer.close().map_err(parquet_err)?;
	persist(tmp, dir.join(CHUNKS_PARQUET))
}

#[cfg(not(feature = "parquet"))]
fn write_parquet(_dir: &Path, _chunks: &[Chunk]) -> Result<PathBuf> {
	Err(Error::Persistence("built without the `parquet` feature".to_string()))
}

#[cfg(feature = "parquet")]
fn read_parquet(path: &Path) -> Result<Vec<Chunk>> {
	use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

	let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)
		.map_err(parquet_err)?
		.build()
		.map_err(parquet_err)?;
	let mut chunks = Vec::new();
	for batch in reader {
		chunks.extend(record_batch_to_chunks(&batch.map_err(arrow_err)?)?);
	}
	Ok(chunks)
}

#[cfg(not(feature = "parquet"))]
fn read_parquet(path: &Path) -> Result<Vec<Chunk>> {
	Err(Error::Persistence(format!("cannot read {}: built without the `parquet` feature", path.display())))
}

fn write_jsonl(dir: &Path, chunks: &[Chunk]) -> Result<PathBuf> {
	let mut tmp = NamedTempFile::new_in(dir)?;
	{
		let mut out = BufWriter::new(tmp.as_file_mut());
		for c in chunks {
			serde_json::to_writer(&mut out, c)?;
			out.write_all(b"\n")?;
		}
		out.flush()?;
	}
	persist(tmp, dir.join(CHUNKS_JSONL))
}

fn read_jsonl(path: &Path) -> Result<Vec<Chunk>> {
	let mut chunks = Vec::new();
	for line in BufReader::new(File::open(path)?).lines() {
		let line = line?;
		if line.trim().is_empty() {
			continue;
		}
		chunks.push(serde_json::from_str(&line)?);
	}
	Ok(chunks)
}

/// Write the chunk table for `chunks` into `dir`, replacing any previous one.
///
/// Writes `chunks.parquet`; if that fails for any reason the same records
/// go to `chunks.jsonl`, one JSON object per line. Whichever format was not
/// written is removed so a later load cannot pick up a stale table. Only a
/// failure of the JSON-lines fallback is returned; a stale columnar table
/// that cannot be removed is logged and left in place.
pub fn persist_chunks(dir: &Path, chunks: &[Chunk]) -> Result<PathBuf> {
	fs::create_dir_all(dir)?;
	match write_parquet(dir, chunks) {
		Ok(path) => {
			remove_stale(&dir.join(CHUNKS_JSONL))?;
			Ok(path)
		}
		Err(e) => {
			tracing::warn!(error = %e, dir = %dir.display(), "columnar chunk table unavailable, writing JSON lines");
			let path = write_jsonl(dir, chunks)?;
			if let Err(e) = remove_stale(&dir.join(CHUNKS_PARQUET)) {
				tracing::warn!(error = %e, dir = %dir.display(), "could not remove stale columnar chunk table");
			}
			Ok(path)
		}
	}
}

/// The chunk table file present in `dir`, preferring the columnar one.
pub fn chunk_table_path(dir: &Path) -> Option<PathBuf> {
	[CHUNKS_PARQUET, CHUNKS_JSONL].into_iter().map(|name| dir.join(name)).find(|p| p.is_file())
}

/// Read back the chunk table in `dir`; an empty set when none exists.
pub fn load_chunks(dir: &Path) -> Result<Vec<Chunk>> {
	match chunk_table_path(dir) {
		Some(path) if path.ends_with(CHUNKS_PARQUET) => read_parquet(&path),
		Some(path) => read_jsonl(&path),
		None => Ok(Vec::new()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn sample() -> Vec<Chunk> {
		vec![
			Chunk::new("a", "doc-1", "first")
				.with_page(3)
				.with_section_path(["Intro", "Scope"])
				.with_span(0, 5)
				.with_meta("lang", "en")
				.with_meta("clip_vector", vec![0.5f32, 0.25]),
			Chunk::new("b", "doc-1", "second"),
		]
	}

	#[test]
	fn record_batch_preserves_every_field() {
		let batch = chunks_to_record_batch(&sample()).unwrap();
		assert_eq!(batch.num_rows(), 2);
		assert_eq!(record_batch_to_chunks(&batch).unwrap(), sample());
	}

	#[test]
	fn jsonl_round_trip_is_lossless() {
		let tmp = TempDir::new().unwrap();
		let path = write_jsonl(tmp.path(), &sample()).unwrap();
		assert_eq!(read_jsonl(&path).unwrap(), sample());
	}

	#[test]
	fn persist_and_load_prefer_columnar_table() {
		let tmp = TempDir::new().unwrap();
		let dir = tmp.path().join("col");
		fs::create_dir_all(&dir).unwrap();
		fs::write(dir.join(CHUNKS_JSONL), "{}\n").unwrap();
		let path = persist_chunks(&dir, &sample()).unwrap();
		if cfg!(feature = "parquet") {
			assert!(path.ends_with(CHUNKS_PARQUET));
			assert!(!dir.join(CHUNKS_JSONL).exists(), "stale fallback removed");
		} else {
			assert!(path.ends_with(CHUNKS_JSONL));
		}
		assert_eq!(load_chunks(&dir).unwrap(), sample());
	}

	#[test]
	fn failed_columnar_write_falls_back_to_jsonl() {
		let tmp = TempDir::new().unwrap();
		let dir = tmp.path().join("col");
		fs::create_dir_all(dir.join(CHUNKS_PARQUET).join("blocker")).unwrap();
		let path = persist_chunks(&dir, &sample()).unwrap();
		assert!(path.ends_with(CHUNKS_JSONL));
		assert!(dir.join(CHUNKS_JSONL).is_file());
		assert_eq!(chunk_table_path(&dir), Some(dir.join(CHUNKS_JSONL)));
		assert_eq!(load_chunks(&dir).unwrap(), sample());
	}

	#[test]
	fn missing_table_loads_empty() {
		let tmp = TempDir::new().unwrap();
		assert!(load_chunks(tmp.path()).unwrap().is_empty());
		assert!(chunk_table_path(tmp.path()).is_none());
	}
}
