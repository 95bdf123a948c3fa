use std::fs;
use tempfile::TempDir;

use retrieval_core::{Backend, Chunk, QueryFilter};
use retrieval_vector::{load_chunks, persist_chunks, SimilarityBackend, VectorIndex, CHUNKS_JSONL, CHUNKS_PARQUET, VEC_INDEX};

fn chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("p1", "manual.pdf", "purify water with bleach").with_page(1).with_meta("clip_vector", vec![0.1f32, 0.2]),
        Chunk::new("p2", "manual.pdf", "store water in shade").with_page(2).with_section_path(["Water", "Storage"]),
        Chunk::new("p3", "radio.txt", "antenna length matters").with_span(10, 33),
    ]
}

#[test]
fn persisted_table_rebuilds_an_equivalent_backend() {
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("collections").join("manuals");
    persist_chunks(&dir, &chunks()).expect("persist");
    VectorIndex::from_chunks(&chunks()).save(&dir).expect("save vec.index");

    assert!(dir.join(CHUNKS_PARQUET).exists() || dir.join(CHUNKS_JSONL).exists());
    let vec_index: serde_json::Value = serde_json::from_slice(&fs::read(dir.join(VEC_INDEX)).expect("read")).expect("json");
    assert_eq!(vec_index.as_object().map(|o| o.len()), Some(1), "only p1 carries an embedding");

    let restored = load_chunks(&dir).expect("load");
    assert_eq!(restored, chunks());

    let mut backend = SimilarityBackend::new();
    backend.upsert(&restored).expect("upsert");
    let hits = backend.query(&["water shade".to_string()], 10, &QueryFilter::default()).expect("query");
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert!(hits[1].score > hits[0].score);
}

#[test]
fn rewriting_replaces_the_previous_table() {
    let tmp = TempDir::new().expect("tmp");
    persist_chunks(tmp.path(), &chunks()).expect("first");
    persist_chunks(tmp.path(), &chunks()[..1]).expect("second");
    assert_eq!(load_chunks(tmp.path()).expect("load").len(), 1);
}
