use retrieval_core::{Backend, Chunk, QueryFilter};
use retrieval_text::{Bm25Backend, KeywordBackend};
use serde_json::json;

fn corpus() -> Vec<Chunk> {
    vec![
        Chunk::new("fire-1", "firecraft.txt", "Fire needs fuel, heat and oxygen. Keep the fire small.").with_meta("topic", "fire").with_page(1),
        Chunk::new("fire-2", "firecraft.txt", "A bow drill makes fire from friction.").with_meta("topic", "fire").with_page(2),
        Chunk::new("water-1", "water.txt", "Boil water for one minute before drinking.").with_meta("topic", "water"),
        Chunk::new("net-1", "networking.txt", "Mesh networking links radios without a tower.").with_meta("topic", "radio"),
    ]
}

fn backends() -> Vec<Box<dyn Backend>> {
    vec![Box::new(KeywordBackend::new()), Box::new(Bm25Backend::new().expect("bm25"))]
}

#[test]
fn both_keyword_backends_honour_the_contract() {
    for mut backend in backends() {
        assert_eq!(backend.upsert(&corpus()).expect("upsert"), 4, "{}", backend.name());
        assert_eq!(backend.len(), 4);

        let hits = backend.query(&["fire".to_string()], 1, &QueryFilter::default()).expect("query");
        let mut ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        ids.sort_unstable();
        // k is not applied inside the backend
        assert_eq!(ids, vec!["fire-1", "fire-2"], "{}", backend.name());

        let filter = QueryFilter::compile(Some(&json!({"page": {"$gte": 2}})), None);
        assert!(backend.query(&["fire".to_string()], 10, &filter).expect("query").is_empty(), "page is not metadata");

        let filter = QueryFilter::compile(None, Some(&json!({"$contains": "bow"})));
        let hits = backend.query(&["fire".to_string()], 10, &filter).expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "fire-2");
        assert_eq!(hits[0].chunk.as_ref().and_then(|c| c.page), Some(2));

        assert_eq!(backend.delete(&["fire-2".to_string()]).expect("delete"), 1);
        let ids: Vec<_> = backend.chunks().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["fire-1", "water-1", "net-1"]);
    }
}

#[test]
fn term_frequency_scores_are_occurrence_counts() {
    let mut backend = KeywordBackend::new();
    backend.upsert(&corpus()).expect("upsert");
    let hits = backend.query(&["FIRE water".to_string()], 10, &QueryFilter::default()).expect("query");
    let scores: Vec<_> = hits.iter().map(|h| (h.id.as_str(), h.score)).collect();
    assert_eq!(scores, vec![("fire-1", 2.0), ("fire-2", 1.0), ("water-1", 1.0)]);
}
