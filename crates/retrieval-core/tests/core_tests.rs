use std::path::{Path, PathBuf};

use retrieval_core::config::{expand_path, resolve_under, Config, KeywordBackendKind, Settings};
use retrieval_core::{Chunk, QueryFilter, SearchType};
use serde_json::json;

#[test]
fn empty_config_yields_defaults() {
    let settings = Config::from_toml_str("").settings().expect("settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.search.default_k, 10);
    assert_eq!(settings.search.search_type, SearchType::Hybrid);
    assert_eq!(settings.collection_path("notes"), PathBuf::from("data/collections/notes"));
}

#[test]
fn collections_and_search_sections_are_read() {
    let config = Config::from_toml_str(
        r#"
        base_dir = "/srv/retrieval"
        log_level = "debug"

        [collections]
        manuals = "/mnt/manuals"
        guides = "field/guides"

        [search]
        default_k = 3
        search_type = "keyword"
        keyword_backend = "bm25"
        "#,
    );
    let settings = config.settings().expect("settings");
    assert_eq!(settings.collection_path("manuals"), PathBuf::from("/mnt/manuals"));
    assert_eq!(settings.collection_path("guides"), PathBuf::from("/srv/retrieval/field/guides"));
    assert_eq!(settings.collection_path("other"), PathBuf::from("/srv/retrieval/collections/other"));
    assert_eq!(settings.search.default_k, 3);
    assert_eq!(settings.search.search_type, SearchType::Keyword);
    assert_eq!(settings.search.keyword_backend, KeywordBackendKind::Bm25);
    assert_eq!(settings.log_level.as_deref(), Some("debug"));
}

#[test]
fn invalid_settings_are_config_errors() {
    assert!(Config::from_toml_str("[search]\ndefault_k = 0").settings().is_err());
    assert!(Config::from_toml_str("[search]\nsearch_type = \"fuzzy\"").settings().is_err());
    assert!(Config::from_toml_str("[search]\ndefault_k = \"ten\"").settings().is_err());
}

#[test]
fn paths_expand_home_and_resolve_relative() {
    let home = std::env::var("HOME").unwrap_or_default();
    if !home.is_empty() {
        assert_eq!(expand_path("~/x"), Path::new(&home).join("x"));
    }
    let base = Path::new("/base");
    assert_eq!(resolve_under(base, "rel/dir"), PathBuf::from("/base/rel/dir"));
    assert_eq!(resolve_under(base, "/abs"), PathBuf::from("/abs"));
}

#[test]
fn query_filter_combines_where_and_where_document() {
    let filter = QueryFilter::compile(
        Some(&json!({"$or": [{"page_kind": "intro"}, {"year": {"$gte": 2020}}]})),
        Some(&json!({"$regex": "(?i)water"})),
    );
    let a = Chunk::new("a", "d", "Water filtration").with_meta("year", 2021_i64);
    let b = Chunk::new("b", "d", "Water storage").with_meta("year", 2010_i64);
    let c = Chunk::new("c", "d", "Fire starting").with_meta("page_kind", "intro");
    assert!(filter.accepts(&a));
    assert!(!filter.accepts(&b));
    assert!(!filter.accepts(&c));
    assert!(filter.validate().is_ok());
}
