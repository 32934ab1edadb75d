//! # Registry and Store Tests
//!
//! Startup loading against on-disk fixtures: a store is either fully
//! populated from the registry or not created at all.

#![allow(clippy::unwrap_used, clippy::panic)]

use catty_core::{CattyError, GraphName, GraphStore, QueryService, Registry};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CLASS_DOC: &str = r#"{
  "@context": {"@base": "http://x/a#", "owl": "http://www.w3.org/2002/07/owl#"},
  "@id": "Category",
  "@type": "owl:Class"
}"#;

fn write_repo(registry_yaml: &str, files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join(".catty")).expect("mkdir");
    fs::write(dir.path().join(".catty/iri-config.yaml"), registry_yaml).expect("write registry");
    for (name, body) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, body).expect("write file");
    }
    dir
}

fn load(root: &Path) -> Result<GraphStore, CattyError> {
    let registry = Registry::load(&root.join(".catty/iri-config.yaml"))?;
    GraphStore::init(root, &registry)
}

const SINGLE_ENTRY: &str = r#"
ontologies:
  a:
    localhost_iri: "http://x/a#"
    production_iri: "https://y/a#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "a.jsonld"
"#;

// =============================================================================
// STARTUP LOADING
// =============================================================================

#[test]
fn single_class_declaration_is_counted_in_its_graph() {
    let repo = write_repo(SINGLE_ENTRY, &[("a.jsonld", CLASS_DOC)]);
    let store = Arc::new(load(repo.path()).expect("store"));

    assert_eq!(store.graph_names(), vec!["http://x/a#".to_string()]);
    let triples = store.graph(&GraphName::named("http://x/a#")).expect("graph");
    assert_eq!(triples.len(), 1);
    assert_eq!(triples[0].subject.value(), "http://x/a#Category");

    let service = QueryService::new(store);
    let result = service
        .execute_query(
            "SELECT (COUNT(*) AS ?n) WHERE { GRAPH <http://x/a#> { ?s ?p ?o } }",
            &BTreeMap::new(),
        )
        .expect("query");
    let bindings = result.bindings().expect("bindings");
    assert_eq!(bindings.rows.len(), 1);
    assert_eq!(bindings.rows[0]["n"].value(), "1");
}

#[test]
fn one_named_graph_per_entry_with_file_counts() {
    let registry = r#"
ontologies:
  a:
    localhost_iri: "http://x/a#"
    production_iri: "https://y/a#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "ontology/a.jsonld"
  b:
    localhost_iri: "http://x/b#"
    production_iri: "https://y/b#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "ontology/b.nt"
"#;
    let context = r#"{"@context": {"rdfs": "http://www.w3.org/2000/01/rdf-schema#", "label": "rdfs:label"}}"#;
    let a = r#"{
      "@context": ["./context.jsonld", {"@base": "http://x/a#"}],
      "@graph": [
        {"@id": "Functor", "label": "functor"},
        {"@id": "Monad", "label": ["monad", "triple"]}
      ]
    }"#;
    let b = "<http://x/b#s> <http://x/b#p> \"o\" .\n<http://x/b#s> <http://x/b#q> _:n .\n";
    let repo = write_repo(
        registry,
        &[("ontology/context.jsonld", context), ("ontology/a.jsonld", a), ("ontology/b.nt", b)],
    );
    let store = load(repo.path()).expect("store");

    let stats = store.statistics();
    assert_eq!(stats.graph_count, 2);
    assert_eq!(stats.graphs["http://x/a#"], 3);
    assert_eq!(stats.graphs["http://x/b#"], 2);
    assert_eq!(stats.default_graph_count, 0);
    assert_eq!(stats.triple_count, 5);
    assert_eq!(store.union_graph().len(), 5);
}

#[test]
fn missing_field_fails_before_any_store_exists() {
    let registry = r#"
ontologies:
  a:
    localhost_iri: "http://x/a#"
    production_iri: "https://y/a#"
    file: "a.jsonld"
"#;
    let repo = write_repo(registry, &[("a.jsonld", CLASS_DOC)]);
    let err = load(repo.path()).unwrap_err();
    assert!(matches!(err, CattyError::Config(_)), "{err}");
}

#[test]
fn missing_registry_file_is_config_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = Registry::load(&dir.path().join(".catty/iri-config.yaml")).unwrap_err();
    assert!(matches!(err, CattyError::Config(_)));
}

#[test]
fn missing_graph_file_aborts_initialization() {
    let registry = r#"
ontologies:
  a:
    localhost_iri: "http://x/a#"
    production_iri: "https://y/a#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "a.jsonld"
  b:
    localhost_iri: "http://x/b#"
    production_iri: "https://y/b#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "b.jsonld"
"#;
    let repo = write_repo(registry, &[("a.jsonld", CLASS_DOC)]);
    let err = load(repo.path()).unwrap_err();
    assert!(matches!(err, CattyError::Load(_)), "{err}");
}

#[test]
fn unparseable_graph_file_is_load_error() {
    let repo = write_repo(SINGLE_ENTRY, &[("a.jsonld", "{ not json")]);
    assert!(matches!(load(repo.path()), Err(CattyError::Load(_))));
}

const LABEL_CONTEXT: &str =
    r#"{"@context": {"rdfs": "http://www.w3.org/2000/01/rdf-schema#", "label": "rdfs:label"}}"#;

fn shared_context_doc(context_url: &str) -> String {
    format!(
        r#"{{"@context": ["{context_url}", {{"@base": "http://x/a#"}}], "@id": "Cat", "label": "Cat"}}"#
    )
}

#[test]
fn shared_context_urls_resolve_to_the_local_file() {
    for url in [
        "http://localhost:8080/ontology/context.jsonld",
        "https://metavacua.github.io/CategoricalReasoner/ontology/context.jsonld",
    ] {
        let doc = shared_context_doc(url);
        let repo = write_repo(
            SINGLE_ENTRY,
            &[("context.jsonld", LABEL_CONTEXT), ("a.jsonld", doc.as_str())],
        );
        let store = load(repo.path()).expect("store");
        let triples = store.graph(&GraphName::named("http://x/a#")).expect("graph");
        assert_eq!(triples.len(), 1, "{url}");
        assert_eq!(triples[0].subject.value(), "http://x/a#Cat");
        assert_eq!(
            triples[0].predicate.value(),
            "http://www.w3.org/2000/01/rdf-schema#label"
        );
    }
}

#[test]
fn registry_context_url_resolves_to_the_local_file() {
    let registry = r#"
ontologies:
  a:
    localhost_iri: "http://x/a#"
    production_iri: "https://y/a#"
    context_url: "http://mirror.internal/shared/context.jsonld"
    file: "ontology/a.jsonld"
"#;
    let doc = shared_context_doc("http://mirror.internal/shared/context.jsonld");
    let repo = write_repo(
        registry,
        &[("ontology/context.jsonld", LABEL_CONTEXT), ("ontology/a.jsonld", doc.as_str())],
    );
    let store = load(repo.path()).expect("store");
    assert_eq!(store.statistics().graphs["http://x/a#"], 1);
}

#[test]
fn unknown_absolute_context_is_load_error() {
    let doc = shared_context_doc("https://elsewhere.example/ctx.jsonld");
    let repo = write_repo(
        SINGLE_ENTRY,
        &[("context.jsonld", LABEL_CONTEXT), ("a.jsonld", doc.as_str())],
    );
    match load(repo.path()) {
        Err(CattyError::Load(message)) => assert!(message.contains("elsewhere.example"), "{message}"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("store should not load"),
    }
}

#[test]
fn shared_context_without_local_copy_is_load_error() {
    let doc = shared_context_doc("http://localhost:8080/ontology/context.jsonld");
    let repo = write_repo(SINGLE_ENTRY, &[("a.jsonld", doc.as_str())]);
    assert!(matches!(load(repo.path()), Err(CattyError::Load(_))));
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

#[test]
fn readers_keep_their_snapshot_across_a_commit() {
    let repo = write_repo(SINGLE_ENTRY, &[("a.jsonld", CLASS_DOC)]);
    let store = Arc::new(load(repo.path()).expect("store"));
    let service = QueryService::new(Arc::clone(&store));

    let before = store.read();
    service
        .execute_update("INSERT DATA { GRAPH <http://x/a#> { <http://x/a#F> a <http://www.w3.org/2002/07/owl#Class> } }")
        .expect("update");

    assert_eq!(before.graph_len(&GraphName::named("http://x/a#")), Some(1));
    assert_eq!(store.read().graph_len(&GraphName::named("http://x/a#")), Some(2));
}

#[test]
fn checksum_is_stable_across_loads() {
    let repo = write_repo(SINGLE_ENTRY, &[("a.jsonld", CLASS_DOC)]);
    let first = load(repo.path()).expect("store").checksum();
    let second = load(repo.path()).expect("store").checksum();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}
