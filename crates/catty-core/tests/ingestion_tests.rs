//! # Ingestion Gate Tests
//!
//! Untrusted documents reach the store only through `Ingestor::admit` and
//! `GraphStore::merge`; a rejected document leaves no trace.

#![allow(clippy::unwrap_used, clippy::panic)]

use catty_core::iri::validate;
use catty_core::{CattyError, GraphName, GraphStore, Ingestor, OntologyEntry, Registry};

fn registry() -> Registry {
    Registry::from_entries(vec![
        OntologyEntry::new(
            "a",
            "http://x/a#",
            "https://y/a#",
            "http://localhost:8080/ontology/context.jsonld",
            "a.jsonld",
        ),
        OntologyEntry::new(
            "b",
            "http://x/b#",
            "https://y/b#",
            "http://localhost:8080/ontology/context.jsonld",
            "b.jsonld",
        ),
    ])
    .expect("registry")
}

fn store(registry: &Registry) -> GraphStore {
    let store = GraphStore::new();
    store
        .write(|ds| {
            for entry in registry.entries() {
                ds.create_pinned_graph(&entry.dev_iri);
            }
            Ok(())
        })
        .expect("graphs");
    store
}

// =============================================================================
// VALIDATOR
// =============================================================================

#[test]
fn relative_ids_under_registered_base_are_accepted() {
    let doc = r#"{
      "@context": {"@base": "http://x/b#"},
      "@graph": [{"@id": "Limit"}, {"@id": "Colimit", "@type": "owl:Class"}]
    }"#;
    let report = validate(doc, &registry());
    assert!(report.ok, "{:?}", report.errors);
    assert!(report.errors.is_empty());
}

#[test]
fn unregistered_base_is_rejected() {
    let report = validate(r#"{"@context": {"@base": "http://x/"}, "@id": "Limit"}"#, &registry());
    assert!(!report.ok);
    assert_eq!(report.base_iri.as_deref(), Some("http://x/"));
}

#[test]
fn foreign_identifier_is_rejected() {
    let doc = r#"{
      "@context": {"@base": "http://x/a#"},
      "@id": "Limit",
      "seeAlso": {"@id": "https://attacker.example/payload"}
    }"#;
    let report = validate(doc, &registry());
    assert!(!report.ok);
    assert_eq!(
        report.errors,
        vec!["Unauthorized @id IRI: https://attacker.example/payload".to_string()]
    );
}

// =============================================================================
// ADMIT AND MERGE
// =============================================================================

#[test]
fn admitted_document_merges_into_entry_graph() {
    let reg = registry();
    let store = store(&reg);
    let doc = r#"{
      "@context": {"@base": "https://y/b#", "rdfs": "http://www.w3.org/2000/01/rdf-schema#"},
      "@id": "Limit",
      "rdfs:label": "limit",
      "rdfs:seeAlso": {"rdfs:label": "anonymous"}
    }"#;
    let admitted = Ingestor::new(&reg)
        .admit(doc, Some("application/ld+json"))
        .expect("admit");
    assert_eq!(admitted.target_graph(), "http://x/b#");
    assert_eq!(admitted.base(), "https://y/b#");

    assert_eq!(store.merge(admitted.clone()).expect("merge"), 3);
    assert_eq!(store.read().graph_len(&GraphName::named("http://x/b#")), Some(3));
    assert_eq!(store.read().graph_len(&GraphName::named("http://x/a#")), Some(0));

    // Blank nodes are rescoped per merge, so a second merge adds the
    // anonymous node again but not the named triple.
    assert_eq!(store.merge(admitted).expect("merge"), 2);
}

#[test]
fn rejected_document_leaves_store_untouched() {
    let reg = registry();
    let store = store(&reg);
    let before = store.checksum();
    let doc = r#"{"@context": {"@base": "http://x/a#"}, "@graph": [{"@id": "Ok"}, {"@id": "evil:Thing"}]}"#;

    let err = Ingestor::new(&reg).admit(doc, None).unwrap_err();
    let CattyError::Rejected(report) = err else {
        panic!("expected a rejection");
    };
    assert_eq!(
        report.errors,
        vec!["Unauthorized compact IRI prefix in @id: evil:Thing".to_string()]
    );
    assert_eq!(store.checksum(), before);
}

#[test]
fn non_jsonld_content_is_refused_before_parsing() {
    let reg = registry();
    let err = Ingestor::new(&reg)
        .admit("not even json", Some("text/turtle"))
        .unwrap_err();
    let CattyError::Rejected(report) = err else {
        panic!("expected a rejection");
    };
    assert!(report.errors[0].contains("only JSON-LD"));
}

#[test]
fn malformed_json_is_rejected() {
    let reg = registry();
    let err = Ingestor::new(&reg).admit("{", None).unwrap_err();
    assert!(matches!(err, CattyError::Rejected(_)));
}
