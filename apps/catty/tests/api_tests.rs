//! Integration tests for the Catty HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow holding MutexGuard across await in auth tests - tests are serialized
// to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use catty::api::{
    AppState, ErrorResponse, HashResponse, HealthResponse, LoadResponse, OntologiesResponse,
    RebindResponse, StatusResponse, UpdateResponse, create_router,
};
use catty_core::{GraphName, GraphStore, OntologyEntry, Registry, Term, Triple};
use serde_json::{Value, json};
use std::sync::Mutex;

/// Mutex to serialize tests since the router reads env vars.
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

const A: &str = "http://x/a#";
const B: &str = "http://x/b#";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Holds the mutex and clears the API key on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("CATTY_API_KEY") };
    }
}

fn registry() -> Registry {
    Registry::from_entries(vec![
        OntologyEntry::new(
            "a",
            A,
            "https://y/a#",
            "http://localhost:8080/ontology/context.jsonld",
            "a.jsonld",
        ),
        OntologyEntry::new(
            "b",
            B,
            "https://y/b#",
            "http://localhost:8080/ontology/context.jsonld",
            "b.jsonld",
        ),
    ])
    .unwrap()
}

/// Two pinned graphs; `a` holds two labelled classes.
fn store(registry: &Registry) -> GraphStore {
    let store = GraphStore::new();
    store
        .write(|ds| {
            for entry in registry.entries() {
                ds.create_pinned_graph(&entry.dev_iri);
            }
            let graph = GraphName::named(A);
            let label = Term::iri("http://www.w3.org/2000/01/rdf-schema#label");
            for (local, text) in [("Monad", "monad"), ("Functor", "functor")] {
                ds.insert(
                    &graph,
                    &Triple::new(Term::iri(format!("{A}{local}")), label.clone(), Term::literal(text)),
                )?;
            }
            Ok(())
        })
        .unwrap();
    store
}

fn build_server(api_key: Option<&str>) -> (TestServer, TestGuard) {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe {
        match api_key {
            Some(key) => std::env::set_var("CATTY_API_KEY", key),
            None => std::env::remove_var("CATTY_API_KEY"),
        }
    }
    let registry = registry();
    let store = store(&registry);
    let router = create_router(AppState::new(registry, store));
    (TestServer::new(router).unwrap(), TestGuard { _guard: guard })
}

fn create_test_server() -> (TestServer, TestGuard) {
    build_server(None)
}

// =============================================================================
// HEALTH / STATUS / REGISTRY
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_counts_pinned_graphs() {
    let (server, _guard) = create_test_server();

    let response = server.get("/api/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.ontologies, 2);
    assert_eq!(status.triple_count, 2);
    assert_eq!(status.graph_count, 2);
    assert_eq!(status.graphs.get(A), Some(&2));
    assert_eq!(status.graphs.get(B), Some(&0));
}

#[tokio::test]
async fn test_ontologies_listing() {
    let (server, _guard) = create_test_server();

    let response = server.get("/api/ontologies").await;

    response.assert_status_ok();
    let listing: OntologiesResponse = response.json();
    let keys: Vec<&str> = listing.ontologies.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(listing.ontologies[1].production_iri, "https://y/b#");
}

#[tokio::test]
async fn test_graph_export_and_unknown_graph() {
    let (server, _guard) = create_test_server();

    let response = server.get("/api/graph").add_query_param("format", "ntriples").await;
    response.assert_status_ok();
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("application/n-triples")
    );
    assert_eq!(response.text().lines().count(), 2);

    let response = server.get("/api/graph").add_query_param("graph", "http://nope/").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

// =============================================================================
// QUERY ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_query_json_results() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/query")
        .json(&json!({
            "query": "SELECT ?l WHERE { ?s <http://www.w3.org/2000/01/rdf-schema#label> ?l } ORDER BY ?l"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["head"]["vars"], json!(["l"]));
    let labels: Vec<&str> = body["results"]["bindings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["l"]["value"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["functor", "monad"]);
}

#[tokio::test]
async fn test_query_csv_with_parameter() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/query")
        .json(&json!({
            "query": "SELECT ?s WHERE { ?s <http://www.w3.org/2000/01/rdf-schema#label> ?l }",
            "format": "csv",
            "params": { "l": "monad" }
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "s\r\nhttp://x/a#Monad\r\n");
}

#[tokio::test]
async fn test_query_ask_is_single_boolean_row() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/query")
        .json(&json!({ "query": "ASK { ?s ?p \"monad\" }" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let rows = body["results"]["bindings"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["boolean"]["value"], "true");
}

#[tokio::test]
async fn test_query_syntax_error_is_bad_request() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/query")
        .json(&json!({ "query": "SELECT ?s WHERE { ?s ?p" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert!(!error.ok);
}

#[tokio::test]
async fn test_query_unknown_format_is_bad_request() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/query")
        .json(&json!({ "query": "SELECT * WHERE { ?s ?p ?o }", "format": "yaml" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_construct_returns_rdf() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/query")
        .json(&json!({
            "query": "CONSTRUCT { ?s ?p ?o } WHERE { GRAPH <http://x/a#> { ?s ?p ?o } }",
            "format": "nt"
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("application/n-triples")
    );
    assert!(response.text().contains("<http://x/a#Monad>"));
}

// =============================================================================
// UPDATE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_update_inserts_data() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/update")
        .json(&json!({
            "update": "INSERT DATA { GRAPH <http://x/b#> { <http://x/b#Limit> <http://x/b#p> \"limit\" } }"
        }))
        .await;

    response.assert_status_ok();
    let summary: UpdateResponse = response.json();
    assert!(summary.ok);
    assert_eq!(summary.inserted, 1);

    let status: StatusResponse = server.get("/api/status").await.json();
    assert_eq!(status.graphs.get(B), Some(&1));
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let (server, _guard) = create_test_server();
    let before: HashResponse = server.get("/api/hash").await.json();

    let response = server
        .post("/api/update")
        .json(&json!({
            "update": "INSERT DATA { <http://x/a#Z> <http://x/a#p> \"z\" } ; CLEAR GRAPH <http://nowhere/>"
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let after: HashResponse = server.get("/api/hash").await.json();
    assert_eq!(before.checksum, after.checksum);
}

// =============================================================================
// INGESTION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_validate_reports_foreign_identifier() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/validate")
        .text(r#"{"@context": {"@base": "http://x/a#"}, "@id": "https://attacker.example/x"}"#)
        .await;

    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["ok"], false);
    assert_eq!(report["base_iri"], "http://x/a#");
}

#[tokio::test]
async fn test_load_merges_admitted_document() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/load")
        .bytes(bytes::Bytes::from(
            r#"{"@context": {"@base": "https://y/b#", "rdfs": "http://www.w3.org/2000/01/rdf-schema#"}, "@id": "Limit", "rdfs:label": "limit"}"#,
        ))
        .content_type("application/ld+json")
        .await;

    response.assert_status_ok();
    let loaded: LoadResponse = response.json();
    assert_eq!(loaded.graph, B);
    assert_eq!(loaded.added, 1);

    let status: StatusResponse = server.get("/api/status").await.json();
    assert_eq!(status.graphs.get(B), Some(&1));
}

#[tokio::test]
async fn test_load_rejection_leaves_store_unchanged() {
    let (server, _guard) = create_test_server();
    let before: HashResponse = server.get("/api/hash").await.json();

    let response = server
        .post("/api/load")
        .bytes(bytes::Bytes::from(
            r#"{"@context": {"@base": "http://x/a#"}, "@graph": [{"@id": "Ok"}, {"@id": "evil:Thing"}]}"#,
        ))
        .content_type("application/ld+json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(
        error.details,
        vec!["Unauthorized compact IRI prefix in @id: evil:Thing".to_string()]
    );
    let after: HashResponse = server.get("/api/hash").await.json();
    assert_eq!(before.checksum, after.checksum);
}

#[tokio::test]
async fn test_load_refuses_other_content_types() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/load")
        .bytes(bytes::Bytes::from("<http://x/a#s> <http://x/a#p> <http://x/a#o> ."))
        .content_type("text/turtle")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rebind_to_production() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/rebind")
        .json(&json!({ "target": "production", "content": "see <http://x/a#Monad>" }))
        .await;

    response.assert_status_ok();
    let rebound: RebindResponse = response.json();
    assert_eq!(rebound.content, "see <https://y/a#Monad>");
}

#[tokio::test]
async fn test_validate_report_shape_matches_core() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/validate")
        .text(r#"{"@context": {"@base": "http://x/b#"}, "@id": "Limit"}"#)
        .await;

    let report: Value = response.json();
    let expected = catty_core::iri::validate(
        r#"{"@context": {"@base": "http://x/b#"}, "@id": "Limit"}"#,
        &registry(),
    );
    assert_eq!(report, serde_json::to_value(&expected).unwrap());
}

// =============================================================================
// FEDERATION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_federated_select_rejects_non_http_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/api/federation/select")
        .json(&json!({ "endpoint": "ftp://example/sparql", "query": "SELECT * WHERE { ?s ?p ?o }" }))
        .await;

    response.assert_status_ok();
    let outcome: Value = response.json();
    assert_eq!(outcome["timed_out"], false);
    assert!(outcome["error"].is_string());
    assert_eq!(outcome["rows"], json!([]));
}

// =============================================================================
// AUTHENTICATION TESTS
// =============================================================================

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let (server, _guard) = build_server(Some("test-secret-key-12345"));

    let response = server
        .get("/api/status")
        .add_header(
            header::AUTHORIZATION,
            "Bearer test-secret-key-12345".parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_missing_or_wrong_token_rejected() {
    let (server, _guard) = build_server(Some("correct-key"));

    let response = server.get("/api/status").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .get("/api/status")
        .add_header(header::AUTHORIZATION, "Bearer wrong-key".parse::<HeaderValue>().unwrap())
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_health_is_public() {
    let (server, _guard) = build_server(Some("correct-key"));

    let response = server.get("/health").await;

    response.assert_status_ok();
}
