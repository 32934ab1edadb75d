//! Integration tests for federated SELECT calls.
//!
//! Each test starts a local axum server that plays a remote endpoint, so
//! nothing here leaves the loopback interface.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use catty::federation::executor::DEFAULT_USER_AGENT;
use catty::federation::{EndpointDiscovery, EndpointRateLimiter, FederationExecutor};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const RESULTS_JSON: &str = "application/sparql-results+json";

// =============================================================================
// MOCK ENDPOINT
// =============================================================================

/// Headers seen by the mock, in arrival order.
#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl Seen {
    fn record(&self, path: &str, headers: &HeaderMap) {
        let agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.requests.lock().unwrap().push((path.to_string(), agent));
    }

    fn count(&self, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|(p, _)| p == path).count()
    }
}

fn results(body: &'static str) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, RESULTS_JSON)], body)
}

async fn rows(State(seen): State<Seen>, headers: HeaderMap) -> impl IntoResponse {
    seen.record("/rows", &headers);
    results(
        r#"{"head": {"vars": ["x"]}, "results": {"bindings": [
            {"x": {"type": "uri", "value": "http://x/a#One"}},
            {"x": {"type": "literal", "value": "two"}}
        ]}}"#,
    )
}

async fn other(State(seen): State<Seen>, headers: HeaderMap) -> impl IntoResponse {
    seen.record("/other", &headers);
    results(r#"{"head": {"vars": ["y"]}, "results": {"bindings": []}}"#)
}

async fn slow(State(seen): State<Seen>, headers: HeaderMap) -> impl IntoResponse {
    seen.record("/slow", &headers);
    tokio::time::sleep(Duration::from_secs(5)).await;
    results(r#"{"head": {"vars": []}, "results": {"bindings": []}}"#)
}

async fn busy() -> impl IntoResponse {
    (StatusCode::TOO_MANY_REQUESTS, "slow down")
}

async fn gateway() -> impl IntoResponse {
    (StatusCode::GATEWAY_TIMEOUT, "upstream timeout")
}

async fn garbage() -> impl IntoResponse {
    results("this is not a results document")
}

async fn index() -> impl IntoResponse {
    results(
        r#"{"head": {"vars": ["representative", "endpoint"]}, "results": {"bindings": [
            {"endpoint": {"type": "uri", "value": "https://sparql.uniprot.org/sparql"}},
            {"endpoint": {"type": "uri", "value": "http://wikiba.se/ontology#Dump"}},
            {"endpoint": {"type": "uri", "value": "https://example.org/sparql"}},
            {"endpoint": {"type": "literal", "value": "ftp://files.example.edu/"}},
            {"endpoint": {"type": "uri", "value": "https://query.wikidata.org/sparql"}},
            {"endpoint": {"type": "uri", "value": "https://sparql.uniprot.org/sparql"}}
        ]}}"#,
    )
}

/// Start the mock endpoint; returns its base URL.
async fn spawn_endpoint(seen: Seen) -> String {
    let app = Router::new()
        .route("/rows", get(rows))
        .route("/other", get(other))
        .route("/slow", get(slow))
        .route("/busy", get(busy))
        .route("/gateway", get(gateway))
        .route("/garbage", get(garbage))
        .route("/index", get(index))
        .with_state(seen);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn executor(min_delay: Duration) -> Arc<FederationExecutor> {
    Arc::new(FederationExecutor::new(EndpointRateLimiter::new(min_delay)))
}

const QUERY: &str = "SELECT ?x WHERE { ?x ?p ?o } LIMIT 2";

// =============================================================================
// SINGLE CALLS
// =============================================================================

#[tokio::test]
async fn successful_select_reports_rows_as_strings() {
    let seen = Seen::default();
    let base = spawn_endpoint(seen.clone()).await;
    let exec = executor(Duration::ZERO);

    let outcome = exec
        .execute_select(&format!("{base}/rows"), QUERY, Duration::from_secs(5))
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.query, QUERY);
    assert_eq!(outcome.variables, vec!["x".to_string()]);
    let values: Vec<&str> = outcome.rows.iter().map(|r| r["x"].as_str()).collect();
    assert_eq!(values, vec!["http://x/a#One", "two"]);

    let requests = seen.requests.lock().unwrap();
    assert_eq!(requests[0].1, DEFAULT_USER_AGENT);
}

#[tokio::test]
async fn slow_endpoint_is_classified_as_timeout() {
    let seen = Seen::default();
    let base = spawn_endpoint(seen.clone()).await;
    let exec = executor(Duration::ZERO);

    let started = Instant::now();
    let outcome = exec
        .execute_select(&format!("{base}/slow"), QUERY, Duration::from_millis(300))
        .await;

    assert!(outcome.timed_out);
    assert!(outcome.error.is_some());
    assert!(outcome.rows.is_empty());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn http_429_is_an_error_not_a_timeout() {
    let base = spawn_endpoint(Seen::default()).await;
    let exec = executor(Duration::ZERO);

    let outcome = exec
        .execute_select(&format!("{base}/busy"), QUERY, Duration::from_secs(5))
        .await;

    assert!(!outcome.timed_out);
    assert!(outcome.error.as_deref().unwrap().contains("429"));
    assert!(outcome.rows.is_empty());
}

#[tokio::test]
async fn gateway_timeout_status_counts_as_timeout() {
    let base = spawn_endpoint(Seen::default()).await;
    let exec = executor(Duration::ZERO);

    let outcome = exec
        .execute_select(&format!("{base}/gateway"), QUERY, Duration::from_secs(5))
        .await;

    assert!(outcome.timed_out);
    assert!(outcome.rows.is_empty());
}

#[tokio::test]
async fn unparseable_body_is_an_error() {
    let base = spawn_endpoint(Seen::default()).await;
    let exec = executor(Duration::ZERO);

    let outcome = exec
        .execute_select(&format!("{base}/garbage"), QUERY, Duration::from_secs(5))
        .await;

    assert!(!outcome.timed_out);
    assert!(outcome.error.is_some());
}

// =============================================================================
// RATE LIMITING
// =============================================================================

#[tokio::test]
async fn calls_to_one_endpoint_are_spaced() {
    let seen = Seen::default();
    let base = spawn_endpoint(seen.clone()).await;
    let min_delay = Duration::from_millis(400);
    let exec = executor(min_delay);
    let endpoint = format!("{base}/rows");

    let started = Instant::now();
    let first = exec.execute_select(&endpoint, QUERY, Duration::from_secs(5)).await;
    let second = exec.execute_select(&endpoint, QUERY, Duration::from_secs(5)).await;

    assert!(first.is_success() && second.is_success());
    assert!(started.elapsed() >= min_delay);
    assert_eq!(seen.count("/rows"), 2);
    // The wait happens before the clock starts.
    assert!(second.elapsed_ms < min_delay.as_millis() as u64);
}

#[tokio::test]
async fn distinct_endpoints_do_not_wait_on_each_other() {
    let seen = Seen::default();
    let base = spawn_endpoint(seen.clone()).await;
    let exec = executor(Duration::from_secs(3));

    let started = Instant::now();
    let outcomes = exec
        .run(
            &[format!("{base}/rows"), format!("{base}/other")],
            QUERY,
            Duration::from_secs(5),
        )
        .await;

    assert!(outcomes.iter().all(|o| o.is_success()));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(exec.limiter().tracked_endpoints(), 2);
}

// =============================================================================
// FAN-OUT
// =============================================================================

#[tokio::test]
async fn run_returns_outcomes_in_input_order() {
    let base = spawn_endpoint(Seen::default()).await;
    let exec = executor(Duration::ZERO);
    let endpoints = vec![
        format!("{base}/busy"),
        format!("{base}/rows"),
        format!("{base}/slow"),
        "not a url".to_string(),
    ];

    let outcomes = exec.run(&endpoints, QUERY, Duration::from_millis(300)).await;

    let order: Vec<&str> = outcomes.iter().map(|o| o.endpoint.as_str()).collect();
    assert_eq!(order, endpoints.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(outcomes[0].error.is_some());
    assert!(outcomes[1].is_success());
    assert!(outcomes[2].timed_out);
    assert!(outcomes[3].error.is_some() && !outcomes[3].timed_out);
}

// =============================================================================
// DISCOVERY
// =============================================================================

#[tokio::test]
async fn discovery_filters_and_deduplicates() {
    let base = spawn_endpoint(Seen::default()).await;
    let exec = executor(Duration::ZERO);

    let found = EndpointDiscovery::new(format!("{base}/index"))
        .discover(&exec)
        .await;

    let found: Vec<&str> = found.iter().map(String::as_str).collect();
    assert_eq!(
        found,
        vec!["https://query.wikidata.org/sparql", "https://sparql.uniprot.org/sparql"]
    );
}

#[tokio::test]
async fn unreachable_index_discovers_nothing() {
    let exec = executor(Duration::ZERO);

    let found = EndpointDiscovery::new("http://127.0.0.1:1/sparql")
        .with_timeout(Duration::from_secs(2))
        .discover(&exec)
        .await;

    assert!(found.is_empty());
}
