//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        EndpointsResponse, ErrorResponse, FederatedSelectRequest, FederationRunRequest,
        FederationRunResponse, GraphParams, HashResponse, HealthResponse, LoadResponse,
        OntologiesResponse, OntologyJson, QueryRequest, RebindRequest, RebindResponse,
        StatusResponse, UpdateRequest, UpdateResponse,
    },
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use catty_core::{
    CattyError, GraphName, Ingestor, IriRebinder, QueryResult, RdfFormat, ResultFormat,
    iri::validate, results::serialize, store::CHECKSUM_ALGORITHM,
};
use std::time::Duration;

/// Error response for a core error.
fn error_response(err: &CattyError) -> Response {
    let (status, body) = ErrorResponse::from_error(err);
    (status, Json(body)).into_response()
}

/// Body with an explicit content type.
fn text_response(content_type: &'static str, body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

// =============================================================================
// HEALTH / STATUS / HASH
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store statistics.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatusResponse::new(state.registry.len(), state.store.statistics());
    (StatusCode::OK, Json(response))
}

/// Deterministic checksum of the whole dataset.
pub async fn hash_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = HashResponse {
        algorithm: CHECKSUM_ALGORITHM.to_string(),
        checksum: state.store.checksum(),
    };
    (StatusCode::OK, Json(response))
}

/// Registry listing.
pub async fn ontologies_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ontologies = state.registry.entries().iter().map(OntologyJson::from).collect();
    (StatusCode::OK, Json(OntologiesResponse { ontologies }))
}

// =============================================================================
// GRAPH EXPORT
// =============================================================================

/// Serialize the union graph, or one named graph.
pub async fn graph_handler(
    State(state): State<AppState>,
    Query(params): Query<GraphParams>,
) -> Response {
    let format = RdfFormat::from_token(params.format.as_deref().unwrap_or_default());
    let triples = match &params.graph {
        Some(name) => match state.store.graph(&GraphName::named(name.clone())) {
            Some(triples) => triples,
            None => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new(format!("Unknown graph <{}>", name))),
                )
                    .into_response();
            }
        },
        None => state.store.union_graph(),
    };
    match format.serialize(&triples) {
        Ok(body) => text_response(format.content_type(), body),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// QUERY / UPDATE
// =============================================================================

/// Execute a query. Bindings use a SPARQL result format, graphs an RDF format.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Response {
    let result = match state.queries.execute_query(&request.query, &request.params) {
        Ok(result) => result,
        Err(e) => return error_response(&e),
    };
    let token = request.format.as_deref().unwrap_or_default();
    match &result {
        QueryResult::Bindings(_) => {
            let format = if token.is_empty() {
                ResultFormat::Json
            } else {
                match ResultFormat::from_token(token) {
                    Some(format) => format,
                    None => {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(ErrorResponse::new(format!("Unknown result format '{}'", token))),
                        )
                            .into_response();
                    }
                }
            };
            match serialize(&result, format) {
                Ok(body) => text_response(format.content_type(), body),
                Err(e) => error_response(&e),
            }
        }
        QueryResult::Graph(triples) => {
            let format = RdfFormat::from_token(token);
            match format.serialize(triples) {
                Ok(body) => text_response(format.content_type(), body),
                Err(e) => error_response(&e),
            }
        }
    }
}

/// Apply an update in one write transaction.
pub async fn update_handler(
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    match state.queries.execute_update(&request.update) {
        Ok(summary) => (StatusCode::OK, Json(UpdateResponse::from(summary))).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// INGESTION
// =============================================================================

/// Safety report for a JSON-LD body. Never touches the store.
pub async fn validate_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let report = validate(&body, &state.registry);
    (StatusCode::OK, Json(report))
}

/// Admit a JSON-LD body and merge it into its ontology's graph.
pub async fn load_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let content_kind = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let mut ingestor = Ingestor::new(&state.registry);
    if let Some(root) = &state.repo_root {
        ingestor = ingestor.with_repo_root(root.clone());
    }
    let admitted = match ingestor.admit(&body, content_kind) {
        Ok(admitted) => admitted,
        Err(e) => return error_response(&e),
    };
    let graph = admitted.target_graph().to_string();
    let base = admitted.base().to_string();
    match state.store.merge(admitted) {
        Ok(added) => (
            StatusCode::OK,
            Json(LoadResponse {
                ok: true,
                graph,
                base,
                added,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Rewrite identifiers between environments.
pub async fn rebind_handler(
    State(state): State<AppState>,
    Json(request): Json<RebindRequest>,
) -> Response {
    match IriRebinder::new(&state.registry, request.target) {
        Ok(rebinder) => (
            StatusCode::OK,
            Json(RebindResponse {
                target: request.target,
                content: rebinder.rebind(&request.content),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// FEDERATION
// =============================================================================

fn federation_timeout(state: &AppState, requested: Option<u64>) -> Duration {
    requested
        .map(|secs| Duration::from_secs(secs.clamp(1, 300)))
        .unwrap_or(state.federation_timeout)
}

/// One remote SELECT. Failures are reported inside the outcome.
pub async fn federated_select_handler(
    State(state): State<AppState>,
    Json(request): Json<FederatedSelectRequest>,
) -> impl IntoResponse {
    let timeout = federation_timeout(&state, request.timeout_secs);
    let outcome = state
        .federation
        .execute_select(&request.endpoint, &request.query, timeout)
        .await;
    (StatusCode::OK, Json(outcome))
}

/// Fan a SELECT out to many endpoints.
pub async fn federation_run_handler(
    State(state): State<AppState>,
    Json(request): Json<FederationRunRequest>,
) -> impl IntoResponse {
    let timeout = federation_timeout(&state, request.timeout_secs);
    let endpoints = match request.endpoints {
        Some(endpoints) => endpoints,
        None => state
            .discovery
            .discover(&state.federation)
            .await
            .into_iter()
            .collect(),
    };
    let outcomes = state.federation.run(&endpoints, &request.query, timeout).await;
    (StatusCode::OK, Json(FederationRunResponse::new(outcomes)))
}

/// Discover candidate endpoints.
pub async fn endpoints_handler(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.discovery.discover(&state.federation).await;
    (
        StatusCode::OK,
        Json(EndpointsResponse {
            bootstrap_endpoint: state.discovery.bootstrap_endpoint().to_string(),
            endpoints: endpoints.into_iter().collect(),
        }),
    )
}
