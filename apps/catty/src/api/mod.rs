//! # Catty HTTP API Module
//!
//! REST API over the registry, the graph store and the federation layer.
//!
//! ## Endpoints
//!
//! | verb | path | handler |
//! |---|---|---|
//! | GET | `/health` | liveness |
//! | GET | `/api/ontologies` | registry listing |
//! | GET | `/api/status` | store statistics |
//! | GET | `/api/hash` | dataset checksum |
//! | GET | `/api/graph?format=&graph=` | graph serialization |
//! | POST | `/api/query` | `{query, format?, params?}` |
//! | POST | `/api/update` | `{update}` |
//! | POST | `/api/validate` | safety report for a JSON-LD body |
//! | POST | `/api/load` | admit and merge a JSON-LD body |
//! | POST | `/api/rebind` | `{target, content}` |
//! | POST | `/api/federation/select` | `{endpoint, query, timeout_secs?}` |
//! | POST | `/api/federation/run` | `{endpoints?, query, timeout_secs?}` |
//! | GET | `/api/federation/endpoints` | endpoint discovery |
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `CATTY_CORS_ORIGINS`: comma-separated origins, or `*` (default: localhost only)
//! - `CATTY_RATE_LIMIT`: requests per second (default: 100, 0 to disable)
//! - `CATTY_API_KEY`: if set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env, keys_match};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    EndpointsResponse, ErrorResponse, FederatedSelectRequest, FederationRunRequest,
    FederationRunResponse, HashResponse, HealthResponse, LoadResponse, OntologiesResponse,
    OntologyJson, QueryRequest, RebindRequest, RebindResponse, StatusResponse, UpdateRequest,
    UpdateResponse,
};

use crate::federation::{EndpointDiscovery, FederationExecutor};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use catty_core::{CattyError, GraphStore, QueryService, Registry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable listing allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "CATTY_CORS_ORIGINS";

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
///
/// The store does its own transaction management, so handlers share it
/// without an outer lock.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub store: Arc<GraphStore>,
    pub queries: QueryService,
    pub federation: Arc<FederationExecutor>,
    pub discovery: EndpointDiscovery,
    pub federation_timeout: Duration,
    /// Used to resolve relative contexts of ingested documents.
    pub repo_root: Option<PathBuf>,
}

impl AppState {
    /// State over a loaded registry and store with default federation settings.
    #[must_use]
    pub fn new(registry: Registry, store: GraphStore) -> Self {
        let store = Arc::new(store);
        Self {
            registry: Arc::new(registry),
            queries: QueryService::new(Arc::clone(&store)),
            store,
            federation: Arc::new(FederationExecutor::default()),
            discovery: EndpointDiscovery::default(),
            federation_timeout: crate::federation::DEFAULT_TIMEOUT,
            repo_root: None,
        }
    }

    #[must_use]
    pub fn with_federation(
        mut self,
        executor: FederationExecutor,
        discovery: EndpointDiscovery,
        timeout: Duration,
    ) -> Self {
        self.federation = Arc::new(executor);
        self.discovery = discovery;
        self.federation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = Some(root.into());
        self
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// CORS from `CATTY_CORS_ORIGINS`: `*` is permissive, a list is parsed,
/// anything else falls back to localhost only.
fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var(CORS_ORIGINS_ENV).ok();
    match configured.as_deref().map(str::trim) {
        Some("*") => {
            tracing::warn!("CORS: allowing ALL origins ({}=*)", CORS_ORIGINS_ENV);
            CorsLayer::permissive()
        }
        Some(list) if !list.is_empty() => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!("CORS: invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();
            if origins.is_empty() {
                tracing::warn!("CORS: no valid origins configured, using localhost only");
                build_localhost_cors()
            } else {
                tracing::info!(origins = origins.len(), "CORS: allowing configured origins");
                cors_for(origins)
            }
        }
        _ => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    cors_for(origins)
}

fn cors_for(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with the route table and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (if enabled), authentication (if configured).
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED; set {} to require a bearer token",
            API_KEY_ENV
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/ontologies", get(handlers::ontologies_handler))
        .route("/api/status", get(handlers::status_handler))
        .route("/api/hash", get(handlers::hash_handler))
        .route("/api/graph", get(handlers::graph_handler))
        .route("/api/query", post(handlers::query_handler))
        .route("/api/update", post(handlers::update_handler))
        .route("/api/validate", post(handlers::validate_handler))
        .route("/api/load", post(handlers::load_handler))
        .route("/api/rebind", post(handlers::rebind_handler))
        .route("/api/federation/select", post(handlers::federated_select_handler))
        .route("/api/federation/run", post(handlers::federation_run_handler))
        .route("/api/federation/endpoints", get(handlers::endpoints_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Bind and serve until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), CattyError> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CattyError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Catty HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CattyError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
