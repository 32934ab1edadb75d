//! # Federation Module
//!
//! Independent SELECT calls against remote endpoints.
//!
//! - `limiter`: per-endpoint minimum spacing
//! - `executor`: one call → one `FederatedQueryOutcome`, plus fan-out runs
//! - `discovery`: endpoint bootstrap from a public index

pub mod discovery;
pub mod executor;
pub mod limiter;

pub use discovery::{EndpointDiscovery, WIKIDATA_ENDPOINT, filter_endpoints, is_endpoint_candidate};
pub use executor::{DEFAULT_TIMEOUT, FederatedQueryOutcome, FederationExecutor};
pub use limiter::EndpointRateLimiter;
