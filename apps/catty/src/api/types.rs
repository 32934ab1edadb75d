//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use crate::federation::FederatedQueryOutcome;
use axum::http::StatusCode;
use catty_core::{
    CattyError, OntologyEntry, RebindTarget, StoreStatistics, UpdateSummary,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    /// Individual violations for a rejected document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: msg.into(),
            details: Vec::new(),
        }
    }

    /// Status code and body for a core error.
    pub fn from_error(err: &CattyError) -> (StatusCode, Self) {
        let status = match err {
            CattyError::QuerySyntax { .. }
            | CattyError::UnsupportedQuery(_)
            | CattyError::UnsupportedOperation(_)
            | CattyError::Rejected(_) => StatusCode::BAD_REQUEST,
            CattyError::Update(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = Self::new(err.to_string());
        if let CattyError::Rejected(report) = err {
            body.details = report.errors.clone();
        }
        (status, body)
    }
}

// =============================================================================
// HEALTH / STATUS / HASH
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ontologies: usize,
    pub triple_count: usize,
    pub graph_count: usize,
    pub default_graph_count: usize,
    pub graphs: BTreeMap<String, usize>,
    pub distinct_subjects: usize,
    pub distinct_predicates: usize,
}

impl StatusResponse {
    pub fn new(ontologies: usize, stats: StoreStatistics) -> Self {
        Self {
            ontologies,
            triple_count: stats.triple_count,
            graph_count: stats.graph_count,
            default_graph_count: stats.default_graph_count,
            graphs: stats.graphs,
            distinct_subjects: stats.distinct_subjects,
            distinct_predicates: stats.distinct_predicates,
        }
    }
}

/// Dataset checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResponse {
    pub algorithm: String,
    pub checksum: String,
}

// =============================================================================
// ONTOLOGIES
// =============================================================================

/// One registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyJson {
    pub key: String,
    pub localhost_iri: String,
    pub production_iri: String,
    pub context_url: String,
    pub file: String,
}

impl From<&OntologyEntry> for OntologyJson {
    fn from(entry: &OntologyEntry) -> Self {
        Self {
            key: entry.key.clone(),
            localhost_iri: entry.dev_iri.clone(),
            production_iri: entry.prod_iri.clone(),
            context_url: entry.context_url.clone(),
            file: entry.file.to_string_lossy().into_owned(),
        }
    }
}

/// Registry listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologiesResponse {
    pub ontologies: Vec<OntologyJson>,
}

// =============================================================================
// QUERY / UPDATE
// =============================================================================

/// Query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Result format token (json, xml, csv, tsv) or graph format token
    /// (turtle, ntriples, jsonld) for CONSTRUCT/DESCRIBE.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Update request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub update: String,
}

/// Committed update counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub ok: bool,
    pub operations: usize,
    pub inserted: usize,
    pub deleted: usize,
}

impl From<UpdateSummary> for UpdateResponse {
    fn from(summary: UpdateSummary) -> Self {
        Self {
            ok: true,
            operations: summary.operations,
            inserted: summary.inserted,
            deleted: summary.deleted,
        }
    }
}

/// Graph export parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphParams {
    #[serde(default)]
    pub format: Option<String>,
    /// A single named graph instead of the union.
    #[serde(default)]
    pub graph: Option<String>,
}

// =============================================================================
// INGESTION / REBIND
// =============================================================================

/// Result of merging an admitted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    pub ok: bool,
    pub graph: String,
    pub base: String,
    pub added: usize,
}

/// Rebind request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebindRequest {
    pub target: RebindTarget,
    pub content: String,
}

/// Rebound document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebindResponse {
    pub target: RebindTarget,
    pub content: String,
}

// =============================================================================
// FEDERATION
// =============================================================================

/// One remote SELECT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedSelectRequest {
    pub endpoint: String,
    pub query: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A fan-out run. Without `endpoints`, discovery supplies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationRunRequest {
    #[serde(default)]
    pub endpoints: Option<Vec<String>>,
    pub query: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Outcomes of a run, in endpoint order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationRunResponse {
    pub endpoints: usize,
    pub succeeded: usize,
    pub timed_out: usize,
    pub outcomes: Vec<FederatedQueryOutcome>,
}

impl FederationRunResponse {
    pub fn new(outcomes: Vec<FederatedQueryOutcome>) -> Self {
        Self {
            endpoints: outcomes.len(),
            succeeded: outcomes.iter().filter(|o| o.is_success()).count(),
            timed_out: outcomes.iter().filter(|o| o.timed_out).count(),
            outcomes,
        }
    }
}

/// Discovered endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsResponse {
    pub bootstrap_endpoint: String,
    pub endpoints: Vec<String>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use catty_core::SafetyReport;

    #[test]
    fn error_statuses() {
        let syntax = CattyError::QuerySyntax {
            message: "x".into(),
            line: 1,
            column: 2,
        };
        assert_eq!(ErrorResponse::from_error(&syntax).0, StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorResponse::from_error(&CattyError::Update("x".into())).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorResponse::from_error(&CattyError::Io("x".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejection_carries_details() {
        let err = CattyError::Rejected(SafetyReport::rejected("Missing @base in @context"));
        let (status, body) = ErrorResponse::from_error(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.ok);
        assert_eq!(body.details, vec!["Missing @base in @context".to_string()]);
    }

    #[test]
    fn query_request_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"query": "ASK {}"}"#).unwrap();
        assert!(req.format.is_none());
        assert!(req.params.is_empty());
    }
}
