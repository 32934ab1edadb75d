//! # catty-core
//!
//! The semantic-knowledge engine for Catty - THE LOGIC.
//!
//! A registry of ontologies, each with a development and a production
//! namespace, is loaded into an in-memory store with one named graph per
//! ontology. On top of the store sit a query service, result serializers,
//! an IRI rebinder and the ingestion gate that guards every merge.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: ordered indices, stable result ordering, canonical checksum
//! - Fail-fast: a registry or store is either fully loaded or not returned
//! - Gated: `GraphStore::merge` only accepts an `AdmittedDocument`, which only
//!   the `Ingestor` can produce

// =============================================================================
// MODULES
// =============================================================================

pub mod formats;
pub mod graph;
pub mod ingest;
pub mod iri;
pub mod primitives;
pub mod query;
pub mod registry;
pub mod results;
pub mod sparql;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{CattyError, GraphName, Literal, Term, Triple};

// =============================================================================
// RE-EXPORTS: Registry and Store
// =============================================================================

pub use graph::Dataset;
pub use registry::{OntologyEntry, Registry};
pub use store::{GraphStore, ReadTransaction, StoreStatistics};

// =============================================================================
// RE-EXPORTS: Query
// =============================================================================

pub use query::{QueryService, validate_query};
pub use results::{Bindings, QueryResult, ResultFormat, parse_json_results};
pub use sparql::{QueryForm, UpdateSummary};

// =============================================================================
// RE-EXPORTS: Formats, IRI handling and Ingestion
// =============================================================================

pub use formats::RdfFormat;
pub use ingest::{AdmittedDocument, Ingestor};
pub use iri::{IriRebinder, RebindTarget, SafetyReport};
