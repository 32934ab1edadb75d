//! # Graph Store
//!
//! The transactional owner of the dataset.
//!
//! ## Transaction Model
//!
//! Single writer, many readers. The committed dataset is an immutable
//! `Arc<Dataset>` snapshot:
//! - `read()` clones the `Arc`; readers never block each other and keep a
//!   consistent snapshot for as long as they hold it
//! - `write()` serializes writers, mutates a private copy and publishes it
//!   only if the closure returns `Ok`; an `Err` discards the copy
//!
//! A failed write therefore leaves no observable trace.

use crate::formats::load_graph_file;
use crate::graph::Dataset;
use crate::ingest::AdmittedDocument;
use crate::registry::Registry;
use crate::types::{CattyError, GraphName, Term, Triple};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

// =============================================================================
// READ TRANSACTION
// =============================================================================

/// A consistent, read-only view of the committed dataset.
#[derive(Debug, Clone)]
pub struct ReadTransaction {
    snapshot: Arc<Dataset>,
}

impl Deref for ReadTransaction {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.snapshot
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Summary counts of the committed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatistics {
    /// Quads across all graphs.
    pub triple_count: usize,
    /// Number of named graphs.
    pub graph_count: usize,
    /// Triples in the default graph.
    pub default_graph_count: usize,
    /// Triple count per named graph.
    pub graphs: BTreeMap<String, usize>,
    pub distinct_subjects: usize,
    pub distinct_predicates: usize,
}

// =============================================================================
// GRAPH STORE
// =============================================================================

/// In-memory multi-graph store with snapshot transactions.
#[derive(Debug, Default)]
pub struct GraphStore {
    current: RwLock<Arc<Dataset>>,
    writer: Mutex<()>,
}

impl GraphStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing dataset.
    #[must_use]
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(dataset)),
            writer: Mutex::new(()),
        }
    }

    /// Load one named graph per registry entry.
    ///
    /// Each entry's file is resolved against `repo_root` and stored under the
    /// entry's development IRI. The first missing or unparseable file aborts
    /// the whole initialization; no partially populated store is returned.
    pub fn init(repo_root: &Path, registry: &Registry) -> Result<Self, CattyError> {
        let mut dataset = Dataset::new();
        for entry in registry.entries() {
            let path = repo_root.join(&entry.file);
            let scope = format!("{}_", dataset.fresh_blank_scope());
            let shared = std::slice::from_ref(&entry.context_url);
            let triples = load_graph_file(&path, &scope, shared).map_err(|e| {
                tracing::error!(key = %entry.key, path = %path.display(), "Graph load failed");
                e
            })?;
            let graph = GraphName::named(entry.dev_iri.clone());
            dataset.create_pinned_graph(&entry.dev_iri);
            for triple in &triples {
                dataset.insert(&graph, triple).map_err(|e| {
                    CattyError::Load(format!("{}: {}", path.display(), e))
                })?;
            }
            tracing::info!(
                key = %entry.key,
                graph = %entry.dev_iri,
                triples = dataset.graph_len(&graph).unwrap_or(0),
                "Loaded named graph"
            );
        }
        tracing::info!(
            graphs = registry.len(),
            triples = dataset.len(),
            "Graph store initialized"
        );
        Ok(Self::from_dataset(dataset))
    }

    /// Begin a read transaction.
    #[must_use]
    pub fn read(&self) -> ReadTransaction {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        ReadTransaction {
            snapshot: Arc::clone(&guard),
        }
    }

    /// Run `f` as a write transaction.
    ///
    /// Commits only when `f` returns `Ok`; otherwise the store is unchanged.
    pub fn write<T, F>(&self, f: F) -> Result<T, CattyError>
    where
        F: FnOnce(&mut Dataset) -> Result<T, CattyError>,
    {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut working = Dataset::clone(&self.read());
        let value = f(&mut working)?;
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(working);
        Ok(value)
    }

    /// Merge a validated document into its target graph.
    ///
    /// Returns the number of triples that were new to the graph.
    pub fn merge(&self, document: AdmittedDocument) -> Result<usize, CattyError> {
        let graph = GraphName::named(document.target_graph().to_string());
        let added = self.write(|ds| {
            let scope = format!("{}_", ds.fresh_blank_scope());
            let mut added = 0;
            for triple in document.triples() {
                let triple = rescope_blanks(triple, &scope);
                if ds.insert(&graph, &triple)? {
                    added += 1;
                }
            }
            Ok(added)
        })?;
        tracing::info!(graph = %graph, added, "Merged admitted document");
        Ok(added)
    }

    /// Counts over the committed dataset.
    #[must_use]
    pub fn statistics(&self) -> StoreStatistics {
        let ds = self.read();
        let graphs: BTreeMap<String, usize> = ds
            .named_graphs()
            .map(|name| {
                let count = ds.graph_len(&GraphName::named(name)).unwrap_or(0);
                (name.to_string(), count)
            })
            .collect();
        StoreStatistics {
            triple_count: ds.len(),
            graph_count: graphs.len(),
            default_graph_count: ds.graph_len(&GraphName::Default).unwrap_or(0),
            graphs,
            distinct_subjects: ds.distinct_subjects(),
            distinct_predicates: ds.distinct_predicates(),
        }
    }

    /// Deterministic content hash of the committed dataset.
    #[must_use]
    pub fn checksum(&self) -> String {
        dataset_checksum(&self.read())
    }

    /// Snapshot of one graph, `None` if the named graph does not exist.
    #[must_use]
    pub fn graph(&self, name: &GraphName) -> Option<Vec<Triple>> {
        let ds = self.read();
        ds.graph_len(name)?;
        Some(ds.triples(name))
    }

    /// Snapshot of the union of all graphs.
    #[must_use]
    pub fn union_graph(&self) -> Vec<Triple> {
        self.read().union_triples()
    }

    /// Names of all named graphs.
    #[must_use]
    pub fn graph_names(&self) -> Vec<String> {
        self.read().named_graphs().map(String::from).collect()
    }
}

/// Give document-local blank nodes a store-unique prefix.
fn rescope_blanks(triple: &Triple, scope: &str) -> Triple {
    let fix = |t: &Term| match t {
        Term::Blank(label) => Term::blank(format!("{}{}", scope, label)),
        other => other.clone(),
    };
    Triple::new(fix(&triple.subject), triple.predicate.clone(), fix(&triple.object))
}

// =============================================================================
// CHECKSUM
// =============================================================================

/// Canonical N-Quads bytes: sorted by graph then triple.
fn canonical_bytes(dataset: &Dataset) -> Vec<u8> {
    let mut out = String::new();
    for (graph, triple) in dataset.quads() {
        out.push_str(&format!(
            "{} {} {}",
            triple.subject, triple.predicate, triple.object
        ));
        if let GraphName::Named(name) = graph {
            out.push_str(&format!(" <{}>", name));
        }
        out.push_str(" .\n");
    }
    out.into_bytes()
}

/// Name of the algorithm behind `dataset_checksum`.
#[cfg(feature = "crypto-hash")]
pub const CHECKSUM_ALGORITHM: &str = "blake3";
/// Name of the algorithm behind `dataset_checksum`.
#[cfg(not(feature = "crypto-hash"))]
pub const CHECKSUM_ALGORITHM: &str = "fnv1a-64";

/// Hash the canonical form of a dataset as lowercase hex.
///
/// BLAKE3 with the `crypto-hash` feature, 64-bit FNV-1a otherwise.
#[must_use]
pub fn dataset_checksum(dataset: &Dataset) -> String {
    let data = canonical_bytes(dataset);
    #[cfg(feature = "crypto-hash")]
    {
        blake3::hash(&data).to_hex().to_string()
    }
    #[cfg(not(feature = "crypto-hash"))]
    {
        format!("{:016x}", fnv1a(&data))
    }
}

#[cfg(not(feature = "crypto-hash"))]
fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}

// =============================================================================
// TESTS
// =============================================================================
