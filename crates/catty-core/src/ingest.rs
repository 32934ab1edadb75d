//! # Ingestion Gate
//!
//! The only way to produce an `AdmittedDocument`, and `GraphStore::merge`
//! accepts nothing else. A document is admitted when
//! 1. its declared content kind is JSON-LD,
//! 2. it passes the IRI safety validator, and
//! 3. it parses into triples against its declared base.
//!
//! Any failure yields `CattyError::Rejected` with the report; nothing is
//! merged.

use crate::formats::{JsonLdOptions, parse_jsonld_value};
use crate::iri::{SafetyReport, validate_value};
use crate::registry::Registry;
use crate::types::{CattyError, Triple};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A validated document ready to be merged.
#[derive(Debug, Clone)]
pub struct AdmittedDocument {
    target_graph: String,
    base: String,
    triples: Vec<Triple>,
}

impl AdmittedDocument {
    /// Named graph the document merges into (the entry's development IRI).
    #[must_use]
    pub fn target_graph(&self) -> &str {
        &self.target_graph
    }

    /// The declared `@base`.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Parsed triples, blank nodes document-local.
    #[must_use]
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }
}

/// True if a declared content kind denotes JSON-LD.
#[must_use]
pub fn is_jsonld_kind(kind: &str) -> bool {
    let media = kind.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    matches!(
        media.as_str(),
        "application/ld+json" | "application/json" | "jsonld" | "json-ld" | "json"
    )
}

/// Validates and parses untrusted documents.
#[derive(Debug, Clone)]
pub struct Ingestor<'r> {
    registry: &'r Registry,
    repo_root: Option<PathBuf>,
}

impl<'r> Ingestor<'r> {
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            repo_root: None,
        }
    }

    /// Resolve relative contexts next to the target entry's graph file.
    #[must_use]
    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = Some(root.into());
        self
    }

    /// Admit a document. `content_kind` of `None` is taken as JSON-LD.
    pub fn admit(&self, text: &str, content_kind: Option<&str>) -> Result<AdmittedDocument, CattyError> {
        if let Some(kind) = content_kind {
            if !is_jsonld_kind(kind) {
                return Err(reject(format!(
                    "Unsupported content kind '{}': only JSON-LD documents can be ingested",
                    kind
                )));
            }
        }
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| reject(format!("Invalid JSON-LD (malformed JSON): {}", e)))?;
        let report = validate_value(&doc, self.registry);
        if !report.ok {
            return Err(CattyError::Rejected(report));
        }
        let base = report.base_iri.clone().unwrap_or_default();
        let entry = self
            .registry
            .entry_for_base(&base)
            .ok_or_else(|| reject(format!("Unregistered @base IRI: {}", base)))?;
        let options = JsonLdOptions {
            base_dir: self.repo_root.as_ref().and_then(|root| {
                root.join(&entry.file).parent().map(Path::to_path_buf)
            }),
            blank_scope: String::new(),
            base: Some(base.clone()),
            shared_contexts: vec![entry.context_url.clone()],
        };
        let triples = parse_jsonld_value(&doc, &options).map_err(|e| {
            CattyError::Rejected(SafetyReport {
                ok: false,
                errors: vec![e.to_string()],
                base_iri: Some(base.clone()),
            })
        })?;
        tracing::debug!(graph = %entry.dev_iri, triples = triples.len(), "Document admitted");
        Ok(AdmittedDocument {
            target_graph: entry.dev_iri.clone(),
            base,
            triples,
        })
    }
}

fn reject(message: String) -> CattyError {
    tracing::warn!(reason = %message, "Document rejected");
    CattyError::Rejected(SafetyReport::rejected(message))
}
