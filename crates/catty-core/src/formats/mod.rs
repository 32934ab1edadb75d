//! # Formats Module
//!
//! RDF readers and writers.
//!
//! - `jsonld`: JSON-LD reader (startup loading and ingestion)
//! - `ntriples`: N-Triples reader and writer
//! - `writers`: Turtle and JSON-LD writers
//!
//! `RdfFormat` is the closed set of graph serializations offered to callers.

pub mod jsonld;
pub mod ntriples;
pub mod writers;

pub use jsonld::{JsonLdError, JsonLdOptions, parse_jsonld, parse_jsonld_value};
pub use ntriples::{parse_ntriples, write_ntriples};
pub use writers::{write_jsonld, write_turtle};

use crate::types::{CattyError, Triple};
use std::path::Path;

// =============================================================================
// GRAPH SERIALIZATION FORMAT
// =============================================================================

/// Graph serialization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RdfFormat {
    NTriples,
    #[default]
    Turtle,
    JsonLd,
}

impl RdfFormat {
    /// Parse a format token. Unknown tokens select Turtle.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "ntriples" | "n-triples" | "nt" => Self::NTriples,
            "jsonld" | "json-ld" => Self::JsonLd,
            _ => Self::Turtle,
        }
    }

    /// MIME type of the serialization.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::NTriples => "application/n-triples",
            Self::Turtle => "text/turtle",
            Self::JsonLd => "application/ld+json",
        }
    }

    /// Serialize triples in this format.
    pub fn serialize(self, triples: &[Triple]) -> Result<String, CattyError> {
        match self {
            Self::NTriples => Ok(write_ntriples(triples)),
            Self::Turtle => Ok(write_turtle(triples)),
            Self::JsonLd => write_jsonld(triples),
        }
    }
}

// =============================================================================
// FILE LOADING
// =============================================================================

/// Read a graph file, choosing the reader by extension.
///
/// `.jsonld`/`.json` are read as JSON-LD with relative contexts resolved
/// next to the file; `.nt` as N-Triples. `shared_contexts` lists extra
/// context URLs that map to the local shared context file.
pub fn load_graph_file(
    path: &Path,
    blank_scope: &str,
    shared_contexts: &[String],
) -> Result<Vec<Triple>, CattyError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CattyError::Load(format!("Cannot read {}: {}", path.display(), e)))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jsonld" | "json" => {
            let options = JsonLdOptions {
                base_dir: path.parent().map(Path::to_path_buf),
                blank_scope: blank_scope.to_string(),
                base: None,
                shared_contexts: shared_contexts.to_vec(),
            };
            parse_jsonld(&text, &options)
                .map_err(|e| CattyError::Load(format!("{}: {}", path.display(), e)))
        }
        "nt" => parse_ntriples(&text, blank_scope)
            .map_err(|e| CattyError::Load(format!("{}: {}", path.display(), e))),
        other => Err(CattyError::Load(format!(
            "{}: unsupported graph file extension '{}'",
            path.display(),
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tokens() {
        assert_eq!(RdfFormat::from_token("nt"), RdfFormat::NTriples);
        assert_eq!(RdfFormat::from_token("JSON-LD"), RdfFormat::JsonLd);
        assert_eq!(RdfFormat::from_token("ttl"), RdfFormat::Turtle);
        assert_eq!(RdfFormat::from_token("rdfxml"), RdfFormat::Turtle);
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = load_graph_file(Path::new("/nope/a.jsonld"), "b1_", &[]).unwrap_err();
        assert!(matches!(err, CattyError::Load(_)));
    }

    #[test]
    fn unsupported_extension_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.owl");
        std::fs::write(&path, "<x/>").unwrap();
        assert!(matches!(
            load_graph_file(&path, "", &[]).unwrap_err(),
            CattyError::Load(_)
        ));
    }
}
