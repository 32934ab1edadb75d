//! # Ontology Registry
//!
//! The registry maps dataset keys to their environment-specific identifiers
//! and file locations. It is built once at startup and never mutated.
//!
//! ## File Format
//!
//! ```yaml
//! ontologies:
//!   a:
//!     localhost_iri: "http://localhost:8080/ontology/a#"
//!     production_iri: "https://example.com/ontology/a#"
//!     context_url: "http://localhost:8080/ontology/context.jsonld"
//!     file: "ontology/a.jsonld"
//! ```
//!
//! Loading is all-or-nothing: any missing field fails the whole registry.

use crate::types::CattyError;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Required string fields of every registry entry.
const REQUIRED_FIELDS: [&str; 4] = ["localhost_iri", "production_iri", "context_url", "file"];

// =============================================================================
// ONTOLOGY ENTRY
// =============================================================================

/// One registered dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OntologyEntry {
    /// Unique, non-empty key.
    pub key: String,
    /// Development namespace (`localhost_iri`). Also the named graph IRI.
    pub dev_iri: String,
    /// Production namespace (`production_iri`).
    pub prod_iri: String,
    /// Context document for this dataset.
    pub context_url: String,
    /// Graph file, relative to the repository root.
    pub file: PathBuf,
}

impl OntologyEntry {
    /// Create an entry from its parts.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        dev_iri: impl Into<String>,
        prod_iri: impl Into<String>,
        context_url: impl Into<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key: key.into(),
            dev_iri: dev_iri.into(),
            prod_iri: prod_iri.into(),
            context_url: context_url.into(),
            file: file.into(),
        }
    }

    /// True if `base` is exactly this entry's development or production IRI.
    #[must_use]
    pub fn has_base(&self, base: &str) -> bool {
        self.dev_iri == base || self.prod_iri == base
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ordered, immutable lookup table of ontology entries.
///
/// Entry order is the order of the source mapping.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    entries: Vec<OntologyEntry>,
}

impl Registry {
    /// Load the registry from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CattyError> {
        if !path.is_file() {
            return Err(CattyError::Config(format!(
                "IRI config not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            CattyError::Config(format!("Cannot read IRI config {}: {}", path.display(), e))
        })?;
        let registry = Self::from_yaml_str(&text)?;
        tracing::info!(
            entries = registry.len(),
            path = %path.display(),
            "Loaded ontology registry"
        );
        Ok(registry)
    }

    /// Parse the registry from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, CattyError> {
        let root: Value = serde_yaml::from_str(text)
            .map_err(|e| CattyError::Config(format!("Invalid IRI config YAML: {}", e)))?;

        let root = match root {
            Value::Null => return Err(CattyError::Config("IRI config is empty".to_string())),
            Value::Mapping(map) => map,
            _ => {
                return Err(CattyError::Config(
                    "IRI config root must be a mapping".to_string(),
                ));
            }
        };

        let ontologies = match root.get("ontologies") {
            Some(Value::Mapping(map)) => map,
            _ => {
                return Err(CattyError::Config(
                    "IRI config missing required mapping 'ontologies'".to_string(),
                ));
            }
        };

        let mut entries = Vec::with_capacity(ontologies.len());
        for (key, body) in ontologies {
            let key = match key {
                Value::String(s) => s.clone(),
                other => yaml_scalar(other).ok_or_else(|| {
                    CattyError::Config("Ontology keys must be scalars".to_string())
                })?,
            };
            let Value::Mapping(body) = body else {
                return Err(CattyError::Config(format!(
                    "Ontology '{}' must be a mapping",
                    key
                )));
            };
            entries.push(parse_entry(&key, body)?);
        }

        Self::from_entries(entries)
    }

    /// Build a registry from already-parsed entries.
    ///
    /// Fails if a key is blank or duplicated, a field is blank, or an
    /// entry's development and production IRIs are equal.
    pub fn from_entries(entries: Vec<OntologyEntry>) -> Result<Self, CattyError> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &entries {
            if entry.key.trim().is_empty() {
                return Err(CattyError::Config("Ontology key must not be blank".to_string()));
            }
            if !seen.insert(entry.key.as_str()) {
                return Err(CattyError::Config(format!(
                    "Duplicate ontology key '{}'",
                    entry.key
                )));
            }
            let fields = [
                ("localhost_iri", entry.dev_iri.as_str()),
                ("production_iri", entry.prod_iri.as_str()),
                ("context_url", entry.context_url.as_str()),
                ("file", entry.file.to_str().unwrap_or_default()),
            ];
            for (name, value) in fields {
                if value.trim().is_empty() {
                    return Err(missing_field(&entry.key, name));
                }
            }
            if entry.dev_iri == entry.prod_iri {
                return Err(CattyError::Config(format!(
                    "Ontology '{}' has identical localhost_iri and production_iri",
                    entry.key
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Look up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OntologyEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// All entries, in registry order.
    #[must_use]
    pub fn entries(&self) -> &[OntologyEntry] {
        &self.entries
    }

    /// The entry whose development or production IRI equals `base`.
    #[must_use]
    pub fn entry_for_base(&self, base: &str) -> Option<&OntologyEntry> {
        self.entries.iter().find(|e| e.has_base(base))
    }

    /// Every registered base: development and production IRIs of all entries.
    pub fn bases(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|e| [e.dev_iri.as_str(), e.prod_iri.as_str()])
    }

    /// True if `base` is exactly one of the registered IRIs.
    #[must_use]
    pub fn is_registered_base(&self, base: &str) -> bool {
        self.entry_for_base(base).is_some()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(key: &str, body: &Mapping) -> Result<OntologyEntry, CattyError> {
    let mut values = [String::new(), String::new(), String::new(), String::new()];
    for (slot, field) in values.iter_mut().zip(REQUIRED_FIELDS) {
        let value = body
            .get(field)
            .and_then(yaml_scalar)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| missing_field(key, field))?;
        *slot = value;
    }
    let [dev, prod, context, file] = values;
    Ok(OntologyEntry::new(key, dev, prod, context, file))
}

fn yaml_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn missing_field(key: &str, field: &str) -> CattyError {
    CattyError::Config(format!(
        "Ontology '{}' missing required field '{}'",
        key, field
    ))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
ontologies:
  b:
    localhost_iri: "http://localhost:8080/ontology/b#"
    production_iri: "https://example.com/ontology/b#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "ontology/b.jsonld"
  a:
    localhost_iri: "http://localhost:8080/ontology/a#"
    production_iri: "https://example.com/ontology/a#"
    context_url: "http://localhost:8080/ontology/context.jsonld"
    file: "ontology/a.jsonld"
"#;

    #[test]
    fn parses_entries_in_source_order() {
        let reg = Registry::from_yaml_str(VALID).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.entries()[0].key, "b");
        assert_eq!(reg.entries()[1].key, "a");
        assert_eq!(
            reg.get("a").unwrap().prod_iri,
            "https://example.com/ontology/a#"
        );
    }

    #[test]
    fn entry_for_base_matches_either_environment() {
        let reg = Registry::from_yaml_str(VALID).unwrap();
        assert_eq!(
            reg.entry_for_base("https://example.com/ontology/a#").unwrap().key,
            "a"
        );
        assert_eq!(
            reg.entry_for_base("http://localhost:8080/ontology/b#").unwrap().key,
            "b"
        );
        assert!(reg.entry_for_base("http://localhost:8080/ontology/").is_none());
        assert_eq!(reg.bases().count(), 4);
    }

    #[test]
    fn missing_field_fails_whole_load() {
        let yaml = r#"
ontologies:
  a:
    localhost_iri: "http://x/a#"
    production_iri: "https://y/a#"
    file: "a.jsonld"
"#;
        let err = Registry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, CattyError::Config(_)));
        assert!(
            err.to_string()
                .contains("Ontology 'a' missing required field 'context_url'")
        );
    }

    #[test]
    fn blank_field_is_missing() {
        let yaml = r#"
ontologies:
  a:
    localhost_iri: "   "
    production_iri: "https://y/a#"
    context_url: "c"
    file: "a.jsonld"
"#;
        assert!(Registry::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn empty_and_malformed_documents_fail() {
        assert!(Registry::from_yaml_str("").is_err());
        assert!(Registry::from_yaml_str("other: 1").is_err());
        assert!(Registry::from_yaml_str("ontologies: [1, 2]").is_err());
        assert!(Registry::from_yaml_str(": : :").is_err());
    }

    #[test]
    fn identical_environments_rejected() {
        let entry = OntologyEntry::new("a", "http://x/a#", "http://x/a#", "c", "a.jsonld");
        assert!(Registry::from_entries(vec![entry]).is_err());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Registry::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("IRI config not found"));
    }
}
