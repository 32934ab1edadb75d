//! # IRI Safety Validator
//!
//! Decides whether an untrusted JSON-LD document may enter the store.
//!
//! ## Rules
//!
//! 1. The document must be well-formed JSON
//! 2. Its `@context` must declare an `@base` that is exactly one of the
//!    registry's development or production IRIs
//! 3. Every `@id` anywhere in the document (contexts included) must be
//!    - a blank node (`_:x`) or empty, or
//!    - an absolute http(s) IRI under a registered base or a trusted
//!      authority, or
//!    - a compact IRI with an allow-listed prefix, or
//!    - a relative reference (resolved against the validated base)
//!
//! Every violation is reported; the document is accepted only when the
//! error list is empty.

use crate::primitives::{ALLOWED_COMPACT_PREFIXES, MAX_DOCUMENT_DEPTH, TRUSTED_EXACT_PREFIXES, TRUSTED_HOSTS};
use crate::registry::Registry;
use serde::Serialize;
use serde_json::Value;

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    /// True iff `errors` is empty.
    pub ok: bool,
    pub errors: Vec<String>,
    /// The declared `@base`, if one was found.
    pub base_iri: Option<String>,
}

impl SafetyReport {
    fn from_errors(errors: Vec<String>, base_iri: Option<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
            base_iri,
        }
    }

    /// A rejection carrying one message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::from_errors(vec![message.into()], None)
    }
}

/// Validate a document against the registry.
#[must_use]
pub fn validate(text: &str, registry: &Registry) -> SafetyReport {
    let doc: Value = match serde_json::from_str(text) {
        Ok(doc) => doc,
        Err(e) => return SafetyReport::rejected(format!("Invalid JSON-LD (malformed JSON): {}", e)),
    };
    validate_value(&doc, registry)
}

/// Validate an already parsed document.
#[must_use]
pub fn validate_value(doc: &Value, registry: &Registry) -> SafetyReport {
    let mut errors = Vec::new();
    let base = extract_base(doc);
    match &base {
        None => errors.push("Missing @base in @context".to_string()),
        Some(b) if !registry.is_registered_base(b) => {
            errors.push(format!("Unregistered @base IRI: {}", b));
        }
        Some(_) => {}
    }

    let mut ids = Vec::new();
    if !collect_ids(doc, 0, &mut ids) {
        errors.push(format!(
            "Document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ));
    }
    for id in ids {
        if let Some(error) = check_id(id, registry) {
            errors.push(error);
        }
    }
    if !errors.is_empty() {
        tracing::warn!(errors = errors.len(), base = ?base, "Document failed IRI safety validation");
    }
    SafetyReport::from_errors(errors, base)
}

/// `@base` of the top-level context: an object, or the first object in a
/// context array that declares a textual `@base`.
fn extract_base(doc: &Value) -> Option<String> {
    let context = doc.get("@context")?;
    let base_of = |v: &Value| v.get("@base").and_then(Value::as_str).map(String::from);
    match context {
        Value::Object(_) => base_of(context),
        Value::Array(items) => items.iter().filter(|i| i.is_object()).find_map(base_of),
        _ => None,
    }
}

/// Collect every textual `@id`. Returns false if nesting is too deep.
fn collect_ids<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a str>) -> bool {
    if depth > MAX_DOCUMENT_DEPTH {
        return false;
    }
    match value {
        Value::Object(map) => {
            if let Some(id) = map.get("@id").and_then(Value::as_str) {
                out.push(id);
            }
            map.values().all(|v| collect_ids(v, depth + 1, out))
        }
        Value::Array(items) => items.iter().all(|v| collect_ids(v, depth + 1, out)),
        _ => true,
    }
}

fn check_id(id: &str, registry: &Registry) -> Option<String> {
    if id.trim().is_empty() || id.starts_with("_:") {
        return None;
    }
    if id.starts_with("http://") || id.starts_with("https://") {
        if is_trusted_absolute(id, registry) {
            return None;
        }
        return Some(format!("Unauthorized @id IRI: {}", id));
    }
    if let Some((prefix, _)) = id.split_once(':') {
        if ALLOWED_COMPACT_PREFIXES.contains(&prefix) {
            return None;
        }
        return Some(format!("Unauthorized compact IRI prefix in @id: {}", id));
    }
    None
}

fn is_trusted_absolute(id: &str, registry: &Registry) -> bool {
    if registry.bases().any(|base| id.starts_with(base)) {
        return true;
    }
    if TRUSTED_EXACT_PREFIXES.iter().any(|p| id.starts_with(p)) {
        return true;
    }
    let rest = id
        .strip_prefix("https://")
        .or_else(|| id.strip_prefix("http://"))
        .unwrap_or(id);
    TRUSTED_HOSTS.iter().any(|host| rest.starts_with(host))
}
