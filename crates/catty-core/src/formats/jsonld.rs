//! # JSON-LD Reader
//!
//! Converts a JSON-LD document into triples.
//!
//! Supported subset: `@context` (object, array, a relative file reference
//! next to the document, or a shared context URL), `@base`, `@vocab`, prefix and term definitions,
//! `@id`, `@type`, `@graph`, value objects, `@list`, `@set`, nested nodes and
//! native JSON scalars. Named graphs inside a document are flattened into
//! the graph the caller loads the document into.
//!
//! Remote contexts are never fetched. The shared context URLs resolve to
//! the local `context.jsonld` next to the document; any other absolute
//! context reference is an error.

use crate::primitives::{
    LOCALHOST_CONTEXT_URL, MAX_DOCUMENT_DEPTH, PRODUCTION_CONTEXT_URL, RDF_FIRST, RDF_NIL,
    RDF_REST, RDF_TYPE, SHARED_CONTEXT_FILE, XSD_DOUBLE, XSD_INTEGER,
};
use crate::types::{Literal, Term, Triple};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised while reading a JSON-LD document.
#[derive(Debug, Error)]
pub enum JsonLdError {
    #[error("Invalid JSON-LD (malformed JSON): {0}")]
    Malformed(String),

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Document nesting exceeds {0} levels")]
    TooDeep(usize),
}

// =============================================================================
// IRI HELPERS
// =============================================================================

/// Split a compact IRI `prefix:suffix`.
///
/// Returns `None` for absolute IRIs such as `http://...`.
#[must_use]
pub fn parse_prefix(s: &str) -> Option<(&str, &str)> {
    let colon = s.find(':')?;
    let (prefix, suffix) = (&s[..colon], &s[colon + 1..]);
    if prefix.is_empty() || prefix.contains('/') || suffix.starts_with("//") {
        return None;
    }
    Some((prefix, suffix))
}

/// True if the string starts with an RFC 3986 scheme.
#[must_use]
pub fn is_absolute(iri: &str) -> bool {
    match iri.find(':') {
        Some(colon) => {
            let scheme = &iri.as_bytes()[..colon];
            !scheme.is_empty()
                && scheme[0].is_ascii_alphabetic()
                && scheme
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
        }
        None => false,
    }
}

/// Join a relative reference onto a base.
///
/// A base ending in `/` or `#` is extended by concatenation, so
/// `http://x/a#` + `Thing` gives `http://x/a#Thing`.
#[must_use]
pub fn join(base: &str, relative: &str) -> String {
    if is_absolute(relative) {
        return relative.to_string();
    }
    if relative.is_empty() {
        return base.to_string();
    }
    if let Some(fragment) = relative.strip_prefix('#') {
        let stem = base.split('#').next().unwrap_or(base);
        return format!("{}#{}", stem, fragment);
    }
    if base.ends_with('/') || base.ends_with('#') {
        format!("{}{}", base, relative)
    } else {
        match base.rfind('/') {
            Some(slash) if slash > base.find("//").map_or(0, |i| i + 1) => {
                format!("{}{}", &base[..=slash], relative)
            }
            _ => format!("{}/{}", base, relative),
        }
    }
}

// =============================================================================
// ACTIVE CONTEXT
// =============================================================================

#[derive(Debug, Clone, Default)]
struct TermDefinition {
    /// Raw IRI mapping; `None` for a term explicitly mapped to null.
    id: Option<String>,
    /// `@id`, `@vocab` or a raw datatype IRI.
    type_mapping: Option<String>,
    language: Option<String>,
    list: bool,
}

#[derive(Debug, Clone, Default)]
struct ActiveContext {
    base: Option<String>,
    vocab: Option<String>,
    language: Option<String>,
    terms: BTreeMap<String, TermDefinition>,
}

impl ActiveContext {
    /// Expand a term or IRI. `vocab` selects vocabulary-relative expansion
    /// (properties, types) over document-relative expansion (`@id`).
    fn expand_iri(&self, value: &str, vocab: bool) -> Option<String> {
        self.expand_iri_bounded(value, vocab, 0)
    }

    fn expand_iri_bounded(&self, value: &str, vocab: bool, depth: usize) -> Option<String> {
        if depth > 16 {
            return None;
        }
        if value.starts_with('@') {
            return Some(value.to_string());
        }
        if vocab {
            if let Some(def) = self.terms.get(value) {
                let id = def.id.as_deref()?;
                if id != value {
                    return self.expand_iri_bounded(id, true, depth + 1);
                }
            }
        }
        if let Some((prefix, suffix)) = parse_prefix(value) {
            if prefix == "_" {
                return Some(value.to_string());
            }
            if let Some(def) = self.terms.get(prefix) {
                let ns = self.expand_iri_bounded(def.id.as_deref()?, true, depth + 1)?;
                return Some(format!("{}{}", ns, suffix));
            }
        }
        if is_absolute(value) {
            return Some(value.to_string());
        }
        if vocab {
            if let Some(v) = &self.vocab {
                return Some(format!("{}{}", v, value));
            }
            return None;
        }
        match &self.base {
            Some(base) => Some(join(base, value)),
            None => Some(value.to_string()),
        }
    }
}

// =============================================================================
// READER
// =============================================================================

/// Options controlling a single document read.
#[derive(Debug, Clone, Default)]
pub struct JsonLdOptions {
    /// Directory used to resolve relative string contexts.
    pub base_dir: Option<PathBuf>,
    /// Prefix applied to every blank node label of this document.
    pub blank_scope: String,
    /// Base IRI applied before the document's own `@base`.
    pub base: Option<String>,
    /// Extra context URLs served by the shared context file in `base_dir`.
    ///
    /// The development and production locations are always recognized.
    pub shared_contexts: Vec<String>,
}

impl JsonLdOptions {
    /// True if `url` names the shared context.
    #[must_use]
    pub fn is_shared_context(&self, url: &str) -> bool {
        url == LOCALHOST_CONTEXT_URL
            || url == PRODUCTION_CONTEXT_URL
            || self.shared_contexts.iter().any(|c| c == url)
    }
}

/// Parse JSON-LD text into triples.
pub fn parse_jsonld(text: &str, options: &JsonLdOptions) -> Result<Vec<Triple>, JsonLdError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| JsonLdError::Malformed(e.to_string()))?;
    parse_jsonld_value(&value, options)
}

/// Convert an already-parsed JSON-LD value into triples.
pub fn parse_jsonld_value(
    value: &Value,
    options: &JsonLdOptions,
) -> Result<Vec<Triple>, JsonLdError> {
    let mut reader = Reader {
        options,
        triples: Vec::new(),
        generated: 0,
    };
    let ctx = ActiveContext {
        base: options.base.clone(),
        ..ActiveContext::default()
    };
    match value {
        Value::Array(items) => {
            for item in items {
                reader.top_level(item, &ctx)?;
            }
        }
        other => reader.top_level(other, &ctx)?,
    }
    Ok(reader.triples)
}

struct Reader<'a> {
    options: &'a JsonLdOptions,
    triples: Vec<Triple>,
    generated: u64,
}

impl Reader<'_> {
    fn top_level(&mut self, value: &Value, ctx: &ActiveContext) -> Result<(), JsonLdError> {
        match value {
            Value::Object(obj) => {
                self.node(obj, ctx, 0)?;
                Ok(())
            }
            Value::Null => Ok(()),
            _ => Err(JsonLdError::InvalidValue {
                key: "document".to_string(),
                message: "top-level items must be node objects".to_string(),
            }),
        }
    }

    fn fresh_blank(&mut self) -> Term {
        self.generated += 1;
        Term::blank(format!("{}g{}", self.options.blank_scope, self.generated))
    }

    fn blank(&self, label: &str) -> Term {
        Term::blank(format!("{}{}", self.options.blank_scope, label))
    }

    fn iri_or_blank(&self, iri: String) -> Term {
        match iri.strip_prefix("_:") {
            Some(label) => self.blank(label),
            None => Term::Iri(iri),
        }
    }

    // -------------------------------------------------------------------------
    // Context processing
    // -------------------------------------------------------------------------

    fn apply_context(
        &self,
        ctx: &ActiveContext,
        local: &Value,
        depth: usize,
    ) -> Result<ActiveContext, JsonLdError> {
        if depth > MAX_DOCUMENT_DEPTH {
            return Err(JsonLdError::TooDeep(MAX_DOCUMENT_DEPTH));
        }
        let mut result = ctx.clone();
        let items: Vec<&Value> = match local {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            match item {
                Value::Null => {
                    result = ActiveContext {
                        base: self.options.base.clone(),
                        ..ActiveContext::default()
                    };
                }
                Value::String(reference) => {
                    result = self.apply_context_reference(&result, reference, depth)?;
                }
                Value::Object(def) => self.apply_context_object(&mut result, def)?,
                _ => {
                    return Err(JsonLdError::InvalidContext(
                        "context entries must be objects, strings or null".to_string(),
                    ));
                }
            }
        }
        Ok(result)
    }

    fn apply_context_reference(
        &self,
        ctx: &ActiveContext,
        reference: &str,
        depth: usize,
    ) -> Result<ActiveContext, JsonLdError> {
        let file = if is_absolute(reference) {
            if !self.options.is_shared_context(reference) {
                return Err(JsonLdError::InvalidContext(format!(
                    "remote context '{}' cannot be fetched",
                    reference
                )));
            }
            tracing::debug!(context = reference, "Using local copy of shared context");
            SHARED_CONTEXT_FILE
        } else {
            reference
        };
        let Some(dir) = &self.options.base_dir else {
            return Err(JsonLdError::InvalidContext(format!(
                "cannot resolve context '{}' without a document location",
                reference
            )));
        };
        let path = dir.join(file);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            JsonLdError::InvalidContext(format!("cannot read {}: {}", path.display(), e))
        })?;
        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| JsonLdError::InvalidContext(format!("{}: {}", path.display(), e)))?;
        let inner = match &doc {
            Value::Object(obj) => obj.get("@context").unwrap_or(&doc),
            _ => &doc,
        };
        self.apply_context(ctx, inner, depth + 1)
    }

    fn apply_context_object(
        &self,
        ctx: &mut ActiveContext,
        def: &Map<String, Value>,
    ) -> Result<(), JsonLdError> {
        if let Some(base) = def.get("@base") {
            ctx.base = match base {
                Value::Null => None,
                Value::String(b) => Some(match &ctx.base {
                    Some(current) => join(current, b),
                    None => b.clone(),
                }),
                _ => return Err(JsonLdError::InvalidContext("@base must be a string".into())),
            };
        }
        if let Some(vocab) = def.get("@vocab") {
            ctx.vocab = match vocab {
                Value::Null => None,
                Value::String(v) => Some(ctx.expand_iri(v, true).unwrap_or_else(|| v.clone())),
                _ => return Err(JsonLdError::InvalidContext("@vocab must be a string".into())),
            };
        }
        if let Some(lang) = def.get("@language") {
            ctx.language = lang.as_str().map(str::to_ascii_lowercase);
        }

        for (term, body) in def {
            if term.starts_with('@') {
                continue;
            }
            let definition = match body {
                Value::Null => TermDefinition::default(),
                Value::String(id) => TermDefinition {
                    id: Some(id.clone()),
                    ..TermDefinition::default()
                },
                Value::Object(obj) => {
                    let id = match obj.get("@id") {
                        Some(Value::String(id)) => Some(id.clone()),
                        Some(Value::Null) => None,
                        Some(_) => {
                            return Err(JsonLdError::InvalidContext(format!(
                                "invalid @id for term '{}'",
                                term
                            )));
                        }
                        None => Some(term.clone()),
                    };
                    TermDefinition {
                        id,
                        type_mapping: obj.get("@type").and_then(Value::as_str).map(String::from),
                        language: obj
                            .get("@language")
                            .and_then(Value::as_str)
                            .map(str::to_ascii_lowercase),
                        list: obj.get("@container").and_then(Value::as_str) == Some("@list"),
                    }
                }
                _ => {
                    return Err(JsonLdError::InvalidContext(format!(
                        "invalid definition for term '{}'",
                        term
                    )));
                }
            };
            ctx.terms.insert(term.clone(), definition);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Node processing
    // -------------------------------------------------------------------------

    fn node(
        &mut self,
        obj: &Map<String, Value>,
        outer: &ActiveContext,
        depth: usize,
    ) -> Result<Term, JsonLdError> {
        if depth > MAX_DOCUMENT_DEPTH {
            return Err(JsonLdError::TooDeep(MAX_DOCUMENT_DEPTH));
        }
        let local;
        let ctx = match obj.get("@context") {
            Some(c) => {
                local = self.apply_context(outer, c, depth)?;
                &local
            }
            None => outer,
        };

        let subject = match obj.get("@id") {
            Some(Value::String(id)) => match ctx.expand_iri(id, false) {
                Some(iri) => self.iri_or_blank(iri),
                None => self.fresh_blank(),
            },
            Some(_) => {
                return Err(JsonLdError::InvalidValue {
                    key: "@id".to_string(),
                    message: "must be a string".to_string(),
                });
            }
            None => self.fresh_blank(),
        };

        if let Some(types) = obj.get("@type") {
            for ty in as_items(types) {
                let Value::String(ty) = ty else {
                    return Err(JsonLdError::InvalidValue {
                        key: "@type".to_string(),
                        message: "must be a string or array of strings".to_string(),
                    });
                };
                if let Some(iri) = ctx.expand_iri(ty, true) {
                    let object = self.iri_or_blank(iri);
                    self.emit(subject.clone(), Term::iri(RDF_TYPE), object);
                }
            }
        }

        if let Some(graph) = obj.get("@graph") {
            for item in as_items(graph) {
                if let Value::Object(inner) = item {
                    self.node(inner, ctx, depth + 1)?;
                }
            }
        }

        for (key, value) in obj {
            if key.starts_with('@') {
                continue;
            }
            let Some(predicate) = ctx.expand_iri(key, true) else {
                continue;
            };
            if !predicate.contains(':') || predicate.starts_with("_:") {
                continue;
            }
            let def = ctx.terms.get(key);
            let predicate = Term::Iri(predicate);

            if def.is_some_and(|d| d.list) {
                let head = self.list(as_items(value), ctx, def, key, depth)?;
                self.emit(subject.clone(), predicate, head);
                continue;
            }
            for item in as_items(value) {
                for object in self.objects(item, ctx, def, key, depth)? {
                    self.emit(subject.clone(), predicate.clone(), object);
                }
            }
        }

        Ok(subject)
    }

    /// Object terms produced by one property value (arrays flatten).
    fn objects(
        &mut self,
        value: &Value,
        ctx: &ActiveContext,
        def: Option<&TermDefinition>,
        key: &str,
        depth: usize,
    ) -> Result<Vec<Term>, JsonLdError> {
        let type_mapping = def.and_then(|d| d.type_mapping.as_deref());
        let term = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.objects(item, ctx, def, key, depth + 1)?);
                }
                return Ok(out);
            }
            Value::String(s) => match type_mapping {
                Some("@id") => match ctx.expand_iri(s, false) {
                    Some(iri) => self.iri_or_blank(iri),
                    None => return Ok(Vec::new()),
                },
                Some("@vocab") => match ctx.expand_iri(s, true) {
                    Some(iri) => self.iri_or_blank(iri),
                    None => return Ok(Vec::new()),
                },
                Some(dt) => Term::Literal(Literal::new_typed(
                    s.clone(),
                    ctx.expand_iri(dt, true).unwrap_or_else(|| dt.to_string()),
                )),
                None => {
                    let lang = def.and_then(|d| d.language.clone()).or(ctx.language.clone());
                    match lang {
                        Some(lang) => Term::Literal(Literal::new_lang(s.clone(), lang)),
                        None => Term::literal(s.clone()),
                    }
                }
            },
            Value::Bool(b) => Term::Literal(Literal::boolean(*b)),
            Value::Number(n) => {
                let datatype = match type_mapping {
                    Some(dt) if !dt.starts_with('@') => {
                        ctx.expand_iri(dt, true).unwrap_or_else(|| dt.to_string())
                    }
                    _ if n.is_i64() || n.is_u64() => XSD_INTEGER.to_string(),
                    _ => XSD_DOUBLE.to_string(),
                };
                let lexical = if datatype == XSD_DOUBLE {
                    n.as_f64()
                        .map(|f| Literal::double(f).lexical().to_string())
                        .unwrap_or_else(|| n.to_string())
                } else {
                    n.to_string()
                };
                Term::Literal(Literal::new_typed(lexical, datatype))
            }
            Value::Object(obj) => {
                if obj.contains_key("@value") {
                    match self.value_object(obj, ctx, key)? {
                        Some(term) => term,
                        None => return Ok(Vec::new()),
                    }
                } else if let Some(list) = obj.get("@list") {
                    self.list(as_items(list), ctx, None, key, depth)?
                } else if let Some(set) = obj.get("@set") {
                    return self.objects(set, ctx, def, key, depth + 1);
                } else {
                    self.node(obj, ctx, depth + 1)?
                }
            }
        };
        Ok(vec![term])
    }

    fn value_object(
        &self,
        obj: &Map<String, Value>,
        ctx: &ActiveContext,
        key: &str,
    ) -> Result<Option<Term>, JsonLdError> {
        let lexical = match obj.get("@value") {
            Some(Value::Null) | None => return Ok(None),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(JsonLdError::InvalidValue {
                    key: key.to_string(),
                    message: "@value must be a scalar".to_string(),
                });
            }
        };
        let ty = obj.get("@type").and_then(Value::as_str);
        let lang = obj.get("@language").and_then(Value::as_str);
        let literal = match (ty, lang) {
            (Some(_), Some(_)) => {
                return Err(JsonLdError::InvalidValue {
                    key: key.to_string(),
                    message: "@language cannot be used with @type".to_string(),
                });
            }
            (Some(ty), None) => Literal::new_typed(
                lexical,
                ctx.expand_iri(ty, true).unwrap_or_else(|| ty.to_string()),
            ),
            (None, Some(lang)) => Literal::new_lang(lexical, lang),
            (None, None) => match obj.get("@value") {
                Some(Value::Bool(b)) => Literal::boolean(*b),
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
                    Literal::new_typed(lexical, XSD_INTEGER)
                }
                Some(Value::Number(_)) => Literal::new_typed(lexical, XSD_DOUBLE),
                _ => Literal::new_simple(lexical),
            },
        };
        Ok(Some(Term::Literal(literal)))
    }

    /// Emit an RDF collection and return its head.
    fn list(
        &mut self,
        items: Vec<&Value>,
        ctx: &ActiveContext,
        def: Option<&TermDefinition>,
        key: &str,
        depth: usize,
    ) -> Result<Term, JsonLdError> {
        let mut members = Vec::new();
        for item in items {
            members.extend(self.objects(item, ctx, def, key, depth + 1)?);
        }
        let mut head = Term::iri(RDF_NIL);
        for member in members.into_iter().rev() {
            let cell = self.fresh_blank();
            self.emit(cell.clone(), Term::iri(RDF_FIRST), member);
            self.emit(cell.clone(), Term::iri(RDF_REST), head);
            head = cell;
        }
        Ok(head)
    }

    fn emit(&mut self, subject: Term, predicate: Term, object: Term) {
        let triple = Triple::new(subject, predicate, object);
        if triple.is_well_formed() {
            self.triples.push(triple);
        }
    }
}

fn as_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Vec<Triple> {
        parse_jsonld(text, &JsonLdOptions::default()).unwrap()
    }

    #[test]
    fn join_follows_hash_and_slash_bases() {
        assert_eq!(join("http://x/a#", "Thing"), "http://x/a#Thing");
        assert_eq!(join("http://x/a/", "Thing"), "http://x/a/Thing");
        assert_eq!(join("http://x/a/b", "c"), "http://x/a/c");
        assert_eq!(join("http://x/a#", "#frag"), "http://x/a#frag");
        assert_eq!(join("http://x/a#", "https://o/y"), "https://o/y");
    }

    #[test]
    fn prefix_parsing_rejects_absolute_iris() {
        assert_eq!(parse_prefix("owl:Class"), Some(("owl", "Class")));
        assert_eq!(parse_prefix("http://x/y"), None);
        assert_eq!(parse_prefix("plain"), None);
        assert!(is_absolute("urn:isbn:1"));
        assert!(!is_absolute("Thing"));
    }

    #[test]
    fn class_declaration_with_context_array() {
        let triples = read(
            r#"{
              "@context": [
                {"@version": 1.1, "owl": "http://www.w3.org/2002/07/owl#",
                 "rdfs": "http://www.w3.org/2000/01/rdf-schema#"},
                {"@base": "http://localhost:8080/ontology/a#"}
              ],
              "@graph": [{"@id": "Thing", "@type": "owl:Class"}]
            }"#,
        );
        assert_eq!(triples.len(), 1);
        assert_eq!(
            triples[0].subject,
            Term::iri("http://localhost:8080/ontology/a#Thing")
        );
        assert_eq!(triples[0].predicate, Term::iri(RDF_TYPE));
        assert_eq!(
            triples[0].object,
            Term::iri("http://www.w3.org/2002/07/owl#Class")
        );
    }

    #[test]
    fn term_definitions_and_value_objects() {
        let triples = read(
            r#"{
              "@context": {
                "ex": "http://example.org/",
                "knows": {"@id": "ex:knows", "@type": "@id"},
                "age": {"@id": "ex:age", "@type": "http://www.w3.org/2001/XMLSchema#integer"}
              },
              "@id": "ex:alice",
              "knows": "ex:bob",
              "age": "30",
              "ex:name": {"@value": "Alice", "@language": "EN"},
              "ex:score": 1.5,
              "ex:active": true
            }"#,
        );
        assert_eq!(triples.len(), 5);
        assert!(triples.iter().any(|t| t.object == Term::iri("http://example.org/bob")));
        assert!(
            triples
                .iter()
                .any(|t| t.object == Term::Literal(Literal::new_typed("30", XSD_INTEGER)))
        );
        assert!(
            triples
                .iter()
                .any(|t| t.object == Term::Literal(Literal::new_lang("Alice", "en")))
        );
    }

    #[test]
    fn nested_nodes_and_lists() {
        let triples = read(
            r#"{
              "@context": {"ex": "http://example.org/"},
              "@id": "ex:s",
              "ex:child": {"ex:name": "kid"},
              "ex:items": {"@list": ["a", "b"]}
            }"#,
        );
        // child link + child name + two list cells with first/rest + items link
        assert_eq!(triples.len(), 7);
        assert!(triples.iter().any(|t| t.object == Term::iri(RDF_NIL)));
    }

    #[test]
    fn unmapped_properties_are_dropped() {
        let triples = read(r#"{"@id": "http://x/s", "plain": "value"}"#);
        assert!(triples.is_empty());
    }

    #[test]
    fn blank_nodes_are_scoped() {
        let opts = JsonLdOptions {
            blank_scope: "d1_".to_string(),
            ..JsonLdOptions::default()
        };
        let triples = parse_jsonld(
            r#"{"@id": "_:n", "http://x/p": {"@id": "_:n"}}"#,
            &opts,
        )
        .unwrap();
        assert_eq!(triples[0].subject, Term::blank("d1_n"));
        assert_eq!(triples[0].object, Term::blank("d1_n"));
    }

    #[test]
    fn remote_contexts_need_a_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("context.jsonld"),
            r#"{"@context": {"name": "http://x/v#name"}}"#,
        )
        .unwrap();
        let opts = JsonLdOptions {
            base_dir: Some(dir.path().to_path_buf()),
            shared_contexts: vec!["https://mirror.example/context.jsonld".to_string()],
            ..JsonLdOptions::default()
        };
        for url in [LOCALHOST_CONTEXT_URL, "https://mirror.example/context.jsonld"] {
            let text = format!(r#"{{"@context": "{url}", "@id": "http://x/s", "name": "n"}}"#);
            let triples = parse_jsonld(&text, &opts).unwrap();
            assert_eq!(triples.len(), 1, "{url}");
        }
        let err = parse_jsonld(
            r#"{"@context": "https://other.example/context.jsonld", "@id": "http://x/s"}"#,
            &opts,
        )
        .unwrap_err();
        assert!(matches!(err, JsonLdError::InvalidContext(_)));
        let err = parse_jsonld(
            &format!(r#"{{"@context": "{PRODUCTION_CONTEXT_URL}", "@id": "http://x/s"}}"#),
            &JsonLdOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JsonLdError::InvalidContext(_)));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = parse_jsonld("{not json", &JsonLdOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON-LD (malformed JSON)"));
    }
}
