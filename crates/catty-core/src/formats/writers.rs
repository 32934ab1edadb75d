//! # Graph Writers
//!
//! Turtle (grouped by subject) and expanded JSON-LD output for graph-shaped
//! results and dataset exports.

use crate::primitives::{RDF_TYPE, XSD_STRING};
use crate::types::{CattyError, Literal, Term, Triple, escape_literal};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Prefixes emitted at the top of Turtle output.
const TURTLE_PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("dct", "http://purl.org/dc/terms/"),
];

// =============================================================================
// TURTLE
// =============================================================================

/// Write triples as Turtle, one block per subject.
#[must_use]
pub fn write_turtle(triples: &[Triple]) -> String {
    let mut out = String::new();
    for (prefix, ns) in TURTLE_PREFIXES {
        out.push_str(&format!("@prefix {}: <{}> .\n", prefix, ns));
    }

    let mut by_subject: BTreeMap<&Term, BTreeMap<&Term, Vec<&Term>>> = BTreeMap::new();
    for t in triples {
        by_subject
            .entry(&t.subject)
            .or_default()
            .entry(&t.predicate)
            .or_default()
            .push(&t.object);
    }

    for (subject, predicates) in by_subject {
        out.push('\n');
        out.push_str(&turtle_term(subject));
        let mut first = true;
        for (predicate, objects) in predicates {
            out.push_str(if first { " " } else { " ;\n    " });
            first = false;
            if predicate.value() == RDF_TYPE {
                out.push('a');
            } else {
                out.push_str(&turtle_term(predicate));
            }
            out.push(' ');
            let rendered: Vec<String> = objects.into_iter().map(turtle_term).collect();
            out.push_str(&rendered.join(", "));
        }
        out.push_str(" .\n");
    }
    out
}

fn turtle_term(term: &Term) -> String {
    match term {
        Term::Iri(iri) => compact(iri).unwrap_or_else(|| format!("<{}>", iri)),
        Term::Blank(label) => format!("_:{}", label),
        Term::Literal(lit) => turtle_literal(lit),
    }
}

fn turtle_literal(lit: &Literal) -> String {
    let quoted = format!("\"{}\"", escape_literal(lit.lexical()));
    if let Some(lang) = lit.language() {
        return format!("{}@{}", quoted, lang);
    }
    if lit.datatype() == XSD_STRING {
        return quoted;
    }
    let datatype = compact(lit.datatype()).unwrap_or_else(|| format!("<{}>", lit.datatype()));
    format!("{}^^{}", quoted, datatype)
}

/// Prefixed name for an IRI when the local part is a plain name.
fn compact(iri: &str) -> Option<String> {
    TURTLE_PREFIXES.iter().find_map(|(prefix, ns)| {
        let local = iri.strip_prefix(ns)?;
        let mut chars = local.chars();
        let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        (head_ok && tail_ok).then(|| format!("{}:{}", prefix, local))
    })
}

// =============================================================================
// JSON-LD
// =============================================================================

/// Write triples as an expanded JSON-LD array of node objects.
pub fn write_jsonld(triples: &[Triple]) -> Result<String, CattyError> {
    let mut nodes: BTreeMap<&Term, Map<String, Value>> = BTreeMap::new();
    for t in triples {
        let node = nodes.entry(&t.subject).or_insert_with(|| {
            let mut m = Map::new();
            m.insert("@id".to_string(), Value::String(node_id(&t.subject)));
            m
        });
        if t.predicate.value() == RDF_TYPE && !t.object.is_literal() {
            push_value(node, "@type", Value::String(node_id(&t.object)));
            continue;
        }
        let value = match &t.object {
            Term::Literal(lit) => {
                let mut v = Map::new();
                v.insert("@value".to_string(), Value::String(lit.lexical().to_string()));
                if let Some(lang) = lit.language() {
                    v.insert("@language".to_string(), Value::String(lang.to_string()));
                } else if lit.datatype() != XSD_STRING {
                    v.insert("@type".to_string(), Value::String(lit.datatype().to_string()));
                }
                Value::Object(v)
            }
            other => json!({ "@id": node_id(other) }),
        };
        push_value(node, t.predicate.value(), value);
    }
    let doc = Value::Array(nodes.into_values().map(Value::Object).collect());
    serde_json::to_string_pretty(&doc).map_err(|e| CattyError::Serialization(e.to_string()))
}

fn node_id(term: &Term) -> String {
    match term {
        Term::Blank(label) => format!("_:{}", label),
        other => other.value().to_string(),
    }
}

fn push_value(node: &mut Map<String, Value>, key: &str, value: Value) {
    match node.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            node.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::jsonld::{JsonLdOptions, parse_jsonld};

    fn sample() -> Vec<Triple> {
        vec![
            Triple::new(
                Term::iri("http://x/a#Thing"),
                Term::iri(RDF_TYPE),
                Term::iri("http://www.w3.org/2002/07/owl#Class"),
            ),
            Triple::new(
                Term::iri("http://x/a#Thing"),
                Term::iri("http://www.w3.org/2000/01/rdf-schema#label"),
                Term::Literal(Literal::new_lang("Thing", "en")),
            ),
        ]
    }

    #[test]
    fn turtle_groups_by_subject() {
        let ttl = write_turtle(&sample());
        assert!(ttl.contains("<http://x/a#Thing> a owl:Class ;"));
        assert!(ttl.contains("rdfs:label \"Thing\"@en ."));
        assert_eq!(ttl.matches("<http://x/a#Thing>").count(), 1);
    }

    #[test]
    fn jsonld_output_reads_back() {
        let text = write_jsonld(&sample()).unwrap();
        let mut back = parse_jsonld(&text, &JsonLdOptions::default()).unwrap();
        back.sort();
        let mut expected = sample();
        expected.sort();
        assert_eq!(back, expected);
    }
}
