//! # Query Results
//!
//! The two result shapes and their serializations.
//!
//! - `Bindings`: variables plus rows, for SELECT and ASK
//! - `Graph`: a triple set, for CONSTRUCT and DESCRIBE
//!
//! Bindings serialize to the W3C result formats (JSON, XML, CSV, TSV).
//! Graphs go through `RdfFormat` instead; asking for a results format on a
//! graph is an `UnsupportedOperation`.

use crate::primitives::XSD_STRING;
use crate::types::{CattyError, Literal, Term, Triple, escape_literal};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Column name of the single row returned for ASK.
pub const BOOLEAN_COLUMN: &str = "boolean";

// =============================================================================
// RESULT SHAPES
// =============================================================================

/// Tabular result: ordered variable names and rows of bound values.
///
/// A row omits variables that are unbound in that solution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Bindings {
    pub variables: Vec<String>,
    pub rows: Vec<BTreeMap<String, Term>>,
}

impl Bindings {
    /// The single-row, single-column result of an ASK query.
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self {
            variables: vec![BOOLEAN_COLUMN.to_string()],
            rows: vec![BTreeMap::from([(
                BOOLEAN_COLUMN.to_string(),
                Term::Literal(Literal::boolean(value)),
            )])],
        }
    }

    /// Value of a boolean-shaped result, if this is one.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        if self.variables.len() != 1 || self.rows.len() != 1 {
            return None;
        }
        self.rows[0]
            .get(&self.variables[0])?
            .as_literal()?
            .as_bool()
    }
}

/// Result of a query: exactly one shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Bindings(Bindings),
    Graph(Vec<Triple>),
}

impl QueryResult {
    /// Borrow the bindings, if this is a tabular result.
    #[must_use]
    pub fn bindings(&self) -> Option<&Bindings> {
        match self {
            Self::Bindings(b) => Some(b),
            Self::Graph(_) => None,
        }
    }

    /// Borrow the triples, if this is a graph result.
    #[must_use]
    pub fn graph(&self) -> Option<&[Triple]> {
        match self {
            Self::Graph(g) => Some(g),
            Self::Bindings(_) => None,
        }
    }
}

// =============================================================================
// FORMATS
// =============================================================================

/// Serialization formats for tabular results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    #[default]
    Json,
    Xml,
    Csv,
    Tsv,
}

impl ResultFormat {
    /// Parse a format token; `None` for unknown tokens.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "json" | "srj" | "application/sparql-results+json" => Some(Self::Json),
            "xml" | "srx" | "application/sparql-results+xml" => Some(Self::Xml),
            "csv" | "text/csv" => Some(Self::Csv),
            "tsv" | "text/tab-separated-values" => Some(Self::Tsv),
            _ => None,
        }
    }

    /// MIME type of the format.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/sparql-results+json",
            Self::Xml => "application/sparql-results+xml",
            Self::Csv => "text/csv",
            Self::Tsv => "text/tab-separated-values",
        }
    }
}

/// Serialize a tabular result.
///
/// Fails with `UnsupportedOperation` for graph results.
pub fn serialize(result: &QueryResult, format: ResultFormat) -> Result<String, CattyError> {
    let QueryResult::Bindings(bindings) = result else {
        return Err(CattyError::UnsupportedOperation(
            "Cannot serialize construct results as SPARQL results - use RDF serialization"
                .to_string(),
        ));
    };
    match format {
        ResultFormat::Json => serde_json::to_string_pretty(&to_json(bindings))
            .map_err(|e| CattyError::Serialization(e.to_string())),
        ResultFormat::Xml => Ok(to_xml(bindings)),
        ResultFormat::Csv => Ok(to_csv(bindings)),
        ResultFormat::Tsv => Ok(to_tsv(bindings)),
    }
}

fn term_json(term: &Term) -> Value {
    match term {
        Term::Iri(iri) => json!({ "type": "uri", "value": iri }),
        Term::Blank(label) => json!({ "type": "bnode", "value": label }),
        Term::Literal(lit) => {
            let mut obj = Map::new();
            obj.insert("type".into(), json!("literal"));
            obj.insert("value".into(), json!(lit.lexical()));
            if let Some(lang) = lit.language() {
                obj.insert("xml:lang".into(), json!(lang));
            } else if lit.datatype() != XSD_STRING {
                obj.insert("datatype".into(), json!(lit.datatype()));
            }
            Value::Object(obj)
        }
    }
}

/// The SPARQL JSON results document for a tabular result.
#[must_use]
pub fn to_json(bindings: &Bindings) -> Value {
    let rows: Vec<Value> = bindings
        .rows
        .iter()
        .map(|row| {
            Value::Object(
                row.iter()
                    .map(|(k, v)| (k.clone(), term_json(v)))
                    .collect(),
            )
        })
        .collect();
    json!({
        "head": { "vars": bindings.variables },
        "results": { "bindings": rows },
    })
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn to_xml(bindings: &Bindings) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\"?>\n<sparql xmlns=\"http://www.w3.org/2005/sparql-results#\">\n  <head>\n",
    );
    for var in &bindings.variables {
        let _ = writeln!(out, "    <variable name=\"{}\"/>", xml_escape(var));
    }
    out.push_str("  </head>\n  <results>\n");
    for row in &bindings.rows {
        out.push_str("    <result>\n");
        for var in &bindings.variables {
            let Some(term) = row.get(var) else {
                continue;
            };
            let value = match term {
                Term::Iri(iri) => format!("<uri>{}</uri>", xml_escape(iri)),
                Term::Blank(label) => format!("<bnode>{}</bnode>", xml_escape(label)),
                Term::Literal(lit) => match lit.language() {
                    Some(lang) => format!(
                        "<literal xml:lang=\"{}\">{}</literal>",
                        xml_escape(lang),
                        xml_escape(lit.lexical())
                    ),
                    None if lit.datatype() != XSD_STRING => format!(
                        "<literal datatype=\"{}\">{}</literal>",
                        xml_escape(lit.datatype()),
                        xml_escape(lit.lexical())
                    ),
                    None => format!("<literal>{}</literal>", xml_escape(lit.lexical())),
                },
            };
            let _ = writeln!(
                out,
                "      <binding name=\"{}\">{}</binding>",
                xml_escape(var),
                value
            );
        }
        out.push_str("    </result>\n");
    }
    out.push_str("  </results>\n</sparql>\n");
    out
}

fn csv_field(term: Option<&Term>) -> String {
    let value = match term {
        None => return String::new(),
        Some(Term::Blank(label)) => format!("_:{}", label),
        Some(other) => other.value().to_string(),
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

fn to_csv(bindings: &Bindings) -> String {
    let mut out = bindings.variables.join(",");
    out.push_str("\r\n");
    for row in &bindings.rows {
        let fields: Vec<String> = bindings
            .variables
            .iter()
            .map(|v| csv_field(row.get(v)))
            .collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

fn to_tsv(bindings: &Bindings) -> String {
    let header: Vec<String> = bindings.variables.iter().map(|v| format!("?{}", v)).collect();
    let mut out = header.join("\t");
    out.push('\n');
    for row in &bindings.rows {
        let fields: Vec<String> = bindings
            .variables
            .iter()
            .map(|v| match row.get(v) {
                None => String::new(),
                Some(Term::Literal(lit)) if lit.is_simple() => {
                    format!("\"{}\"", escape_literal(lit.lexical()).replace('\t', "\\t"))
                }
                Some(term) => term.to_string(),
            })
            .collect();
        out.push_str(&fields.join("\t"));
        out.push('\n');
    }
    out
}

// =============================================================================
// JSON RESULTS READER
// =============================================================================

fn malformed(message: &str) -> CattyError {
    CattyError::Serialization(format!("Malformed SPARQL JSON results: {}", message))
}

/// Parse a SPARQL JSON results document (SELECT or ASK).
pub fn parse_json_results(text: &str) -> Result<Bindings, CattyError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| malformed(&e.to_string()))?;
    if let Some(value) = doc.get(BOOLEAN_COLUMN).and_then(Value::as_bool) {
        return Ok(Bindings::boolean(value));
    }
    let variables = doc
        .pointer("/head/vars")
        .and_then(Value::as_array)
        .map(|vars| {
            vars.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let rows = doc
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing results.bindings"))?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let obj = row
            .as_object()
            .ok_or_else(|| malformed("binding is not an object"))?;
        let mut parsed = BTreeMap::new();
        for (var, value) in obj {
            parsed.insert(var.clone(), parse_term(value)?);
        }
        out.push(parsed);
    }
    Ok(Bindings {
        variables,
        rows: out,
    })
}

fn parse_term(value: &Value) -> Result<Term, CattyError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("term without type"))?;
    let text = value
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("term without value"))?;
    Ok(match kind {
        "uri" => Term::iri(text),
        "bnode" => Term::blank(text),
        "literal" | "typed-literal" => {
            if let Some(lang) = value.get("xml:lang").and_then(Value::as_str) {
                Term::Literal(Literal::new_lang(text, lang))
            } else if let Some(datatype) = value.get("datatype").and_then(Value::as_str) {
                Term::Literal(Literal::new_typed(text, datatype))
            } else {
                Term::literal(text)
            }
        }
        other => return Err(malformed(&format!("unknown term type '{}'", other))),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::XSD_BOOLEAN;

    fn sample() -> Bindings {
        Bindings {
            variables: vec!["s".into(), "label".into()],
            rows: vec![
                BTreeMap::from([
                    ("s".to_string(), Term::iri("http://x/a")),
                    ("label".to_string(), Term::literal("a, \"b\"")),
                ]),
                BTreeMap::from([("s".to_string(), Term::blank("n1"))]),
            ],
        }
    }

    #[test]
    fn graph_results_refuse_tabular_formats() {
        let err = serialize(&QueryResult::Graph(Vec::new()), ResultFormat::Json).unwrap_err();
        match err {
            CattyError::UnsupportedOperation(msg) => assert!(msg.contains("RDF serialization")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn csv_quotes_and_leaves_unbound_empty() {
        let csv = serialize(&QueryResult::Bindings(sample()), ResultFormat::Csv).unwrap();
        assert_eq!(csv, "s,label\r\nhttp://x/a,\"a, \"\"b\"\"\"\r\n_:n1,\r\n");
    }

    #[test]
    fn tsv_uses_term_syntax() {
        let tsv = serialize(&QueryResult::Bindings(sample()), ResultFormat::Tsv).unwrap();
        assert!(tsv.starts_with("?s\t?label\n<http://x/a>\t\"a, \\\"b\\\"\"\n"));
    }

    #[test]
    fn xml_escapes_values() {
        let xml = serialize(&QueryResult::Bindings(sample()), ResultFormat::Xml).unwrap();
        assert!(xml.contains("<binding name=\"label\"><literal>a, &quot;b&quot;</literal></binding>"));
        assert!(xml.contains("<bnode>n1</bnode>"));
    }

    #[test]
    fn json_round_trips_through_reader() {
        let result = QueryResult::Bindings(sample());
        let text = serialize(&result, ResultFormat::Json).unwrap();
        assert_eq!(parse_json_results(&text).unwrap(), sample());
    }

    #[test]
    fn boolean_results() {
        let parsed = parse_json_results(r#"{"head":{},"boolean":true}"#).unwrap();
        assert_eq!(parsed.as_boolean(), Some(true));
        let ask = Bindings::boolean(false);
        assert_eq!(ask.rows[0][BOOLEAN_COLUMN].as_literal().unwrap().datatype(), XSD_BOOLEAN);
    }

    #[test]
    fn malformed_results_are_errors() {
        assert!(parse_json_results("{").is_err());
        assert!(parse_json_results(r#"{"head":{"vars":[]}}"#).is_err());
    }

    #[test]
    fn format_tokens() {
        assert_eq!(ResultFormat::from_token("TSV"), Some(ResultFormat::Tsv));
        assert_eq!(ResultFormat::from_token("yaml"), None);
    }
}
