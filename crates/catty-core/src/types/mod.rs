//! # Core Type Definitions
//!
//! This module contains the RDF data model shared by every Catty component:
//! - Terms (`Term`, `Literal`) and statements (`Triple`)
//! - Graph addressing (`GraphName`)
//! - Error types (`CattyError`)
//!
//! ## Ordering Guarantees
//!
//! All types in this module implement `Ord`, so they can live in
//! `BTreeMap`/`BTreeSet` indices and produce stable output ordering.

use crate::iri::SafetyReport;
use crate::primitives::{RDF_LANG_STRING, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER, XSD_STRING};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// LITERAL
// =============================================================================

/// An RDF literal: a lexical form plus either a datatype or a language tag.
///
/// Language-tagged literals always carry `rdf:langString` as datatype.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    lexical: String,
    datatype: String,
    language: Option<String>,
}

impl Literal {
    /// Create a simple (`xsd:string`) literal.
    #[must_use]
    pub fn new_simple(value: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: XSD_STRING.to_string(),
            language: None,
        }
    }

    /// Create a literal with an explicit datatype IRI.
    #[must_use]
    pub fn new_typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: datatype.into(),
            language: None,
        }
    }

    /// Create a language-tagged literal. The tag is lower-cased.
    #[must_use]
    pub fn new_lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: RDF_LANG_STRING.to_string(),
            language: Some(language.into().to_ascii_lowercase()),
        }
    }

    /// Create an `xsd:integer` literal.
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::new_typed(value.to_string(), XSD_INTEGER)
    }

    /// Create an `xsd:boolean` literal.
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::new_typed(if value { "true" } else { "false" }, XSD_BOOLEAN)
    }

    /// Create an `xsd:double` literal in canonical exponent form.
    #[must_use]
    pub fn double(value: f64) -> Self {
        Self::new_typed(format!("{:E}", value), XSD_DOUBLE)
    }

    /// Create an `xsd:decimal` literal.
    #[must_use]
    pub fn decimal(value: f64) -> Self {
        let mut lexical = format!("{}", value);
        if !lexical.contains('.') && !lexical.contains("inf") && !lexical.contains("NaN") {
            lexical.push_str(".0");
        }
        Self::new_typed(lexical, XSD_DECIMAL)
    }

    /// The lexical form.
    #[must_use]
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// The datatype IRI.
    #[must_use]
    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    /// The language tag, if any.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// True for plain `xsd:string` literals (no language tag).
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.language.is_none() && self.datatype == XSD_STRING
    }

    /// True if the datatype is one of the numeric XSD types.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        crate::primitives::is_numeric_datatype(&self.datatype)
    }

    /// Numeric value of the literal if it has a numeric datatype and a
    /// parsable lexical form.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        if !self.is_numeric() {
            return None;
        }
        self.lexical.trim().parse::<f64>().ok()
    }

    /// Integer value of the literal if it is an integer-derived type.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        if !crate::primitives::is_integer_datatype(&self.datatype) {
            return None;
        }
        self.lexical.trim().trim_start_matches('+').parse::<i64>().ok()
    }

    /// Boolean value of an `xsd:boolean` literal.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if self.datatype != XSD_BOOLEAN {
            return None;
        }
        match self.lexical.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape_literal(&self.lexical))?;
        if let Some(lang) = &self.language {
            write!(f, "@{}", lang)
        } else if self.datatype != XSD_STRING {
            write!(f, "^^<{}>", self.datatype)
        } else {
            Ok(())
        }
    }
}

/// Escape a lexical form for N-Triples / query output.
#[must_use]
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// TERM
// =============================================================================

/// An RDF term.
///
/// The variant order defines the ordering used by `ORDER BY` for terms of
/// different kinds: blank nodes, then IRIs, then literals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Blank node, stored without the `_:` prefix.
    Blank(String),
    /// Absolute (or at least resolved) IRI.
    Iri(String),
    /// Literal value.
    Literal(Literal),
}

impl Term {
    /// Create an IRI term.
    #[must_use]
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    /// Create a blank node term.
    #[must_use]
    pub fn blank(label: impl Into<String>) -> Self {
        Self::Blank(label.into())
    }

    /// Create a simple string literal term.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(Literal::new_simple(value))
    }

    /// True if this term is an IRI.
    #[must_use]
    pub fn is_iri(&self) -> bool {
        matches!(self, Self::Iri(_))
    }

    /// True if this term is a blank node.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    /// True if this term is a literal.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Borrow the literal, if this term is one.
    #[must_use]
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// The bare value: IRI text, blank label or literal lexical form.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(iri) => iri,
            Self::Blank(label) => label,
            Self::Literal(lit) => lit.lexical(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{}>", iri),
            Self::Blank(label) => write!(f, "_:{}", label),
            Self::Literal(lit) => lit.fmt(f),
        }
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

// =============================================================================
// TRIPLE
// =============================================================================

/// A subject–predicate–object statement.
///
/// Well-formedness (non-literal subject, IRI predicate) is checked by
/// [`Triple::is_well_formed`]; the store refuses ill-formed triples.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    /// Create a new triple.
    #[must_use]
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// True if the subject is not a literal and the predicate is an IRI.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.subject.is_literal() && self.predicate.is_iri()
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

// =============================================================================
// GRAPH NAME
// =============================================================================

/// Address of a graph inside the dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GraphName {
    /// The unnamed default graph.
    Default,
    /// A named graph identified by its IRI.
    Named(String),
}

impl GraphName {
    /// Create a named graph address.
    #[must_use]
    pub fn named(iri: impl Into<String>) -> Self {
        Self::Named(iri.into())
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "DEFAULT"),
            Self::Named(iri) => write!(f, "<{}>", iri),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Catty core.
///
/// - `Config` and `Load` are fatal at startup
/// - `QuerySyntax`, `UnsupportedQuery`, `Evaluation` are per request and
///   never touch store state
/// - `Update` is reported after the write transaction rolled back
/// - `Rejected` carries the safety report of a refused document
#[derive(Debug, Error)]
pub enum CattyError {
    /// The registry file is missing, malformed or incomplete.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A graph file is missing or cannot be parsed.
    #[error("Load error: {0}")]
    Load(String),

    /// The query text is malformed.
    #[error("Query syntax error at line {line}, column {column}: {message}")]
    QuerySyntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// The query form is not one of the supported forms.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Evaluation failed after parsing (e.g. resource limits).
    #[error("Query evaluation error: {0}")]
    Evaluation(String),

    /// An update failed and was rolled back.
    #[error("Update failed: {0}")]
    Update(String),

    /// The operation does not apply to this value.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A document failed the IRI safety gate.
    #[error("Document rejected: {}", .0.errors.join("; "))]
    Rejected(SafetyReport),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_display_forms() {
        assert_eq!(Literal::new_simple("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Literal::new_lang("chat", "FR").to_string(), "\"chat\"@fr");
        assert_eq!(
            Literal::integer(3).to_string(),
            "\"3\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
    }

    #[test]
    fn numeric_accessors() {
        assert_eq!(Literal::integer(42).as_i64(), Some(42));
        assert_eq!(Literal::decimal(1.5).as_f64(), Some(1.5));
        assert_eq!(Literal::decimal(2.0).lexical(), "2.0");
        assert!(Literal::new_simple("42").as_f64().is_none());
        assert_eq!(Literal::boolean(true).as_bool(), Some(true));
    }

    #[test]
    fn term_ordering_blank_iri_literal() {
        let mut terms = vec![Term::literal("x"), Term::iri("http://a"), Term::blank("b")];
        terms.sort();
        assert!(terms[0].is_blank());
        assert!(terms[1].is_iri());
        assert!(terms[2].is_literal());
    }

    #[test]
    fn triple_well_formedness() {
        let ok = Triple::new(Term::iri("s"), Term::iri("p"), Term::literal("o"));
        assert!(ok.is_well_formed());
        let bad = Triple::new(Term::literal("s"), Term::iri("p"), Term::literal("o"));
        assert!(!bad.is_well_formed());
    }
}
