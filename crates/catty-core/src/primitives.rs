//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Catty core.
//!
//! These values are compiled into the binary and are immutable at runtime:
//! vocabulary IRIs, the shared context locations used by the rebinder, the
//! allow-lists used by the safety validator and evaluation limits.

// =============================================================================
// VOCABULARY
// =============================================================================

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";

/// Integer-derived XSD datatypes (local names).
const INTEGER_TYPES: &[&str] = &[
    "integer",
    "int",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "positiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
];

/// True if the datatype IRI is an integer-derived XSD type.
#[must_use]
pub fn is_integer_datatype(datatype: &str) -> bool {
    datatype
        .strip_prefix(XSD_NS)
        .is_some_and(|local| INTEGER_TYPES.contains(&local))
}

/// True if the datatype IRI is any numeric XSD type.
#[must_use]
pub fn is_numeric_datatype(datatype: &str) -> bool {
    is_integer_datatype(datatype)
        || datatype == XSD_DECIMAL
        || datatype == XSD_DOUBLE
        || datatype == XSD_FLOAT
}

// =============================================================================
// SHARED CONTEXT RESOURCE
// =============================================================================

/// Development location of the shared JSON-LD context.
pub const LOCALHOST_CONTEXT_URL: &str = "http://localhost:8080/ontology/context.jsonld";

/// Published location of the shared JSON-LD context.
pub const PRODUCTION_CONTEXT_URL: &str =
    "https://metavacua.github.io/CategoricalReasoner/ontology/context.jsonld";

/// File name of the shared context, next to the ontology files.
pub const SHARED_CONTEXT_FILE: &str = "context.jsonld";

/// Relative references to the shared context that documents may carry.
pub const RELATIVE_CONTEXT_REFS: &[&str] = &["./context.jsonld", "context.jsonld"];

// =============================================================================
// SAFETY ALLOW-LISTS
// =============================================================================

/// External authorities trusted for absolute `@id` values.
///
/// Each host is accepted under both `http://` and `https://`.
pub const TRUSTED_HOSTS: &[&str] = &[
    "www.w3.org/",
    "purl.org/",
    "dbpedia.org/",
    "www.wikidata.org/",
    "doi.org/",
    "arxiv.org/",
    "en.wikipedia.org/",
    "metavacua.github.io/",
];

/// Absolute prefixes trusted under a single scheme only.
pub const TRUSTED_EXACT_PREFIXES: &[&str] = &["https://ncatlab.org/"];

/// Prefixes accepted in compact `@id` values (`prefix:local`).
pub const ALLOWED_COMPACT_PREFIXES: &[&str] = &[
    "catty", "lao", "mc", "lattice", "ch", "ex", "cit", "cu", "owl", "rdf", "rdfs", "xsd", "dct",
    "prov", "bibo", "skos", "dbo", "wd", "math",
];

// =============================================================================
// DEFAULT LOCATIONS
// =============================================================================

/// Registry location relative to the repository root.
pub const REGISTRY_RELATIVE_PATH: &str = ".catty/iri-config.yaml";

// =============================================================================
// EVALUATION LIMITS
// =============================================================================

/// Maximum number of intermediate solutions a single query may produce.
///
/// Evaluation fails with `CattyError::Evaluation` beyond this bound.
pub const MAX_SOLUTIONS: usize = 1_000_000;

/// Maximum number of hops explored by `*`/`+` property paths.
pub const MAX_PATH_DEPTH: usize = 256;

/// Maximum length of a query or update text.
pub const MAX_QUERY_LENGTH: usize = 1 << 20;

/// Maximum nesting of groups, expressions, blank nodes and paths in a query.
///
/// Parsing fails with `CattyError::QuerySyntax` beyond this bound, which
/// also bounds recursion in the evaluator.
pub const MAX_QUERY_DEPTH: usize = 32;

/// Maximum JSON-LD nesting depth accepted by the reader and validator.
pub const MAX_DOCUMENT_DEPTH: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_types_are_numeric() {
        assert!(is_integer_datatype(XSD_INTEGER));
        assert!(is_numeric_datatype(XSD_INTEGER));
        assert!(is_numeric_datatype(XSD_DOUBLE));
        assert!(!is_numeric_datatype(XSD_STRING));
        assert!(!is_integer_datatype("http://example.org/integer"));
    }

    #[test]
    fn compact_prefixes_contain_core_vocabularies() {
        for p in ["owl", "rdf", "rdfs", "xsd", "catty"] {
            assert!(ALLOWED_COMPACT_PREFIXES.contains(&p));
        }
    }
}
