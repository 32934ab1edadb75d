//! # IRI Rebinder
//!
//! Rewrites a document's identifiers between the development and
//! production namespaces.
//!
//! Substitution pairs come from the registry plus the shared context
//! references. They are sorted by source length, longest first, and applied
//! in a single left-to-right pass: at each position the longest matching
//! source wins and replaced text is never scanned again.
//!
//! This is a text transform, not a structural rewrite. When development and
//! production identifiers overlap as substrings, rebinding there and back
//! is not guaranteed to restore the original text.

use crate::primitives::{LOCALHOST_CONTEXT_URL, PRODUCTION_CONTEXT_URL, RELATIVE_CONTEXT_REFS};
use crate::registry::Registry;
use crate::types::CattyError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a rebind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebindTarget {
    #[serde(alias = "prod")]
    Production,
    #[serde(alias = "dev")]
    Development,
}

impl RebindTarget {
    /// Parse `production|prod` or `development|dev`.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "development" | "dev" | "localhost" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Precomputed substitution pairs for one direction.
#[derive(Debug, Clone)]
pub struct IriRebinder {
    target: RebindTarget,
    pairs: Vec<(String, String)>,
    lookup: BTreeMap<String, String>,
    matcher: Regex,
}

impl IriRebinder {
    /// Build the rebinder for `target` from the registry.
    pub fn new(registry: &Registry, target: RebindTarget) -> Result<Self, CattyError> {
        let context_to = match target {
            RebindTarget::Production => PRODUCTION_CONTEXT_URL,
            RebindTarget::Development => LOCALHOST_CONTEXT_URL,
        };
        let context_from = match target {
            RebindTarget::Production => LOCALHOST_CONTEXT_URL,
            RebindTarget::Development => PRODUCTION_CONTEXT_URL,
        };
        let mut pairs: Vec<(String, String)> = registry
            .entries()
            .iter()
            .map(|e| match target {
                RebindTarget::Production => (e.dev_iri.clone(), e.prod_iri.clone()),
                RebindTarget::Development => (e.prod_iri.clone(), e.dev_iri.clone()),
            })
            .collect();
        pairs.push((context_from.to_string(), context_to.to_string()));
        pairs.extend(
            RELATIVE_CONTEXT_REFS
                .iter()
                .map(|r| ((*r).to_string(), context_to.to_string())),
        );
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        pairs.dedup_by(|a, b| a.0 == b.0);

        // Leftmost-first alternation in length order gives longest match.
        let alternation = pairs
            .iter()
            .map(|(from, _)| regex::escape(from))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&alternation)
            .map_err(|e| CattyError::Config(format!("Cannot build rebind matcher: {}", e)))?;
        let lookup = pairs.iter().cloned().collect();
        Ok(Self {
            target,
            pairs,
            lookup,
            matcher,
        })
    }

    /// Direction of this rebinder.
    #[must_use]
    pub fn target(&self) -> RebindTarget {
        self.target
    }

    /// The ordered substitution pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Rewrite `content` in one pass.
    #[must_use]
    pub fn rebind(&self, content: &str) -> String {
        self.matcher
            .replace_all(content, |caps: &Captures<'_>| {
                let found = &caps[0];
                self.lookup
                    .get(found)
                    .cloned()
                    .unwrap_or_else(|| found.to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OntologyEntry;

    fn registry() -> Registry {
        Registry::from_entries(vec![
            OntologyEntry::new("a", "http://x/a#", "https://y/a#", LOCALHOST_CONTEXT_URL, "a.jsonld"),
            OntologyEntry::new("ab", "http://x/a#b/", "https://y/ab#", LOCALHOST_CONTEXT_URL, "ab.jsonld"),
        ])
        .unwrap()
    }

    #[test]
    fn pairs_are_longest_first() {
        let rebinder = IriRebinder::new(&registry(), RebindTarget::Production).unwrap();
        let lengths: Vec<usize> = rebinder.pairs().iter().map(|(f, _)| f.len()).collect();
        let mut sorted = lengths.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn longer_identifier_wins_over_prefix() {
        let rebinder = IriRebinder::new(&registry(), RebindTarget::Production).unwrap();
        assert_eq!(rebinder.rebind("<http://x/a#b/C> <http://x/a#D>"), "<https://y/ab#C> <https://y/a#D>");
    }

    #[test]
    fn context_references_follow_target() {
        let rebinder = IriRebinder::new(&registry(), RebindTarget::Production).unwrap();
        let doc = r#"{"@context": "./context.jsonld", "x": "http://localhost:8080/ontology/context.jsonld"}"#;
        let out = rebinder.rebind(doc);
        assert_eq!(out.matches(PRODUCTION_CONTEXT_URL).count(), 2);
        assert!(!out.contains("./context.jsonld"));
    }

    #[test]
    fn round_trip_restores_development_text() {
        let reg = registry();
        let to_prod = IriRebinder::new(&reg, RebindTarget::Production).unwrap();
        let to_dev = IriRebinder::new(&reg, RebindTarget::Development).unwrap();
        let doc = r#"{"@id": "http://x/a#Thing", "see": "http://x/a#b/Other"}"#;
        assert_eq!(to_dev.rebind(&to_prod.rebind(doc)), doc);
    }

    #[test]
    fn target_tokens() {
        assert_eq!(RebindTarget::from_token("PROD"), Some(RebindTarget::Production));
        assert_eq!(RebindTarget::from_token("dev"), Some(RebindTarget::Development));
        assert_eq!(RebindTarget::from_token("staging"), None);
    }
}
