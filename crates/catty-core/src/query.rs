//! # Query Service
//!
//! Entry point for query and update text against a `GraphStore`.
//!
//! ## Parameter Binding
//!
//! Caller parameters are never spliced into the query text. Each value is
//! bound as a plain literal in the initial solution the pattern is
//! evaluated from, so a value such as `"} ; DROP ALL ; {"` is only ever a
//! string to compare against.

use crate::results::{Bindings, QueryResult};
use crate::sparql::{
    Evaluator, QueryForm, QueryOutcome, Solution, UpdateSummary, apply_update, parse_query,
    parse_update,
};
use crate::store::GraphStore;
use crate::types::{CattyError, Term};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Executes queries and updates against a shared store.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<GraphStore>,
}

impl QueryService {
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Parse and evaluate a query inside a read transaction.
    ///
    /// `params` maps variable names (with or without `?`/`$`) to literal
    /// values. ASK results come back as a one-row `boolean` binding.
    pub fn execute_query(
        &self,
        text: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<QueryResult, CattyError> {
        let query = parse_query(text)?;
        tracing::debug!(
            form = query.form().as_str(),
            query = %text.chars().take(120).collect::<String>(),
            params = params.len(),
            "Executing query"
        );
        let seed = seed_from_params(params);
        let snapshot = self.store.read();
        let outcome = Evaluator::new(&snapshot)
            .with_dataset_clause(&query.dataset)
            .evaluate(&query, &seed)?;
        Ok(match outcome {
            QueryOutcome::Solutions { variables, rows } => {
                QueryResult::Bindings(Bindings { variables, rows })
            }
            QueryOutcome::Boolean(value) => QueryResult::Bindings(Bindings::boolean(value)),
            QueryOutcome::Graph(triples) => QueryResult::Graph(triples),
        })
    }

    /// Parse and apply an update as one write transaction.
    ///
    /// Either every operation commits or none does.
    pub fn execute_update(&self, text: &str) -> Result<UpdateSummary, CattyError> {
        let operations = parse_update(text)?;
        let summary = self.store.write(|ds| apply_update(ds, &operations))?;
        tracing::info!(
            operations = summary.operations,
            inserted = summary.inserted,
            deleted = summary.deleted,
            "Update committed"
        );
        Ok(summary)
    }

    /// Detect the form of a query without executing it.
    pub fn validate_query(&self, text: &str) -> Result<QueryForm, CattyError> {
        validate_query(text)
    }
}

/// Detect the form of a query without executing it.
pub fn validate_query(text: &str) -> Result<QueryForm, CattyError> {
    parse_query(text).map(|q| q.form())
}

fn seed_from_params(params: &BTreeMap<String, String>) -> Solution {
    params
        .iter()
        .map(|(name, value)| {
            let name = name.trim_start_matches(['?', '$']).to_string();
            (name, Term::literal(value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GraphName, Triple};

    fn service() -> QueryService {
        let store = GraphStore::new();
        store
            .write(|ds| {
                ds.insert(
                    &GraphName::named("http://g"),
                    &Triple::new(Term::iri("http://s"), Term::iri("http://label"), Term::literal("cat")),
                )
            })
            .unwrap();
        QueryService::new(Arc::new(store))
    }

    #[test]
    fn ask_returns_single_boolean_row() {
        let svc = service();
        for (text, expected) in [
            ("ASK { ?s <http://label> \"cat\" }", true),
            ("ASK { ?s <http://label> \"dog\" }", false),
        ] {
            let result = svc.execute_query(text, &BTreeMap::new()).unwrap();
            let bindings = result.bindings().unwrap();
            assert_eq!(bindings.variables.len(), 1);
            assert_eq!(bindings.rows.len(), 1);
            assert_eq!(bindings.as_boolean(), Some(expected));
        }
    }

    #[test]
    fn params_bind_as_literals() {
        let svc = service();
        let params = BTreeMap::from([("?l".to_string(), "cat".to_string())]);
        let result = svc
            .execute_query("SELECT ?s ?l WHERE { ?s <http://label> ?l }", &params)
            .unwrap();
        assert_eq!(result.bindings().unwrap().rows.len(), 1);

        let params = BTreeMap::from([("l".to_string(), "\"} ?s ?p ?o {".to_string())]);
        let result = svc
            .execute_query("SELECT ?s WHERE { ?s <http://label> ?l }", &params)
            .unwrap();
        assert!(result.bindings().unwrap().rows.is_empty());
    }

    #[test]
    fn construct_returns_graph() {
        let svc = service();
        let result = svc
            .execute_query("CONSTRUCT { ?s <http://name> ?l } WHERE { ?s <http://label> ?l }", &BTreeMap::new())
            .unwrap();
        assert_eq!(result.graph().unwrap().len(), 1);
    }

    #[test]
    fn failed_update_rolls_back() {
        let svc = service();
        let before = svc.store().checksum();
        let err = svc
            .execute_update("INSERT DATA { <http://a> <http://p> 1 } ; CREATE GRAPH <http://g>")
            .unwrap_err();
        assert!(matches!(err, CattyError::Update(_)));
        assert_eq!(svc.store().checksum(), before);
    }

    #[test]
    fn validate_detects_form() {
        assert_eq!(validate_query("DESCRIBE <http://s>").unwrap(), QueryForm::Describe);
        assert!(matches!(
            validate_query("SELECT WHERE {").unwrap_err(),
            CattyError::QuerySyntax { .. }
        ));
    }
}
