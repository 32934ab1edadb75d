//! # Update Application
//!
//! Applies parsed update operations to a working copy of the dataset.
//! The caller runs this inside `GraphStore::write`, so an error in any
//! operation discards every change of the request.
//!
//! ## Graph Rules
//!
//! - A delete quad without `GRAPH` removes the triple from every graph
//!   holding it (the default graph is the union of all graphs)
//! - An insert quad without `GRAPH` goes to the `WITH` graph, or the
//!   default graph when there is none
//! - Registry graphs can be cleared but not dropped

use super::ast::{GraphPattern, GraphTarget, PatternElement, QuadPattern, TermPattern, UpdateOperation};
use super::eval::{Evaluator, Solution};
use crate::graph::Dataset;
use crate::types::{CattyError, GraphName, Term, Triple};
use serde::Serialize;

/// Counts reported after a successful update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub operations: usize,
    pub inserted: usize,
    pub deleted: usize,
}

/// Apply every operation in order.
pub fn apply_update(ds: &mut Dataset, operations: &[UpdateOperation]) -> Result<UpdateSummary, CattyError> {
    let mut summary = UpdateSummary::default();
    for operation in operations {
        apply_one(ds, operation, &mut summary)?;
        summary.operations += 1;
    }
    Ok(summary)
}

fn apply_one(ds: &mut Dataset, operation: &UpdateOperation, summary: &mut UpdateSummary) -> Result<(), CattyError> {
    match operation {
        UpdateOperation::InsertData(quads) => {
            let scope = ds.fresh_blank_scope();
            for quad in quads {
                let triple = ground(quad, &Solution::new(), &scope)
                    .ok_or_else(|| CattyError::Update("INSERT DATA contains an ill-formed triple".to_string()))?;
                let graph = quad_graph(quad, &Solution::new(), None)?.unwrap_or(GraphName::Default);
                if ds.insert(&graph, &triple)? {
                    summary.inserted += 1;
                }
            }
        }
        UpdateOperation::DeleteData(quads) => {
            if quads.iter().any(|q| has_blank(q)) {
                return Err(CattyError::Update("blank nodes are not allowed in DELETE DATA".to_string()));
            }
            for quad in quads {
                let Some(triple) = ground(quad, &Solution::new(), "") else {
                    continue;
                };
                summary.deleted += remove(ds, quad_graph(quad, &Solution::new(), None)?, &triple);
            }
        }
        UpdateOperation::DeleteWhere(quads) => {
            let pattern = quads_to_pattern(quads);
            let solutions = Evaluator::new(ds).solutions(&pattern, &Solution::new())?;
            let deletions = instantiate_all(quads, &solutions, None, "")?;
            for (graph, triple) in deletions {
                summary.deleted += remove(ds, graph, &triple);
            }
        }
        UpdateOperation::Modify {
            with,
            delete,
            insert,
            pattern,
        } => {
            let solutions = {
                let evaluator = match with {
                    Some(graph) => Evaluator::new(ds).with_default_graph(GraphName::named(graph.clone())),
                    None => Evaluator::new(ds),
                };
                evaluator.solutions(pattern, &Solution::new())?
            };
            let with_graph = with.as_ref().map(|g| GraphName::named(g.clone()));
            let deletions = instantiate_all(delete, &solutions, with_graph.clone(), "")?;
            let scope = ds.fresh_blank_scope();
            let insertions = instantiate_all(insert, &solutions, with_graph, &scope)?;
            for (graph, triple) in deletions {
                summary.deleted += remove(ds, graph, &triple);
            }
            for (graph, triple) in insertions {
                if ds.insert(&graph.unwrap_or(GraphName::Default), &triple)? {
                    summary.inserted += 1;
                }
            }
        }
        UpdateOperation::Clear { silent, target } => match target {
            GraphTarget::Graph(name) => {
                if !ds.has_named_graph(name) {
                    return missing_graph(name, *silent);
                }
                ds.clear_graph(&GraphName::named(name.clone()));
            }
            GraphTarget::Default => ds.clear_graph(&GraphName::Default),
            GraphTarget::Named | GraphTarget::All => {
                for name in named_graphs(ds) {
                    ds.clear_graph(&name);
                }
                if *target == GraphTarget::All {
                    ds.clear_graph(&GraphName::Default);
                }
            }
        },
        UpdateOperation::Drop { silent, target } => match target {
            GraphTarget::Graph(name) => {
                if !ds.has_named_graph(name) {
                    return missing_graph(name, *silent);
                }
                match ds.drop_graph(&GraphName::named(name.clone())) {
                    Ok(_) => {}
                    Err(_) if *silent => {}
                    Err(e) => return Err(e),
                }
            }
            GraphTarget::Default => ds.clear_graph(&GraphName::Default),
            GraphTarget::Named | GraphTarget::All => {
                for name in named_graphs(ds) {
                    let pinned = matches!(&name, GraphName::Named(n) if ds.is_pinned(n));
                    if pinned {
                        ds.clear_graph(&name);
                    } else {
                        ds.drop_graph(&name)?;
                    }
                }
                if *target == GraphTarget::All {
                    ds.clear_graph(&GraphName::Default);
                }
            }
        },
        UpdateOperation::Create { silent, graph } => {
            if !ds.create_graph(graph) && !silent {
                return Err(CattyError::Update(format!("Graph <{}> already exists", graph)));
            }
        }
    }
    Ok(())
}

fn missing_graph(name: &str, silent: bool) -> Result<(), CattyError> {
    if silent {
        Ok(())
    } else {
        Err(CattyError::Update(format!("Graph <{}> does not exist", name)))
    }
}

fn named_graphs(ds: &Dataset) -> Vec<GraphName> {
    ds.named_graphs().map(GraphName::named).collect()
}

/// Remove a triple from one graph, or from every graph when `graph` is `None`.
fn remove(ds: &mut Dataset, graph: Option<GraphName>, triple: &Triple) -> usize {
    match graph {
        Some(graph) => usize::from(ds.remove(&graph, triple)),
        None => {
            let mut graphs = named_graphs(ds);
            graphs.push(GraphName::Default);
            graphs.iter().filter(|g| ds.remove(g, triple)).count()
        }
    }
}

fn has_blank(quad: &QuadPattern) -> bool {
    [&quad.triple.subject, &quad.triple.predicate, &quad.triple.object]
        .iter()
        .any(|p| matches!(p, TermPattern::Term(Term::Blank(_))))
}

/// Instantiate a quad under a solution. Template blank nodes get `scope`
/// as label prefix. `None` if a variable is unbound or the triple is
/// ill-formed.
fn ground(quad: &QuadPattern, row: &Solution, scope: &str) -> Option<Triple> {
    let term = |p: &TermPattern| match p {
        TermPattern::Var(v) => row.get(v).cloned(),
        TermPattern::Term(Term::Blank(label)) if !scope.is_empty() => {
            Some(Term::blank(format!("{}_{}", scope, label)))
        }
        TermPattern::Term(t) => Some(t.clone()),
    };
    let triple = Triple::new(
        term(&quad.triple.subject)?,
        term(&quad.triple.predicate)?,
        term(&quad.triple.object)?,
    );
    triple.is_well_formed().then_some(triple)
}

/// Target graph of a quad; `Ok(None)` means "no explicit graph".
fn quad_graph(quad: &QuadPattern, row: &Solution, with: Option<GraphName>) -> Result<Option<GraphName>, CattyError> {
    match &quad.graph {
        None => Ok(with),
        Some(TermPattern::Term(Term::Iri(iri))) => Ok(Some(GraphName::named(iri.clone()))),
        Some(TermPattern::Var(v)) => match row.get(v) {
            Some(Term::Iri(iri)) => Ok(Some(GraphName::named(iri.clone()))),
            _ => Err(CattyError::Update(format!("graph variable ?{} is not bound to an IRI", v))),
        },
        Some(TermPattern::Term(other)) => Err(CattyError::Update(format!("{} is not a graph name", other))),
    }
}

fn instantiate_all(
    quads: &[QuadPattern],
    solutions: &[Solution],
    with: Option<GraphName>,
    scope: &str,
) -> Result<Vec<(Option<GraphName>, Triple)>, CattyError> {
    let mut out = Vec::new();
    for (i, row) in solutions.iter().enumerate() {
        let row_scope = if scope.is_empty() {
            String::new()
        } else {
            format!("{}s{}", scope, i)
        };
        for quad in quads {
            if let Some(triple) = ground(quad, row, &row_scope) {
                out.push((quad_graph(quad, row, with.clone())?, triple));
            }
        }
    }
    Ok(out)
}

/// Turn `DELETE WHERE` quads into the pattern that matches them.
fn quads_to_pattern(quads: &[QuadPattern]) -> GraphPattern {
    let mut elements = Vec::new();
    let mut default = Vec::new();
    for quad in quads {
        match &quad.graph {
            None => default.push(PatternElement::Triple(quad.triple.clone())),
            Some(name) => elements.push(GraphPattern::Graph {
                name: name.clone(),
                pattern: Box::new(GraphPattern::Bgp(vec![PatternElement::Triple(quad.triple.clone())])),
            }),
        }
    }
    elements.insert(0, GraphPattern::Bgp(default));
    GraphPattern::Group(elements)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::parser::parse_update;

    fn run(ds: &mut Dataset, text: &str) -> Result<UpdateSummary, CattyError> {
        apply_update(ds, &parse_update(text)?)
    }

    fn count(ds: &Dataset, graph: &GraphName) -> usize {
        ds.graph_len(graph).unwrap_or(0)
    }

    #[test]
    fn insert_and_delete_data() {
        let mut ds = Dataset::new();
        let summary = run(
            &mut ds,
            "INSERT DATA { <http://s> <http://p> 1 . GRAPH <http://g> { <http://s> <http://p> 2 } }",
        )
        .unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(count(&ds, &GraphName::named("http://g")), 1);

        let summary = run(&mut ds, "DELETE DATA { <http://s> <http://p> 2 }").unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(count(&ds, &GraphName::named("http://g")), 0);
    }

    #[test]
    fn modify_with_graph() {
        let mut ds = Dataset::new();
        run(&mut ds, "INSERT DATA { GRAPH <http://g> { <http://a> <http://old> \"x\" } }").unwrap();
        let summary = run(
            &mut ds,
            "WITH <http://g> DELETE { ?s <http://old> ?o } INSERT { ?s <http://new> ?o } WHERE { ?s <http://old> ?o }",
        )
        .unwrap();
        assert_eq!((summary.deleted, summary.inserted), (1, 1));
        let g = GraphName::named("http://g");
        assert_eq!(
            ds.triples(&g),
            vec![Triple::new(Term::iri("http://a"), Term::iri("http://new"), Term::literal("x"))]
        );
    }

    #[test]
    fn delete_where_removes_matches() {
        let mut ds = Dataset::new();
        run(&mut ds, "INSERT DATA { <http://a> <http://p> 1 . <http://b> <http://p> 2 . <http://b> <http://q> 3 }").unwrap();
        let summary = run(&mut ds, "DELETE WHERE { ?s <http://p> ?o }").unwrap();
        assert_eq!(summary.deleted, 2);
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn drop_refuses_registry_graph() {
        let mut ds = Dataset::new();
        ds.create_pinned_graph("http://reg#");
        assert!(run(&mut ds, "DROP GRAPH <http://reg#>").is_err());
        assert!(run(&mut ds, "DROP SILENT GRAPH <http://reg#>").is_ok());
        assert!(ds.has_named_graph("http://reg#"));
        run(&mut ds, "CREATE GRAPH <http://tmp> ; DROP ALL").unwrap();
        assert!(ds.has_named_graph("http://reg#"));
        assert!(!ds.has_named_graph("http://tmp"));
    }

    #[test]
    fn clear_missing_graph() {
        let mut ds = Dataset::new();
        assert!(run(&mut ds, "CLEAR GRAPH <http://none>").is_err());
        assert!(run(&mut ds, "CLEAR SILENT GRAPH <http://none>").is_ok());
    }

    #[test]
    fn create_existing_graph_fails() {
        let mut ds = Dataset::new();
        run(&mut ds, "CREATE GRAPH <http://g>").unwrap();
        assert!(run(&mut ds, "CREATE GRAPH <http://g>").is_err());
        assert!(run(&mut ds, "CREATE SILENT GRAPH <http://g>").is_ok());
    }

    #[test]
    fn insert_blank_nodes_are_fresh_per_operation() {
        let mut ds = Dataset::new();
        run(&mut ds, "INSERT DATA { _:x <http://p> 1 }").unwrap();
        run(&mut ds, "INSERT DATA { _:x <http://p> 1 }").unwrap();
        assert_eq!(ds.len(), 2);
    }
}
