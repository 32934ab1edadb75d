//! # Query Evaluation
//!
//! Evaluates parsed queries against one dataset snapshot.
//!
//! Patterns are evaluated with input solutions ("seeds"): every element of a
//! group receives the solutions produced so far and extends them. Seeding
//! is also how externally supplied parameter values enter a query, so they
//! are matched as terms and never re-parsed as query text.
//!
//! ## Limits
//!
//! Intermediate results are capped at `MAX_SOLUTIONS` rows and path
//! closures at `MAX_PATH_DEPTH` steps; exceeding the row cap is an
//! `Evaluation` error.

use super::ast::{
    Expression, Function, GraphPattern, PatternElement, Projection, ProjectionItem, PropertyPath,
    Query, QueryKind, TermPattern, TriplePattern, HIDDEN_VAR_PREFIX, DatasetClause,
};
use super::expr::{
    RegexCache, arithmetic, call_function, compare_op, effective_boolean, equals, fold_aggregate,
    negate, order_terms,
};
use crate::graph::{Dataset, GraphScope};
use crate::primitives::{MAX_PATH_DEPTH, MAX_SOLUTIONS};
use crate::types::{CattyError, GraphName, Literal, Term, Triple};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One solution: variable name to bound term.
pub type Solution = BTreeMap<String, Term>;

/// Result of evaluating a query, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// SELECT: projected variables and rows.
    Solutions {
        variables: Vec<String>,
        rows: Vec<Solution>,
    },
    /// ASK
    Boolean(bool),
    /// CONSTRUCT and DESCRIBE: a sorted, duplicate-free triple set.
    Graph(Vec<Triple>),
}

/// Where expression variables are looked up.
enum Context<'r> {
    Row(&'r Solution),
    /// Aggregation: group key bindings plus the rows of the group.
    Group {
        keys: &'r Solution,
        rows: &'r [Solution],
    },
}

impl Context<'_> {
    fn lookup(&self, var: &str) -> Option<&Term> {
        match self {
            Self::Row(row) => row.get(var),
            Self::Group { keys, .. } => keys.get(var),
        }
    }

    fn bindings(&self) -> &Solution {
        match self {
            Self::Row(row) => row,
            Self::Group { keys, .. } => keys,
        }
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Pattern and expression evaluator over one dataset.
#[derive(Debug)]
pub struct Evaluator<'a> {
    ds: &'a Dataset,
    default_scope: GraphScope,
    /// Graphs visible to `GRAPH`; `None` means every named graph.
    named: Option<BTreeSet<String>>,
    regexes: RegexCache,
}

impl<'a> Evaluator<'a> {
    /// Evaluator whose default graph is the union of all graphs.
    #[must_use]
    pub fn new(ds: &'a Dataset) -> Self {
        Self {
            ds,
            default_scope: GraphScope::Union,
            named: None,
            regexes: RegexCache::default(),
        }
    }

    /// Apply `FROM` / `FROM NAMED`.
    ///
    /// `FROM` replaces the default graph with the merge of the listed
    /// graphs; `FROM NAMED` alone leaves the default graph empty.
    #[must_use]
    pub fn with_dataset_clause(mut self, clause: &DatasetClause) -> Self {
        if !clause.default.is_empty() {
            self.default_scope = GraphScope::Graphs(
                clause.default.iter().map(|g| GraphName::named(g.clone())).collect(),
            );
        } else if !clause.named.is_empty() {
            self.default_scope = GraphScope::Graphs(Vec::new());
        }
        if !clause.named.is_empty() {
            self.named = Some(clause.named.iter().cloned().collect());
        }
        self
    }

    /// Use one graph as the default graph (`WITH <g>`).
    #[must_use]
    pub fn with_default_graph(mut self, graph: GraphName) -> Self {
        self.default_scope = GraphScope::single(graph);
        self
    }

    /// Solutions of a pattern in the default graph, extending `seed`.
    pub fn solutions(&self, pattern: &GraphPattern, seed: &Solution) -> Result<Vec<Solution>, CattyError> {
        self.eval_pattern(pattern, &self.default_scope, vec![seed.clone()])
    }

    /// Evaluate a query, seeding the pattern with `seed`.
    pub fn evaluate(&self, query: &Query, seed: &Solution) -> Result<QueryOutcome, CattyError> {
        let rows = self.solutions(&query.pattern, seed)?;
        match &query.kind {
            QueryKind::Select {
                distinct,
                projection,
            } => self.select(query, rows, *distinct, projection),
            QueryKind::Ask => Ok(QueryOutcome::Boolean(!rows.is_empty())),
            QueryKind::Construct { template } => {
                let rows = self.order_and_slice(query, rows);
                let mut triples = BTreeSet::new();
                for (i, row) in rows.iter().enumerate() {
                    for pattern in template {
                        if let Some(triple) = instantiate(pattern, row, i) {
                            triples.insert(triple);
                        }
                    }
                }
                Ok(QueryOutcome::Graph(triples.into_iter().collect()))
            }
            QueryKind::Describe { targets } => {
                let rows = self.order_and_slice(query, rows);
                let mut resources = BTreeSet::new();
                if targets.is_empty() {
                    for row in &rows {
                        resources.extend(
                            row.iter()
                                .filter(|(k, _)| !k.starts_with(HIDDEN_VAR_PREFIX))
                                .map(|(_, v)| v.clone()),
                        );
                    }
                }
                for target in targets {
                    match target {
                        TermPattern::Term(t) => {
                            resources.insert(t.clone());
                        }
                        TermPattern::Var(v) => {
                            resources.extend(rows.iter().filter_map(|r| r.get(v).cloned()));
                        }
                    }
                }
                Ok(QueryOutcome::Graph(self.describe(&resources)))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Graph patterns
    // -------------------------------------------------------------------------

    fn eval_pattern(
        &self,
        pattern: &GraphPattern,
        scope: &GraphScope,
        input: Vec<Solution>,
    ) -> Result<Vec<Solution>, CattyError> {
        let output = match pattern {
            GraphPattern::Group(elements) => {
                let mut rows = input;
                let mut filters = Vec::new();
                for element in elements {
                    match element {
                        GraphPattern::Filter(expr) => filters.push(expr),
                        other => rows = self.eval_pattern(other, scope, rows)?,
                    }
                }
                rows.retain(|row| filters.iter().all(|f| self.test(f, row, scope)));
                rows
            }
            GraphPattern::Bgp(elements) => {
                let mut rows = input;
                for element in elements {
                    let mut next = Vec::new();
                    for row in &rows {
                        self.match_element(element, row, scope, &mut next)?;
                        check_limit(next.len())?;
                    }
                    rows = next;
                }
                rows
            }
            GraphPattern::Optional(inner) => {
                let mut out = Vec::new();
                for row in input {
                    let extended = self.eval_pattern(inner, scope, vec![row.clone()])?;
                    if extended.is_empty() {
                        out.push(row);
                    } else {
                        out.extend(extended);
                    }
                    check_limit(out.len())?;
                }
                out
            }
            GraphPattern::Union(branches) => {
                let mut out = Vec::new();
                for branch in branches {
                    out.extend(self.eval_pattern(branch, scope, input.clone())?);
                    check_limit(out.len())?;
                }
                out
            }
            GraphPattern::Minus(inner) => {
                let right = self.eval_pattern(inner, scope, vec![Solution::new()])?;
                input
                    .into_iter()
                    .filter(|row| {
                        !right.iter().any(|r| {
                            let shared = r.keys().any(|k| row.contains_key(k));
                            shared && merge(row, r).is_some()
                        })
                    })
                    .collect()
            }
            GraphPattern::Graph { name, pattern } => self.eval_graph(name, pattern, input)?,
            GraphPattern::Filter(expr) => input
                .into_iter()
                .filter(|row| self.test(expr, row, scope))
                .collect(),
            GraphPattern::Bind { expr, var } => {
                let mut out = Vec::with_capacity(input.len());
                for mut row in input {
                    if row.contains_key(var) {
                        return Err(CattyError::Evaluation(format!(
                            "BIND target ?{} is already bound",
                            var
                        )));
                    }
                    if let Some(value) = self.eval_expr(expr, &Context::Row(&row), scope) {
                        row.insert(var.clone(), value);
                    }
                    out.push(row);
                }
                out
            }
            GraphPattern::Values { vars, rows: data } => {
                let mut out = Vec::new();
                for row in &input {
                    for values in data {
                        let candidate: Solution = vars
                            .iter()
                            .zip(values)
                            .filter_map(|(v, t)| t.as_ref().map(|t| (v.clone(), t.clone())))
                            .collect();
                        if let Some(merged) = merge(row, &candidate) {
                            out.push(merged);
                        }
                    }
                    check_limit(out.len())?;
                }
                out
            }
        };
        check_limit(output.len())?;
        Ok(output)
    }

    fn eval_graph(
        &self,
        name: &TermPattern,
        pattern: &GraphPattern,
        input: Vec<Solution>,
    ) -> Result<Vec<Solution>, CattyError> {
        match name {
            TermPattern::Term(Term::Iri(iri)) => {
                if !self.graph_visible(iri) {
                    return Ok(Vec::new());
                }
                self.eval_pattern(pattern, &GraphScope::single(GraphName::named(iri.clone())), input)
            }
            TermPattern::Term(_) => Ok(Vec::new()),
            TermPattern::Var(var) => {
                let candidates: Vec<String> = self
                    .ds
                    .named_graphs()
                    .filter(|g| self.graph_visible(g))
                    .map(String::from)
                    .collect();
                let mut out = Vec::new();
                for row in input {
                    let graphs: Vec<&String> = match row.get(var) {
                        Some(Term::Iri(bound)) => candidates.iter().filter(|g| *g == bound).collect(),
                        Some(_) => Vec::new(),
                        None => candidates.iter().collect(),
                    };
                    for graph in graphs {
                        let mut seed = row.clone();
                        seed.insert(var.clone(), Term::iri(graph.clone()));
                        let scope = GraphScope::single(GraphName::named(graph.clone()));
                        out.extend(self.eval_pattern(pattern, &scope, vec![seed])?);
                        check_limit(out.len())?;
                    }
                }
                Ok(out)
            }
        }
    }

    fn graph_visible(&self, graph: &str) -> bool {
        self.ds.has_named_graph(graph) && self.named.as_ref().is_none_or(|n| n.contains(graph))
    }

    fn match_element(
        &self,
        element: &PatternElement,
        row: &Solution,
        scope: &GraphScope,
        out: &mut Vec<Solution>,
    ) -> Result<(), CattyError> {
        match element {
            PatternElement::Triple(TriplePattern {
                subject,
                predicate,
                object,
            }) => {
                let s = resolve(subject, row);
                let p = resolve(predicate, row);
                let o = resolve(object, row);
                for triple in self.ds.match_pattern(scope, s.as_ref(), p.as_ref(), o.as_ref()) {
                    let mut extended = row.clone();
                    if bind(&mut extended, subject, &triple.subject)
                        && bind(&mut extended, predicate, &triple.predicate)
                        && bind(&mut extended, object, &triple.object)
                    {
                        out.push(extended);
                    }
                }
            }
            PatternElement::Path {
                subject,
                path,
                object,
            } => {
                let s = resolve(subject, row);
                let o = resolve(object, row);
                for (start, end) in self.eval_path(path, scope, s.as_ref(), o.as_ref())? {
                    let mut extended = row.clone();
                    if bind(&mut extended, subject, &start) && bind(&mut extended, object, &end) {
                        out.push(extended);
                    }
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Property paths
    // -------------------------------------------------------------------------

    fn eval_path(
        &self,
        path: &PropertyPath,
        scope: &GraphScope,
        s: Option<&Term>,
        o: Option<&Term>,
    ) -> Result<BTreeSet<(Term, Term)>, CattyError> {
        let pairs = match path {
            PropertyPath::Iri(iri) => {
                let p = Term::iri(iri.clone());
                self.ds
                    .match_pattern(scope, s, Some(&p), o)
                    .into_iter()
                    .map(|t| (t.subject, t.object))
                    .collect()
            }
            PropertyPath::Inverse(inner) => self
                .eval_path(inner, scope, o, s)?
                .into_iter()
                .map(|(a, b)| (b, a))
                .collect(),
            PropertyPath::Alternative(branches) => {
                let mut out = BTreeSet::new();
                for branch in branches {
                    out.extend(self.eval_path(branch, scope, s, o)?);
                }
                out
            }
            PropertyPath::Sequence(steps) => self.eval_sequence(steps, scope, s, o)?,
            PropertyPath::ZeroOrOne(inner) => {
                let mut out = self.eval_path(inner, scope, s, o)?;
                out.extend(self.zero_length(scope, s, o));
                out
            }
            PropertyPath::ZeroOrMore(inner) => self.closure(inner, scope, s, o, true)?,
            PropertyPath::OneOrMore(inner) => self.closure(inner, scope, s, o, false)?,
            PropertyPath::Negated { forward, inverse } => {
                let mut out = BTreeSet::new();
                let check_forward = !forward.is_empty() || inverse.is_empty();
                if check_forward {
                    out.extend(
                        self.ds
                            .match_pattern(scope, s, None, o)
                            .into_iter()
                            .filter(|t| !forward.iter().any(|f| t.predicate.value() == f))
                            .map(|t| (t.subject, t.object)),
                    );
                }
                if !inverse.is_empty() {
                    out.extend(
                        self.ds
                            .match_pattern(scope, o, None, s)
                            .into_iter()
                            .filter(|t| !inverse.iter().any(|f| t.predicate.value() == f))
                            .map(|t| (t.object, t.subject)),
                    );
                }
                out
            }
        };
        check_limit(pairs.len())?;
        Ok(pairs)
    }

    fn eval_sequence(
        &self,
        steps: &[PropertyPath],
        scope: &GraphScope,
        s: Option<&Term>,
        o: Option<&Term>,
    ) -> Result<BTreeSet<(Term, Term)>, CattyError> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(self.zero_length(scope, s, o));
        };
        if rest.is_empty() {
            return self.eval_path(first, scope, s, o);
        }
        let mut out = BTreeSet::new();
        for (start, middle) in self.eval_path(first, scope, s, None)? {
            for (_, end) in self.eval_sequence(rest, scope, Some(&middle), o)? {
                out.insert((start.clone(), end));
                check_limit(out.len())?;
            }
        }
        Ok(out)
    }

    /// Zero-length path: every node in scope (or the bound end) to itself.
    fn zero_length(&self, scope: &GraphScope, s: Option<&Term>, o: Option<&Term>) -> BTreeSet<(Term, Term)> {
        match (s, o) {
            (Some(a), Some(b)) if a == b => BTreeSet::from([(a.clone(), a.clone())]),
            (Some(_), Some(_)) => BTreeSet::new(),
            (Some(a), None) | (None, Some(a)) => BTreeSet::from([(a.clone(), a.clone())]),
            (None, None) => self
                .nodes(scope)
                .into_iter()
                .map(|n| (n.clone(), n))
                .collect(),
        }
    }

    fn nodes(&self, scope: &GraphScope) -> BTreeSet<Term> {
        self.ds
            .match_pattern(scope, None, None, None)
            .into_iter()
            .flat_map(|t| [t.subject, t.object])
            .collect()
    }

    /// Transitive closure by breadth-first search from each start node.
    fn closure(
        &self,
        inner: &PropertyPath,
        scope: &GraphScope,
        s: Option<&Term>,
        o: Option<&Term>,
        reflexive: bool,
    ) -> Result<BTreeSet<(Term, Term)>, CattyError> {
        // Search from the bound end; with an unbound subject and bound
        // object, walk backwards.
        let backwards = s.is_none() && o.is_some();
        let starts: BTreeSet<Term> = match (s, o) {
            (Some(a), _) => BTreeSet::from([a.clone()]),
            (None, Some(b)) => BTreeSet::from([b.clone()]),
            (None, None) => self.nodes(scope),
        };
        let mut out = BTreeSet::new();
        for start in starts {
            let mut seen = BTreeSet::new();
            if reflexive {
                seen.insert(start.clone());
            }
            let mut frontier = VecDeque::from([(start.clone(), 0usize)]);
            while let Some((node, depth)) = frontier.pop_front() {
                if depth >= MAX_PATH_DEPTH {
                    continue;
                }
                let step = if backwards {
                    self.eval_path(inner, scope, None, Some(&node))?
                        .into_iter()
                        .map(|(a, _)| a)
                        .collect::<Vec<_>>()
                } else {
                    self.eval_path(inner, scope, Some(&node), None)?
                        .into_iter()
                        .map(|(_, b)| b)
                        .collect::<Vec<_>>()
                };
                for next in step {
                    if seen.insert(next.clone()) {
                        frontier.push_back((next, depth + 1));
                    }
                }
            }
            for reached in seen {
                let pair = if backwards {
                    (reached, start.clone())
                } else {
                    (start.clone(), reached)
                };
                let end_matches = if backwards {
                    s.is_none_or(|a| *a == pair.0)
                } else {
                    o.is_none_or(|b| *b == pair.1)
                };
                if end_matches {
                    out.insert(pair);
                }
            }
            check_limit(out.len())?;
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn test(&self, expr: &Expression, row: &Solution, scope: &GraphScope) -> bool {
        self.eval_expr(expr, &Context::Row(row), scope)
            .and_then(|t| effective_boolean(&t))
            .unwrap_or(false)
    }

    fn ebv(&self, expr: &Expression, ctx: &Context<'_>, scope: &GraphScope) -> Option<bool> {
        self.eval_expr(expr, ctx, scope)
            .and_then(|t| effective_boolean(&t))
    }

    fn eval_expr(&self, expr: &Expression, ctx: &Context<'_>, scope: &GraphScope) -> Option<Term> {
        match expr {
            Expression::Var(v) => ctx.lookup(v).cloned(),
            Expression::Term(t) => Some(t.clone()),
            Expression::Or(a, b) => {
                let (l, r) = (self.ebv(a, ctx, scope), self.ebv(b, ctx, scope));
                match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(bool_term(true)),
                    (Some(false), Some(false)) => Some(bool_term(false)),
                    _ => None,
                }
            }
            Expression::And(a, b) => {
                let (l, r) = (self.ebv(a, ctx, scope), self.ebv(b, ctx, scope));
                match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(bool_term(false)),
                    (Some(true), Some(true)) => Some(bool_term(true)),
                    _ => None,
                }
            }
            Expression::Not(a) => self.ebv(a, ctx, scope).map(|b| bool_term(!b)),
            Expression::Compare(op, a, b) => {
                let l = self.eval_expr(a, ctx, scope)?;
                let r = self.eval_expr(b, ctx, scope)?;
                compare_op(*op, &l, &r).map(bool_term)
            }
            Expression::In {
                expr,
                list,
                negated,
            } => {
                let value = self.eval_expr(expr, ctx, scope)?;
                let mut errored = false;
                for item in list {
                    match self.eval_expr(item, ctx, scope).and_then(|t| equals(&value, &t)) {
                        Some(true) => return Some(bool_term(!negated)),
                        Some(false) => {}
                        None => errored = true,
                    }
                }
                if errored {
                    None
                } else {
                    Some(bool_term(*negated))
                }
            }
            Expression::Arith(op, a, b) => {
                let l = self.eval_expr(a, ctx, scope)?;
                let r = self.eval_expr(b, ctx, scope)?;
                arithmetic(*op, &l, &r)
            }
            Expression::Neg(a) => negate(&self.eval_expr(a, ctx, scope)?),
            Expression::Bound(v) => Some(bool_term(ctx.lookup(v).is_some())),
            Expression::Call(Function::If, args) => {
                let cond = self.ebv(args.first()?, ctx, scope)?;
                let branch = if cond { args.get(1)? } else { args.get(2)? };
                self.eval_expr(branch, ctx, scope)
            }
            Expression::Call(Function::Coalesce, args) => {
                args.iter().find_map(|a| self.eval_expr(a, ctx, scope))
            }
            Expression::Call(function, args) => {
                let values: Vec<Option<Term>> = args
                    .iter()
                    .map(|a| self.eval_expr(a, ctx, scope))
                    .collect();
                call_function(*function, &values, &self.regexes)
            }
            Expression::Exists(pattern) | Expression::NotExists(pattern) => {
                let seed = ctx.bindings().clone();
                let found = !self.eval_pattern(pattern, scope, vec![seed]).ok()?.is_empty();
                let wanted = matches!(expr, Expression::Exists(_));
                Some(bool_term(found == wanted))
            }
            Expression::Aggregate(aggregate) => {
                let Context::Group { rows, .. } = ctx else {
                    return None;
                };
                let values: Vec<Term> = match &aggregate.arg {
                    Some(arg) => rows
                        .iter()
                        .filter_map(|row| self.eval_expr(arg, &Context::Row(row), scope))
                        .collect(),
                    None => {
                        if aggregate.distinct {
                            // COUNT(DISTINCT *): distinct solutions.
                            let distinct: BTreeSet<&Solution> = rows.iter().collect();
                            return Some(Term::Literal(Literal::integer(
                                i64::try_from(distinct.len()).ok()?,
                            )));
                        }
                        Vec::new()
                    }
                };
                fold_aggregate(
                    aggregate.function,
                    aggregate.distinct,
                    aggregate.separator.as_deref(),
                    values,
                    rows.len(),
                    aggregate.arg.is_none(),
                )
            }
        }
    }

    // -------------------------------------------------------------------------
    // SELECT pipeline
    // -------------------------------------------------------------------------

    fn select(
        &self,
        query: &Query,
        rows: Vec<Solution>,
        distinct: bool,
        projection: &Projection,
    ) -> Result<QueryOutcome, CattyError> {
        let modifiers = &query.modifiers;
        let scope = &self.default_scope;
        let aggregated = !modifiers.group_by.is_empty()
            || !modifiers.having.is_empty()
            || matches!(projection, Projection::Items(items) if items.iter().any(|i| matches!(i, ProjectionItem::Expr(e, _) if e.has_aggregate())));

        // Each entry: the row to project plus its ORDER BY values.
        let mut keyed: Vec<(Solution, Vec<Option<Term>>)> = Vec::new();
        if aggregated {
            let mut groups: BTreeMap<Vec<Option<Term>>, (Solution, Vec<Solution>)> = BTreeMap::new();
            for row in rows {
                let mut key = Vec::with_capacity(modifiers.group_by.len());
                let mut keys = Solution::new();
                for group_key in &modifiers.group_by {
                    let value = self.eval_expr(&group_key.expr, &Context::Row(&row), scope);
                    let name = group_key.alias.as_deref().or(match &group_key.expr {
                        Expression::Var(v) => Some(v.as_str()),
                        _ => None,
                    });
                    if let (Some(name), Some(value)) = (name, &value) {
                        keys.insert(name.to_string(), value.clone());
                    }
                    key.push(value);
                }
                groups.entry(key).or_insert_with(|| (keys, Vec::new())).1.push(row);
            }
            if groups.is_empty() && modifiers.group_by.is_empty() {
                groups.insert(Vec::new(), (Solution::new(), Vec::new()));
            }
            for (_, (keys, members)) in groups {
                let ctx = Context::Group {
                    keys: &keys,
                    rows: &members,
                };
                if !modifiers
                    .having
                    .iter()
                    .all(|h| self.ebv(h, &ctx, scope).unwrap_or(false))
                {
                    continue;
                }
                let mut out = keys.clone();
                if let Projection::Items(items) = projection {
                    for item in items {
                        if let ProjectionItem::Expr(expr, var) = item {
                            let ctx = Context::Group {
                                keys: &out,
                                rows: &members,
                            };
                            if let Some(value) = self.eval_expr(expr, &ctx, scope) {
                                out.insert(var.clone(), value);
                            }
                        }
                    }
                }
                let ctx = Context::Group {
                    keys: &out,
                    rows: &members,
                };
                let order = modifiers
                    .order_by
                    .iter()
                    .map(|k| self.eval_expr(&k.expr, &ctx, scope))
                    .collect();
                keyed.push((out, order));
            }
        } else {
            for mut row in rows {
                if let Projection::Items(items) = projection {
                    for item in items {
                        if let ProjectionItem::Expr(expr, var) = item {
                            if let Some(value) = self.eval_expr(expr, &Context::Row(&row), scope) {
                                row.insert(var.clone(), value);
                            }
                        }
                    }
                }
                let order = modifiers
                    .order_by
                    .iter()
                    .map(|k| self.eval_expr(&k.expr, &Context::Row(&row), scope))
                    .collect();
                keyed.push((row, order));
            }
        }

        sort_keyed(&mut keyed, query);

        let variables = match projection {
            Projection::All => {
                let mut vars = Vec::new();
                collect_vars(&query.pattern, &mut vars);
                vars
            }
            Projection::Items(items) => items
                .iter()
                .map(|i| match i {
                    ProjectionItem::Var(v) | ProjectionItem::Expr(_, v) => v.clone(),
                })
                .collect(),
        };

        let mut seen = BTreeSet::new();
        let mut projected = Vec::new();
        for (row, _) in keyed {
            let out: Solution = variables
                .iter()
                .filter_map(|v| row.get(v).map(|t| (v.clone(), t.clone())))
                .collect();
            if distinct && !seen.insert(out.clone()) {
                continue;
            }
            projected.push(out);
        }
        let rows = slice(projected, query);
        Ok(QueryOutcome::Solutions { variables, rows })
    }

    fn order_and_slice(&self, query: &Query, rows: Vec<Solution>) -> Vec<Solution> {
        let scope = &self.default_scope;
        let mut keyed: Vec<(Solution, Vec<Option<Term>>)> = rows
            .into_iter()
            .map(|row| {
                let order = query
                    .modifiers
                    .order_by
                    .iter()
                    .map(|k| self.eval_expr(&k.expr, &Context::Row(&row), scope))
                    .collect();
                (row, order)
            })
            .collect();
        sort_keyed(&mut keyed, query);
        slice(keyed.into_iter().map(|(r, _)| r).collect(), query)
    }

    // -------------------------------------------------------------------------
    // DESCRIBE
    // -------------------------------------------------------------------------

    /// Concise bounded description: triples with the resource as subject,
    /// following blank-node objects transitively.
    fn describe(&self, resources: &BTreeSet<Term>) -> Vec<Triple> {
        let mut out = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<Term> = resources.iter().filter(|r| !r.is_literal()).cloned().collect();
        while let Some(resource) = queue.pop_front() {
            if !visited.insert(resource.clone()) {
                continue;
            }
            for triple in self.ds.match_pattern(&self.default_scope, Some(&resource), None, None) {
                if triple.object.is_blank() && !visited.contains(&triple.object) {
                    queue.push_back(triple.object.clone());
                }
                out.insert(triple);
            }
        }
        out.into_iter().collect()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn check_limit(len: usize) -> Result<(), CattyError> {
    if len > MAX_SOLUTIONS {
        return Err(CattyError::Evaluation(format!(
            "Result exceeds {} intermediate solutions",
            MAX_SOLUTIONS
        )));
    }
    Ok(())
}

fn bool_term(value: bool) -> Term {
    Term::Literal(Literal::boolean(value))
}

/// Term for a pattern position under a solution, `None` if unbound.
fn resolve(pattern: &TermPattern, row: &Solution) -> Option<Term> {
    match pattern {
        TermPattern::Term(t) => Some(t.clone()),
        TermPattern::Var(v) => row.get(v).cloned(),
    }
}

/// Bind a variable position; false if it is already bound to another term.
fn bind(row: &mut Solution, pattern: &TermPattern, term: &Term) -> bool {
    match pattern {
        TermPattern::Term(_) => true,
        TermPattern::Var(v) => match row.get(v) {
            Some(existing) => existing == term,
            None => {
                row.insert(v.clone(), term.clone());
                true
            }
        },
    }
}

/// Join two solutions if they agree on shared variables.
fn merge(a: &Solution, b: &Solution) -> Option<Solution> {
    let mut out = a.clone();
    for (k, v) in b {
        match out.get(k) {
            Some(existing) if existing != v => return None,
            Some(_) => {}
            None => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Some(out)
}

fn sort_keyed(keyed: &mut [(Solution, Vec<Option<Term>>)], query: &Query) {
    let order = &query.modifiers.order_by;
    if order.is_empty() {
        return;
    }
    keyed.sort_by(|(_, a), (_, b)| {
        for (i, key) in order.iter().enumerate() {
            let ord = order_terms(
                a.get(i).and_then(Option::as_ref),
                b.get(i).and_then(Option::as_ref),
            );
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn slice(rows: Vec<Solution>, query: &Query) -> Vec<Solution> {
    let limit = query.modifiers.limit.unwrap_or(usize::MAX);
    rows.into_iter()
        .skip(query.modifiers.offset)
        .take(limit)
        .collect()
}

/// Instantiate a template triple; blank nodes are fresh per solution.
fn instantiate(pattern: &TriplePattern, row: &Solution, index: usize) -> Option<Triple> {
    let term = |p: &TermPattern| match p {
        TermPattern::Var(v) => row.get(v).cloned(),
        TermPattern::Term(Term::Blank(label)) => Some(Term::blank(format!("c{}_{}", index, label))),
        TermPattern::Term(t) => Some(t.clone()),
    };
    let triple = Triple::new(
        term(&pattern.subject)?,
        term(&pattern.predicate)?,
        term(&pattern.object)?,
    );
    triple.is_well_formed().then_some(triple)
}

/// Visible variables of a pattern in order of first appearance.
fn collect_vars(pattern: &GraphPattern, out: &mut Vec<String>) {
    let push = |v: &str, out: &mut Vec<String>| {
        if !v.starts_with(HIDDEN_VAR_PREFIX) && !out.iter().any(|x| x == v) {
            out.push(v.to_string());
        }
    };
    match pattern {
        GraphPattern::Group(elements) | GraphPattern::Union(elements) => {
            for e in elements {
                collect_vars(e, out);
            }
        }
        GraphPattern::Bgp(elements) => {
            for element in elements {
                let positions: Vec<&TermPattern> = match element {
                    PatternElement::Triple(t) => vec![&t.subject, &t.predicate, &t.object],
                    PatternElement::Path { subject, object, .. } => vec![subject, object],
                };
                for p in positions {
                    if let Some(v) = p.as_var() {
                        push(v, out);
                    }
                }
            }
        }
        GraphPattern::Optional(inner) => collect_vars(inner, out),
        GraphPattern::Minus(_) | GraphPattern::Filter(_) => {}
        GraphPattern::Graph { name, pattern } => {
            if let Some(v) = name.as_var() {
                push(v, out);
            }
            collect_vars(pattern, out);
        }
        GraphPattern::Bind { var, .. } => push(var, out),
        GraphPattern::Values { vars, .. } => {
            for v in vars {
                push(v, out);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
