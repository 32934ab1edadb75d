//! # Triple Index and Dataset
//!
//! The deterministic in-memory storage for the Catty core.
//!
//! Terms are interned into a `Dictionary` and every graph keeps three
//! permutation indices (SPO, POS, OSP) over interned ids, so a pattern with
//! any combination of bound positions is answered by a single range scan.
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.

use crate::types::{CattyError, GraphName, Term, Triple};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

// =============================================================================
// DICTIONARY
// =============================================================================

/// Interned term identifier. Only meaningful within one `Dataset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(u64);

/// Bidirectional mapping between terms and their ids.
///
/// Terms are never removed; ids stay stable for the lifetime of the dataset.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    ids: BTreeMap<Term, TermId>,
    terms: Vec<Term>,
}

impl Dictionary {
    /// Intern a term, returning its id.
    pub fn intern(&mut self, term: &Term) -> TermId {
        if let Some(id) = self.ids.get(term) {
            return *id;
        }
        let id = TermId(self.terms.len() as u64);
        self.terms.push(term.clone());
        self.ids.insert(term.clone(), id);
        id
    }

    /// Id of an already-interned term.
    #[must_use]
    pub fn id_of(&self, term: &Term) -> Option<TermId> {
        self.ids.get(term).copied()
    }

    /// Term for an id.
    #[must_use]
    pub fn term(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id.0 as usize)
    }

    /// Number of interned terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

// =============================================================================
// TRIPLE INDEX
// =============================================================================

type Key = [TermId; 3];

const MIN_ID: TermId = TermId(0);
const MAX_ID: TermId = TermId(u64::MAX);

/// One graph: three permutation indices over the same set of triples.
#[derive(Debug, Clone, Default)]
pub struct TripleIndex {
    spo: BTreeSet<Key>,
    pos: BTreeSet<Key>,
    osp: BTreeSet<Key>,
}

impl TripleIndex {
    /// Insert a triple. Returns false if it was already present.
    pub fn insert(&mut self, [s, p, o]: Key) -> bool {
        if !self.spo.insert([s, p, o]) {
            return false;
        }
        self.pos.insert([p, o, s]);
        self.osp.insert([o, s, p]);
        true
    }

    /// Remove a triple. Returns false if it was absent.
    pub fn remove(&mut self, [s, p, o]: Key) -> bool {
        if !self.spo.remove(&[s, p, o]) {
            return false;
        }
        self.pos.remove(&[p, o, s]);
        self.osp.remove(&[o, s, p]);
        true
    }

    /// Membership test.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.spo.contains(key)
    }

    /// Number of triples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spo.len()
    }

    /// True if the graph holds no triples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spo.is_empty()
    }

    /// Remove every triple.
    pub fn clear(&mut self) {
        self.spo.clear();
        self.pos.clear();
        self.osp.clear();
    }

    /// All triples in SPO order.
    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        self.spo.iter().copied()
    }

    /// Triples matching a pattern, in SPO key form.
    ///
    /// The index is chosen so that the bound positions form a key prefix.
    #[must_use]
    pub fn matches(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> Vec<Key> {
        match (s, p, o) {
            (Some(s), Some(p), Some(o)) => {
                if self.spo.contains(&[s, p, o]) {
                    vec![[s, p, o]]
                } else {
                    Vec::new()
                }
            }
            (Some(s), Some(p), None) => scan(&self.spo, &[s, p]).collect(),
            (Some(s), None, None) => scan(&self.spo, &[s]).collect(),
            (Some(s), None, Some(o)) => scan(&self.osp, &[o, s])
                .map(|[o, s, p]| [s, p, o])
                .collect(),
            (None, Some(p), Some(o)) => scan(&self.pos, &[p, o])
                .map(|[p, o, s]| [s, p, o])
                .collect(),
            (None, Some(p), None) => scan(&self.pos, &[p])
                .map(|[p, o, s]| [s, p, o])
                .collect(),
            (None, None, Some(o)) => scan(&self.osp, &[o])
                .map(|[o, s, p]| [s, p, o])
                .collect(),
            (None, None, None) => self.spo.iter().copied().collect(),
        }
    }
}

/// Range scan over all keys starting with `prefix`.
fn scan<'a>(set: &'a BTreeSet<Key>, prefix: &[TermId]) -> impl Iterator<Item = Key> + 'a {
    let mut lo = [MIN_ID; 3];
    let mut hi = [MAX_ID; 3];
    for (i, id) in prefix.iter().enumerate() {
        lo[i] = *id;
        hi[i] = *id;
    }
    set.range((Bound::Included(lo), Bound::Included(hi))).copied()
}

// =============================================================================
// DATASET
// =============================================================================

/// Which graphs a pattern is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphScope {
    /// The default graph plus every named graph, deduplicated.
    Union,
    /// The merge of the listed graphs, deduplicated.
    Graphs(Vec<GraphName>),
}

impl GraphScope {
    /// Scope of exactly one graph.
    #[must_use]
    pub fn single(name: GraphName) -> Self {
        Self::Graphs(vec![name])
    }
}

/// A multi-graph dataset: one default graph plus named graphs.
///
/// Named graphs listed as pinned belong to the registry and can be cleared
/// but never dropped.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dict: Dictionary,
    default_graph: TripleIndex,
    named: BTreeMap<String, TripleIndex>,
    pinned: BTreeSet<String>,
    blank_scopes: u64,
}

impl Dataset {
    /// Create an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty named graph owned by the registry.
    pub fn create_pinned_graph(&mut self, name: &str) {
        self.named.entry(name.to_string()).or_default();
        self.pinned.insert(name.to_string());
    }

    /// Create an empty named graph. Returns false if it already exists.
    pub fn create_graph(&mut self, name: &str) -> bool {
        if self.named.contains_key(name) {
            return false;
        }
        self.named.insert(name.to_string(), TripleIndex::default());
        true
    }

    /// Fresh prefix for blank node labels, unique within this dataset.
    pub fn fresh_blank_scope(&mut self) -> String {
        self.blank_scopes += 1;
        format!("b{}", self.blank_scopes)
    }

    /// Insert a triple into a graph, creating the named graph if needed.
    pub fn insert(&mut self, graph: &GraphName, triple: &Triple) -> Result<bool, CattyError> {
        if !triple.is_well_formed() {
            return Err(CattyError::Update(format!(
                "Ill-formed triple cannot be stored: {}",
                triple
            )));
        }
        let key = [
            self.dict.intern(&triple.subject),
            self.dict.intern(&triple.predicate),
            self.dict.intern(&triple.object),
        ];
        let index = match graph {
            GraphName::Default => &mut self.default_graph,
            GraphName::Named(name) => self.named.entry(name.clone()).or_default(),
        };
        Ok(index.insert(key))
    }

    /// Remove a triple from a graph. Returns false if it was absent.
    pub fn remove(&mut self, graph: &GraphName, triple: &Triple) -> bool {
        let Some(key) = self.key_of(triple) else {
            return false;
        };
        match graph {
            GraphName::Default => self.default_graph.remove(key),
            GraphName::Named(name) => self.named.get_mut(name).is_some_and(|g| g.remove(key)),
        }
    }

    /// Remove every triple of one graph. The graph itself stays.
    pub fn clear_graph(&mut self, graph: &GraphName) {
        match graph {
            GraphName::Default => self.default_graph.clear(),
            GraphName::Named(name) => {
                if let Some(g) = self.named.get_mut(name) {
                    g.clear();
                }
            }
        }
    }

    /// Remove a named graph entirely.
    ///
    /// Registry graphs are refused; dropping the default graph clears it.
    pub fn drop_graph(&mut self, graph: &GraphName) -> Result<bool, CattyError> {
        match graph {
            GraphName::Default => {
                self.default_graph.clear();
                Ok(true)
            }
            GraphName::Named(name) => {
                if self.pinned.contains(name) {
                    return Err(CattyError::Update(format!(
                        "Graph <{}> belongs to the registry and cannot be dropped",
                        name
                    )));
                }
                Ok(self.named.remove(name).is_some())
            }
        }
    }

    /// True if the named graph exists.
    #[must_use]
    pub fn has_named_graph(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// True if the named graph belongs to the registry.
    #[must_use]
    pub fn is_pinned(&self, name: &str) -> bool {
        self.pinned.contains(name)
    }

    /// Names of all named graphs, sorted.
    pub fn named_graphs(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    /// Number of triples in one graph, `None` if the named graph is absent.
    #[must_use]
    pub fn graph_len(&self, graph: &GraphName) -> Option<usize> {
        match graph {
            GraphName::Default => Some(self.default_graph.len()),
            GraphName::Named(name) => self.named.get(name).map(TripleIndex::len),
        }
    }

    /// Total number of stored quads (a triple in two graphs counts twice).
    #[must_use]
    pub fn len(&self) -> usize {
        self.default_graph.len() + self.named.values().map(TripleIndex::len).sum::<usize>()
    }

    /// True if no graph holds a triple.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership test in one graph.
    #[must_use]
    pub fn contains(&self, graph: &GraphName, triple: &Triple) -> bool {
        let Some(key) = self.key_of(triple) else {
            return false;
        };
        self.index(graph).is_some_and(|g| g.contains(&key))
    }

    /// All triples of one graph in SPO order. Empty if the graph is absent.
    #[must_use]
    pub fn triples(&self, graph: &GraphName) -> Vec<Triple> {
        self.index(graph)
            .map(|g| g.iter().filter_map(|k| self.resolve(k)).collect())
            .unwrap_or_default()
    }

    /// All distinct triples across every graph, sorted.
    #[must_use]
    pub fn union_triples(&self) -> Vec<Triple> {
        self.match_pattern(&GraphScope::Union, None, None, None)
    }

    /// Every quad, sorted by graph then triple.
    #[must_use]
    pub fn quads(&self) -> Vec<(GraphName, Triple)> {
        let mut out = Vec::with_capacity(self.len());
        let mut names = vec![GraphName::Default];
        names.extend(self.named.keys().map(|n| GraphName::Named(n.clone())));
        for name in names {
            let mut triples = self.triples(&name);
            triples.sort();
            out.extend(triples.into_iter().map(|t| (name.clone(), t)));
        }
        out
    }

    /// Triples matching a pattern within a scope.
    ///
    /// Unknown bound terms match nothing. Results are deduplicated and
    /// sorted by interned key order.
    #[must_use]
    pub fn match_pattern(
        &self,
        scope: &GraphScope,
        s: Option<&Term>,
        p: Option<&Term>,
        o: Option<&Term>,
    ) -> Vec<Triple> {
        let (Some(s), Some(p), Some(o)) = (self.bound(s), self.bound(p), self.bound(o)) else {
            return Vec::new();
        };
        let keys: BTreeSet<Key> = match scope {
            GraphScope::Union => std::iter::once(&self.default_graph)
                .chain(self.named.values())
                .flat_map(|g| g.matches(s, p, o))
                .collect(),
            GraphScope::Graphs(names) => names
                .iter()
                .filter_map(|n| self.index(n))
                .flat_map(|g| g.matches(s, p, o))
                .collect(),
        };
        keys.into_iter().filter_map(|k| self.resolve(k)).collect()
    }

    /// Distinct subjects across the whole dataset.
    #[must_use]
    pub fn distinct_subjects(&self) -> usize {
        self.distinct_position(0)
    }

    /// Distinct predicates across the whole dataset.
    #[must_use]
    pub fn distinct_predicates(&self) -> usize {
        self.distinct_position(1)
    }

    fn distinct_position(&self, pos: usize) -> usize {
        std::iter::once(&self.default_graph)
            .chain(self.named.values())
            .flat_map(TripleIndex::iter)
            .map(|k| k[pos])
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn index(&self, graph: &GraphName) -> Option<&TripleIndex> {
        match graph {
            GraphName::Default => Some(&self.default_graph),
            GraphName::Named(name) => self.named.get(name),
        }
    }

    /// `Some(None)` for an unbound position, `None` if a bound term is unknown.
    fn bound(&self, term: Option<&Term>) -> Option<Option<TermId>> {
        match term {
            None => Some(None),
            Some(t) => self.dict.id_of(t).map(Some),
        }
    }

    fn key_of(&self, triple: &Triple) -> Option<Key> {
        Some([
            self.dict.id_of(&triple.subject)?,
            self.dict.id_of(&triple.predicate)?,
            self.dict.id_of(&triple.object)?,
        ])
    }

    fn resolve(&self, [s, p, o]: Key) -> Option<Triple> {
        Some(Triple::new(
            self.dict.term(s)?.clone(),
            self.dict.term(p)?.clone(),
            self.dict.term(o)?.clone(),
        ))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), Term::literal(o))
    }

    #[test]
    fn index_answers_every_bound_combination() {
        let mut ds = Dataset::new();
        let g = GraphName::named("http://g");
        ds.insert(&g, &t("s1", "p1", "a")).unwrap();
        ds.insert(&g, &t("s1", "p2", "b")).unwrap();
        ds.insert(&g, &t("s2", "p1", "a")).unwrap();

        let scope = GraphScope::single(g);
        let s1 = Term::iri("s1");
        let p1 = Term::iri("p1");
        let a = Term::literal("a");
        assert_eq!(ds.match_pattern(&scope, Some(&s1), None, None).len(), 2);
        assert_eq!(ds.match_pattern(&scope, None, Some(&p1), None).len(), 2);
        assert_eq!(ds.match_pattern(&scope, None, None, Some(&a)).len(), 2);
        assert_eq!(ds.match_pattern(&scope, Some(&s1), Some(&p1), None).len(), 1);
        assert_eq!(ds.match_pattern(&scope, Some(&s1), None, Some(&a)).len(), 1);
        assert_eq!(ds.match_pattern(&scope, None, Some(&p1), Some(&a)).len(), 2);
        assert_eq!(ds.match_pattern(&scope, Some(&s1), Some(&p1), Some(&a)).len(), 1);
        assert_eq!(ds.match_pattern(&scope, None, None, None).len(), 3);
    }

    #[test]
    fn unknown_term_matches_nothing() {
        let mut ds = Dataset::new();
        ds.insert(&GraphName::Default, &t("s", "p", "o")).unwrap();
        let unknown = Term::iri("nope");
        assert!(
            ds.match_pattern(&GraphScope::Union, Some(&unknown), None, None)
                .is_empty()
        );
    }

    #[test]
    fn union_deduplicates_across_graphs() {
        let mut ds = Dataset::new();
        let triple = t("s", "p", "o");
        ds.insert(&GraphName::named("http://a"), &triple).unwrap();
        ds.insert(&GraphName::named("http://b"), &triple).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.union_triples().len(), 1);
    }

    #[test]
    fn remove_updates_all_permutations() {
        let mut ds = Dataset::new();
        let g = GraphName::Default;
        let triple = t("s", "p", "o");
        ds.insert(&g, &triple).unwrap();
        assert!(ds.remove(&g, &triple));
        assert!(!ds.remove(&g, &triple));
        let o = Term::literal("o");
        assert!(
            ds.match_pattern(&GraphScope::Union, None, None, Some(&o))
                .is_empty()
        );
    }

    #[test]
    fn pinned_graph_cannot_be_dropped() {
        let mut ds = Dataset::new();
        ds.create_pinned_graph("http://reg#");
        assert!(ds.drop_graph(&GraphName::named("http://reg#")).is_err());
        ds.insert(&GraphName::named("http://tmp"), &t("s", "p", "o"))
            .unwrap();
        assert!(ds.drop_graph(&GraphName::named("http://tmp")).unwrap());
        assert!(!ds.has_named_graph("http://tmp"));
    }

    #[test]
    fn literal_subject_is_refused() {
        let mut ds = Dataset::new();
        let bad = Triple::new(Term::literal("s"), Term::iri("p"), Term::iri("o"));
        assert!(ds.insert(&GraphName::Default, &bad).is_err());
        assert!(ds.is_empty());
    }
}
