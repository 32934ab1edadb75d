//! # Query Syntax Tree
//!
//! Closed enums for query forms, graph patterns, expressions and update
//! operations. The parser resolves prefixes and relative IRIs, so every IRI
//! in the tree is already expanded.

use crate::types::Term;

// =============================================================================
// QUERY
// =============================================================================

/// The four query forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryForm {
    Select,
    Ask,
    Construct,
    Describe,
}

impl QueryForm {
    /// Lower-case name of the form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Ask => "ask",
            Self::Construct => "construct",
            Self::Describe => "describe",
        }
    }
}

/// A parsed query.
#[derive(Debug, Clone)]
pub struct Query {
    pub kind: QueryKind,
    pub dataset: DatasetClause,
    pub pattern: GraphPattern,
    pub modifiers: SolutionModifiers,
}

impl Query {
    /// The form of this query.
    #[must_use]
    pub fn form(&self) -> QueryForm {
        match self.kind {
            QueryKind::Select { .. } => QueryForm::Select,
            QueryKind::Ask => QueryForm::Ask,
            QueryKind::Construct { .. } => QueryForm::Construct,
            QueryKind::Describe { .. } => QueryForm::Describe,
        }
    }
}

/// Form-specific parts of a query.
#[derive(Debug, Clone)]
pub enum QueryKind {
    Select {
        distinct: bool,
        projection: Projection,
    },
    Ask,
    Construct {
        template: Vec<TriplePattern>,
    },
    Describe {
        targets: Vec<TermPattern>,
    },
}

/// `FROM` and `FROM NAMED` clauses.
#[derive(Debug, Clone, Default)]
pub struct DatasetClause {
    pub default: Vec<String>,
    pub named: Vec<String>,
}

impl DatasetClause {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.is_empty()
    }
}

/// SELECT projection.
#[derive(Debug, Clone)]
pub enum Projection {
    /// `SELECT *`
    All,
    Items(Vec<ProjectionItem>),
}

#[derive(Debug, Clone)]
pub enum ProjectionItem {
    Var(String),
    /// `(expr AS ?var)`
    Expr(Expression, String),
}

#[derive(Debug, Clone, Default)]
pub struct SolutionModifiers {
    pub group_by: Vec<GroupKey>,
    pub having: Vec<Expression>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct GroupKey {
    pub expr: Expression,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderKey {
    pub expr: Expression,
    pub descending: bool,
}

// =============================================================================
// PATTERNS
// =============================================================================

/// A position in a triple pattern.
///
/// Blank nodes in query patterns are parsed as hidden variables whose names
/// start with `#`, so they never appear in `SELECT *` output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TermPattern {
    Var(String),
    Term(Term),
}

impl TermPattern {
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(v) => Some(v),
            Self::Term(_) => None,
        }
    }
}

/// Name prefix marking a variable introduced for a query blank node.
pub const HIDDEN_VAR_PREFIX: char = '#';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    #[must_use]
    pub fn new(subject: TermPattern, predicate: TermPattern, object: TermPattern) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// Property path expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyPath {
    Iri(String),
    Inverse(Box<PropertyPath>),
    Sequence(Vec<PropertyPath>),
    Alternative(Vec<PropertyPath>),
    ZeroOrMore(Box<PropertyPath>),
    OneOrMore(Box<PropertyPath>),
    ZeroOrOne(Box<PropertyPath>),
    /// `!(p1|^p2)`: forward and inverse IRIs excluded.
    Negated {
        forward: Vec<String>,
        inverse: Vec<String>,
    },
}

/// One element of a basic graph pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternElement {
    Triple(TriplePattern),
    Path {
        subject: TermPattern,
        path: PropertyPath,
        object: TermPattern,
    },
}

#[derive(Debug, Clone)]
pub enum GraphPattern {
    /// `{ ... }`: elements joined left to right, filters applied last.
    Group(Vec<GraphPattern>),
    Bgp(Vec<PatternElement>),
    Optional(Box<GraphPattern>),
    Union(Vec<GraphPattern>),
    Minus(Box<GraphPattern>),
    Graph {
        name: TermPattern,
        pattern: Box<GraphPattern>,
    },
    Filter(Expression),
    Bind {
        expr: Expression,
        var: String,
    },
    Values {
        vars: Vec<String>,
        rows: Vec<Vec<Option<Term>>>,
    },
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Iri,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    StrStarts,
    StrEnds,
    Contains,
    StrLen,
    LCase,
    UCase,
    Concat,
    Regex,
    SameTerm,
    If,
    Coalesce,
}

impl Function {
    /// Look up a function by its (case-insensitive) name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "STR" => Self::Str,
            "LANG" => Self::Lang,
            "LANGMATCHES" => Self::LangMatches,
            "DATATYPE" => Self::Datatype,
            "IRI" | "URI" => Self::Iri,
            "ISIRI" | "ISURI" => Self::IsIri,
            "ISBLANK" => Self::IsBlank,
            "ISLITERAL" => Self::IsLiteral,
            "ISNUMERIC" => Self::IsNumeric,
            "STRSTARTS" => Self::StrStarts,
            "STRENDS" => Self::StrEnds,
            "CONTAINS" => Self::Contains,
            "STRLEN" => Self::StrLen,
            "LCASE" => Self::LCase,
            "UCASE" => Self::UCase,
            "CONCAT" => Self::Concat,
            "REGEX" => Self::Regex,
            "SAMETERM" => Self::SameTerm,
            "IF" => Self::If,
            "COALESCE" => Self::Coalesce,
            _ => return None,
        })
    }

    /// Accepted argument counts (inclusive); `None` means variadic.
    #[must_use]
    pub fn arity(self) -> Option<(usize, usize)> {
        match self {
            Self::Str
            | Self::Lang
            | Self::Datatype
            | Self::Iri
            | Self::IsIri
            | Self::IsBlank
            | Self::IsLiteral
            | Self::IsNumeric
            | Self::StrLen
            | Self::LCase
            | Self::UCase => Some((1, 1)),
            Self::LangMatches
            | Self::StrStarts
            | Self::StrEnds
            | Self::Contains
            | Self::SameTerm => Some((2, 2)),
            Self::Regex => Some((2, 3)),
            Self::If => Some((3, 3)),
            Self::Concat | Self::Coalesce => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Sample,
    GroupConcat,
}

impl AggregateFunction {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "COUNT" => Self::Count,
            "SUM" => Self::Sum,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "AVG" => Self::Avg,
            "SAMPLE" => Self::Sample,
            "GROUP_CONCAT" => Self::GroupConcat,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub distinct: bool,
    /// `None` for `COUNT(*)`.
    pub arg: Option<Box<Expression>>,
    pub separator: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Var(String),
    Term(Term),
    Or(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    In {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    Arith(ArithOp, Box<Expression>, Box<Expression>),
    Neg(Box<Expression>),
    Bound(String),
    Call(Function, Vec<Expression>),
    Exists(Box<GraphPattern>),
    NotExists(Box<GraphPattern>),
    Aggregate(Aggregate),
}

impl Expression {
    /// True if an aggregate occurs anywhere in the expression.
    #[must_use]
    pub fn has_aggregate(&self) -> bool {
        match self {
            Self::Aggregate(_) => true,
            Self::Var(_)
            | Self::Term(_)
            | Self::Bound(_)
            | Self::Exists(_)
            | Self::NotExists(_) => false,
            Self::Or(a, b) | Self::And(a, b) | Self::Compare(_, a, b) | Self::Arith(_, a, b) => {
                a.has_aggregate() || b.has_aggregate()
            }
            Self::Not(a) | Self::Neg(a) => a.has_aggregate(),
            Self::In { expr, list, .. } => {
                expr.has_aggregate() || list.iter().any(Expression::has_aggregate)
            }
            Self::Call(_, args) => args.iter().any(Expression::has_aggregate),
        }
    }
}

// =============================================================================
// UPDATES
// =============================================================================

/// A triple template with an optional `GRAPH` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadPattern {
    pub graph: Option<TermPattern>,
    pub triple: TriplePattern,
}

/// Target of `CLEAR` and `DROP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphTarget {
    Graph(String),
    Default,
    Named,
    All,
}

#[derive(Debug, Clone)]
pub enum UpdateOperation {
    InsertData(Vec<QuadPattern>),
    DeleteData(Vec<QuadPattern>),
    DeleteWhere(Vec<QuadPattern>),
    Modify {
        with: Option<String>,
        delete: Vec<QuadPattern>,
        insert: Vec<QuadPattern>,
        pattern: GraphPattern,
    },
    Clear {
        silent: bool,
        target: GraphTarget,
    },
    Drop {
        silent: bool,
        target: GraphTarget,
    },
    Create {
        silent: bool,
        graph: String,
    },
}
