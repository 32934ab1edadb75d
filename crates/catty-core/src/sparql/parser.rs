//! # Query Parser
//!
//! Recursive-descent parser over the token stream produced by the lexer.
//!
//! - `parse_query` accepts SELECT, ASK, CONSTRUCT and DESCRIBE
//! - `parse_update` accepts a `;`-separated sequence of update operations
//!
//! Any other leading keyword is reported as `UnsupportedQuery`; malformed
//! text is reported as `QuerySyntax` with the offending token's position.

use super::ast::{
    Aggregate, AggregateFunction, ArithOp, CompareOp, DatasetClause, Expression, Function,
    GraphPattern, GraphTarget, GroupKey, HIDDEN_VAR_PREFIX, OrderKey, PatternElement, Projection,
    ProjectionItem, PropertyPath, QuadPattern, Query, QueryKind, SolutionModifiers, TermPattern,
    TriplePattern, UpdateOperation,
};
use super::lexer::{Token, TokenKind, tokenize};
use crate::formats::jsonld::join;
use crate::primitives::{
    MAX_QUERY_DEPTH, MAX_QUERY_LENGTH, RDF_TYPE, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER,
};
use crate::types::{CattyError, Literal, Term};
use std::collections::BTreeMap;

/// Keywords that start an update operation.
const UPDATE_KEYWORDS: &[&str] = &[
    "INSERT", "DELETE", "WITH", "LOAD", "CLEAR", "DROP", "CREATE", "ADD", "MOVE", "COPY",
];

/// Parse query text.
pub fn parse_query(text: &str) -> Result<Query, CattyError> {
    let mut parser = Parser::new(text)?;
    parser.prologue()?;
    let query = parser.query()?;
    parser.expect_eof()?;
    Ok(query)
}

/// Parse update text into its operations.
pub fn parse_update(text: &str) -> Result<Vec<UpdateOperation>, CattyError> {
    let mut parser = Parser::new(text)?;
    let mut operations = Vec::new();
    loop {
        parser.prologue()?;
        if parser.at_eof() {
            break;
        }
        operations.push(parser.update_operation()?);
        if !parser.eat(&TokenKind::Semicolon) {
            break;
        }
    }
    parser.expect_eof()?;
    if operations.is_empty() {
        return Err(parser.error_here("empty update"));
    }
    Ok(operations)
}

/// How blank nodes in the current position are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlankMode {
    /// Query patterns: blank nodes are hidden variables.
    Variable,
    /// Templates and data: blank nodes stay terms.
    Term,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    prefixes: BTreeMap<String, String>,
    base: Option<String>,
    anon: usize,
    blank_mode: BlankMode,
    allow_paths: bool,
    /// Open groups, expressions, blank nodes and paths at the cursor.
    depth: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, CattyError> {
        if text.len() > MAX_QUERY_LENGTH {
            return Err(CattyError::QuerySyntax {
                message: format!("query text exceeds {} bytes", MAX_QUERY_LENGTH),
                line: 1,
                column: 1,
            });
        }
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            prefixes: BTreeMap::new(),
            base: None,
            anon: 0,
            blank_mode: BlankMode::Variable,
            allow_paths: true,
            depth: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        self.peek_n(0)
    }

    fn peek_n(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn at_eof(&self) -> bool {
        *self.peek() == TokenKind::Eof
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), CattyError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn expect_eof(&self) -> Result<(), CattyError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn is_word(&self, word: &str) -> bool {
        self.is_word_at(0, word)
    }

    fn is_word_at(&self, n: usize, word: &str) -> bool {
        matches!(self.peek_n(n), TokenKind::Word(w) if w.eq_ignore_ascii_case(word))
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), CattyError> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.unexpected(word))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> CattyError {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or((1, 1), |t| (t.line, t.column));
        CattyError::QuerySyntax {
            message: message.into(),
            line,
            column,
        }
    }

    /// Run `f` one nesting level deeper, failing past `MAX_QUERY_DEPTH`.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CattyError>,
    ) -> Result<T, CattyError> {
        if self.depth >= MAX_QUERY_DEPTH {
            return Err(self.error_here(format!(
                "query nesting exceeds {} levels",
                MAX_QUERY_DEPTH
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self, expected: &str) -> CattyError {
        self.error_here(format!(
            "expected {}, found {}",
            expected,
            self.peek().describe()
        ))
    }

    // -------------------------------------------------------------------------
    // Prologue and IRIs
    // -------------------------------------------------------------------------

    fn prologue(&mut self) -> Result<(), CattyError> {
        loop {
            if self.eat_word("BASE") {
                let iri = self.iri_ref()?;
                self.base = Some(iri);
            } else if self.eat_word("PREFIX") {
                let prefix = match self.advance() {
                    TokenKind::PrefixedName { prefix, local } if local.is_empty() => prefix,
                    _ => return Err(self.error_here("expected prefix declaration 'name:'")),
                };
                let iri = self.iri_ref()?;
                self.prefixes.insert(prefix, iri);
            } else {
                return Ok(());
            }
        }
    }

    fn resolve(&self, iri: String) -> String {
        match &self.base {
            Some(base) => join(base, &iri),
            None => iri,
        }
    }

    fn iri_ref(&mut self) -> Result<String, CattyError> {
        match self.peek().clone() {
            TokenKind::Iri(iri) => {
                self.advance();
                Ok(self.resolve(iri))
            }
            _ => Err(self.unexpected("IRI")),
        }
    }

    fn expand_prefixed(&self, prefix: &str, local: &str) -> Result<String, CattyError> {
        self.prefixes
            .get(prefix)
            .map(|ns| format!("{}{}", ns, local))
            .ok_or_else(|| self.error_here(format!("undefined prefix '{}:'", prefix)))
    }

    /// IRI or prefixed name.
    fn iri(&mut self) -> Result<String, CattyError> {
        match self.peek().clone() {
            TokenKind::PrefixedName { prefix, local } => {
                let iri = self.expand_prefixed(&prefix, &local)?;
                self.advance();
                Ok(iri)
            }
            _ => self.iri_ref(),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn query(&mut self) -> Result<Query, CattyError> {
        let word = match self.peek() {
            TokenKind::Word(w) => w.to_ascii_uppercase(),
            TokenKind::Eof => return Err(self.error_here("empty query")),
            _ => return Err(self.unexpected("SELECT, ASK, CONSTRUCT or DESCRIBE")),
        };
        match word.as_str() {
            "SELECT" => self.select(),
            "ASK" => {
                self.advance();
                let dataset = self.dataset_clause()?;
                self.eat_word("WHERE");
                let pattern = self.group()?;
                let modifiers = self.modifiers()?;
                Ok(Query {
                    kind: QueryKind::Ask,
                    dataset,
                    pattern,
                    modifiers,
                })
            }
            "CONSTRUCT" => self.construct(),
            "DESCRIBE" => self.describe(),
            w if UPDATE_KEYWORDS.contains(&w) => Err(CattyError::UnsupportedQuery(format!(
                "{} is an update operation; submit it as an update",
                w
            ))),
            w => Err(CattyError::UnsupportedQuery(format!(
                "unsupported query form '{}'",
                w
            ))),
        }
    }

    fn select(&mut self) -> Result<Query, CattyError> {
        self.expect_word("SELECT")?;
        let distinct = self.eat_word("DISTINCT") || self.eat_word("REDUCED");
        let projection = if self.eat(&TokenKind::Star) {
            Projection::All
        } else {
            let mut items = Vec::new();
            loop {
                match self.peek().clone() {
                    TokenKind::Var(v) => {
                        self.advance();
                        items.push(ProjectionItem::Var(v));
                    }
                    TokenKind::LParen => {
                        self.advance();
                        let expr = self.expression()?;
                        self.expect_word("AS")?;
                        let var = self.var()?;
                        self.expect(&TokenKind::RParen)?;
                        items.push(ProjectionItem::Expr(expr, var));
                    }
                    _ => break,
                }
            }
            if items.is_empty() {
                return Err(self.unexpected("projection"));
            }
            Projection::Items(items)
        };
        let dataset = self.dataset_clause()?;
        self.eat_word("WHERE");
        let pattern = self.group()?;
        let modifiers = self.modifiers()?;
        Ok(Query {
            kind: QueryKind::Select {
                distinct,
                projection,
            },
            dataset,
            pattern,
            modifiers,
        })
    }

    fn construct(&mut self) -> Result<Query, CattyError> {
        self.expect_word("CONSTRUCT")?;
        if self.is_word("WHERE") || self.is_word("FROM") {
            // CONSTRUCT WHERE { triples }: the pattern doubles as template.
            let dataset = self.dataset_clause()?;
            self.expect_word("WHERE")?;
            self.expect(&TokenKind::LBrace)?;
            let saved = self.allow_paths;
            self.allow_paths = false;
            let mut elements = Vec::new();
            self.triples_block(&mut elements, &TokenKind::RBrace)?;
            self.allow_paths = saved;
            self.expect(&TokenKind::RBrace)?;
            let template = elements
                .iter()
                .filter_map(|e| match e {
                    PatternElement::Triple(t) => Some(t.clone()),
                    PatternElement::Path { .. } => None,
                })
                .collect();
            let modifiers = self.modifiers()?;
            return Ok(Query {
                kind: QueryKind::Construct { template },
                dataset,
                pattern: GraphPattern::Group(vec![GraphPattern::Bgp(elements)]),
                modifiers,
            });
        }
        let template = self.template()?;
        let dataset = self.dataset_clause()?;
        self.eat_word("WHERE");
        let pattern = self.group()?;
        let modifiers = self.modifiers()?;
        Ok(Query {
            kind: QueryKind::Construct { template },
            dataset,
            pattern,
            modifiers,
        })
    }

    fn describe(&mut self) -> Result<Query, CattyError> {
        self.expect_word("DESCRIBE")?;
        let mut targets = Vec::new();
        if self.eat(&TokenKind::Star) {
            // All in-scope variables, resolved by the evaluator.
        } else {
            loop {
                match self.peek().clone() {
                    TokenKind::Var(v) => {
                        self.advance();
                        targets.push(TermPattern::Var(v));
                    }
                    TokenKind::Iri(_) | TokenKind::PrefixedName { .. } => {
                        targets.push(TermPattern::Term(Term::Iri(self.iri()?)));
                    }
                    _ => break,
                }
            }
            if targets.is_empty() {
                return Err(self.unexpected("resource to describe"));
            }
        }
        let dataset = self.dataset_clause()?;
        let has_where = self.eat_word("WHERE") || *self.peek() == TokenKind::LBrace;
        let pattern = if has_where {
            self.group()?
        } else {
            GraphPattern::Group(Vec::new())
        };
        let modifiers = self.modifiers()?;
        Ok(Query {
            kind: QueryKind::Describe { targets },
            dataset,
            pattern,
            modifiers,
        })
    }

    fn dataset_clause(&mut self) -> Result<DatasetClause, CattyError> {
        let mut clause = DatasetClause::default();
        while self.eat_word("FROM") {
            if self.eat_word("NAMED") {
                clause.named.push(self.iri()?);
            } else {
                clause.default.push(self.iri()?);
            }
        }
        Ok(clause)
    }

    fn modifiers(&mut self) -> Result<SolutionModifiers, CattyError> {
        let mut m = SolutionModifiers::default();
        if self.is_word("GROUP") && self.is_word_at(1, "BY") {
            self.advance();
            self.advance();
            loop {
                match self.peek().clone() {
                    TokenKind::Var(v) => {
                        self.advance();
                        m.group_by.push(GroupKey {
                            expr: Expression::Var(v),
                            alias: None,
                        });
                    }
                    TokenKind::LParen => {
                        self.advance();
                        let expr = self.expression()?;
                        let alias = if self.eat_word("AS") {
                            Some(self.var()?)
                        } else {
                            None
                        };
                        self.expect(&TokenKind::RParen)?;
                        m.group_by.push(GroupKey { expr, alias });
                    }
                    TokenKind::Word(w) if Function::from_name(&w).is_some() => {
                        let expr = self.primary()?;
                        m.group_by.push(GroupKey { expr, alias: None });
                    }
                    _ => break,
                }
            }
            if m.group_by.is_empty() {
                return Err(self.unexpected("group condition"));
            }
        }
        if self.eat_word("HAVING") {
            while self.starts_constraint() {
                m.having.push(self.constraint()?);
            }
            if m.having.is_empty() {
                return Err(self.unexpected("HAVING condition"));
            }
        }
        if self.is_word("ORDER") && self.is_word_at(1, "BY") {
            self.advance();
            self.advance();
            loop {
                let descending = if self.eat_word("DESC") {
                    true
                } else {
                    self.eat_word("ASC");
                    false
                };
                let expr = match self.peek().clone() {
                    TokenKind::Var(v) => {
                        self.advance();
                        Expression::Var(v)
                    }
                    TokenKind::LParen => self.bracketted()?,
                    TokenKind::Word(w)
                        if Function::from_name(&w).is_some()
                            || AggregateFunction::from_name(&w).is_some() =>
                    {
                        self.primary()?
                    }
                    _ => break,
                };
                m.order_by.push(OrderKey { expr, descending });
            }
            if m.order_by.is_empty() {
                return Err(self.unexpected("order condition"));
            }
        }
        for _ in 0..2 {
            if self.eat_word("LIMIT") {
                m.limit = Some(self.usize_literal()?);
            } else if self.eat_word("OFFSET") {
                m.offset = self.usize_literal()?;
            }
        }
        Ok(m)
    }

    fn usize_literal(&mut self) -> Result<usize, CattyError> {
        match self.advance() {
            TokenKind::Integer(n) => n
                .parse()
                .map_err(|_| self.error_here(format!("invalid count '{}'", n))),
            _ => Err(self.error_here("expected non-negative integer")),
        }
    }

    fn var(&mut self) -> Result<String, CattyError> {
        match self.peek().clone() {
            TokenKind::Var(v) => {
                self.advance();
                Ok(v)
            }
            _ => Err(self.unexpected("variable")),
        }
    }

    // -------------------------------------------------------------------------
    // Graph patterns
    // -------------------------------------------------------------------------

    fn group(&mut self) -> Result<GraphPattern, CattyError> {
        self.nested(Self::group_body)
    }

    fn group_body(&mut self) -> Result<GraphPattern, CattyError> {
        self.expect(&TokenKind::LBrace)?;
        if self.is_word("SELECT") {
            return Err(CattyError::UnsupportedQuery(
                "sub-queries are not supported".to_string(),
            ));
        }
        let mut elements: Vec<GraphPattern> = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Dot => {
                    self.advance();
                }
                TokenKind::LBrace => {
                    let first = self.group()?;
                    let mut branches = vec![first];
                    while self.eat_word("UNION") {
                        branches.push(self.group()?);
                    }
                    if branches.len() == 1 {
                        elements.extend(branches);
                    } else {
                        elements.push(GraphPattern::Union(branches));
                    }
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("OPTIONAL") => {
                    self.advance();
                    elements.push(GraphPattern::Optional(Box::new(self.group()?)));
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("MINUS") => {
                    self.advance();
                    elements.push(GraphPattern::Minus(Box::new(self.group()?)));
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("GRAPH") => {
                    self.advance();
                    let name = self.var_or_iri()?;
                    let pattern = Box::new(self.group()?);
                    elements.push(GraphPattern::Graph { name, pattern });
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("FILTER") => {
                    self.advance();
                    elements.push(GraphPattern::Filter(self.constraint()?));
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("BIND") => {
                    self.advance();
                    self.expect(&TokenKind::LParen)?;
                    let expr = self.expression()?;
                    self.expect_word("AS")?;
                    let var = self.var()?;
                    self.expect(&TokenKind::RParen)?;
                    elements.push(GraphPattern::Bind { expr, var });
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("VALUES") => {
                    self.advance();
                    elements.push(self.values()?);
                }
                TokenKind::Word(w) if w.eq_ignore_ascii_case("SERVICE") => {
                    return Err(CattyError::UnsupportedQuery(
                        "SERVICE is not supported; use the federation API".to_string(),
                    ));
                }
                TokenKind::Eof => return Err(self.unexpected("'}'")),
                _ => {
                    let mut block = Vec::new();
                    self.triples_block(&mut block, &TokenKind::RBrace)?;
                    match elements.last_mut() {
                        Some(GraphPattern::Bgp(prev)) => prev.extend(block),
                        _ => elements.push(GraphPattern::Bgp(block)),
                    }
                }
            }
        }
        Ok(GraphPattern::Group(elements))
    }

    fn starts_constraint(&self) -> bool {
        match self.peek() {
            TokenKind::LParen => true,
            TokenKind::Word(w) => {
                Function::from_name(w).is_some()
                    || AggregateFunction::from_name(w).is_some()
                    || w.eq_ignore_ascii_case("BOUND")
                    || w.eq_ignore_ascii_case("EXISTS")
                    || w.eq_ignore_ascii_case("NOT")
            }
            _ => false,
        }
    }

    fn constraint(&mut self) -> Result<Expression, CattyError> {
        match self.peek() {
            TokenKind::LParen => self.bracketted(),
            _ => self.primary(),
        }
    }

    fn bracketted(&mut self) -> Result<Expression, CattyError> {
        self.expect(&TokenKind::LParen)?;
        let expr = self.expression()?;
        self.expect(&TokenKind::RParen)?;
        Ok(expr)
    }

    fn values(&mut self) -> Result<GraphPattern, CattyError> {
        let mut vars = Vec::new();
        let single = if let TokenKind::Var(v) = self.peek().clone() {
            self.advance();
            vars.push(v);
            true
        } else {
            self.expect(&TokenKind::LParen)?;
            while let TokenKind::Var(v) = self.peek().clone() {
                self.advance();
                vars.push(v);
            }
            self.expect(&TokenKind::RParen)?;
            false
        };
        self.expect(&TokenKind::LBrace)?;
        let mut rows = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if single {
                rows.push(vec![self.data_value()?]);
            } else {
                self.expect(&TokenKind::LParen)?;
                let mut row = Vec::new();
                while !self.eat(&TokenKind::RParen) {
                    row.push(self.data_value()?);
                }
                if row.len() != vars.len() {
                    return Err(self.error_here(format!(
                        "VALUES row has {} values for {} variables",
                        row.len(),
                        vars.len()
                    )));
                }
                rows.push(row);
            }
        }
        Ok(GraphPattern::Values { vars, rows })
    }

    fn data_value(&mut self) -> Result<Option<Term>, CattyError> {
        if self.eat_word("UNDEF") {
            return Ok(None);
        }
        match self.term_pattern()? {
            TermPattern::Term(t) if !t.is_blank() => Ok(Some(t)),
            _ => Err(self.error_here("VALUES accepts only IRIs, literals and UNDEF")),
        }
    }

    /// Triples separated by `.` until `end` or a non-triple token.
    fn triples_block(
        &mut self,
        out: &mut Vec<PatternElement>,
        end: &TokenKind,
    ) -> Result<(), CattyError> {
        loop {
            if self.peek() == end {
                return Ok(());
            }
            self.triples_same_subject(out)?;
            if !self.eat(&TokenKind::Dot) {
                return Ok(());
            }
            if !self.starts_term() {
                return Ok(());
            }
        }
    }

    fn starts_term(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Var(_)
                | TokenKind::Iri(_)
                | TokenKind::PrefixedName { .. }
                | TokenKind::BlankLabel(_)
                | TokenKind::LBracket
                | TokenKind::String(_)
                | TokenKind::Integer(_)
                | TokenKind::Decimal(_)
                | TokenKind::Double(_)
        ) || self.is_word("true")
            || self.is_word("false")
    }

    fn triples_same_subject(&mut self, out: &mut Vec<PatternElement>) -> Result<(), CattyError> {
        if *self.peek() == TokenKind::LBracket && *self.peek_n(1) != TokenKind::RBracket {
            let subject = self.blank_property_list(out)?;
            if self.starts_verb() {
                self.property_list(&subject, out)?;
            }
            return Ok(());
        }
        let subject = self.term_pattern()?;
        if let TermPattern::Term(Term::Literal(_)) = subject {
            return Err(self.error_here("a literal cannot be a subject"));
        }
        self.property_list(&subject, out)
    }

    fn starts_verb(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Var(_)
                | TokenKind::Iri(_)
                | TokenKind::PrefixedName { .. }
                | TokenKind::Caret
                | TokenKind::Bang
                | TokenKind::LParen
        ) || self.is_word("a")
    }

    fn property_list(
        &mut self,
        subject: &TermPattern,
        out: &mut Vec<PatternElement>,
    ) -> Result<(), CattyError> {
        loop {
            let verb = self.verb()?;
            loop {
                let object = if *self.peek() == TokenKind::LBracket
                    && *self.peek_n(1) != TokenKind::RBracket
                {
                    self.blank_property_list(out)?
                } else {
                    self.term_pattern()?
                };
                out.push(match &verb {
                    Verb::Simple(p) => PatternElement::Triple(TriplePattern::new(
                        subject.clone(),
                        p.clone(),
                        object,
                    )),
                    Verb::Path(path) => PatternElement::Path {
                        subject: subject.clone(),
                        path: path.clone(),
                        object,
                    },
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            if !self.eat(&TokenKind::Semicolon) {
                return Ok(());
            }
            while self.eat(&TokenKind::Semicolon) {}
            if !self.starts_verb() {
                return Ok(());
            }
        }
    }

    fn blank_property_list(
        &mut self,
        out: &mut Vec<PatternElement>,
    ) -> Result<TermPattern, CattyError> {
        self.nested(|p| {
            p.expect(&TokenKind::LBracket)?;
            let node = p.fresh_blank();
            p.property_list(&node, out)?;
            p.expect(&TokenKind::RBracket)?;
            Ok(node)
        })
    }

    fn fresh_blank(&mut self) -> TermPattern {
        self.anon += 1;
        self.blank_pattern(&format!("anon{}", self.anon))
    }

    fn blank_pattern(&self, label: &str) -> TermPattern {
        match self.blank_mode {
            BlankMode::Variable => TermPattern::Var(format!("{}{}", HIDDEN_VAR_PREFIX, label)),
            BlankMode::Term => TermPattern::Term(Term::blank(label)),
        }
    }

    fn verb(&mut self) -> Result<Verb, CattyError> {
        if let TokenKind::Var(v) = self.peek().clone() {
            self.advance();
            return Ok(Verb::Simple(TermPattern::Var(v)));
        }
        let path = self.path_alternative()?;
        match path {
            PropertyPath::Iri(iri) => Ok(Verb::Simple(TermPattern::Term(Term::Iri(iri)))),
            other if self.allow_paths => Ok(Verb::Path(other)),
            _ => Err(self.error_here("property paths are not allowed here")),
        }
    }

    fn path_alternative(&mut self) -> Result<PropertyPath, CattyError> {
        let mut alternatives = vec![self.path_sequence()?];
        while self.eat(&TokenKind::Pipe) {
            alternatives.push(self.path_sequence()?);
        }
        Ok(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            PropertyPath::Alternative(alternatives)
        })
    }

    fn path_sequence(&mut self) -> Result<PropertyPath, CattyError> {
        let mut steps = vec![self.path_elt_or_inverse()?];
        while self.eat(&TokenKind::Slash) {
            steps.push(self.path_elt_or_inverse()?);
        }
        Ok(if steps.len() == 1 {
            steps.remove(0)
        } else {
            PropertyPath::Sequence(steps)
        })
    }

    fn path_elt_or_inverse(&mut self) -> Result<PropertyPath, CattyError> {
        if self.eat(&TokenKind::Caret) {
            return Ok(PropertyPath::Inverse(Box::new(self.path_elt()?)));
        }
        self.path_elt()
    }

    fn path_elt(&mut self) -> Result<PropertyPath, CattyError> {
        let primary = self.path_primary()?;
        Ok(match self.peek() {
            TokenKind::Star => {
                self.advance();
                PropertyPath::ZeroOrMore(Box::new(primary))
            }
            TokenKind::Plus => {
                self.advance();
                PropertyPath::OneOrMore(Box::new(primary))
            }
            TokenKind::Question => {
                self.advance();
                PropertyPath::ZeroOrOne(Box::new(primary))
            }
            _ => primary,
        })
    }

    fn path_primary(&mut self) -> Result<PropertyPath, CattyError> {
        if self.eat_word("a") {
            return Ok(PropertyPath::Iri(RDF_TYPE.to_string()));
        }
        match self.peek().clone() {
            TokenKind::LParen => {
                self.advance();
                let path = self.nested(Self::path_alternative)?;
                self.expect(&TokenKind::RParen)?;
                Ok(path)
            }
            TokenKind::Bang => {
                self.advance();
                let mut forward = Vec::new();
                let mut inverse = Vec::new();
                let grouped = self.eat(&TokenKind::LParen);
                loop {
                    let inv = self.eat(&TokenKind::Caret);
                    let iri = if self.eat_word("a") {
                        RDF_TYPE.to_string()
                    } else {
                        self.iri()?
                    };
                    if inv {
                        inverse.push(iri);
                    } else {
                        forward.push(iri);
                    }
                    if !grouped || !self.eat(&TokenKind::Pipe) {
                        break;
                    }
                }
                if grouped {
                    self.expect(&TokenKind::RParen)?;
                }
                Ok(PropertyPath::Negated { forward, inverse })
            }
            TokenKind::Iri(_) | TokenKind::PrefixedName { .. } => Ok(PropertyPath::Iri(self.iri()?)),
            _ => Err(self.unexpected("predicate")),
        }
    }

    fn var_or_iri(&mut self) -> Result<TermPattern, CattyError> {
        match self.peek().clone() {
            TokenKind::Var(v) => {
                self.advance();
                Ok(TermPattern::Var(v))
            }
            _ => Ok(TermPattern::Term(Term::Iri(self.iri()?))),
        }
    }

    /// Variable, IRI, literal or blank node.
    fn term_pattern(&mut self) -> Result<TermPattern, CattyError> {
        match self.peek().clone() {
            TokenKind::Var(v) => {
                self.advance();
                Ok(TermPattern::Var(v))
            }
            TokenKind::Iri(_) | TokenKind::PrefixedName { .. } => {
                Ok(TermPattern::Term(Term::Iri(self.iri()?)))
            }
            TokenKind::BlankLabel(label) => {
                self.advance();
                Ok(self.blank_pattern(&format!("b_{}", label)))
            }
            TokenKind::LBracket => {
                self.advance();
                self.expect(&TokenKind::RBracket)?;
                Ok(self.fresh_blank())
            }
            _ => Ok(TermPattern::Term(self.literal()?)),
        }
    }

    fn literal(&mut self) -> Result<Term, CattyError> {
        let negative = match self.peek() {
            TokenKind::Minus => {
                self.advance();
                true
            }
            TokenKind::Plus => {
                self.advance();
                false
            }
            _ => false,
        };
        let sign = if negative { "-" } else { "" };
        let term = match self.advance() {
            TokenKind::String(s) if !negative => match self.peek().clone() {
                TokenKind::LangTag(lang) => {
                    self.advance();
                    Term::Literal(Literal::new_lang(s, lang))
                }
                TokenKind::DoubleCaret => {
                    self.advance();
                    let datatype = self.iri()?;
                    Term::Literal(Literal::new_typed(s, datatype))
                }
                _ => Term::literal(s),
            },
            TokenKind::Integer(n) => Term::Literal(Literal::new_typed(format!("{}{}", sign, n), XSD_INTEGER)),
            TokenKind::Decimal(n) => Term::Literal(Literal::new_typed(format!("{}{}", sign, n), XSD_DECIMAL)),
            TokenKind::Double(n) => Term::Literal(Literal::new_typed(format!("{}{}", sign, n), XSD_DOUBLE)),
            TokenKind::Word(w)
                if !negative && (w.eq_ignore_ascii_case("true") || w.eq_ignore_ascii_case("false")) =>
            {
                Term::Literal(Literal::new_typed(w.to_ascii_lowercase(), XSD_BOOLEAN))
            }
            other => {
                if other != TokenKind::Eof {
                    self.pos -= 1;
                }
                return Err(self.error_here(format!("expected term, found {}", other.describe())));
            }
        };
        Ok(term)
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expression, CattyError> {
        self.nested(Self::or_expression)
    }

    fn or_expression(&mut self) -> Result<Expression, CattyError> {
        let mut left = self.and_expression()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expression()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Expression, CattyError> {
        let mut left = self.relational()?;
        while self.eat(&TokenKind::And) {
            let right = self.relational()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expression, CattyError> {
        let left = self.additive()?;
        let op = match self.peek() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Ge => CompareOp::Ge,
            _ => {
                let negated = if self.is_word("NOT") && self.is_word_at(1, "IN") {
                    self.advance();
                    true
                } else if self.is_word("IN") {
                    false
                } else {
                    return Ok(left);
                };
                self.expect_word("IN")?;
                let list = self.argument_list()?;
                return Ok(Expression::In {
                    expr: Box::new(left),
                    list,
                    negated,
                });
            }
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expression::Compare(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expression, CattyError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expression::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expression, CattyError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expression::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expression, CattyError> {
        match self.peek() {
            TokenKind::Bang => {
                self.advance();
                Ok(Expression::Not(Box::new(self.nested(Self::unary)?)))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Expression::Neg(Box::new(self.nested(Self::unary)?)))
            }
            TokenKind::Plus => {
                self.advance();
                self.nested(Self::unary)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expression, CattyError> {
        match self.peek().clone() {
            TokenKind::LParen => self.bracketted(),
            TokenKind::Var(v) => {
                self.advance();
                Ok(Expression::Var(v))
            }
            TokenKind::Iri(_) | TokenKind::PrefixedName { .. } => {
                let iri = self.iri()?;
                if *self.peek() == TokenKind::LParen {
                    return Err(CattyError::UnsupportedQuery(format!(
                        "extension function <{}> is not supported",
                        iri
                    )));
                }
                Ok(Expression::Term(Term::Iri(iri)))
            }
            TokenKind::Word(w) => {
                let upper = w.to_ascii_uppercase();
                if upper == "TRUE" || upper == "FALSE" {
                    return Ok(Expression::Term(self.literal()?));
                }
                self.advance();
                if upper == "BOUND" {
                    self.expect(&TokenKind::LParen)?;
                    let var = self.var()?;
                    self.expect(&TokenKind::RParen)?;
                    return Ok(Expression::Bound(var));
                }
                if upper == "EXISTS" {
                    return Ok(Expression::Exists(Box::new(self.group()?)));
                }
                if upper == "NOT" && self.eat_word("EXISTS") {
                    return Ok(Expression::NotExists(Box::new(self.group()?)));
                }
                if let Some(function) = AggregateFunction::from_name(&upper) {
                    return self.aggregate(function);
                }
                let Some(function) = Function::from_name(&upper) else {
                    self.pos -= 1;
                    return Err(CattyError::UnsupportedQuery(format!(
                        "unknown function '{}'",
                        w
                    )));
                };
                let args = self.argument_list()?;
                if let Some((min, max)) = function.arity() {
                    if args.len() < min || args.len() > max {
                        return Err(self.error_here(format!(
                            "{} expects {} argument(s), got {}",
                            upper,
                            if min == max { min.to_string() } else { format!("{}-{}", min, max) },
                            args.len()
                        )));
                    }
                }
                Ok(Expression::Call(function, args))
            }
            _ => Ok(Expression::Term(self.literal()?)),
        }
    }

    fn argument_list(&mut self) -> Result<Vec<Expression>, CattyError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }

    fn aggregate(&mut self, function: AggregateFunction) -> Result<Expression, CattyError> {
        self.expect(&TokenKind::LParen)?;
        let distinct = self.eat_word("DISTINCT");
        let arg = if function == AggregateFunction::Count && self.eat(&TokenKind::Star) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let mut separator = None;
        if function == AggregateFunction::GroupConcat && self.eat(&TokenKind::Semicolon) {
            self.expect_word("SEPARATOR")?;
            self.expect(&TokenKind::Eq)?;
            match self.advance() {
                TokenKind::String(s) => separator = Some(s),
                _ => return Err(self.error_here("expected separator string")),
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Expression::Aggregate(Aggregate {
            function,
            distinct,
            arg,
            separator,
        }))
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    fn update_operation(&mut self) -> Result<UpdateOperation, CattyError> {
        let word = match self.peek() {
            TokenKind::Word(w) => w.to_ascii_uppercase(),
            _ => return Err(self.unexpected("update operation")),
        };
        match word.as_str() {
            "INSERT" if self.is_word_at(1, "DATA") => {
                self.advance();
                self.advance();
                Ok(UpdateOperation::InsertData(self.quad_data()?))
            }
            "DELETE" if self.is_word_at(1, "DATA") => {
                self.advance();
                self.advance();
                Ok(UpdateOperation::DeleteData(self.quad_data()?))
            }
            "DELETE" if self.is_word_at(1, "WHERE") => {
                self.advance();
                self.advance();
                let quads = self.quads(BlankMode::Variable)?;
                Ok(UpdateOperation::DeleteWhere(quads))
            }
            "WITH" | "INSERT" | "DELETE" => self.modify(),
            "CLEAR" | "DROP" => {
                self.advance();
                let silent = self.eat_word("SILENT");
                let target = self.graph_target()?;
                Ok(if word == "CLEAR" {
                    UpdateOperation::Clear { silent, target }
                } else {
                    UpdateOperation::Drop { silent, target }
                })
            }
            "CREATE" => {
                self.advance();
                let silent = self.eat_word("SILENT");
                self.expect_word("GRAPH")?;
                let graph = self.iri()?;
                Ok(UpdateOperation::Create { silent, graph })
            }
            "LOAD" | "ADD" | "MOVE" | "COPY" => Err(CattyError::UnsupportedOperation(format!(
                "{} is not supported",
                word
            ))),
            "SELECT" | "ASK" | "CONSTRUCT" | "DESCRIBE" => Err(CattyError::UnsupportedQuery(
                format!("{} is a query; submit it as a query", word),
            )),
            _ => Err(self.unexpected("update operation")),
        }
    }

    fn modify(&mut self) -> Result<UpdateOperation, CattyError> {
        let with = if self.eat_word("WITH") {
            Some(self.iri()?)
        } else {
            None
        };
        let mut delete = Vec::new();
        let mut insert = Vec::new();
        if self.eat_word("DELETE") {
            delete = self.quads(BlankMode::Variable)?;
            if delete.iter().any(|q| has_hidden_var(&q.triple)) {
                return Err(self.error_here("blank nodes are not allowed in DELETE templates"));
            }
        }
        if self.eat_word("INSERT") {
            insert = self.quads(BlankMode::Term)?;
        }
        if delete.is_empty() && insert.is_empty() && !self.is_word("WHERE") {
            return Err(self.unexpected("DELETE or INSERT template"));
        }
        if self.is_word("USING") {
            return Err(CattyError::UnsupportedOperation(
                "USING is not supported".to_string(),
            ));
        }
        self.expect_word("WHERE")?;
        let pattern = self.group()?;
        Ok(UpdateOperation::Modify {
            with,
            delete,
            insert,
            pattern,
        })
    }

    fn graph_target(&mut self) -> Result<GraphTarget, CattyError> {
        if self.eat_word("GRAPH") {
            return Ok(GraphTarget::Graph(self.iri()?));
        }
        if self.eat_word("DEFAULT") {
            return Ok(GraphTarget::Default);
        }
        if self.eat_word("NAMED") {
            return Ok(GraphTarget::Named);
        }
        if self.eat_word("ALL") {
            return Ok(GraphTarget::All);
        }
        Err(self.unexpected("GRAPH <iri>, DEFAULT, NAMED or ALL"))
    }

    /// Ground quads for `INSERT DATA` / `DELETE DATA`.
    fn quad_data(&mut self) -> Result<Vec<QuadPattern>, CattyError> {
        let quads = self.quads(BlankMode::Term)?;
        let has_var = quads.iter().any(|q| {
            q.graph.as_ref().is_some_and(|g| g.as_var().is_some())
                || [&q.triple.subject, &q.triple.predicate, &q.triple.object]
                    .iter()
                    .any(|p| p.as_var().is_some())
        });
        if has_var {
            return Err(self.error_here("variables are not allowed in DATA blocks"));
        }
        Ok(quads)
    }

    fn quads(&mut self, mode: BlankMode) -> Result<Vec<QuadPattern>, CattyError> {
        let saved = (self.blank_mode, self.allow_paths);
        self.blank_mode = mode;
        self.allow_paths = false;
        let result = self.quads_inner();
        (self.blank_mode, self.allow_paths) = saved;
        result
    }

    fn quads_inner(&mut self) -> Result<Vec<QuadPattern>, CattyError> {
        self.expect(&TokenKind::LBrace)?;
        let mut quads = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Ok(quads);
            }
            if self.eat(&TokenKind::Dot) {
                continue;
            }
            if self.eat_word("GRAPH") {
                let graph = self.var_or_iri()?;
                self.expect(&TokenKind::LBrace)?;
                let mut block = Vec::new();
                self.triples_block(&mut block, &TokenKind::RBrace)?;
                self.expect(&TokenKind::RBrace)?;
                quads.extend(block.into_iter().filter_map(|e| match e {
                    PatternElement::Triple(triple) => Some(QuadPattern {
                        graph: Some(graph.clone()),
                        triple,
                    }),
                    PatternElement::Path { .. } => None,
                }));
                continue;
            }
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            let mut block = Vec::new();
            self.triples_block(&mut block, &TokenKind::RBrace)?;
            if block.is_empty() {
                return Err(self.unexpected("triple"));
            }
            quads.extend(block.into_iter().filter_map(|e| match e {
                PatternElement::Triple(triple) => Some(QuadPattern { graph: None, triple }),
                PatternElement::Path { .. } => None,
            }));
        }
    }

    /// CONSTRUCT template: triples with blank nodes kept as terms.
    fn template(&mut self) -> Result<Vec<TriplePattern>, CattyError> {
        let quads = self.quads(BlankMode::Term)?;
        if quads.iter().any(|q| q.graph.is_some()) {
            return Err(self.error_here("GRAPH is not allowed in a CONSTRUCT template"));
        }
        Ok(quads.into_iter().map(|q| q.triple).collect())
    }
}

enum Verb {
    Simple(TermPattern),
    Path(PropertyPath),
}

fn has_hidden_var(triple: &TriplePattern) -> bool {
    [&triple.subject, &triple.predicate, &triple.object]
        .iter()
        .any(|p| p.as_var().is_some_and(|v| v.starts_with(HIDDEN_VAR_PREFIX)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::ast::QueryForm;

    #[test]
    fn detects_all_four_forms() {
        assert_eq!(parse_query("SELECT * WHERE { ?s ?p ?o }").unwrap().form(), QueryForm::Select);
        assert_eq!(parse_query("ASK { ?s ?p ?o }").unwrap().form(), QueryForm::Ask);
        assert_eq!(
            parse_query("CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }").unwrap().form(),
            QueryForm::Construct
        );
        assert_eq!(parse_query("DESCRIBE <http://x/a>").unwrap().form(), QueryForm::Describe);
    }

    #[test]
    fn prefixes_expand_and_unknown_prefix_fails() {
        let q = parse_query(
            "PREFIX owl: <http://www.w3.org/2002/07/owl#> SELECT ?c WHERE { ?c a owl:Class }",
        )
        .unwrap();
        let GraphPattern::Group(elements) = q.pattern else {
            panic!("expected group");
        };
        let GraphPattern::Bgp(triples) = &elements[0] else {
            panic!("expected bgp");
        };
        assert_eq!(
            triples[0],
            PatternElement::Triple(TriplePattern::new(
                TermPattern::Var("c".into()),
                TermPattern::Term(Term::iri(RDF_TYPE)),
                TermPattern::Term(Term::iri("http://www.w3.org/2002/07/owl#Class")),
            ))
        );
        let err = parse_query("SELECT ?c WHERE { ?c a nope:Class }").unwrap_err();
        assert!(matches!(err, CattyError::QuerySyntax { .. }));
    }

    #[test]
    fn syntax_error_carries_position() {
        let err = parse_query("SELECT ?x\nWHERE { ?x ?p }").unwrap_err();
        match err {
            CattyError::QuerySyntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn nesting_limit_reports_the_offending_token() {
        let depth = MAX_QUERY_DEPTH + 1;
        let text = format!("ASK {{\n  FILTER({}1{}) }}", "(".repeat(depth), ")".repeat(depth));
        match parse_query(&text).unwrap_err() {
            CattyError::QuerySyntax { message, line, column } => {
                assert!(message.contains("nesting"), "{message}");
                assert_eq!(line, 2);
                assert!(column > 8);
            }
            other => panic!("unexpected error {:?}", other),
        }
        let text = format!("ASK {{ FILTER({}1{}) }}", "(".repeat(8), ")".repeat(8));
        assert!(parse_query(&text).is_ok());
    }

    #[test]
    fn updates_are_not_queries() {
        let err = parse_query("INSERT DATA { <http://s> <http://p> <http://o> }").unwrap_err();
        assert!(matches!(err, CattyError::UnsupportedQuery(_)));
        let err = parse_query("LOAD <http://x>").unwrap_err();
        assert!(matches!(err, CattyError::UnsupportedQuery(_)));
    }

    #[test]
    fn solution_modifiers() {
        let q = parse_query(
            "SELECT ?g (COUNT(*) AS ?n) WHERE { GRAPH ?g { ?s ?p ?o } } \
             GROUP BY ?g HAVING (COUNT(*) > 1) ORDER BY DESC(?n) LIMIT 5 OFFSET 2",
        )
        .unwrap();
        assert_eq!(q.modifiers.group_by.len(), 1);
        assert_eq!(q.modifiers.having.len(), 1);
        assert!(q.modifiers.order_by[0].descending);
        assert_eq!(q.modifiers.limit, Some(5));
        assert_eq!(q.modifiers.offset, 2);
    }

    #[test]
    fn property_list_shorthand() {
        let q = parse_query("SELECT * { ?s <http://p> 1, 2 ; <http://q> [ <http://r> ?x ] }")
            .unwrap();
        let GraphPattern::Group(elements) = q.pattern else {
            panic!("expected group");
        };
        let GraphPattern::Bgp(triples) = &elements[0] else {
            panic!("expected bgp");
        };
        assert_eq!(triples.len(), 4);
    }

    #[test]
    fn update_sequence() {
        let ops = parse_update(
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:a ex:p 1 . GRAPH <http://g> { ex:b ex:p 2 } } ; \
             DELETE { ?s ex:p ?o } INSERT { ?s ex:q ?o } WHERE { ?s ex:p ?o } ; \
             CLEAR SILENT GRAPH <http://g> ; DROP ALL",
        )
        .unwrap();
        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], UpdateOperation::InsertData(q) if q.len() == 2));
        assert!(matches!(&ops[2], UpdateOperation::Clear { silent: true, .. }));
    }

    #[test]
    fn variables_rejected_in_data() {
        let err = parse_update("INSERT DATA { ?s <http://p> 1 }").unwrap_err();
        assert!(matches!(err, CattyError::QuerySyntax { .. }));
    }

    #[test]
    fn paths_parse() {
        let q = parse_query("SELECT ?x { ?x (<http://p>/^<http://q>)+ ?y }").unwrap();
        let GraphPattern::Group(elements) = q.pattern else {
            panic!("expected group");
        };
        assert!(matches!(
            &elements[0],
            GraphPattern::Bgp(e) if matches!(e[0], PatternElement::Path { .. })
        ));
    }
}
