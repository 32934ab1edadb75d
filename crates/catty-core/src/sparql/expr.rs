//! # Expression Semantics
//!
//! Value-level operations used by the evaluator: effective boolean value,
//! comparison, numeric promotion, built-in functions and aggregate folds.
//!
//! Every helper returns `Option`; `None` is an expression error, which
//! makes a FILTER reject the solution and leaves a BIND variable unbound.

use super::ast::{AggregateFunction, ArithOp, CompareOp, Function};
use crate::primitives::{XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_FLOAT, XSD_STRING, is_integer_datatype};
use crate::types::{Literal, Term};
use regex::{Regex, RegexBuilder};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;

// =============================================================================
// BOOLEAN AND COMPARISON
// =============================================================================

/// Effective boolean value.
#[must_use]
pub fn effective_boolean(term: &Term) -> Option<bool> {
    let lit = term.as_literal()?;
    if lit.datatype() == XSD_BOOLEAN {
        return lit.as_bool();
    }
    if lit.is_numeric() {
        return lit.as_f64().map(|v| v != 0.0 && !v.is_nan());
    }
    if is_string_like(lit) {
        return Some(!lit.lexical().is_empty());
    }
    None
}

fn is_string_like(lit: &Literal) -> bool {
    lit.datatype() == XSD_STRING || lit.language().is_some()
}

/// `=` semantics: numeric and string values compare by value, everything
/// else by term identity.
#[must_use]
pub fn equals(a: &Term, b: &Term) -> Option<bool> {
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return Some(x.as_f64() == y.as_f64());
    }
    if let (Some(x), Some(y)) = (a.as_literal(), b.as_literal()) {
        if x.datatype() == XSD_BOOLEAN && y.datatype() == XSD_BOOLEAN {
            return Some(x.as_bool()? == y.as_bool()?);
        }
    }
    Some(a == b)
}

/// Ordering for `<`, `>`, `<=`, `>=`. `None` when the values are not
/// comparable.
#[must_use]
pub fn compare(a: &Term, b: &Term) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.as_f64().partial_cmp(&y.as_f64());
    }
    let (x, y) = (a.as_literal()?, b.as_literal()?);
    if x.is_simple() && y.is_simple() {
        return Some(x.lexical().cmp(y.lexical()));
    }
    if x.language().is_some() && x.language() == y.language() {
        return Some(x.lexical().cmp(y.lexical()));
    }
    if x.datatype() == XSD_BOOLEAN && y.datatype() == XSD_BOOLEAN {
        return Some(x.as_bool()?.cmp(&y.as_bool()?));
    }
    if x.datatype() == y.datatype() && !x.datatype().is_empty() {
        // Same non-numeric datatype (dates, times): lexical order.
        return Some(x.lexical().cmp(y.lexical()));
    }
    None
}

/// Apply a comparison operator.
#[must_use]
pub fn compare_op(op: CompareOp, a: &Term, b: &Term) -> Option<bool> {
    match op {
        CompareOp::Eq => equals(a, b),
        CompareOp::Ne => equals(a, b).map(|eq| !eq),
        CompareOp::Lt => compare(a, b).map(Ordering::is_lt),
        CompareOp::Gt => compare(a, b).map(Ordering::is_gt),
        CompareOp::Le => compare(a, b).map(Ordering::is_le),
        CompareOp::Ge => compare(a, b).map(Ordering::is_ge),
    }
}

/// Total order used by `ORDER BY` and `MIN`/`MAX`.
///
/// Unbound sorts first, then blank nodes, IRIs and literals; comparable
/// literals use value order, the rest fall back to term order.
#[must_use]
pub fn order_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x, y) {
            (Term::Literal(_), Term::Literal(_)) => compare(x, y)
                .filter(|o| o.is_ne())
                .unwrap_or_else(|| x.cmp(y)),
            _ => x.cmp(y),
        },
    }
}

// =============================================================================
// NUMERIC PROMOTION
// =============================================================================

/// A numeric value with its XSD type rank.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Integer(i64),
    Decimal(f64),
    Double(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Self::Integer(i) => i as f64,
            Self::Decimal(d) | Self::Double(d) => d,
        }
    }

    fn into_term(self) -> Term {
        match self {
            Self::Integer(i) => Term::Literal(Literal::integer(i)),
            Self::Decimal(d) => Term::Literal(Literal::decimal(d)),
            Self::Double(d) => Term::Literal(Literal::double(d)),
        }
    }
}

fn numeric(term: &Term) -> Option<Numeric> {
    let lit = term.as_literal()?;
    let datatype = lit.datatype();
    if is_integer_datatype(datatype) {
        return lit.as_i64().map(Numeric::Integer);
    }
    match datatype {
        XSD_DECIMAL => lit.as_f64().map(Numeric::Decimal),
        XSD_DOUBLE | XSD_FLOAT => lit.as_f64().map(Numeric::Double),
        _ => None,
    }
}

/// Binary arithmetic with integer → decimal → double promotion.
/// Integer division yields a decimal; division by zero is an error.
#[must_use]
pub fn arithmetic(op: ArithOp, a: &Term, b: &Term) -> Option<Term> {
    let (x, y) = (numeric(a)?, numeric(b)?);
    let result = match (x, y) {
        (Numeric::Integer(i), Numeric::Integer(j)) => match op {
            ArithOp::Add => Numeric::Integer(i.checked_add(j)?),
            ArithOp::Sub => Numeric::Integer(i.checked_sub(j)?),
            ArithOp::Mul => Numeric::Integer(i.checked_mul(j)?),
            ArithOp::Div => {
                if j == 0 {
                    return None;
                }
                Numeric::Decimal(i as f64 / j as f64)
            }
        },
        _ => {
            let (l, r) = (x.as_f64(), y.as_f64());
            let value = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => {
                    let decimal = !matches!(x, Numeric::Double(_)) && !matches!(y, Numeric::Double(_));
                    if r == 0.0 && decimal {
                        return None;
                    }
                    l / r
                }
            };
            if matches!(x, Numeric::Double(_)) || matches!(y, Numeric::Double(_)) {
                Numeric::Double(value)
            } else {
                Numeric::Decimal(value)
            }
        }
    };
    Some(result.into_term())
}

/// Unary minus.
#[must_use]
pub fn negate(a: &Term) -> Option<Term> {
    Some(
        match numeric(a)? {
            Numeric::Integer(i) => Numeric::Integer(i.checked_neg()?),
            Numeric::Decimal(d) => Numeric::Decimal(-d),
            Numeric::Double(d) => Numeric::Double(-d),
        }
        .into_term(),
    )
}

// =============================================================================
// BUILT-IN FUNCTIONS
// =============================================================================

/// Compiled REGEX patterns keyed by pattern and flags.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: RefCell<BTreeMap<(String, String), Option<Regex>>>,
}

impl RegexCache {
    fn is_match(&self, text: &str, pattern: &str, flags: &str) -> Option<bool> {
        let key = (pattern.to_string(), flags.to_string());
        let mut compiled = self.compiled.borrow_mut();
        let regex = compiled.entry(key).or_insert_with(|| {
            let mut builder = RegexBuilder::new(pattern);
            for flag in flags.chars() {
                match flag {
                    'i' => builder.case_insensitive(true),
                    'm' => builder.multi_line(true),
                    's' => builder.dot_matches_new_line(true),
                    'x' => builder.ignore_whitespace(true),
                    _ => return None,
                };
            }
            builder.build().ok()
        });
        regex.as_ref().map(|r| r.is_match(text))
    }
}

fn string_arg(term: &Term) -> Option<&Literal> {
    term.as_literal().filter(|lit| is_string_like(lit))
}

fn bool_term(value: bool) -> Term {
    Term::Literal(Literal::boolean(value))
}

/// Evaluate an eagerly-evaluated built-in over already evaluated arguments.
///
/// `IF` and `COALESCE` are lazy and handled by the evaluator.
#[must_use]
pub fn call_function(function: Function, args: &[Option<Term>], regexes: &RegexCache) -> Option<Term> {
    let arg = |i: usize| args.get(i).and_then(Option::as_ref);
    match function {
        Function::Str => match arg(0)? {
            Term::Iri(iri) => Some(Term::literal(iri.clone())),
            Term::Literal(lit) => Some(Term::literal(lit.lexical())),
            Term::Blank(_) => None,
        },
        Function::Lang => Some(Term::literal(arg(0)?.as_literal()?.language().unwrap_or(""))),
        Function::LangMatches => {
            let tag = arg(0)?.as_literal()?.lexical().to_ascii_lowercase();
            let range = arg(1)?.as_literal()?.lexical().to_ascii_lowercase();
            let matched = if range == "*" {
                !tag.is_empty()
            } else {
                tag == range || tag.starts_with(&format!("{}-", range))
            };
            Some(bool_term(matched))
        }
        Function::Datatype => Some(Term::iri(arg(0)?.as_literal()?.datatype())),
        Function::Iri => match arg(0)? {
            Term::Iri(iri) => Some(Term::iri(iri.clone())),
            Term::Literal(lit) if lit.is_simple() => Some(Term::iri(lit.lexical())),
            _ => None,
        },
        Function::IsIri => Some(bool_term(arg(0)?.is_iri())),
        Function::IsBlank => Some(bool_term(arg(0)?.is_blank())),
        Function::IsLiteral => Some(bool_term(arg(0)?.is_literal())),
        Function::IsNumeric => Some(bool_term(numeric(arg(0)?).is_some())),
        Function::StrStarts | Function::StrEnds | Function::Contains => {
            let text = string_arg(arg(0)?)?.lexical();
            let needle = string_arg(arg(1)?)?.lexical();
            Some(bool_term(match function {
                Function::StrStarts => text.starts_with(needle),
                Function::StrEnds => text.ends_with(needle),
                _ => text.contains(needle),
            }))
        }
        Function::StrLen => {
            let len = string_arg(arg(0)?)?.lexical().chars().count();
            Some(Term::Literal(Literal::integer(i64::try_from(len).ok()?)))
        }
        Function::LCase | Function::UCase => {
            let lit = string_arg(arg(0)?)?;
            let value = if function == Function::LCase {
                lit.lexical().to_lowercase()
            } else {
                lit.lexical().to_uppercase()
            };
            Some(Term::Literal(match lit.language() {
                Some(lang) => Literal::new_lang(value, lang),
                None => Literal::new_simple(value),
            }))
        }
        Function::Concat => {
            let mut out = String::new();
            for value in args {
                out.push_str(string_arg(value.as_ref()?)?.lexical());
            }
            Some(Term::literal(out))
        }
        Function::Regex => {
            let text = string_arg(arg(0)?)?.lexical();
            let pattern = arg(1)?.as_literal()?.lexical();
            let flags = match args.get(2) {
                Some(f) => f.as_ref()?.as_literal()?.lexical(),
                None => "",
            };
            regexes.is_match(text, pattern, flags).map(bool_term)
        }
        Function::SameTerm => Some(bool_term(arg(0)? == arg(1)?)),
        Function::If | Function::Coalesce => None,
    }
}

// =============================================================================
// AGGREGATES
// =============================================================================

/// Fold the values of one group.
///
/// `values` holds the successfully evaluated argument values (errors are
/// skipped); `rows` is the group size, used by `COUNT(*)`.
#[must_use]
pub fn fold_aggregate(
    function: AggregateFunction,
    distinct: bool,
    separator: Option<&str>,
    mut values: Vec<Term>,
    rows: usize,
    star: bool,
) -> Option<Term> {
    if distinct {
        values.sort();
        values.dedup();
    }
    match function {
        AggregateFunction::Count => {
            let count = if star && !distinct { rows } else { values.len() };
            Some(Term::Literal(Literal::integer(i64::try_from(count).ok()?)))
        }
        AggregateFunction::Sum => values
            .iter()
            .try_fold(Term::Literal(Literal::integer(0)), |acc, v| {
                arithmetic(ArithOp::Add, &acc, v)
            }),
        AggregateFunction::Avg => {
            if values.is_empty() {
                return Some(Term::Literal(Literal::integer(0)));
            }
            let sum = fold_aggregate(AggregateFunction::Sum, false, None, values.clone(), rows, false)?;
            let count = Term::Literal(Literal::integer(i64::try_from(values.len()).ok()?));
            arithmetic(ArithOp::Div, &sum, &count)
        }
        AggregateFunction::Min => values
            .into_iter()
            .min_by(|a, b| order_terms(Some(a), Some(b))),
        AggregateFunction::Max => values
            .into_iter()
            .max_by(|a, b| order_terms(Some(a), Some(b))),
        AggregateFunction::Sample => values.into_iter().next(),
        AggregateFunction::GroupConcat => {
            let parts: Vec<&str> = values
                .iter()
                .map(|v| v.as_literal().map_or(v.value(), Literal::lexical))
                .collect();
            Some(Term::literal(parts.join(separator.unwrap_or(" "))))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::XSD_INTEGER;

    fn int(i: i64) -> Term {
        Term::Literal(Literal::integer(i))
    }

    #[test]
    fn integer_division_is_decimal() {
        let result = arithmetic(ArithOp::Div, &int(7), &int(2)).unwrap();
        let lit = result.as_literal().unwrap();
        assert_eq!(lit.datatype(), XSD_DECIMAL);
        assert_eq!(lit.as_f64(), Some(3.5));
        assert!(arithmetic(ArithOp::Div, &int(1), &int(0)).is_none());
    }

    #[test]
    fn integer_addition_stays_integer() {
        let result = arithmetic(ArithOp::Add, &int(2), &int(3)).unwrap();
        assert_eq!(result.as_literal().unwrap().datatype(), XSD_INTEGER);
        assert_eq!(result.as_literal().unwrap().as_i64(), Some(5));
    }

    #[test]
    fn numeric_equality_crosses_types() {
        let decimal = Term::Literal(Literal::new_typed("2.0", XSD_DECIMAL));
        assert_eq!(equals(&int(2), &decimal), Some(true));
        assert_eq!(compare(&int(1), &decimal), Some(Ordering::Less));
    }

    #[test]
    fn ebv_rules() {
        assert_eq!(effective_boolean(&Term::literal("")), Some(false));
        assert_eq!(effective_boolean(&Term::literal("x")), Some(true));
        assert_eq!(effective_boolean(&int(0)), Some(false));
        assert_eq!(effective_boolean(&Term::iri("http://x")), None);
    }

    #[test]
    fn order_puts_unbound_first() {
        let a = Term::iri("http://a");
        let lit = Term::literal("a");
        let blank = Term::blank("b");
        assert_eq!(order_terms(None, Some(&blank)), Ordering::Less);
        assert_eq!(order_terms(Some(&blank), Some(&a)), Ordering::Less);
        assert_eq!(order_terms(Some(&a), Some(&lit)), Ordering::Less);
        assert_eq!(order_terms(Some(&int(10)), Some(&int(9))), Ordering::Greater);
    }

    #[test]
    fn regex_with_flags() {
        let cache = RegexCache::default();
        let args = [
            Some(Term::literal("Category")),
            Some(Term::literal("^cat")),
            Some(Term::literal("i")),
        ];
        assert_eq!(
            call_function(Function::Regex, &args, &cache),
            Some(Term::Literal(Literal::boolean(true)))
        );
        let bad = [Some(Term::literal("x")), Some(Term::literal("(")), None];
        assert!(call_function(Function::Regex, &bad[..2], &cache).is_none());
    }

    #[test]
    fn aggregates_fold() {
        let values = vec![int(1), int(2), int(2)];
        assert_eq!(
            fold_aggregate(AggregateFunction::Count, true, None, values.clone(), 3, false),
            Some(int(2))
        );
        assert_eq!(
            fold_aggregate(AggregateFunction::Sum, false, None, values.clone(), 3, false),
            Some(int(5))
        );
        assert_eq!(
            fold_aggregate(AggregateFunction::Max, false, None, values, 3, false),
            Some(int(2))
        );
        assert_eq!(
            fold_aggregate(AggregateFunction::Count, false, None, Vec::new(), 4, true),
            Some(int(4))
        );
    }
}
