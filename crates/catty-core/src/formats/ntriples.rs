//! # N-Triples
//!
//! Line-based reader and writer. One triple per line, `#` comments allowed.

use crate::types::{Literal, Term, Triple};

/// Parse N-Triples text. Blank node labels receive `blank_scope` as prefix.
///
/// Errors carry the 1-based line number.
pub fn parse_ntriples(text: &str, blank_scope: &str) -> Result<Vec<Triple>, String> {
    let mut triples = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let mut cursor = Cursor {
            chars: line.char_indices().peekable(),
            line,
            blank_scope,
        };
        cursor.skip_ws();
        if cursor.at_end() || cursor.peek() == Some('#') {
            continue;
        }
        let parse = |c: &mut Cursor<'_>| -> Result<Triple, String> {
            let subject = c.term()?;
            c.skip_ws();
            let predicate = c.term()?;
            c.skip_ws();
            let object = c.term()?;
            c.skip_ws();
            if c.next() != Some('.') {
                return Err("expected '.'".to_string());
            }
            c.skip_ws();
            if !c.at_end() && c.peek() != Some('#') {
                return Err("unexpected content after '.'".to_string());
            }
            Ok(Triple::new(subject, predicate, object))
        };
        let triple = parse(&mut cursor).map_err(|e| format!("line {}: {}", line_no, e))?;
        if !triple.is_well_formed() {
            return Err(format!("line {}: ill-formed triple", line_no));
        }
        triples.push(triple);
    }
    Ok(triples)
}

/// Write triples as N-Triples, one per line.
#[must_use]
pub fn write_ntriples(triples: &[Triple]) -> String {
    let mut out = String::new();
    for triple in triples {
        out.push_str(&triple.to_string());
        out.push('\n');
    }
    out
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: &'a str,
    blank_scope: &'a str,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.next();
        }
    }

    fn term(&mut self) -> Result<Term, String> {
        match self.peek() {
            Some('<') => {
                self.next();
                Ok(Term::Iri(self.until('>')?))
            }
            Some('_') => {
                self.next();
                if self.next() != Some(':') {
                    return Err("expected ':' after '_'".to_string());
                }
                let mut label = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    label.push(c);
                    self.next();
                }
                let label = label.trim_end_matches('.');
                if label.is_empty() {
                    return Err("empty blank node label".to_string());
                }
                Ok(Term::blank(format!("{}{}", self.blank_scope, label)))
            }
            Some('"') => {
                self.next();
                let lexical = self.quoted()?;
                match self.peek() {
                    Some('@') => {
                        self.next();
                        let mut lang = String::new();
                        while let Some(c) = self.peek() {
                            if c.is_ascii_alphanumeric() || c == '-' {
                                lang.push(c);
                                self.next();
                            } else {
                                break;
                            }
                        }
                        Ok(Term::Literal(Literal::new_lang(lexical, lang)))
                    }
                    Some('^') => {
                        self.next();
                        if self.next() != Some('^') || self.next() != Some('<') {
                            return Err("expected '^^<' datatype".to_string());
                        }
                        let datatype = self.until('>')?;
                        Ok(Term::Literal(Literal::new_typed(lexical, datatype)))
                    }
                    _ => Ok(Term::literal(lexical)),
                }
            }
            Some(c) => Err(format!("unexpected character '{}' in {}", c, self.line)),
            None => Err("unexpected end of line".to_string()),
        }
    }

    fn until(&mut self, end: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.next() {
                Some(c) if c == end => return Ok(out),
                Some('\\') => out.push(self.escape()?),
                Some(c) => out.push(c),
                None => return Err(format!("unterminated term, expected '{}'", end)),
            }
        }
    }

    fn quoted(&mut self) -> Result<String, String> {
        self.until('"')
    }

    fn escape(&mut self) -> Result<char, String> {
        match self.next() {
            Some('t') => Ok('\t'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.hex(4),
            Some('U') => self.hex(8),
            other => Err(format!("invalid escape {:?}", other)),
        }
    }

    fn hex(&mut self, len: usize) -> Result<char, String> {
        let mut code = String::with_capacity(len);
        for _ in 0..len {
            code.push(self.next().ok_or("truncated unicode escape")?);
        }
        u32::from_str_radix(&code, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid unicode escape \\u{}", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_term_kinds() {
        let text = "\
# comment
<http://s> <http://p> <http://o> .
_:b1 <http://p> \"plain\" .
<http://s> <http://p> \"chat\"@fr .
<http://s> <http://p> \"5\"^^<http://www.w3.org/2001/XMLSchema#integer> .

<http://s> <http://p> \"a\\\"b\\u0041\" . # trailing
";
        let triples = parse_ntriples(text, "x_").unwrap();
        assert_eq!(triples.len(), 5);
        assert_eq!(triples[1].subject, Term::blank("x_b1"));
        assert_eq!(triples[2].object, Term::Literal(Literal::new_lang("chat", "fr")));
        assert_eq!(triples[4].object, Term::literal("a\"bA"));
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_ntriples("<http://s> <http://p> <http://o> .\n<http://s> <http://p>", "")
            .unwrap_err();
        assert!(err.starts_with("line 2"));
    }

    #[test]
    fn writer_output_reparses() {
        let triples = vec![Triple::new(
            Term::iri("http://s"),
            Term::iri("http://p"),
            Term::literal("line\nbreak"),
        )];
        let text = write_ntriples(&triples);
        assert_eq!(parse_ntriples(&text, "").unwrap(), triples);
    }
}
