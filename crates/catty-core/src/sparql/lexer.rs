//! # Query Lexer
//!
//! Turns query or update text into tokens carrying their line and column.
//!
//! Keywords and function names are lexed as `Word` and matched
//! case-insensitively by the parser, which keeps the token set small.
//! A `<` starts an IRI only when the characters up to the next `>` are
//! valid IRI characters; otherwise it is the less-than operator.

use crate::types::CattyError;

/// A token with its 1-based source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `<http://...>` without the brackets.
    Iri(String),
    /// `prefix:local`; the prefix may be empty.
    PrefixedName { prefix: String, local: String },
    /// `?name` or `$name` without the sigil.
    Var(String),
    /// Unescaped string contents.
    String(String),
    /// `@en` without the `@`.
    LangTag(String),
    Integer(String),
    Decimal(String),
    Double(String),
    /// `_:label` without the `_:`.
    BlankLabel(String),
    /// Bare word: keyword, function name, `a`, `true`, `false`.
    Word(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Semicolon,
    Star,
    Plus,
    Minus,
    Slash,
    Bang,
    Caret,
    DoubleCaret,
    Pipe,
    Question,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Eof,
}

impl TokenKind {
    /// Short description for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Iri(i) => format!("<{}>", i),
            Self::PrefixedName { prefix, local } => format!("{}:{}", prefix, local),
            Self::Var(v) => format!("?{}", v),
            Self::String(s) => format!("\"{}\"", s),
            Self::LangTag(l) => format!("@{}", l),
            Self::Integer(n) | Self::Decimal(n) | Self::Double(n) => n.clone(),
            Self::BlankLabel(b) => format!("_:{}", b),
            Self::Word(w) => w.clone(),
            Self::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// Tokenize query text. The result always ends with `Eof`.
pub fn tokenize(text: &str) -> Result<Vec<Token>, CattyError> {
    let mut lexer = Lexer {
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        lexer.skip_trivia();
        let (line, column) = (lexer.line, lexer.column);
        let kind = lexer.next_kind()?;
        let done = kind == TokenKind::Eof;
        tokens.push(Token { kind, line, column });
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_var_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> CattyError {
        CattyError::QuerySyntax {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn next_kind(&mut self) -> Result<TokenKind, CattyError> {
        let Some(c) = self.peek() else {
            return Ok(TokenKind::Eof);
        };
        let kind = match c {
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ',' => self.single(TokenKind::Comma),
            ';' => self.single(TokenKind::Semicolon),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '|' if self.peek_at(1) == Some('|') => self.double(TokenKind::Or),
            '|' => self.single(TokenKind::Pipe),
            '&' if self.peek_at(1) == Some('&') => self.double(TokenKind::And),
            '^' if self.peek_at(1) == Some('^') => self.double(TokenKind::DoubleCaret),
            '^' => self.single(TokenKind::Caret),
            '=' => self.single(TokenKind::Eq),
            '!' if self.peek_at(1) == Some('=') => self.double(TokenKind::Ne),
            '!' => self.single(TokenKind::Bang),
            '>' if self.peek_at(1) == Some('=') => self.double(TokenKind::Ge),
            '>' => self.single(TokenKind::Gt),
            '<' => {
                if let Some(iri) = self.try_iri() {
                    TokenKind::Iri(iri)
                } else if self.peek_at(1) == Some('=') {
                    self.double(TokenKind::Le)
                } else {
                    self.single(TokenKind::Lt)
                }
            }
            '?' | '$' => {
                if self.peek_at(1).is_some_and(is_var_char) {
                    self.bump();
                    TokenKind::Var(self.var_name())
                } else if c == '?' {
                    self.single(TokenKind::Question)
                } else {
                    return Err(self.error("expected variable name after '$'"));
                }
            }
            '"' | '\'' => TokenKind::String(self.string(c)?),
            '@' => {
                self.bump();
                let mut tag = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        tag.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                if tag.is_empty() {
                    return Err(self.error("empty language tag"));
                }
                TokenKind::LangTag(tag)
            }
            '_' if self.peek_at(1) == Some(':') => {
                self.bump();
                self.bump();
                let label = self.local_name();
                if label.is_empty() {
                    return Err(self.error("empty blank node label"));
                }
                TokenKind::BlankLabel(label)
            }
            '0'..='9' => self.number(),
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
            '.' => self.single(TokenKind::Dot),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            ':' => {
                self.bump();
                TokenKind::PrefixedName {
                    prefix: String::new(),
                    local: self.local_name(),
                }
            }
            c if is_name_start(c) => {
                let word = self.name();
                if self.peek() == Some(':') {
                    self.bump();
                    TokenKind::PrefixedName {
                        prefix: word,
                        local: self.local_name(),
                    }
                } else {
                    TokenKind::Word(word)
                }
            }
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };
        Ok(kind)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        self.bump();
        kind
    }

    fn name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn var_name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|c| is_var_char(*c)) {
            out.push(c);
            self.bump();
        }
        out
    }

    /// Local part of a prefixed name. Dots are allowed inside but not at
    /// the end, so `ex:a.` lexes as `ex:a` followed by `.`.
    fn local_name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            let inner_dot = c == '.' && self.peek_at(1).is_some_and(is_name_char);
            if is_name_char(c) || inner_dot {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn try_iri(&mut self) -> Option<String> {
        let mut end = self.pos + 1;
        loop {
            let c = *self.chars.get(end)?;
            if c == '>' {
                break;
            }
            if c.is_whitespace() || matches!(c, '<' | '"' | '{' | '}' | '|' | '^' | '`') {
                return None;
            }
            end += 1;
        }
        let iri: String = self.chars[self.pos + 1..end].iter().collect();
        while self.pos <= end {
            self.bump();
        }
        Some(iri)
    }

    fn string(&mut self, quote: char) -> Result<String, CattyError> {
        let long = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let open = if long { 3 } else { 1 };
        for _ in 0..open {
            self.bump();
        }
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            if c == quote {
                if !long {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.bump();
                    self.bump();
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            match c {
                '\\' => out.push(self.escape()?),
                '\n' if !long => return Err(self.error("newline in string literal")),
                _ => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<char, CattyError> {
        let c = self
            .bump()
            .ok_or_else(|| self.error("unterminated escape sequence"))?;
        Ok(match c {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '"' => '"',
            '\'' => '\'',
            '\\' => '\\',
            'u' | 'U' => {
                let len = if c == 'u' { 4 } else { 8 };
                let mut code = String::with_capacity(len);
                for _ in 0..len {
                    code.push(
                        self.bump()
                            .ok_or_else(|| self.error("truncated unicode escape"))?,
                    );
                }
                u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error(format!("invalid unicode escape {}", code)))?
            }
            other => return Err(self.error(format!("invalid escape '\\{}'", other))),
        })
    }

    fn number(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            text.push(c);
            self.bump();
        }
        let mut decimal = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            decimal = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..=digit_at {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    text.push(c);
                    self.bump();
                }
                return TokenKind::Double(text);
            }
        }
        if decimal {
            TokenKind::Decimal(text)
        } else {
            TokenKind::Integer(text)
        }
    }
}
