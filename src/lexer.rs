//! Lexer for Dime
//!
//! The lexer converts source text into a flat token sequence. Raw scanning is
//! done with `logos`; this module then classifies lexemes into the coarse
//! [`TokenKind`] categories and attaches file/line/column positions.
//!
//! Newlines are significant (they separate statements) and are emitted as
//! [`TokenKind::NewLine`] tokens. No end-of-file token is appended.

use crate::error::{CompileError, CompileResult};
use crate::span::{Position, UNKNOWN_FILE};
use crate::token::{Token, TokenKind, DATATYPES, KEYWORDS};
use logos::Logos;
use std::sync::Arc;

/// Raw lexeme classes recognised by the scanner
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"//[^\n]*")]
enum Scan {
    #[token("\n")]
    NewLine,

    #[regex(r"\+=|-=|\*=|/=|%=|==|!=|<=|>=|\+\+|--|&&|\|\||[=+\-*/%<>]")]
    Operator,

    #[regex(r"[(){}\[\];:.,]")]
    Delimiter,

    #[regex(r"[0-9]+")]
    Integer,

    #[regex(r"[0-9]+\.[0-9]*")]
    Double,

    /// Trailing `f` marks a single precision literal
    #[regex(r"[0-9]+(\.[0-9]*)?f")]
    Float,

    #[regex(r#""[^"\n]*""#)]
    DoubleQuoted,

    #[regex(r"'[^'\n]*'")]
    SingleQuoted,

    /// A quote that reaches the end of the line before closing
    #[regex(r#""[^"\n]*"#)]
    #[regex(r"'[^'\n]*")]
    Unterminated,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Word,
}

/// The lexer for Dime
pub struct Lexer<'src> {
    source: &'src str,
    file: Arc<str>,
    inner: logos::Lexer<'src, Scan>,
    line: u32,
    line_start: usize,
    after_operand: bool,
}

impl<'src> Lexer<'src> {
    /// Create a lexer for source text that has no file name
    pub fn new(source: &'src str) -> Self {
        Self::with_file(UNKNOWN_FILE, source)
    }

    /// Create a lexer that stamps `file` into every position
    pub fn with_file(file: &str, source: &'src str) -> Self {
        Self {
            source,
            file: Arc::from(file),
            inner: Scan::lexer(source),
            line: 0,
            line_start: 0,
            after_operand: false,
        }
    }

    fn pos_at(&self, offset: usize, length: usize) -> Position {
        let column = self.source[self.line_start..offset].chars().count() as u32;
        Position::new(self.file.clone(), self.line, column, length, offset)
    }

    /// Get the next token, or `None` at end of input
    pub fn next_token(&mut self) -> CompileResult<Option<Token>> {
        let scan = match self.inner.next() {
            Some(scan) => scan,
            None => return Ok(None),
        };
        let span = self.inner.span();
        let slice = self.inner.slice();
        let pos = self.pos_at(span.start, slice.chars().count());

        let scan = scan.map_err(|()| {
            let ch = slice.chars().next().unwrap_or('\0');
            CompileError::unknown_character(ch, pos.with_length(1))
        })?;

        let token = match scan {
            Scan::NewLine => {
                let token = Token::new(TokenKind::NewLine, "\n", pos);
                self.line += 1;
                self.line_start = span.end;
                token
            }
            Scan::Operator if slice == "-" && self.starts_negative_literal(span.end) => {
                self.negative_literal(span.start)
            }
            Scan::Operator => Token::new(TokenKind::Operator, slice, pos),
            Scan::Delimiter => Token::new(TokenKind::Delimiter, slice, pos),
            Scan::Integer => Token::new(TokenKind::Integer, slice, pos),
            Scan::Double => Token::new(TokenKind::Double, slice, pos),
            Scan::Float => Token::with_pos(TokenKind::Float, &slice[..slice.len() - 1], pos),
            Scan::DoubleQuoted => quoted(TokenKind::String, slice, pos),
            Scan::SingleQuoted => {
                let inner = &slice[1..slice.len() - 1];
                let kind = if inner.chars().count() == 1 {
                    TokenKind::Char
                } else {
                    TokenKind::String
                };
                quoted(kind, slice, pos)
            }
            Scan::Unterminated => return Err(CompileError::unterminated_string(pos)),
            Scan::Word => Token::new(classify_word(slice), slice, pos),
        };

        self.after_operand =
            token.kind.ends_operand() || token.is_delimiter(")") || token.is_delimiter("]");
        Ok(Some(token))
    }

    /// A `-` glued to a digit is a sign when no operand precedes it
    fn starts_negative_literal(&self, end: usize) -> bool {
        let glued = self.source[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());
        glued && !self.after_operand
    }

    /// Extend the current `-` over the number that follows it
    fn negative_literal(&mut self, start: usize) -> Token {
        let rest = &self.source[start + 1..];
        let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();

        let mut len = digits(rest);
        if rest[len..].starts_with('.') {
            len += 1 + digits(&rest[len + 1..]);
        }
        let is_float = rest[len..].starts_with('f');
        if is_float {
            len += 1;
        }
        self.inner.bump(len);

        let slice = self.inner.slice();
        let pos = self.pos_at(start, slice.len());
        if is_float {
            Token::with_pos(TokenKind::Float, &slice[..slice.len() - 1], pos)
        } else if slice.contains('.') {
            Token::new(TokenKind::Double, slice, pos)
        } else {
            Token::new(TokenKind::Integer, slice, pos)
        }
    }

    /// Collect all tokens, stopping at the first error
    pub fn tokenize(mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn classify_word(word: &str) -> TokenKind {
    if KEYWORDS.contains(&word) {
        TokenKind::Keyword
    } else if DATATYPES.contains(&word) {
        TokenKind::Datatype
    } else {
        TokenKind::Identifier
    }
}

/// Quoted literal: value drops the quotes, position keeps them
fn quoted(kind: TokenKind, slice: &str, pos: Position) -> Token {
    let value = &slice[1..slice.len() - 1];
    let pos = pos.with_length(value.chars().count() + 2);
    Token::with_pos(kind, value, pos)
}

/// Helper function to lex source code
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}
