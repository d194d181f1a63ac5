//! Token definitions for Dime
//!
//! Tokens are coarse: the lexer only decides the category of a lexeme, the raw
//! text is kept in [`Token::value`] and interpreted by the parser.

use crate::span::Position;
use std::fmt;

/// Reserved words
pub const KEYWORDS: &[&str] = &[
    "func", "let", "const", "return", "true", "false", "if", "else", "decl", "export", "extern",
    "define", "include", "class", "new", "for", "while", "break", "continue",
];

/// Primitive type names
pub const DATATYPES: &[&str] = &["i32", "i64", "f32", "f64", "str", "char", "bool"];

/// Operators that write to their left operand
pub const ASSIGNMENTS: &[&str] = &["=", "+=", "-=", "*=", "/=", "%=", "++", "--"];

/// Assignment operators that take no right-hand side
pub const NO_RIGHT_HAND: &[&str] = &["++", "--"];

/// Binding power of a binary operator; higher binds tighter
pub fn precedence(op: &str) -> Option<u8> {
    let prec = match op {
        "=" => 1,
        "+=" | "-=" | "*=" | "/=" | "%=" => 2,
        "||" => 4,
        "&&" => 5,
        "++" | "--" => 6,
        "<" | ">" | "<=" | ">=" | "==" | "!=" => 7,
        "+" | "-" => 10,
        "*" | "/" | "%" => 20,
        _ => return None,
    };
    Some(prec)
}

pub fn is_assignment(op: &str) -> bool {
    ASSIGNMENTS.contains(&op)
}

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TokenKind {
    /// Placeholder returned past the end of input
    #[default]
    Null,
    Char,
    Pointer,
    String,
    Boolean,
    Integer,
    Double,
    Float,
    Datatype,
    Keyword,
    Identifier,
    Delimiter,
    Operator,
    NewLine,
    EndOfFile,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Char
                | TokenKind::String
                | TokenKind::Boolean
                | TokenKind::Integer
                | TokenKind::Double
                | TokenKind::Float
        )
    }

    /// Can a token of this kind be the last token of an operand
    pub fn ends_operand(&self) -> bool {
        self.is_literal() || matches!(self, TokenKind::Identifier | TokenKind::Datatype)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Null => "Null",
            TokenKind::Char => "Char",
            TokenKind::Pointer => "Pointer",
            TokenKind::String => "String",
            TokenKind::Boolean => "Boolean",
            TokenKind::Integer => "Integer",
            TokenKind::Double => "Double",
            TokenKind::Float => "Float",
            TokenKind::Datatype => "Datatype",
            TokenKind::Keyword => "Keyword",
            TokenKind::Identifier => "Identifier",
            TokenKind::Delimiter => "Delimiter",
            TokenKind::Operator => "Operator",
            TokenKind::NewLine => "NewLine",
            TokenKind::EndOfFile => "EndOfFile",
        };
        write!(f, "{}", s)
    }
}

/// A lexeme with its category and location
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: Position,
}

impl Token {
    /// Create a token whose position length covers the whole value
    pub fn new(kind: TokenKind, value: impl Into<String>, pos: Position) -> Self {
        let value = value.into();
        let pos = pos.with_length(value.chars().count());
        Self { kind, value, pos }
    }

    /// Create a token keeping the position length as given
    pub fn with_pos(kind: TokenKind, value: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            value: value.into(),
            pos,
        }
    }

    pub fn is(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }

    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.is(TokenKind::Keyword, word)
    }

    pub fn is_delimiter(&self, delim: &str) -> bool {
        self.is(TokenKind::Delimiter, delim)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.is(TokenKind::Operator, op)
    }

    pub fn is_newline(&self) -> bool {
        self.kind == TokenKind::NewLine
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?}) at {}", self.kind, self.value, self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_follows_value() {
        let tok = Token::new(TokenKind::Identifier, "count", Position::default());
        assert_eq!(tok.pos.length, 5);
    }

    #[test]
    fn test_length_override() {
        let pos = Position::default().with_length(4);
        let tok = Token::with_pos(TokenKind::String, "ab", pos);
        assert_eq!(tok.pos.length, 4);
    }

    #[test]
    fn test_precedence_order() {
        assert!(precedence("*") > precedence("+"));
        assert!(precedence("+") > precedence("<"));
        assert!(precedence("&&") > precedence("||"));
        assert!(precedence("+=") > precedence("="));
        assert_eq!(precedence("."), None);
    }

    #[test]
    fn test_assignment_table() {
        assert!(is_assignment("+="));
        assert!(is_assignment("++"));
        assert!(!is_assignment("=="));
    }
}
