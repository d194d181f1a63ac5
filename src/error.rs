//! Error Definitions
//!
//! Every phase stops at the first problem it finds and reports it as a
//! [`CompileError`]. Messages are written as templates where `%t` is replaced
//! by a token's kind, `%v` by a token's value and `%s` by a plain string, in
//! the order the placeholders appear.

use crate::span::Position;
use crate::token::Token;
use crate::ty::Type;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownCharacter,
    UnexpectedToken,
    MissingTypeAnnotation,
    UndefinedVariable,
    DuplicateDefinition,
    ConstantReassigned,
    TypeMismatch,
    UnknownFunction,
    IllegalAccess,
    MissingEntryFile,
    Unsupported,
}

impl ErrorKind {
    /// Subtype label printed in front of the message
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::UnknownCharacter
            | ErrorKind::UnexpectedToken
            | ErrorKind::MissingTypeAnnotation => "SyntaxError",
            _ => "Error",
        }
    }
}

/// A placeholder argument for a message template
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Token(&'a Token),
    Str(&'a str),
}

/// Substitute `%t`, `%v` and `%s` placeholders from `args`, in order
pub fn format_message(template: &str, args: &[Arg<'_>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let spec = match chars.peek() {
            Some(&s @ ('t' | 'v' | 's')) => s,
            _ => {
                out.push(c);
                continue;
            }
        };
        chars.next();
        match (spec, args.next()) {
            ('t', Some(Arg::Token(tok))) => out.push_str(&format!("'{}'", tok.kind)),
            ('v', Some(Arg::Token(tok))) => out.push_str(&format!("'{}'", tok.value)),
            (_, Some(Arg::Token(tok))) => out.push_str(&tok.value),
            (_, Some(Arg::Str(s))) => out.push_str(s),
            (_, None) => {
                out.push('%');
                out.push(spec);
            }
        }
    }
    out
}

/// Result type for the compile phases
pub type CompileResult<T> = Result<T, CompileError>;

/// A fatal compile error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}: {}\n\tat {}", .kind.label(), .message, .pos)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Position,
}

impl CompileError {
    pub fn new(kind: ErrorKind, template: &str, args: &[Arg<'_>], pos: Position) -> Self {
        Self {
            kind,
            message: format_message(template, args),
            pos,
        }
    }

    // ============ Error Constructors ============

    pub fn unknown_character(ch: char, pos: Position) -> Self {
        let ch = ch.escape_debug().to_string();
        Self::new(
            ErrorKind::UnknownCharacter,
            "Unknown character '%s'",
            &[Arg::Str(&ch)],
            pos,
        )
    }

    pub fn unterminated_string(pos: Position) -> Self {
        Self::new(
            ErrorKind::UnknownCharacter,
            "String literal is not closed before the end of the line",
            &[],
            pos,
        )
    }

    pub fn unexpected_token(expected: &str, found: &Token) -> Self {
        Self::new(
            ErrorKind::UnexpectedToken,
            "Unexpected token %v, expected '%s'",
            &[Arg::Token(found), Arg::Str(expected)],
            found.pos.clone(),
        )
    }

    pub fn unknown_token(found: &Token) -> Self {
        Self::new(
            ErrorKind::UnexpectedToken,
            "Unknown token %v",
            &[Arg::Token(found)],
            found.pos.clone(),
        )
    }

    pub fn missing_type(param: &Token) -> Self {
        Self::new(
            ErrorKind::MissingTypeAnnotation,
            "Parameter %v has no type specified. Use '%s: <type>'.",
            &[Arg::Token(param), Arg::Token(param)],
            param.pos.clone(),
        )
    }

    pub fn undefined_variable(name: &Token) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            "Variable %v is not defined. Tried using variable that was not defined.",
            &[Arg::Token(name)],
            name.pos.clone(),
        )
    }

    pub fn duplicate_variable(name: &Token) -> Self {
        Self::new(
            ErrorKind::DuplicateDefinition,
            "Variable %v is already defined.",
            &[Arg::Token(name)],
            name.pos.clone(),
        )
    }

    pub fn duplicate_definition(what: &str, name: &Token) -> Self {
        Self::new(
            ErrorKind::DuplicateDefinition,
            "%s %v is already defined.",
            &[Arg::Str(what), Arg::Token(name)],
            name.pos.clone(),
        )
    }

    pub fn constant_reassigned(name: &Token) -> Self {
        Self::new(
            ErrorKind::ConstantReassigned,
            "Cannot reassign constant %v.",
            &[Arg::Token(name)],
            name.pos.clone(),
        )
    }

    pub fn assign_mismatch(target: &Type, found: &Type, name: &Token) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            "Cannot assign a '%s' to '%s' on variable %v. Type mismatch.",
            &[
                Arg::Str(&found.canonical()),
                Arg::Str(&target.canonical()),
                Arg::Token(name),
            ],
            name.pos.clone(),
        )
    }

    pub fn operand_mismatch(op: &Token, left: &Type, right: &Type) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            "Cannot perform operation %v on '%s' and '%s'. Type mismatch.",
            &[
                Arg::Token(op),
                Arg::Str(&left.canonical()),
                Arg::Str(&right.canonical()),
            ],
            op.pos.clone(),
        )
    }

    pub fn return_mismatch(found: &Type, declared: &Type, at: &Token) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            "Invalid value returned. Value has type '%s' while function has '%s'.",
            &[Arg::Str(&found.canonical()), Arg::Str(&declared.canonical())],
            at.pos.clone(),
        )
    }

    pub fn type_mismatch(message: &str, at: &Token) -> Self {
        Self::new(ErrorKind::TypeMismatch, message, &[Arg::Token(at)], at.pos.clone())
    }

    pub fn unknown_function(name: &Token) -> Self {
        Self::new(
            ErrorKind::UnknownFunction,
            "Trying to call function %v, but it does not exist!",
            &[Arg::Token(name)],
            name.pos.clone(),
        )
    }

    pub fn illegal_access(detail: &str, at: &Token) -> Self {
        Self::new(
            ErrorKind::IllegalAccess,
            "Illegal access of %v: %s",
            &[Arg::Token(at), Arg::Str(detail)],
            at.pos.clone(),
        )
    }

    pub fn unsupported(detail: &str, at: &Token) -> Self {
        Self::new(
            ErrorKind::Unsupported,
            "%s (at %v)",
            &[Arg::Str(detail), Arg::Token(at)],
            at.pos.clone(),
        )
    }

    pub fn missing_entry(path: &str) -> Self {
        Self::new(
            ErrorKind::MissingEntryFile,
            "Entry point file does not exist! File should be at root and called 'main.dime'",
            &[],
            Position::new(Arc::from(path), 0, 0, 0, 0),
        )
    }
}

/// Errors from building a project on disk
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}
