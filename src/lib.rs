//! Dime Compiler
//!
//! Compiles Dime, a small statically typed curly-brace language, into a
//! WebAssembly text module.
//!
//! # Architecture
//!
//! ```text
//! Source Code (.dime)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → AST
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Code Gen   │  → WAT module (type checked while emitting)
//! └─────────────┘
//! ```

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod project;
pub mod span;
pub mod token;
pub mod ty;

// Re-exports for convenience
pub use codegen::{compile_source, Compiler};
pub use error::{BuildError, CompileError, CompileResult, ErrorKind};
pub use lexer::Lexer;
pub use project::{build_project, BuildConfig};
pub use span::Position;
pub use token::{Token, TokenKind};
pub use ty::Type;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Dime source files
pub const FILE_EXTENSION: &str = "dime";
