//! Abstract Syntax Tree (AST) for Dime
//!
//! Every node keeps the token it was built from (for diagnostics and for the
//! literal/identifier text) and an optional declared type. Kind specific data
//! lives in the [`NodeKind`] payloads.
//!
//! Member and subscript suffixes form a singly linked chain: `a.b[0]` is the
//! identifier `a` whose `access` is `b`, whose `access` is the subscript `0`.
//! Each accessor records the token of the node it hangs off in `parent`; that
//! back-reference is only read when reporting errors.

use crate::token::Token;
use crate::ty::Type;

/// An AST node
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub kind: NodeKind,
    /// Primary token: literal text, name, operator or leading keyword
    pub token: Token,
    pub data_type: Option<Type>,
    /// Next `.member` or `[index]` suffix
    pub access: Option<Box<Node>>,
    /// Token of the node this accessor is attached to
    pub parent: Option<Token>,
    /// Set on accessors written with `[ ]`
    pub is_subscript: bool,
}

impl Node {
    pub fn new(kind: NodeKind, token: Token) -> Self {
        Self {
            kind,
            token,
            ..Self::default()
        }
    }

    pub fn typed(kind: NodeKind, token: Token, data_type: Type) -> Self {
        Self {
            data_type: Some(data_type),
            ..Self::new(kind, token)
        }
    }

    /// Name or literal text
    pub fn value(&self) -> &str {
        &self.token.value
    }

    /// Attach `accessor` as the access suffix of this node
    pub fn link(&mut self, mut accessor: Node) {
        accessor.parent = Some(self.token.clone());
        self.access = Some(Box::new(accessor));
    }

    /// Node kinds a `( ... )` may turn into a call
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, NodeKind::Identifier) && self.access.is_none()
    }

    /// Whether the statement list always leaves through a `return`
    pub fn definitely_returns(body: &[Node]) -> bool {
        matches!(body.last().map(|n| &n.kind), Some(NodeKind::Return { .. }))
    }
}

/// Node variants
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Null,

    // ============ Literals ============
    Char,
    String,
    Boolean,
    Integer,
    Double,
    Float,

    // ============ Expressions ============
    Identifier,

    /// `left op right`
    Binary {
        left: Box<Node>,
        op: Token,
        right: Box<Node>,
    },

    /// `left = right`, compound forms, and `++`/`--` without a right side
    Assign {
        left: Box<Node>,
        op: Token,
        right: Option<Box<Node>>,
        is_op_before: bool,
    },

    /// `name(args)` or `new name(args)`
    FunctionCall(Call),

    // ============ Declarations ============
    /// `let T name` / `const T name`; the type is in `data_type`
    Variable { is_const: bool },

    /// `func T name(params) { body }`
    Function(Function),

    /// Signature without a body, from `decl func` and `extern func`
    FunctionDef { params: Vec<Node> },

    /// `extern func ...`, wrapping a `FunctionDef`
    Extern { signature: Box<Node> },

    /// `class Name { members }`
    Class { body: Vec<Node> },

    /// `define NAME value`
    Define { name: Box<Node>, value: Box<Node> },

    /// `include path`
    Include { path: Box<Node> },

    // ============ Structure ============
    Scope { body: Vec<Node> },

    If {
        condition: Box<Node>,
        body: Vec<Node>,
        els: Option<Box<Node>>,
    },

    Else { body: Vec<Node> },

    WhileLoop {
        condition: Box<Node>,
        body: Vec<Node>,
    },

    ForLoop {
        init: Option<Box<Node>>,
        condition: Box<Node>,
        step: Option<Box<Node>>,
        body: Vec<Node>,
    },

    Return { value: Option<Box<Node>> },

    Break,
    Continue,
}

/// Function definition
#[derive(Debug, Clone, Default)]
pub struct Function {
    /// `Variable` nodes carrying the parameter types
    pub params: Vec<Node>,
    pub body: Vec<Node>,
    pub is_exported: bool,
}

/// Call site
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub args: Vec<Node>,
    /// Written with a leading `new`
    pub is_new: bool,
}
