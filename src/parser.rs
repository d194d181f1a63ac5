//! Parser for Dime
//!
//! Statements are parsed by recursive descent, dispatching on the leading
//! keyword. Expressions use precedence climbing over the operator table in
//! [`crate::token::precedence`]. Statements are separated by newlines or `;`.

use crate::ast::{Call, Function, Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::lexer::Lexer;
use crate::token::{is_assignment, precedence, Token, TokenKind, NO_RIGHT_HAND};
use crate::ty::Type;

/// Parse result
pub type ParseResult<T> = CompileResult<T>;

/// Name of the root scope token
pub const GLOBAL_SCOPE: &str = "_GLOBAL_";

/// The parser for Dime
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Returned once the tokens run out
    end: Token,
}

impl Parser {
    /// Create a new parser
    pub fn new(tokens: Vec<Token>) -> Self {
        let end_pos = tokens
            .last()
            .map(|tok| tok.pos.after())
            .unwrap_or_default();
        Self {
            tokens,
            index: 0,
            end: Token::with_pos(TokenKind::Null, "", end_pos),
        }
    }

    // ============ Token helpers ============

    fn current(&self) -> &Token {
        self.tokens.get(self.index).unwrap_or(&self.end)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.index + 1).unwrap_or(&self.end)
    }

    fn is_at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    /// Consume the current token and return it
    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.is_at_end() {
            self.index += 1;
        }
        token
    }

    fn expect_delimiter(&mut self, delim: &str) -> ParseResult<Token> {
        if self.current().is_delimiter(delim) {
            Ok(self.advance())
        } else {
            Err(CompileError::unexpected_token(delim, self.current()))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> ParseResult<Token> {
        if self.current().is_keyword(word) {
            Ok(self.advance())
        } else {
            Err(CompileError::unexpected_token(word, self.current()))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<Token> {
        if self.current().is_kind(TokenKind::Identifier) {
            Ok(self.advance())
        } else {
            Err(CompileError::unexpected_token("identifier", self.current()))
        }
    }

    fn skip_newlines(&mut self) {
        while self.current().is_newline() {
            self.advance();
        }
    }

    /// Skip newlines and `;`
    fn skip_separators(&mut self) {
        while self.current().is_newline() || self.current().is_delimiter(";") {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        let tok = self.current();
        self.is_at_end() || tok.is_newline() || tok.is_delimiter(";") || tok.is_delimiter("}")
    }

    // ============ Program ============

    /// Parse the whole token stream into the root scope
    pub fn parse_program(&mut self) -> ParseResult<Node> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            if self.is_at_end() {
                break;
            }
            body.push(self.parse_expression(false)?);
        }

        let root = Token::new(TokenKind::Identifier, GLOBAL_SCOPE, Default::default());
        Ok(Node::new(NodeKind::Scope { body }, root))
    }

    /// Parse a list like `(a, b)` or `{ stmt; stmt }`.
    ///
    /// An empty separator means statements split by newlines or `;`. With
    /// `is_func` every item must be a `name: type` parameter.
    fn parse_delimited(
        &mut self,
        start: &str,
        end: &str,
        separator: &str,
        is_func: bool,
    ) -> ParseResult<Vec<Node>> {
        self.expect_delimiter(start)?;
        let mut items = Vec::new();

        loop {
            if separator.is_empty() {
                self.skip_separators();
            } else {
                self.skip_newlines();
            }
            if self.is_at_end() || self.current().is_delimiter(end) {
                break;
            }
            if !items.is_empty() && !separator.is_empty() {
                self.expect_delimiter(separator)?;
                self.skip_newlines();
            }
            items.push(self.parse_expression(is_func)?);
        }

        self.expect_delimiter(end)?;
        Ok(items)
    }

    // ============ Expression parsing ============

    /// Parse one full expression or keyword-led statement
    pub fn parse_expression(&mut self, is_func: bool) -> ParseResult<Node> {
        let atom = self.parse_atom(is_func)?;
        let atom = self.check_call(atom)?;
        let expr = self.parse_binary(atom, 0)?;
        self.check_call(expr)
    }

    /// Atom followed by an optional call suffix
    fn parse_operand(&mut self) -> ParseResult<Node> {
        let atom = self.parse_atom(false)?;
        self.check_call(atom)
    }

    /// Fold trailing operators that bind tighter than `floor`
    fn parse_binary(&mut self, mut left: Node, floor: u8) -> ParseResult<Node> {
        loop {
            let op = self.current().clone();
            if !op.is_kind(TokenKind::Operator) {
                return Ok(left);
            }
            let prec = match precedence(&op.value) {
                Some(prec) if prec > floor => prec,
                _ => return Ok(left),
            };
            self.advance();

            if NO_RIGHT_HAND.contains(&op.value.as_str()) {
                left = assign(left, op, None, false);
                continue;
            }

            let operand = self.parse_operand()?;
            left = if is_assignment(&op.value) {
                let right = self.parse_binary(operand, floor)?;
                assign(left, op, Some(right), false)
            } else {
                let right = self.parse_binary(operand, prec)?;
                let data_type = left.data_type.clone().or_else(|| right.data_type.clone());
                Node {
                    data_type,
                    ..Node::new(
                        NodeKind::Binary {
                            left: Box::new(left),
                            op: op.clone(),
                            right: Box::new(right),
                        },
                        op,
                    )
                }
            };
        }
    }

    /// Turn `name` followed by `(` into a call
    fn check_call(&mut self, expr: Node) -> ParseResult<Node> {
        if expr.is_callable() && self.current().is_delimiter("(") {
            self.parse_call(expr, false)
        } else {
            Ok(expr)
        }
    }

    fn parse_call(&mut self, callee: Node, is_new: bool) -> ParseResult<Node> {
        let args = self.parse_delimited("(", ")", ",", false)?;
        let mut call = Node::new(NodeKind::FunctionCall(Call { args, is_new }), callee.token);
        self.parse_access(&mut call)?;
        Ok(call)
    }

    /// Parse a single atom
    fn parse_atom(&mut self, is_func: bool) -> ParseResult<Node> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Delimiter if tok.value == "(" => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expression(false)?;
                self.skip_newlines();
                self.expect_delimiter(")")?;
                Ok(inner)
            }
            TokenKind::Keyword => self.parse_keyword(tok),
            TokenKind::Operator if NO_RIGHT_HAND.contains(&tok.value.as_str()) => {
                self.advance();
                let target = self.parse_atom(false)?;
                Ok(assign(target, tok, None, true))
            }
            TokenKind::String => self.literal(NodeKind::String, "str"),
            TokenKind::Char => self.literal(NodeKind::Char, "char"),
            TokenKind::Integer => self.literal(NodeKind::Integer, "i32"),
            TokenKind::Double => self.literal(NodeKind::Double, "f64"),
            TokenKind::Float => self.literal(NodeKind::Float, "f32"),
            TokenKind::Identifier => self.parse_identifier(is_func),
            _ => Err(CompileError::unknown_token(&tok)),
        }
    }

    fn literal(&mut self, kind: NodeKind, ty: &str) -> ParseResult<Node> {
        let tok = self.advance();
        Ok(Node::typed(kind, tok, Type::named(ty)))
    }

    fn parse_keyword(&mut self, tok: Token) -> ParseResult<Node> {
        match tok.value.as_str() {
            "let" | "const" => self.parse_variable(),
            "func" => self.parse_function(false),
            "export" => {
                self.advance();
                self.parse_function(true)
            }
            "decl" => {
                self.advance();
                self.expect_keyword("func")?;
                self.parse_signature()
            }
            "extern" => self.parse_extern(),
            "return" => self.parse_return(),
            "if" => self.parse_if(),
            "while" => self.parse_while(),
            "for" => self.parse_for(),
            "class" => self.parse_class(),
            "include" => {
                self.advance();
                let path = self.parse_expression(false)?;
                Ok(Node::new(
                    NodeKind::Include {
                        path: Box::new(path),
                    },
                    tok,
                ))
            }
            "define" => {
                self.advance();
                let name = Node::new(NodeKind::Identifier, self.expect_identifier()?);
                let value = self.parse_expression(false)?;
                Ok(Node::new(
                    NodeKind::Define {
                        name: Box::new(name),
                        value: Box::new(value),
                    },
                    tok,
                ))
            }
            "new" => {
                self.advance();
                let name = self.expect_identifier()?;
                if !self.current().is_delimiter("(") {
                    return Err(CompileError::unexpected_token("(", self.current()));
                }
                self.parse_call(Node::new(NodeKind::Identifier, name), true)
            }
            "true" | "false" => {
                self.advance();
                let tok = Token::with_pos(TokenKind::Boolean, tok.value, tok.pos);
                Ok(Node::typed(NodeKind::Boolean, tok, Type::bool()))
            }
            "break" => {
                self.advance();
                Ok(Node::new(NodeKind::Break, tok))
            }
            "continue" => {
                self.advance();
                Ok(Node::new(NodeKind::Continue, tok))
            }
            _ => Err(CompileError::unknown_token(&tok)),
        }
    }

    /// Identifier, or `name: type` parameter when `is_func` is set
    fn parse_identifier(&mut self, is_func: bool) -> ParseResult<Node> {
        let name = self.advance();
        if is_func {
            if !self.current().is_delimiter(":") {
                return Err(CompileError::missing_type(&name));
            }
            self.advance();
            let ty = self.parse_data_type()?;
            return Ok(Node::typed(NodeKind::Variable { is_const: false }, name, ty));
        }

        let mut node = Node::new(NodeKind::Identifier, name);
        self.parse_access(&mut node)?;
        Ok(node)
    }

    /// Parse one `.member` or `[index]` suffix onto `base`
    fn parse_access(&mut self, base: &mut Node) -> ParseResult<()> {
        if self.current().is_delimiter(".") {
            self.advance();
            let mut accessor = self.parse_operand()?;
            if self.at_assignment() {
                accessor = self.parse_binary(accessor, 0)?;
            }
            if !matches!(
                accessor.kind,
                NodeKind::FunctionCall(_) | NodeKind::Identifier | NodeKind::Assign { .. }
            ) {
                return Err(CompileError::unexpected_token("member", &accessor.token));
            }
            base.link(accessor);
        } else if self.current().is_delimiter("[") {
            self.advance();
            let first = self.current();
            if !matches!(
                first.kind,
                TokenKind::Identifier | TokenKind::String | TokenKind::Integer
            ) {
                return Err(CompileError::unexpected_token("index", first));
            }
            let mut index = self.parse_expression(false)?;
            index.is_subscript = true;
            self.expect_delimiter("]")?;

            if self.at_assignment() {
                let op = self.current().clone();
                index = self.parse_binary(index, 0)?;
                if !matches!(index.kind, NodeKind::Assign { .. }) {
                    return Err(CompileError::unexpected_token("assignment", &op));
                }
            } else {
                self.parse_access(&mut index)?;
            }
            base.link(index);
        }
        Ok(())
    }

    fn at_assignment(&self) -> bool {
        let tok = self.current();
        tok.is_kind(TokenKind::Operator) && is_assignment(&tok.value)
    }

    // ============ Types ============

    /// Parse `base`, `base[..]`, `base[..][..]` or `base<..>`
    pub fn parse_data_type(&mut self) -> ParseResult<Type> {
        let base = self.current().clone();
        if !matches!(base.kind, TokenKind::Datatype | TokenKind::Identifier) {
            return Err(CompileError::unexpected_token("type", &base));
        }
        self.advance();
        let mut ty = Type::named(base.value);

        while self.current().is_delimiter("[") {
            self.advance();
            ty.is_array = true;
            self.parse_sub_types(&mut ty, "]")?;
        }
        if self.current().is_operator("<") {
            self.advance();
            ty.is_generic = true;
            self.parse_sub_types(&mut ty, ">")?;
        }
        Ok(ty)
    }

    fn parse_sub_types(&mut self, ty: &mut Type, close: &str) -> ParseResult<()> {
        while self.current().value != close {
            if self.is_at_end() {
                return Err(CompileError::unexpected_token(close, self.current()));
            }
            let sub = if self.current().is_kind(TokenKind::Integer) {
                Type::named(self.advance().value)
            } else {
                self.parse_data_type()?
            };
            ty.add_sub_type(sub);
            if self.current().is_delimiter(",") {
                self.advance();
            }
        }
        self.advance();
        Ok(())
    }

    // ============ Declarations ============

    /// `let T name`, `let name: T` or the `const` forms
    fn parse_variable(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        let is_const = keyword.value == "const";

        let (name, ty) = if self.current().is_kind(TokenKind::Identifier)
            && self.peek().is_delimiter(":")
        {
            let name = self.advance();
            self.advance();
            (name, self.parse_data_type()?)
        } else {
            let ty = self.parse_data_type()?;
            (self.expect_identifier()?, ty)
        };
        Ok(Node::typed(NodeKind::Variable { is_const }, name, ty))
    }

    /// `T name(params)` after `func`; the return type may be left out
    fn parse_signature_parts(&mut self) -> ParseResult<(Token, Type, Vec<Node>)> {
        let (name, ret) = if self.peek().is_delimiter("(") {
            (self.advance(), Type::void())
        } else {
            let ret = self.parse_data_type()?;
            (self.expect_identifier()?, ret)
        };
        let params = self.parse_delimited("(", ")", ",", true)?;
        Ok((name, ret, params))
    }

    fn parse_signature(&mut self) -> ParseResult<Node> {
        let (name, ret, params) = self.parse_signature_parts()?;
        Ok(Node::typed(NodeKind::FunctionDef { params }, name, ret))
    }

    fn parse_function(&mut self, is_exported: bool) -> ParseResult<Node> {
        self.expect_keyword("func")?;
        let (name, ret, params) = self.parse_signature_parts()?;
        let body = self.parse_delimited("{", "}", "", false)?;
        let function = Function {
            params,
            body,
            is_exported,
        };
        Ok(Node::typed(NodeKind::Function(function), name, ret))
    }

    fn parse_extern(&mut self) -> ParseResult<Node> {
        self.advance();
        self.expect_keyword("func")?;
        let signature = self.parse_signature()?;
        let name = signature.token.clone();
        Ok(Node::new(
            NodeKind::Extern {
                signature: Box::new(signature),
            },
            name,
        ))
    }

    fn parse_class(&mut self) -> ParseResult<Node> {
        self.advance();
        let name = self.expect_identifier()?;
        let body = self.parse_delimited("{", "}", "", false)?;
        let ty = Type::named(name.value.clone());
        Ok(Node::typed(NodeKind::Class { body }, name, ty))
    }

    // ============ Statements ============

    fn parse_return(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        let value = if self.at_statement_end() {
            None
        } else {
            Some(Box::new(self.parse_expression(false)?))
        };
        Ok(Node::new(NodeKind::Return { value }, keyword))
    }

    /// A braced block, or a single statement
    fn parse_body(&mut self) -> ParseResult<Vec<Node>> {
        if self.current().is_delimiter("{") {
            self.parse_delimited("{", "}", "", false)
        } else {
            Ok(vec![self.parse_expression(false)?])
        }
    }

    fn parse_if(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        let condition = self.parse_expression(false)?;
        let body = self.parse_body()?;

        let resume = self.index;
        self.skip_newlines();
        let els = if self.current().is_keyword("else") {
            let else_tok = self.advance();
            let body = if self.current().is_keyword("if") {
                vec![self.parse_if()?]
            } else {
                self.parse_body()?
            };
            Some(Box::new(Node::new(NodeKind::Else { body }, else_tok)))
        } else {
            self.index = resume;
            None
        };

        Ok(Node::new(
            NodeKind::If {
                condition: Box::new(condition),
                body,
                els,
            },
            keyword,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        let condition = self.parse_expression(false)?;
        let body = self.parse_delimited("{", "}", "", false)?;
        Ok(Node::new(
            NodeKind::WhileLoop {
                condition: Box::new(condition),
                body,
            },
            keyword,
        ))
    }

    /// `for (init; condition; step) { body }`, every clause optional
    fn parse_for(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        self.expect_delimiter("(")?;

        let init = self.parse_clause(";")?;
        self.expect_delimiter(";")?;
        let condition = match self.parse_clause(";")? {
            Some(condition) => condition,
            None => {
                let tok = Token::with_pos(TokenKind::Boolean, "true", keyword.pos.clone());
                Box::new(Node::typed(NodeKind::Boolean, tok, Type::bool()))
            }
        };
        self.expect_delimiter(";")?;
        let step = self.parse_clause(")")?;
        self.expect_delimiter(")")?;

        let body = self.parse_delimited("{", "}", "", false)?;
        Ok(Node::new(
            NodeKind::ForLoop {
                init,
                condition,
                step,
                body,
            },
            keyword,
        ))
    }

    fn parse_clause(&mut self, end: &str) -> ParseResult<Option<Box<Node>>> {
        if self.current().is_delimiter(end) {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.parse_expression(false)?)))
        }
    }
}

fn assign(left: Node, op: Token, right: Option<Node>, is_op_before: bool) -> Node {
    let data_type = left
        .data_type
        .clone()
        .or_else(|| right.as_ref().and_then(|r| r.data_type.clone()));
    Node {
        data_type,
        ..Node::new(
            NodeKind::Assign {
                left: Box::new(left),
                op: op.clone(),
                right: right.map(Box::new),
                is_op_before,
            },
            op,
        )
    }
}

/// Parse a token stream into the root scope
pub fn parse(tokens: Vec<Token>) -> ParseResult<Node> {
    Parser::new(tokens).parse_program()
}

/// Lex and parse source text
pub fn parse_source(file: &str, source: &str) -> ParseResult<Node> {
    let tokens = Lexer::with_file(file, source).tokenize()?;
    parse(tokens)
}
