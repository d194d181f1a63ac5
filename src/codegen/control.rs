//! Structured control flow: `if`/`else`, `while`, `for`, `break`, `continue`

use super::{BlockContext, BlockKind, Compiler};
use crate::ast::{Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::token::Token;
use crate::ty::{Type, ValType};

impl Compiler {
    /// Statements of a nested block
    pub(super) fn compile_block(&mut self, body: &[Node]) -> CompileResult<()> {
        body.iter().try_for_each(|stmt| self.compile_statement(stmt))
    }

    /// Push a condition; it must be word sized
    fn compile_condition(&mut self, condition: &Node, at: &Token) -> CompileResult<()> {
        let ty = self.value_of(condition, at)?;
        if ty.convert() != Some(ValType::I32) {
            return Err(CompileError::type_mismatch(
                &format!("Condition of %v has type '{}', expected a word sized value.", ty),
                at,
            ));
        }
        Ok(())
    }

    /// Push the negated condition and leave `exit` when it is false
    fn compile_exit_test(&mut self, condition: &Node, at: &Token, exit: &str) -> CompileResult<()> {
        self.compile_condition(condition, at)?;
        self.emit("i32.const 1");
        self.emit("i32.xor");
        self.emit(format!("br_if {}", exit));
        Ok(())
    }

    pub(super) fn compile_if(
        &mut self,
        node: &Node,
        condition: &Node,
        body: &[Node],
        els: Option<&Node>,
    ) -> CompileResult<Option<Type>> {
        self.compile_condition(condition, &node.token)?;
        let n = self.next_block(&node.token)?;
        let header = self.emit_marked(format!("if $if{}", n));

        self.depth += 1;
        self.with_context(
            BlockContext {
                header,
                kind: BlockKind::If,
            },
            |c| {
                if body.is_empty() {
                    c.emit("nop");
                }
                c.compile_block(body)
            },
        )?;

        if let Some(els) = els {
            let NodeKind::Else { body } = &els.kind else {
                return Err(CompileError::unexpected_token("else", &els.token));
            };
            self.depth -= 1;
            self.emit("else");
            self.depth += 1;
            self.with_context(
                BlockContext {
                    header,
                    kind: BlockKind::Else,
                },
                |c| c.compile_block(body),
            )?;
        }

        self.depth -= 1;
        self.emit("end");
        Ok(None)
    }

    pub(super) fn compile_while(
        &mut self,
        node: &Node,
        condition: &Node,
        body: &[Node],
    ) -> CompileResult<Option<Type>> {
        let n = self.next_block(&node.token)?;
        let exit = format!("$block{}", n);
        let top = format!("$loop{}", n);

        let header = self.emit_marked(format!("block {}", exit));
        self.depth += 1;
        self.emit(format!("loop {}", top));
        self.depth += 1;
        self.compile_exit_test(condition, &node.token, &exit)?;

        let ctx = BlockContext {
            header,
            kind: BlockKind::Loop {
                exit: exit.clone(),
                next: top.clone(),
            },
        };
        self.with_context(ctx, |c| c.compile_block(body))?;
        if !Node::definitely_returns(body) {
            self.emit(format!("br {}", top));
        }

        self.depth -= 1;
        self.emit("end");
        self.depth -= 1;
        self.emit("end");
        Ok(None)
    }

    /// Like `while`, with the body wrapped in a block that `continue` leaves
    /// so the step still runs
    pub(super) fn compile_for(
        &mut self,
        node: &Node,
        init: Option<&Node>,
        condition: &Node,
        step: Option<&Node>,
        body: &[Node],
    ) -> CompileResult<Option<Type>> {
        if let Some(init) = init {
            self.compile_statement(init)?;
        }

        let n = self.next_block(&node.token)?;
        let exit = format!("$block{}", n);
        let top = format!("$loop{}", n);
        let next = format!("$continue{}", n);

        let header = self.emit_marked(format!("block {}", exit));
        self.depth += 1;
        self.emit(format!("loop {}", top));
        self.depth += 1;
        self.compile_exit_test(condition, &node.token, &exit)?;

        self.emit(format!("block {}", next));
        self.depth += 1;
        let ctx = BlockContext {
            header,
            kind: BlockKind::Loop {
                exit: exit.clone(),
                next,
            },
        };
        self.with_context(ctx, |c| c.compile_block(body))?;
        self.depth -= 1;
        self.emit("end");

        if let Some(step) = step {
            self.compile_statement(step)?;
        }
        self.emit(format!("br {}", top));

        self.depth -= 1;
        self.emit("end");
        self.depth -= 1;
        self.emit("end");
        Ok(None)
    }

    /// `break` when `leave` is set, `continue` otherwise
    pub(super) fn compile_jump(&mut self, node: &Node, leave: bool) -> CompileResult<Option<Type>> {
        let target = self.contexts.iter().rev().find_map(|ctx| match &ctx.kind {
            BlockKind::Loop { exit, next } => Some(if leave { exit } else { next }),
            _ => None,
        });
        let Some(target) = target.cloned() else {
            return Err(CompileError::unsupported(
                "Jump statement outside of a loop",
                &node.token,
            ));
        };
        self.emit(format!("br {}", target));
        Ok(None)
    }
}
