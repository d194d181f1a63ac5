//! WebAssembly text generation
//!
//! A single forward pass over the AST that writes WAT lines into an
//! [`InstrBuffer`] and type-checks as it goes. There is no separate semantic
//! pass: every `compile_*` method pushes the instructions for its node and
//! returns the type of the value it left on the stack, if any.
//!
//! Result types are only discovered when the first `return` of a function is
//! reached, after the function header and the blocks around the `return`
//! were already written. Those header lines are recorded as [`Mark`]s and
//! patched in place. Locals declared mid-body are spliced in right below the
//! function header for the same reason.

mod buffer;
mod control;
mod module;
mod object;
mod tables;

pub use buffer::{InstrBuffer, Mark};
pub use tables::{
    decode_escapes, ClassDef, ClassTable, FunctionId, FunctionRecord, FunctionTable, Property,
    StringTable, Variable, VariableTable,
};

use crate::ast::{Call, Function, Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::token::Token;
use crate::ty::{Type, ValType, WORD_SIZE};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Pages of linear memory exported by every module
pub const MEMORY_PAGES: u32 = 1;

/// Import module that `extern` functions are bound from
pub const IMPORT_MODULE: &str = "std";

/// Name of the generated bump allocator
pub const ALLOCATOR: &str = "malloc";

/// Method name treated as a class constructor
pub const CONSTRUCTOR: &str = "constructor";

const LEAVE_LABEL: &str = "$funcleave";
const SCRATCH: &str = "$#scratch";

/// An open `if`, `else` or loop whose header may receive a result type
#[derive(Debug, Clone)]
struct BlockContext {
    header: Mark,
    kind: BlockKind,
}

#[derive(Debug, Clone)]
enum BlockKind {
    If,
    Else,
    Loop { exit: String, next: String },
}

/// The code generator
pub struct Compiler {
    code: InstrBuffer,
    /// Lines that go before the memory declaration
    imports: Vec<String>,
    strings: StringTable,
    records: Vec<FunctionRecord>,
    functions: FunctionTable,
    classes: ClassTable,
    defines: HashMap<String, Node>,
    current: Option<FunctionId>,
    contexts: Vec<BlockContext>,
    depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut compiler = Self {
            code: InstrBuffer::new(),
            imports: Vec::new(),
            strings: StringTable::default(),
            records: Vec::new(),
            functions: FunctionTable::default(),
            classes: ClassTable::default(),
            defines: HashMap::new(),
            current: None,
            contexts: Vec::new(),
            depth: 0,
        };

        let mut malloc = FunctionRecord::new(ALLOCATOR, Token::default(), vec![Type::i32()], Type::i32());
        malloc.returned = true;
        malloc.result = Some(Type::i32());
        compiler.records.push(malloc);
        compiler.functions.bind(ALLOCATOR, FunctionId(0));
        compiler
    }

    /// Compile a parsed program into module text
    pub fn compile_program(mut self, root: &Node) -> CompileResult<String> {
        self.compile(root)?;
        if let Some(record) = self.records.iter().find(|r| r.is_def && !r.is_import) {
            return Err(CompileError::unknown_function(&record.token));
        }
        Ok(self.finish())
    }

    // ============ Emission helpers ============

    fn indent(&self, instr: &str) -> String {
        format!("{}{}", "\t".repeat(self.depth), instr)
    }

    fn emit(&mut self, instr: impl AsRef<str>) {
        let line = self.indent(instr.as_ref());
        self.code.push(line);
    }

    fn emit_marked(&mut self, instr: impl AsRef<str>) -> Mark {
        let line = self.indent(instr.as_ref());
        self.code.push_marked(line)
    }

    /// Append ` (result T)` to a header line unless it already has one
    fn patch_result(&mut self, mark: Mark, val: ValType) {
        if self.code.line(mark).contains("(result") {
            return;
        }
        trace!(line = self.code.position(mark), %val, "patching result type");
        self.code.append(mark, &format!(" (result {})", val));
    }

    fn record(&self, id: FunctionId) -> &FunctionRecord {
        &self.records[id.0]
    }

    fn record_mut(&mut self, id: FunctionId) -> &mut FunctionRecord {
        &mut self.records[id.0]
    }

    fn require_function(&self, at: &Token) -> CompileResult<FunctionId> {
        self.current
            .ok_or_else(|| CompileError::unsupported("Statements must appear inside a function", at))
    }

    fn next_block(&mut self, at: &Token) -> CompileResult<u32> {
        let id = self.require_function(at)?;
        Ok(self.record_mut(id).next_block())
    }

    /// Declare a local and splice its declaration below the function header
    fn declare_local(&mut self, name: &Token, ty: Type, is_const: bool) -> CompileResult<()> {
        let id = self.require_function(name)?;
        if self.record(id).variables.contains(&name.value) {
            return Err(CompileError::duplicate_variable(name));
        }
        let val = ty
            .convert()
            .ok_or_else(|| CompileError::type_mismatch("Variable %v cannot have type 'void'.", name))?;

        let record = self.record_mut(id);
        record.variables.declare(&name.value, ty, is_const);
        let header = record.header.ok_or_else(|| CompileError::unsupported("Local outside of a function body", name))?;
        trace!(local = %name.value, "hoisting local");
        self.code
            .insert_after(header, format!("\t\t(local ${} {})", name.value, val));
        Ok(())
    }

    /// Declare the hidden address temporary once per function
    fn ensure_scratch(&mut self, at: &Token) -> CompileResult<()> {
        let id = self.require_function(at)?;
        let record = self.record_mut(id);
        if record.has_scratch {
            return Ok(());
        }
        record.has_scratch = true;
        if let Some(header) = record.header {
            self.code
                .insert_after(header, format!("\t\t(local {} i32)", SCRATCH));
        }
        Ok(())
    }

    /// Run `f` with `ctx` as the innermost block context
    fn with_context<T>(
        &mut self,
        ctx: BlockContext,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        self.contexts.push(ctx);
        let result = f(self);
        self.contexts.pop();
        result
    }

    // ============ Dispatch ============

    /// Compile a node and return the type of the value it produced
    pub fn compile(&mut self, node: &Node) -> CompileResult<Option<Type>> {
        match &node.kind {
            NodeKind::Null => Ok(None),
            NodeKind::Scope { body } => {
                for stmt in body {
                    self.compile_statement(stmt)?;
                }
                Ok(None)
            }
            NodeKind::Function(func) => {
                self.compile_function(node, func, None)?;
                Ok(None)
            }
            NodeKind::FunctionDef { params } => self.compile_declaration(node, params),
            NodeKind::Extern { signature } => self.compile_extern(signature),
            NodeKind::Class { body } => self.compile_class(node, body),
            NodeKind::Define { name, value } => self.compile_define(name, value),
            NodeKind::Include { path } => {
                warn!(path = %path.value(), "include is not supported, ignoring");
                Ok(None)
            }
            _ => {
                self.require_function(&node.token)?;
                self.compile_node(node, true)
            }
        }
    }

    /// Compile a statement, dropping any value it leaves behind
    fn compile_statement(&mut self, node: &Node) -> CompileResult<()> {
        if self.compile(node)?.is_some() {
            self.emit("drop");
        }
        Ok(())
    }

    /// Compile a node that needs an enclosing function
    fn compile_node(&mut self, node: &Node, with_access: bool) -> CompileResult<Option<Type>> {
        let ty = match &node.kind {
            NodeKind::Integer => {
                self.emit(format!("i32.const {}", node.value()));
                Some(Type::i32())
            }
            NodeKind::Double => {
                self.emit(format!("f64.const {}", node.value()));
                Some(Type::named("f64"))
            }
            NodeKind::Float => {
                self.emit(format!("f32.const {}", node.value()));
                Some(Type::named("f32"))
            }
            NodeKind::Boolean => {
                let bit = if node.value() == "true" { 1 } else { 0 };
                self.emit(format!("i32.const {}", bit));
                Some(Type::bool())
            }
            NodeKind::Char => {
                let code = node.value().chars().next().map_or(0, u32::from);
                self.emit(format!("i32.const {}", code));
                Some(Type::named("char"))
            }
            NodeKind::String => {
                let offset = self.strings.intern(node.value());
                self.emit(format!("i32.const {}", offset));
                Some(Type::named("str"))
            }
            NodeKind::Identifier => self.compile_identifier(node)?,
            NodeKind::Binary { left, op, right } => Some(self.compile_binary(left, op, right)?),
            NodeKind::Assign {
                left, op, right, ..
            } => self.compile_assign(left, op, right.as_deref())?,
            NodeKind::FunctionCall(call) => self.compile_call(node, call)?,
            NodeKind::Variable { is_const } => self.compile_variable(node, *is_const)?,
            NodeKind::Return { value } => self.compile_return(node, value.as_deref())?,
            NodeKind::If {
                condition,
                body,
                els,
            } => self.compile_if(node, condition, body, els.as_deref())?,
            NodeKind::WhileLoop { condition, body } => {
                self.compile_while(node, condition, body)?
            }
            NodeKind::ForLoop {
                init,
                condition,
                step,
                body,
            } => self.compile_for(node, init.as_deref(), condition, step.as_deref(), body)?,
            NodeKind::Break => self.compile_jump(node, true)?,
            NodeKind::Continue => self.compile_jump(node, false)?,
            NodeKind::Scope { body } => {
                self.compile_block(body)?;
                None
            }
            _ => {
                return Err(CompileError::unsupported(
                    "This declaration is only allowed at the top level",
                    &node.token,
                ))
            }
        };

        match &node.access {
            Some(access) if with_access => self.compile_chain(ty, access, None, &node.token),
            _ => Ok(ty),
        }
    }

    /// Compile an expression that must produce a value
    fn value_of(&mut self, node: &Node, at: &Token) -> CompileResult<Type> {
        self.compile(node)?
            .ok_or_else(|| CompileError::type_mismatch("Expression used with %v has no value.", at))
    }

    // ============ Expressions ============

    fn compile_identifier(&mut self, node: &Node) -> CompileResult<Option<Type>> {
        let id = self.require_function(&node.token)?;
        if let Some(var) = self.record(id).variables.get(node.value()) {
            let ty = var.ty.clone();
            self.emit(format!("local.get ${}", node.value()));
            return Ok(Some(ty));
        }
        if let Some(value) = self.defines.get(node.value()).cloned() {
            return self.compile_node(&value, false);
        }
        Err(CompileError::undefined_variable(&node.token))
    }

    fn compile_binary(&mut self, left: &Node, op: &Token, right: &Node) -> CompileResult<Type> {
        let lt = self.value_of(left, op)?;
        let rt = self.value_of(right, op)?;
        if lt != rt {
            return Err(CompileError::operand_mismatch(op, &lt, &rt));
        }
        let val = lt
            .convert()
            .ok_or_else(|| CompileError::type_mismatch("Operand of %v has no value.", op))?;
        let (instr, compares) = binary_instr(&op.value, val).ok_or_else(|| {
            CompileError::type_mismatch(&format!("Operator %v is not supported for '{}'.", lt), op)
        })?;
        self.emit(format!("{}.{}", val, instr));
        Ok(if compares { Type::bool() } else { lt })
    }

    /// Emit `1` in the storage category of `val`
    fn emit_one(&mut self, val: ValType) {
        self.emit(format!("{}.const 1", val));
    }

    /// Combine the value on the stack with the right side of a compound
    /// assignment, leaving the new value
    fn emit_update(
        &mut self,
        op: &Token,
        ty: &Type,
        right: Option<&Node>,
        target: &Token,
    ) -> CompileResult<()> {
        let val = ty
            .convert()
            .ok_or_else(|| CompileError::type_mismatch("Cannot update %v of type 'void'.", target))?;
        let arith = match op.value.as_str() {
            "++" => {
                self.emit_one(val);
                "+"
            }
            "--" => {
                self.emit_one(val);
                "-"
            }
            compound => {
                let right = right.ok_or_else(|| CompileError::unexpected_token("value", op))?;
                let rt = self.value_of(right, op)?;
                if &rt != ty {
                    return Err(CompileError::assign_mismatch(ty, &rt, target));
                }
                compound.trim_end_matches('=')
            }
        };
        let (instr, _) = binary_instr(arith, val).ok_or_else(|| {
            CompileError::type_mismatch(&format!("Operator %v is not supported for '{}'.", ty), op)
        })?;
        self.emit(format!("{}.{}", val, instr));
        Ok(())
    }

    fn compile_assign(
        &mut self,
        left: &Node,
        op: &Token,
        right: Option<&Node>,
    ) -> CompileResult<Option<Type>> {
        if let Some(access) = &left.access {
            let base = self.compile_node(left, false)?;
            let store = object::Store { op, right };
            return self.compile_chain(base, access, Some(store), &left.token);
        }

        match &left.kind {
            NodeKind::Variable { is_const } => {
                let name = &left.token;
                if op.value != "=" {
                    return Err(CompileError::unexpected_token("=", op));
                }
                let id = self.require_function(name)?;
                if self.record(id).variables.contains(&name.value) {
                    return Err(CompileError::duplicate_variable(name));
                }
                let ty = left.data_type.clone().unwrap_or_else(Type::i32);
                let right = right.ok_or_else(|| CompileError::unexpected_token("value", op))?;
                let rt = self.value_of(right, op)?;
                if rt != ty {
                    return Err(CompileError::assign_mismatch(&ty, &rt, name));
                }
                self.declare_local(name, ty, *is_const)?;
                self.emit(format!("local.set ${}", name.value));
            }
            NodeKind::Identifier => {
                let name = &left.token;
                let id = self.require_function(name)?;
                let var = self
                    .record(id)
                    .variables
                    .get(&name.value)
                    .cloned()
                    .ok_or_else(|| CompileError::undefined_variable(name))?;
                if var.is_const {
                    return Err(CompileError::constant_reassigned(name));
                }
                if op.value == "=" {
                    let right = right.ok_or_else(|| CompileError::unexpected_token("value", op))?;
                    let rt = self.value_of(right, op)?;
                    if rt != var.ty {
                        return Err(CompileError::assign_mismatch(&var.ty, &rt, name));
                    }
                } else {
                    self.emit(format!("local.get ${}", name.value));
                    self.emit_update(op, &var.ty, right, name)?;
                }
                self.emit(format!("local.set ${}", name.value));
            }
            _ => {
                return Err(CompileError::unsupported(
                    "Left side of an assignment must be a variable or member",
                    &left.token,
                ))
            }
        }
        Ok(None)
    }

    fn compile_variable(&mut self, node: &Node, is_const: bool) -> CompileResult<Option<Type>> {
        let ty = node.data_type.clone().unwrap_or_else(Type::i32);
        let words = if ty.is_fixed_array() {
            let words = ty
                .inline_words()
                .filter(|w| w.checked_mul(WORD_SIZE).is_some())
                .ok_or_else(|| CompileError::type_mismatch("Array %v is too large.", &node.token))?;
            Some(words)
        } else {
            None
        };
        self.declare_local(&node.token, ty, is_const)?;

        if let Some(words) = words {
            self.emit(format!("i32.const {}", words));
            self.emit(format!("call ${}", ALLOCATOR));
            self.emit(format!("local.set ${}", node.value()));
        }
        Ok(None)
    }

    fn compile_call(&mut self, node: &Node, call: &Call) -> CompileResult<Option<Type>> {
        if self.classes.contains(node.value()) {
            return self.compile_construct(node, call);
        }
        let id = self
            .functions
            .lookup(node.value())
            .ok_or_else(|| CompileError::unknown_function(&node.token))?;
        if call.is_new {
            return Err(CompileError::illegal_access("'new' needs a class name", &node.token));
        }
        self.compile_arguments(id, &call.args, &node.token)?;
        Ok(self.emit_call(id))
    }

    /// Emit the call instruction and return the type it leaves on the stack
    fn emit_call(&mut self, id: FunctionId) -> Option<Type> {
        let record = self.record_mut(id);
        if !record.returned {
            record.called_early = true;
        }
        let line = format!("call ${}", record.symbol);
        let ty = record.call_type();
        self.emit(line);
        ty
    }

    /// Push call arguments, checking them against the callee's parameters
    fn compile_arguments(&mut self, id: FunctionId, args: &[Node], at: &Token) -> CompileResult<()> {
        let params = self.record(id).params.clone();
        if params.len() != args.len() {
            return Err(CompileError::type_mismatch(
                &format!(
                    "Function %v expects {} argument(s) but got {}.",
                    params.len(),
                    args.len()
                ),
                at,
            ));
        }
        for (i, (arg, param)) in args.iter().zip(&params).enumerate() {
            let ty = self.value_of(arg, at)?;
            if &ty != param {
                return Err(CompileError::type_mismatch(
                    &format!(
                        "Argument {} of %v has type '{}' but '{}' was expected.",
                        i + 1,
                        ty,
                        param
                    ),
                    at,
                ));
            }
        }
        Ok(())
    }

    // ============ Functions ============

    fn function_table(&self, owner: Option<&str>) -> Option<&FunctionTable> {
        match owner {
            Some(class) => self.classes.get(class).map(|c| &c.methods),
            None => Some(&self.functions),
        }
    }

    /// Add or complete a function record; forward declarations may be
    /// completed once, anything else is a duplicate
    fn register_function(
        &mut self,
        owner: Option<&str>,
        record: FunctionRecord,
    ) -> CompileResult<FunctionId> {
        let name = record.token.value.clone();
        let existing = self.function_table(owner).and_then(|t| t.lookup(&name));

        if let Some(id) = existing {
            if !self.record(id).is_def || self.record(id).is_import || record.is_def {
                return Err(CompileError::duplicate_definition("Function", &record.token));
            }
            let mut record = record;
            record.called_early = self.record(id).called_early;
            self.records[id.0] = record;
            return Ok(id);
        }

        let id = FunctionId(self.records.len());
        self.records.push(record);
        match owner {
            Some(class) => {
                if let Some(class) = self.classes.get_mut(class) {
                    class.methods.bind(&name, id);
                }
            }
            None => self.functions.bind(&name, id),
        }
        Ok(id)
    }

    fn compile_function(
        &mut self,
        node: &Node,
        func: &Function,
        owner: Option<&str>,
    ) -> CompileResult<()> {
        if self.current.is_some() {
            return Err(CompileError::unsupported("Functions cannot be nested", &node.token));
        }
        let name = node.value();
        let declared = node.data_type.clone().unwrap_or_else(Type::void);
        let symbol = match owner {
            Some(class) => format!("{}.{}", class, name),
            None => name.to_string(),
        };
        let is_constructor = owner.is_some() && name == CONSTRUCTOR;
        let params = param_types(&func.params);

        let mut header = format!("(func ${}", symbol);
        if func.is_exported {
            header.push_str(&format!(" (export \"{}\")", symbol));
        }
        if owner.is_some() {
            header.push_str(" (param $this i32)");
        }
        for (tok, ty) in &params {
            let val = ty.convert().ok_or_else(|| {
                CompileError::type_mismatch("Parameter %v cannot have type 'void'.", tok)
            })?;
            header.push_str(&format!(" (param ${} {})", tok.value, val));
        }
        if is_constructor {
            header.push_str(" (result i32)");
        }

        let mut record = FunctionRecord::new(
            symbol.clone(),
            node.token.clone(),
            params.iter().map(|(_, ty)| ty.clone()).collect(),
            declared,
        );
        record.is_constructor = is_constructor;
        if let Some(class) = owner {
            record.variables.declare("this", Type::named(class), true);
        }
        for (tok, ty) in &params {
            if record.variables.contains(&tok.value) {
                return Err(CompileError::duplicate_variable(tok));
            }
            record.variables.declare(&tok.value, ty.clone(), false);
        }

        let id = self.register_function(owner, record)?;
        debug!(function = %symbol, "compiling function");

        self.depth = 1;
        let header = self.emit_marked(header);
        self.depth = 2;
        let leave = self.emit_marked(format!("(block {}", LEAVE_LABEL));
        self.depth = 3;
        {
            let record = self.record_mut(id);
            record.header = Some(header);
            record.leave = Some(leave);
        }

        self.current = Some(id);
        let body = func.body.iter().try_for_each(|stmt| self.compile_statement(stmt));
        self.current = None;
        body?;

        let record = self.record(id);
        if !record.returned && record.declared.convert().is_some() {
            if record.called_early {
                return Err(CompileError::type_mismatch(
                    "Function %v is used for a value but never returns one.",
                    &node.token,
                ));
            }
            // no return was compiled, so calls yield nothing
            let record = self.record_mut(id);
            record.returned = true;
            record.result = Some(Type::void());
        }

        let record = self.record(id);
        if record.result.as_ref().and_then(Type::convert).is_some() {
            self.emit("unreachable");
        }
        self.depth = 2;
        self.emit(")");
        if is_constructor {
            self.emit("local.get $this");
        }
        self.depth = 1;
        self.emit(")");
        self.depth = 0;
        Ok(())
    }

    /// `decl func`: register a signature to be defined later
    fn compile_declaration(&mut self, node: &Node, params: &[Node]) -> CompileResult<Option<Type>> {
        if self.current.is_some() {
            return Err(CompileError::unsupported(
                "Declarations must be at the top level",
                &node.token,
            ));
        }
        let types = param_types(params).into_iter().map(|(_, ty)| ty).collect();
        let declared = node.data_type.clone().unwrap_or_else(Type::void);
        let record = FunctionRecord::signature(node.value(), node.token.clone(), types, declared);
        self.register_function(None, record)?;
        Ok(None)
    }

    /// `extern func`: register the signature and import it from the host
    fn compile_extern(&mut self, signature: &Node) -> CompileResult<Option<Type>> {
        let NodeKind::FunctionDef { params } = &signature.kind else {
            return Err(CompileError::unexpected_token("func", &signature.token));
        };
        let name = signature.value();
        let declared = signature.data_type.clone().unwrap_or_else(Type::void);
        let params = param_types(params);

        let mut import = format!("(import \"{}\" \"{}\" (func ${}", IMPORT_MODULE, name, name);
        for (tok, ty) in &params {
            let val = ty.convert().ok_or_else(|| {
                CompileError::type_mismatch("Parameter %v cannot have type 'void'.", tok)
            })?;
            import.push_str(&format!(" (param {})", val));
        }
        if let Some(val) = declared.convert() {
            import.push_str(&format!(" (result {})", val));
        }
        import.push_str("))");

        let mut record = FunctionRecord::signature(
            name,
            signature.token.clone(),
            params.into_iter().map(|(_, ty)| ty).collect(),
            declared.clone(),
        );
        record.is_import = true;
        record.returned = true;
        record.result = Some(declared);
        self.register_function(None, record)?;
        self.imports.push(import);
        Ok(None)
    }

    fn compile_return(&mut self, node: &Node, value: Option<&Node>) -> CompileResult<Option<Type>> {
        let id = self.require_function(&node.token)?;

        if self.record(id).is_constructor {
            if value.is_some() {
                return Err(CompileError::type_mismatch(
                    "Constructors cannot return a value (at %v).",
                    &node.token,
                ));
            }
            self.emit(format!("br {}", LEAVE_LABEL));
            return Ok(None);
        }

        let ty = match value {
            Some(value) => self.compile(value)?.unwrap_or_else(Type::void),
            None => Type::void(),
        };

        let record = self.record(id);
        if !record.returned {
            if ty != record.declared {
                return Err(CompileError::return_mismatch(&ty, &record.declared, &node.token));
            }
            let (header, leave) = (record.header, record.leave);
            let record = self.record_mut(id);
            record.returned = true;
            record.result = Some(ty.clone());

            if let Some(val) = ty.convert() {
                for mark in [header, leave].into_iter().flatten() {
                    self.patch_result(mark, val);
                }
                self.patch_context(val);
            }
        } else if let Some(val) = record.result.as_ref().and_then(Type::convert) {
            self.patch_context(val);
        }

        self.emit(format!("br {}", LEAVE_LABEL));
        Ok(None)
    }

    /// Give the innermost open block the function's result type
    fn patch_context(&mut self, val: ValType) {
        if let Some(header) = self.contexts.last().map(|ctx| ctx.header) {
            self.patch_result(header, val);
        }
    }

    /// `define NAME literal`
    fn compile_define(&mut self, name: &Node, value: &Node) -> CompileResult<Option<Type>> {
        if !matches!(
            value.kind,
            NodeKind::Integer
                | NodeKind::Double
                | NodeKind::Float
                | NodeKind::Boolean
                | NodeKind::Char
                | NodeKind::String
        ) {
            return Err(CompileError::unsupported(
                "A define must name a literal value",
                &value.token,
            ));
        }
        if self.defines.contains_key(name.value()) {
            return Err(CompileError::duplicate_definition("Define", &name.token));
        }
        self.defines.insert(name.value().to_string(), value.clone());
        Ok(None)
    }
}

/// `(name, type)` of each parameter node
fn param_types(params: &[Node]) -> Vec<(Token, Type)> {
    params
        .iter()
        .map(|p| (p.token.clone(), p.data_type.clone().unwrap_or_else(Type::i32)))
        .collect()
}

/// Instruction suffix for a binary operator, and whether it compares
fn binary_instr(op: &str, val: ValType) -> Option<(&'static str, bool)> {
    let float = val.is_float();
    let pick = |int: &'static str, flt: &'static str| if float { flt } else { int };
    let instr = match op {
        "+" => ("add", false),
        "-" => ("sub", false),
        "*" => ("mul", false),
        "/" => (pick("div_s", "div"), false),
        "%" if !float => ("rem_s", false),
        "&&" if !float => ("and", false),
        "||" if !float => ("or", false),
        "==" => ("eq", true),
        "!=" => ("ne", true),
        "<" => (pick("lt_s", "lt"), true),
        ">" => (pick("gt_s", "gt"), true),
        "<=" => (pick("le_s", "le"), true),
        ">=" => (pick("ge_s", "ge"), true),
        _ => return None,
    };
    Some(instr)
}

/// Lex, parse and compile one source file
pub fn compile_source(file: &str, source: &str) -> CompileResult<String> {
    let root = crate::parser::parse_source(file, source)?;
    Compiler::new().compile_program(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    pub(super) fn compile_ok(source: &str) -> String {
        match compile_source("test.dime", source) {
            Ok(wat) => wat,
            Err(err) => panic!("compile error: {}\nsource:\n{}", err, source),
        }
    }

    pub(super) fn compile_err(source: &str) -> CompileError {
        compile_source("test.dime", source).expect_err("expected a compile error")
    }

    /// Trimmed lines of the output
    pub(super) fn lines(wat: &str) -> Vec<&str> {
        wat.lines().map(str::trim).collect()
    }

    /// Assert that `expected` appear in order as consecutive lines
    pub(super) fn assert_sequence(wat: &str, expected: &[&str]) {
        let lines = lines(wat);
        let found = lines
            .windows(expected.len())
            .any(|window| window == expected);
        assert!(found, "sequence {:?} not found in:\n{}", expected, wat);
    }

    /// Text of one function, from its header to the next function or the end
    pub(super) fn function_text<'a>(wat: &'a str, symbol: &str) -> &'a str {
        let header = format!("(func ${}", symbol);
        let start = wat
            .match_indices(&header)
            .map(|(i, _)| i)
            .find(|&i| matches!(wat[i + header.len()..].chars().next(), Some(' ' | '\n')))
            .unwrap_or_else(|| panic!("function {} not found in:\n{}", symbol, wat));
        let rest = &wat[start..];
        match rest[1..].find("(func $") {
            Some(end) => &rest[..end + 1],
            None => rest,
        }
    }

    fn index_of(wat: &str, needle: &str) -> usize {
        lines(wat)
            .iter()
            .position(|l| *l == needle)
            .unwrap_or_else(|| panic!("{:?} not found in:\n{}", needle, wat))
    }

    #[test]
    fn test_add_function() {
        let wat = compile_ok("func i32 add(a: i32, b: i32) { return a + b }");
        assert_sequence(
            &wat,
            &[
                "(func $add (param $a i32) (param $b i32) (result i32)",
                "(block $funcleave (result i32)",
                "local.get $a",
                "local.get $b",
                "i32.add",
                "br $funcleave",
                "unreachable",
                ")",
                ")",
            ],
        );
    }

    #[test]
    fn test_export() {
        let wat = compile_ok("export func i32 answer() { return 42 }");
        assert!(wat.contains("(func $answer (export \"answer\") (result i32)"));
    }

    #[test]
    fn test_void_function_has_no_result() {
        let wat = compile_ok("func noop() {\n}");
        assert_sequence(&wat, &["(func $noop", "(block $funcleave", ")", ")"]);
        assert!(!wat.contains("unreachable"));
    }

    #[test]
    fn test_assignment_type_mismatch_names_variable() {
        let err = compile_err("func main() {\n let x: i32 = 5\n x = \"hi\"\n}");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert!(err.message.contains("'x'"), "{}", err.message);
        assert_eq!(err.pos.line, 2);
    }

    #[test]
    fn test_reassignment() {
        let wat = compile_ok("func main() {\n let i32 x = 5\n x = 6\n}");
        assert_sequence(&wat, &["i32.const 6", "local.set $x"]);
    }

    #[test]
    fn test_string_offsets() {
        let wat = compile_ok("func main() {\n let str a = \"a\"\n let str b = \"bb\"\n}");
        assert!(wat.contains("(data (i32.const 0) \"a\\00\")"));
        assert!(wat.contains("(data (i32.const 2) \"bb\\00\")"));
        assert!(wat.contains("(global $memoryTop (mut i32) (i32.const 5))"));
        assert_sequence(&wat, &["i32.const 2", "local.set $b"]);
    }

    #[test]
    fn test_locals_are_hoisted() {
        let wat = compile_ok("func i32 f() {\n let i32 a = 1\n let i32 b = a\n return b\n}");
        let header = index_of(&wat, "(func $f (result i32)");
        let block = index_of(&wat, "(block $funcleave (result i32)");
        let a = index_of(&wat, "(local $a i32)");
        let b = index_of(&wat, "(local $b i32)");
        assert!(header < a && a < block);
        assert!(header < b && b < block);
        assert_sequence(
            &wat,
            &["i32.const 1", "local.set $a", "local.get $a", "local.set $b"],
        );
    }

    #[test]
    fn test_undefined_variable() {
        let err = compile_err("func main() {\n y += 1\n}");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        let err = compile_err("func i32 f() { return z }");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_variables_do_not_leak_between_functions() {
        let err = compile_err("func a() { let i32 x = 1 }\nfunc i32 b() { return x }");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_duplicate_variable() {
        let err = compile_err("func main() {\n let i32 x = 1\n let i32 x = 2\n}");
        assert_eq!(err.kind, ErrorKind::DuplicateDefinition);
        let err = compile_err("func f(a: i32) { let i32 a }");
        assert_eq!(err.kind, ErrorKind::DuplicateDefinition);
    }

    #[test]
    fn test_constant_reassigned() {
        let err = compile_err("func main() {\n const i32 x = 1\n x += 1\n}");
        assert_eq!(err.kind, ErrorKind::ConstantReassigned);
        let err = compile_err("func main() {\n const i32 x = 1\n x = 2\n}");
        assert_eq!(err.kind, ErrorKind::ConstantReassigned);
    }

    #[test]
    fn test_compound_assignment() {
        let wat = compile_ok("func main() {\n let i32 x = 1\n x += 2\n x++\n}");
        assert_sequence(
            &wat,
            &["local.get $x", "i32.const 2", "i32.add", "local.set $x"],
        );
        assert_sequence(
            &wat,
            &["local.get $x", "i32.const 1", "i32.add", "local.set $x"],
        );
    }

    #[test]
    fn test_compound_assignment_checks_type() {
        let err = compile_err("func main() {\n let i32 x = 1\n x += 2.5\n}");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_binary_operand_mismatch() {
        let err = compile_err("func f() { let i32 x = 1 + 1.5 }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert!(err.message.contains("'+'"));
    }

    #[test]
    fn test_float_arithmetic() {
        let wat = compile_ok("func f64 half(x: f64) { return x / 2.0 }");
        assert_sequence(&wat, &["local.get $x", "f64.const 2.0", "f64.div"]);
        assert!(wat.contains("(result f64)"));
    }

    #[test]
    fn test_comparison_yields_bool() {
        let wat = compile_ok("func bool less(a: i32, b: i32) { return a < b }");
        assert!(wat.contains("i32.lt_s"));
        let err = compile_err("func i32 f(a: i32) { return a < 1 }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_modulo_not_supported_for_floats() {
        let err = compile_err("func f64 f(a: f64) { return a % a }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_return_type_mismatch() {
        let err = compile_err("func i32 f() { return \"s\" }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = compile_err("func f() { return 1 }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_later_return_is_not_revalidated() {
        let wat = compile_ok(
            "func i32 f(a: i32) {\n if a > 0 {\n return 1\n }\n return 2.5\n}",
        );
        assert!(wat.contains("(func $f (param $a i32) (result i32)"));
        assert!(wat.contains("f64.const 2.5"));
    }

    #[test]
    fn test_return_patches_enclosing_if() {
        let wat = compile_ok("func i32 f(a: i32) {\n if a > 0 {\n return 1\n }\n return 0\n}");
        let f = function_text(&wat, "f");
        assert!(f.contains("(func $f (param $a i32) (result i32)"));
        assert!(f.contains("(block $funcleave (result i32)"));
        assert!(f.contains("if $if0 (result i32)"));
        assert_eq!(f.matches("(result i32)").count(), 3);
    }

    #[test]
    fn test_function_without_return_yields_no_value() {
        let wat = compile_ok("func i32 f() {}\nfunc g() {\n f()\n}");
        let f = function_text(&wat, "f");
        assert!(!f.contains("(result"));
        assert!(!f.contains("unreachable"));
        // no value is left behind, so nothing is dropped
        let g = function_text(&wat, "g");
        assert!(g.contains("call $f"));
        assert!(!g.contains("drop"));

        let err = compile_err("func i32 f() {}\nfunc i32 g() {\n let i32 x = f()\n return x\n}");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_value_used_before_function_fails_to_return() {
        let err = compile_err("func i32 f(n: i32) {\n let i32 x = f(n)\n}");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert!(err.message.contains("'f'"));

        let err = compile_err(
            "decl func i32 later()\nfunc i32 first() { return later() }\nfunc i32 later() {}",
        );
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_declared_function_must_be_defined() {
        let err = compile_err("decl func i32 later()\nfunc i32 f() { return later() }");
        assert_eq!(err.kind, ErrorKind::UnknownFunction);
        assert!(err.message.contains("'later'"));
        assert_eq!(err.pos.line, 0);
    }

    #[test]
    fn test_constant_index_out_of_range() {
        let err = compile_err("func i32 f() {\n let i32[4] xs\n return xs[1073741824]\n}");
        assert_eq!(err.kind, ErrorKind::IllegalAccess);
        let err = compile_err("func i32 f() {\n let i32[4] xs\n return xs[99999999999]\n}");
        assert_eq!(err.kind, ErrorKind::IllegalAccess);
    }

    #[test]
    fn test_array_too_large() {
        let err = compile_err("func f() {\n let f64[2147483648] xs\n}");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = compile_err("func f() {\n let i32[65536][65536] grid\n}");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_unknown_function() {
        let err = compile_err("func main() { missing() }");
        assert_eq!(err.kind, ErrorKind::UnknownFunction);
        assert!(err.message.contains("'missing'"));
    }

    #[test]
    fn test_call_statement_drops_value() {
        let wat = compile_ok("func i32 one() { return 1 }\nfunc main() {\n one()\n}");
        assert_sequence(&wat, &["call $one", "drop"]);
    }

    #[test]
    fn test_call_argument_checks() {
        let err = compile_err("func i32 id(a: i32) { return a }\nfunc main() { id(1, 2) }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = compile_err("func i32 id(a: i32) { return a }\nfunc main() { id(\"s\") }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_recursion() {
        let wat = compile_ok(
            "func i32 fact(n: i32) {\n if n < 2 { return 1 }\n return n * fact(n - 1)\n}",
        );
        assert_sequence(
            &wat,
            &["local.get $n", "i32.const 1", "i32.sub", "call $fact", "i32.mul"],
        );
    }

    #[test]
    fn test_forward_declaration() {
        let wat = compile_ok(
            "decl func i32 later()\nfunc i32 first() { return later() }\nfunc i32 later() { return 3 }",
        );
        assert!(wat.contains("call $later"));
        assert!(wat.contains("(func $later (result i32)"));
    }

    #[test]
    fn test_duplicate_function() {
        let err = compile_err("func f() {}\nfunc f() {}");
        assert_eq!(err.kind, ErrorKind::DuplicateDefinition);
    }

    #[test]
    fn test_extern_import() {
        let wat = compile_ok(
            "extern func void print(s: str)\nextern func i32 now()\nfunc main() {\n print(\"hi\")\n}",
        );
        assert!(wat.contains("(import \"std\" \"print\" (func $print (param i32)))"));
        assert!(wat.contains("(import \"std\" \"now\" (func $now (result i32)))"));
        let import = index_of(&wat, "(import \"std\" \"print\" (func $print (param i32)))");
        let memory = index_of(&wat, "(memory (export \"memory\") 1)");
        assert!(import < memory);
        assert_sequence(&wat, &["i32.const 0", "call $print"]);
    }

    #[test]
    fn test_global_statement_rejected() {
        let err = compile_err("let i32 x = 1");
        assert_eq!(err.kind, ErrorKind::Unsupported);
    }

    #[test]
    fn test_define() {
        let wat = compile_ok("define LIMIT 10\nfunc i32 f() { return LIMIT }");
        assert_sequence(&wat, &["i32.const 10", "br $funcleave"]);
        let err = compile_err("define A B");
        assert_eq!(err.kind, ErrorKind::Unsupported);
    }

    #[test]
    fn test_include_is_ignored() {
        let wat = compile_ok("include \"other\"\nfunc main() {}");
        assert!(wat.contains("(func $main"));
        assert!(!wat.contains("other"));
    }

    #[test]
    fn test_char_and_bool_literals() {
        let wat = compile_ok("func main() {\n let char c = 'A'\n let bool b = false\n}");
        assert_sequence(&wat, &["i32.const 65", "local.set $c"]);
        assert_sequence(&wat, &["i32.const 0", "local.set $b"]);
    }

    #[test]
    fn test_negative_literal() {
        let wat = compile_ok("func i32 f() { return -7 }");
        assert!(wat.contains("i32.const -7"));
    }
}
