//! Classes, instances and member access chains
//!
//! An instance is a run of words on the bump heap. Properties take slots in
//! declaration order and a member access is `base + slot * WORD_SIZE`
//! followed by a load or store. Arrays use the same addressing with the
//! element size as stride.

use super::{Compiler, FunctionRecord, ALLOCATOR, CONSTRUCTOR, SCRATCH};
use crate::ast::{Call, Node, NodeKind};
use crate::error::{CompileError, CompileResult};
use crate::token::Token;
use crate::ty::{Type, ValType, WORD_SIZE};
use tracing::debug;

/// A write at the end of an access chain
#[derive(Clone, Copy)]
pub(super) struct Store<'a> {
    pub op: &'a Token,
    pub right: Option<&'a Node>,
}

/// Address of a member on the stack, with the member's type
struct Member {
    ty: Type,
    /// An array row stored in place rather than behind a pointer
    inline: bool,
}

impl Member {
    fn element(ty: Type) -> Self {
        let inline = ty.is_fixed_array();
        Self { ty, inline }
    }
}

impl Compiler {
    // ============ Declarations ============

    pub(super) fn compile_class(&mut self, node: &Node, body: &[Node]) -> CompileResult<Option<Type>> {
        if self.current.is_some() {
            return Err(CompileError::unsupported("Classes must be declared at the top level", &node.token));
        }
        let name = node.value().to_string();
        if self.classes.contains(&name) {
            return Err(CompileError::duplicate_definition("Class", &node.token));
        }
        self.classes.insert(super::ClassDef::new(name.clone()));

        for member in body {
            match &member.kind {
                NodeKind::Variable { .. } => self.add_property(&name, member)?,
                NodeKind::Function(_) => {}
                NodeKind::Assign { .. } => {
                    return Err(CompileError::unsupported(
                        "Properties cannot have initializers",
                        &member.token,
                    ))
                }
                _ => {
                    return Err(CompileError::unsupported(
                        "Only properties and methods may appear in a class",
                        &member.token,
                    ))
                }
            }
        }

        // Methods are registered before any body is compiled so they can call
        // each other regardless of order.
        for member in body {
            let NodeKind::Function(func) = &member.kind else {
                continue;
            };
            let params = func
                .params
                .iter()
                .map(|p| p.data_type.clone().unwrap_or_else(Type::i32))
                .collect();
            let declared = member.data_type.clone().unwrap_or_else(Type::void);
            let record = FunctionRecord::signature(
                format!("{}.{}", name, member.value()),
                member.token.clone(),
                params,
                declared,
            );
            let id = self.register_function(Some(&name), record)?;
            if member.value() == CONSTRUCTOR {
                if let Some(class) = self.classes.get_mut(&name) {
                    class.constructor = Some(id);
                }
            }
        }

        for member in body {
            if let NodeKind::Function(func) = &member.kind {
                self.compile_function(member, func, Some(&name))?;
            }
        }

        if let Some(class) = self.classes.get(&name) {
            debug!(class = %name, slots = class.slots, "compiled class");
        }
        Ok(None)
    }

    fn add_property(&mut self, class: &str, member: &Node) -> CompileResult<()> {
        let ty = member.data_type.clone().unwrap_or_else(Type::i32);
        if ty.is_void() {
            return Err(CompileError::type_mismatch("Property %v cannot have type 'void'.", &member.token));
        }
        let nested = !ty.is_array && self.classes.contains(&ty.base);
        let added = self
            .classes
            .get_mut(class)
            .map_or(false, |c| c.add_property(member.value(), ty, nested));
        if !added {
            return Err(CompileError::duplicate_definition("Property", &member.token));
        }
        Ok(())
    }

    // ============ Instances ============

    /// Allocate an instance and run its constructor
    pub(super) fn compile_construct(&mut self, node: &Node, call: &Call) -> CompileResult<Option<Type>> {
        let class = self
            .classes
            .get(node.value())
            .ok_or_else(|| CompileError::unknown_function(&node.token))?;
        let (slots, constructor) = (class.slots, class.constructor);

        self.emit(format!("i32.const {}", slots));
        self.emit(format!("call ${}", ALLOCATOR));

        match constructor {
            Some(id) => {
                self.compile_arguments(id, &call.args, &node.token)?;
                let line = format!("call ${}", self.record(id).symbol);
                self.emit(line);
            }
            None if !call.args.is_empty() => {
                return Err(CompileError::type_mismatch(
                    "Class %v has no constructor but was given arguments.",
                    &node.token,
                ))
            }
            None => {}
        }
        Ok(Some(Type::named(node.value())))
    }

    // ============ Access chains ============

    /// Walk `.member` / `[index]` suffixes starting from a value of type
    /// `base` already on the stack
    pub(super) fn compile_chain(
        &mut self,
        base: Option<Type>,
        access: &Node,
        store: Option<Store<'_>>,
        at: &Token,
    ) -> CompileResult<Option<Type>> {
        let mut ty = base.ok_or_else(|| CompileError::illegal_access("value has no members", at))?;
        let mut accessor = access;

        loop {
            if let NodeKind::Assign { left, op, right, .. } = &accessor.kind {
                let member = self.member_address(&ty, left)?;
                let store = Store {
                    op,
                    right: right.as_deref(),
                };
                self.emit_store(store, &member, &left.token)?;
                return Ok(None);
            }

            let result = match &accessor.kind {
                NodeKind::FunctionCall(call) => self.compile_method_call(&ty, accessor, call)?,
                _ => {
                    let member = self.member_address(&ty, accessor)?;
                    if let (Some(store), None) = (store, &accessor.access) {
                        self.emit_store(store, &member, &accessor.token)?;
                        return Ok(None);
                    }
                    if !member.inline {
                        let val = storage(&member.ty, &accessor.token)?;
                        self.emit(format!("{}.load", val));
                    }
                    Some(member.ty)
                }
            };

            match (&accessor.access, result) {
                (Some(next), Some(member)) => {
                    accessor = &**next;
                    ty = member;
                }
                (Some(_), None) => {
                    return Err(CompileError::illegal_access("call returns no value", &accessor.token))
                }
                (None, result) => {
                    if store.is_some() {
                        return Err(CompileError::unsupported(
                            "Cannot assign to a call result",
                            &accessor.token,
                        ));
                    }
                    return Ok(result);
                }
            }
        }
    }

    /// Turn the container address on the stack into the address of a member.
    /// Rows of a multi-dimensional array are stored inline, so their address
    /// is already their value and they must not be loaded.
    fn member_address(&mut self, container: &Type, accessor: &Node) -> CompileResult<Member> {
        if !accessor.is_subscript {
            return match accessor.kind {
                NodeKind::Identifier => self.property_address(container, &accessor.token),
                _ => Err(CompileError::illegal_access("expected a member name", &accessor.token)),
            };
        }

        match accessor.kind {
            NodeKind::String => self.property_address(container, &accessor.token),
            NodeKind::Integer => {
                let (elem, stride) = element_layout(container, &accessor.token)?;
                let offset = accessor
                    .value()
                    .parse::<u32>()
                    .ok()
                    .and_then(|index| index.checked_mul(stride))
                    .ok_or_else(|| {
                        CompileError::illegal_access("index is out of the addressable range", &accessor.token)
                    })?;
                self.emit(format!("i32.const {}", offset));
                self.emit("i32.add");
                Ok(Member::element(elem))
            }
            _ => {
                let (elem, stride) = element_layout(container, &accessor.token)?;
                let index = self
                    .compile_node(accessor, false)?
                    .ok_or_else(|| CompileError::illegal_access("index has no value", &accessor.token))?;
                if index.convert() != Some(ValType::I32) {
                    return Err(CompileError::illegal_access(
                        "index must be a word sized value",
                        &accessor.token,
                    ));
                }
                self.emit(format!("i32.const {}", stride));
                self.emit("i32.mul");
                self.emit("i32.add");
                Ok(Member::element(elem))
            }
        }
    }

    fn property_address(&mut self, container: &Type, name: &Token) -> CompileResult<Member> {
        let class = (!container.is_array)
            .then(|| self.classes.get(&container.base))
            .flatten()
            .ok_or_else(|| {
                CompileError::illegal_access(&format!("'{}' has no properties", container), name)
            })?;
        let prop = class.property(&name.value).ok_or_else(|| {
            CompileError::illegal_access(&format!("class '{}' has no such property", class.name), name)
        })?;
        let (offset, ty) = (prop.offset(), prop.ty());
        self.emit(format!("i32.const {}", offset));
        self.emit("i32.add");
        Ok(Member { ty, inline: false })
    }

    /// Store into the member whose address is on the stack
    fn emit_store(&mut self, store: Store<'_>, member: &Member, target: &Token) -> CompileResult<()> {
        if member.inline {
            return Err(CompileError::illegal_access("cannot assign to a whole array row", target));
        }
        let member = &member.ty;
        let val = storage(member, target)?;
        if store.op.value == "=" {
            let right = store
                .right
                .ok_or_else(|| CompileError::unexpected_token("value", store.op))?;
            let ty = self.value_of(right, store.op)?;
            if &ty != member {
                return Err(CompileError::assign_mismatch(member, &ty, target));
            }
        } else {
            self.ensure_scratch(target)?;
            self.emit(format!("local.tee {}", SCRATCH));
            self.emit(format!("local.get {}", SCRATCH));
            self.emit(format!("{}.load", val));
            self.emit_update(store.op, member, store.right, target)?;
        }
        self.emit(format!("{}.store", val));
        Ok(())
    }

    /// Call a method; the instance is already on the stack as `this`
    fn compile_method_call(
        &mut self,
        instance: &Type,
        accessor: &Node,
        call: &Call,
    ) -> CompileResult<Option<Type>> {
        let class = self.classes.get(&instance.base).filter(|_| !instance.is_array).ok_or_else(|| {
            CompileError::illegal_access(&format!("'{}' has no methods", instance), &accessor.token)
        })?;
        let id = class
            .methods
            .lookup(accessor.value())
            .ok_or_else(|| CompileError::unknown_function(&accessor.token))?;
        if self.record(id).is_constructor {
            return Err(CompileError::illegal_access(
                "constructors are only called through 'new'",
                &accessor.token,
            ));
        }

        self.compile_arguments(id, &call.args, &accessor.token)?;
        Ok(self.emit_call(id))
    }
}

fn storage(ty: &Type, at: &Token) -> CompileResult<ValType> {
    ty.convert()
        .ok_or_else(|| CompileError::illegal_access("member has no storage", at))
}

/// Element type of an array and the byte distance between elements
fn element_layout(container: &Type, at: &Token) -> CompileResult<(Type, u32)> {
    let elem = container.element().ok_or_else(|| {
        CompileError::illegal_access(&format!("'{}' is not an array", container), at)
    })?;
    let stride = elem
        .inline_words()
        .and_then(|words| words.checked_mul(WORD_SIZE))
        .ok_or_else(|| CompileError::illegal_access("array element is too large", at))?;
    Ok((elem, stride))
}
