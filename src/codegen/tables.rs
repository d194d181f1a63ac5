//! Symbol tables used while generating code
//!
//! None of these outlive a single [`Compiler`](super::Compiler) run.

use super::buffer::Mark;
use crate::token::Token;
use crate::ty::{Type, WORD_SIZE};
use std::collections::HashMap;

// ============ Strings ============

/// Interned string literals, laid out back to back from address 0
#[derive(Debug, Default)]
pub struct StringTable {
    entries: Vec<(u32, Vec<u8>)>,
    size: u32,
}

impl StringTable {
    /// Store a NUL-terminated copy of a literal and return its address.
    /// Equal literals are stored again.
    pub fn intern(&mut self, literal: &str) -> u32 {
        let bytes = decode_escapes(literal);
        let offset = self.size;
        self.size += bytes.len() as u32 + 1;
        self.entries.push((offset, bytes));
        offset
    }

    /// First byte past all string data
    pub fn size(&self) -> u32 {
        self.size
    }

    /// `(offset, bytes)` for every literal, without the terminator
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.entries.iter().map(|(off, bytes)| (*off, bytes.as_slice()))
    }
}

/// Bytes of a literal as written between quotes; `\n` is the only escape
pub fn decode_escapes(literal: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'n') {
            chars.next();
            out.push(b'\n');
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

// ============ Variables ============

#[derive(Debug, Clone)]
pub struct Variable {
    pub index: u32,
    pub ty: Type,
    pub is_const: bool,
}

/// Locals of one function, parameters first
#[derive(Debug, Default)]
pub struct VariableTable {
    vars: HashMap<String, Variable>,
    next: u32,
}

impl VariableTable {
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Add a variable and return its ordinal
    pub fn declare(&mut self, name: &str, ty: Type, is_const: bool) -> u32 {
        let index = self.next;
        self.next += 1;
        self.vars.insert(
            name.to_string(),
            Variable {
                index,
                ty,
                is_const,
            },
        );
        index
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ============ Functions ============

/// Index of a record in the compiler's function list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

/// Everything known about one function
#[derive(Debug)]
pub struct FunctionRecord {
    /// Emitted name, `name` or `Class.name`
    pub symbol: String,
    pub token: Token,
    pub params: Vec<Type>,
    /// Return type as written
    pub declared: Type,
    /// Only a signature has been seen so far
    pub is_def: bool,
    pub is_import: bool,
    pub is_constructor: bool,
    /// The `(func ...` line
    pub header: Option<Mark>,
    /// The `(block $funcleave` line
    pub leave: Option<Mark>,
    /// Set by the first `return`
    pub returned: bool,
    pub result: Option<Type>,
    /// A call relied on `declared` before the first `return` was seen
    pub called_early: bool,
    blocks: u32,
    pub variables: VariableTable,
    pub has_scratch: bool,
}

impl FunctionRecord {
    pub fn new(symbol: impl Into<String>, token: Token, params: Vec<Type>, declared: Type) -> Self {
        Self {
            symbol: symbol.into(),
            token,
            params,
            declared,
            is_def: false,
            is_import: false,
            is_constructor: false,
            header: None,
            leave: None,
            returned: false,
            result: None,
            called_early: false,
            blocks: 0,
            variables: VariableTable::default(),
            has_scratch: false,
        }
    }

    /// Signature-only record
    pub fn signature(symbol: impl Into<String>, token: Token, params: Vec<Type>, declared: Type) -> Self {
        Self {
            is_def: true,
            ..Self::new(symbol, token, params, declared)
        }
    }

    /// Fresh label number for a structured block in this function
    pub fn next_block(&mut self) -> u32 {
        let n = self.blocks;
        self.blocks += 1;
        n
    }

    /// Type of the value a call leaves on the stack
    pub fn call_type(&self) -> Option<Type> {
        let ty = if self.returned {
            self.result.clone()?
        } else {
            self.declared.clone()
        };
        ty.convert().map(|_| ty)
    }
}

/// Name to function mapping; one global table and one per class
#[derive(Debug, Default)]
pub struct FunctionTable {
    names: HashMap<String, FunctionId>,
}

impl FunctionTable {
    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.names.get(name).copied()
    }

    pub fn bind(&mut self, name: &str, id: FunctionId) {
        self.names.insert(name.to_string(), id);
    }
}

// ============ Classes ============

/// A class member slot
#[derive(Debug, Clone)]
pub enum Property {
    Slot(Variable),
    /// Property holding an instance of another known class
    Nested { class: String, index: u32 },
}

impl Property {
    pub fn index(&self) -> u32 {
        match self {
            Property::Slot(var) => var.index,
            Property::Nested { index, .. } => *index,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Property::Slot(var) => var.ty.clone(),
            Property::Nested { class, .. } => Type::named(class.clone()),
        }
    }

    /// Byte offset from the instance base
    pub fn offset(&self) -> u32 {
        self.index() * WORD_SIZE
    }
}

#[derive(Debug)]
pub struct ClassDef {
    pub name: String,
    properties: HashMap<String, Property>,
    /// Words per instance
    pub slots: u32,
    pub methods: FunctionTable,
    pub constructor: Option<FunctionId>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            slots: 0,
            methods: FunctionTable::default(),
            constructor: None,
        }
    }

    /// Add a property in the next free slot; `false` if the name is taken
    pub fn add_property(&mut self, name: &str, ty: Type, nested: bool) -> bool {
        if self.properties.contains_key(name) {
            return false;
        }
        let index = self.slots;
        self.slots += ty.words().max(1);
        let prop = if nested {
            Property::Nested {
                class: ty.base.clone(),
                index,
            }
        } else {
            Property::Slot(Variable {
                index,
                ty,
                is_const: false,
            })
        };
        self.properties.insert(name.to_string(), prop);
        true
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }
}

#[derive(Debug, Default)]
pub struct ClassTable {
    classes: HashMap<String, ClassDef>,
}

impl ClassTable {
    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassDef> {
        self.classes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn insert(&mut self, class: ClassDef) {
        self.classes.insert(class.name.clone(), class);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_string_offsets() {
        let mut strings = StringTable::default();
        assert_eq!(strings.intern("a"), 0);
        assert_eq!(strings.intern("bb"), 2);
        assert_eq!(strings.size(), 5);
    }

    #[test]
    fn test_strings_not_deduplicated() {
        let mut strings = StringTable::default();
        let first = strings.intern("same");
        let second = strings.intern("same");
        assert_ne!(first, second);
        assert_eq!(strings.iter().count(), 2);
    }

    #[test]
    fn test_newline_escape_is_one_byte() {
        assert_eq!(decode_escapes("a\\nb"), b"a\nb");
        assert_eq!(decode_escapes("c:\\path"), b"c:\\path");
        let mut strings = StringTable::default();
        strings.intern("\\n");
        assert_eq!(strings.size(), 2);
    }

    #[test]
    fn test_variable_ordinals() {
        let mut vars = VariableTable::default();
        assert_eq!(vars.declare("a", Type::i32(), false), 0);
        assert_eq!(vars.declare("b", Type::i32(), true), 1);
        assert!(vars.get("b").unwrap().is_const);
        assert!(!vars.contains("c"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_property_layout() {
        let mut class = ClassDef::new("Point");
        assert!(class.add_property("x", Type::i32(), false));
        assert!(class.add_property("y", Type::named("f32"), false));
        assert!(class.add_property("next", Type::named("Point"), true));
        assert!(!class.add_property("x", Type::i32(), false));

        assert_eq!(class.property("x").unwrap().offset(), 0);
        assert_eq!(class.property("y").unwrap().offset(), 4);
        assert_eq!(class.property("next").unwrap().offset(), 8);
        assert_eq!(class.property("next").unwrap().ty().canonical(), "Point");
        assert_eq!(class.slots, 3);
    }

    #[test]
    fn test_wide_property_takes_two_words() {
        let mut class = ClassDef::new("Pair");
        class.add_property("a", Type::named("f64"), false);
        class.add_property("b", Type::i32(), false);
        assert_eq!(class.property("b").unwrap().offset(), 8);
        assert_eq!(class.slots, 3);
    }

    #[test]
    fn test_call_type() {
        let tok = Token::default();
        let mut rec = FunctionRecord::new("f", tok.clone(), vec![], Type::i32());
        assert_eq!(rec.call_type(), Some(Type::i32()));
        rec.returned = true;
        rec.result = Some(Type::void());
        assert_eq!(rec.call_type(), None);

        let rec = FunctionRecord::signature("g", tok, vec![], Type::void());
        assert!(rec.is_def);
        assert_eq!(rec.call_type(), None);
    }

    #[test]
    fn test_block_counter() {
        let mut rec = FunctionRecord::new("f", Token::default(), vec![], Type::void());
        assert_eq!(rec.next_block(), 0);
        assert_eq!(rec.next_block(), 1);
    }

    proptest! {
        #[test]
        fn offsets_are_cumulative(words in proptest::collection::vec("[a-z ]{0,8}", 1..10)) {
            let mut strings = StringTable::default();
            let mut expected = 0u32;
            for word in &words {
                prop_assert_eq!(strings.intern(word), expected);
                expected += word.len() as u32 + 1;
            }
            prop_assert_eq!(strings.size(), expected);
        }
    }
}
