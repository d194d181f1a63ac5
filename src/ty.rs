//! Nominal type descriptors
//!
//! A [`Type`] is what the source wrote: a base name plus an optional array or
//! generic suffix. Types are compared by their canonical rendering, so
//! `i32[4]` and `i32<4>` are different types while two separately parsed
//! `Map<str, i32>` are the same.
//!
//! [`ValType`] is the storage category a type lowers to in the emitted module.

use std::fmt;

/// Size in bytes of one heap slot
pub const WORD_SIZE: u32 = 4;

/// A source-level type
#[derive(Debug, Clone, Default)]
pub struct Type {
    pub base: String,
    pub sub_types: Vec<Type>,
    pub is_array: bool,
    pub is_generic: bool,
}

impl Type {
    pub fn named(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn i32() -> Self {
        Self::named("i32")
    }

    pub fn bool() -> Self {
        Self::named("bool")
    }

    pub fn void() -> Self {
        Self::named("void")
    }

    pub fn is_void(&self) -> bool {
        self.sub_types.is_empty() && self.base == "void"
    }

    pub fn add_sub_type(&mut self, sub: Type) {
        self.sub_types.push(sub);
    }

    /// Sizes of an array whose dimensions are all integer literals
    pub fn dims(&self) -> Option<Vec<u32>> {
        if !self.is_array || self.sub_types.is_empty() {
            return None;
        }
        self.sub_types
            .iter()
            .map(|size| {
                if size.sub_types.is_empty() {
                    size.base.parse().ok()
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn is_fixed_array(&self) -> bool {
        self.dims().is_some()
    }

    /// Type of one element when subscripting a value of this type. Indexing
    /// `T[N, M]` yields the row type `T[M]`.
    pub fn element(&self) -> Option<Type> {
        if !self.is_array {
            return None;
        }
        if self.sub_types.len() > 1 {
            return Some(Type {
                base: self.base.clone(),
                sub_types: self.sub_types[1..].to_vec(),
                is_array: true,
                is_generic: false,
            });
        }
        Some(Type::named(self.base.clone()))
    }

    /// Words a value of this type occupies when stored inline: every element
    /// for a fixed array, otherwise at least one word. `None` on overflow.
    pub fn inline_words(&self) -> Option<u32> {
        let scalar = Type::named(self.base.clone()).words().max(1);
        match self.dims() {
            Some(dims) => dims.into_iter().try_fold(scalar, |acc, n| acc.checked_mul(n)),
            None => Some(self.words().max(1)),
        }
    }

    /// Canonical string used for equality
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Storage category, or `None` for `void`
    pub fn convert(&self) -> Option<ValType> {
        if !self.sub_types.is_empty() {
            return Some(ValType::I32);
        }
        match self.base.as_str() {
            "void" => None,
            "i64" => Some(ValType::I64),
            "f32" => Some(ValType::F32),
            "f64" => Some(ValType::F64),
            _ => Some(ValType::I32),
        }
    }

    /// Number of heap words a value of this type occupies
    pub fn words(&self) -> u32 {
        match self.convert() {
            Some(val) => val.size() / WORD_SIZE,
            None => 0,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if self.sub_types.is_empty() {
            return Ok(());
        }
        let (open, close) = if self.is_array {
            ("[", "]")
        } else if self.is_generic {
            ("<", ">")
        } else {
            return Ok(());
        };
        write!(f, "{}", open)?;
        for (i, sub) in self.sub_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", sub)?;
        }
        write!(f, "{}", close)
    }
}

/// Storage category of a value in the emitted module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    /// Size in bytes
    pub fn size(&self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn array(base: &str, subs: &[&str]) -> Type {
        let mut ty = Type::named(base);
        ty.is_array = true;
        for sub in subs {
            ty.add_sub_type(Type::named(*sub));
        }
        ty
    }

    #[test]
    fn test_canonical_rendering() {
        assert_eq!(array("i32", &["5"]).canonical(), "i32[5]");
        assert_eq!(array("i32", &["3", "3"]).canonical(), "i32[3, 3]");

        let mut map = Type::named("Map");
        map.is_generic = true;
        map.add_sub_type(Type::named("str"));
        map.add_sub_type(array("i32", &["2"]));
        assert_eq!(map.canonical(), "Map<str, i32[2]>");
    }

    #[test]
    fn test_array_and_generic_differ() {
        let arr = array("List", &["i32"]);
        let mut gen = Type::named("List");
        gen.is_generic = true;
        gen.add_sub_type(Type::i32());
        assert_ne!(arr, gen);
    }

    #[test]
    fn test_convert() {
        assert_eq!(Type::i32().convert(), Some(ValType::I32));
        assert_eq!(Type::named("f32").convert(), Some(ValType::F32));
        assert_eq!(Type::named("f64").convert(), Some(ValType::F64));
        assert_eq!(Type::named("i64").convert(), Some(ValType::I64));
        assert_eq!(Type::named("str").convert(), Some(ValType::I32));
        assert_eq!(Type::named("bool").convert(), Some(ValType::I32));
        assert_eq!(Type::named("Point").convert(), Some(ValType::I32));
        assert_eq!(array("f64", &["2"]).convert(), Some(ValType::I32));
        assert_eq!(Type::void().convert(), None);
    }

    #[test]
    fn test_dims() {
        assert_eq!(array("i32", &["8"]).dims(), Some(vec![8]));
        assert_eq!(array("i32", &["3", "4"]).dims(), Some(vec![3, 4]));
        assert_eq!(array("i32", &["n"]).dims(), None);
        assert!(!Type::i32().is_fixed_array());
    }

    #[test]
    fn test_element_keeps_tail_dimensions() {
        let grid = array("i32", &["3", "4"]);
        let row = grid.element().unwrap();
        assert_eq!(row.canonical(), "i32[4]");
        assert_eq!(row.element().unwrap(), Type::i32());
        assert_eq!(Type::i32().element(), None);
    }

    #[test]
    fn test_inline_words() {
        assert_eq!(array("i32", &["3", "4"]).inline_words(), Some(12));
        assert_eq!(array("f64", &["3"]).inline_words(), Some(6));
        assert_eq!(Type::named("f64").inline_words(), Some(2));
        assert_eq!(Type::named("Point").inline_words(), Some(1));
        assert_eq!(array("f64", &["2147483648"]).inline_words(), None);
    }

    proptest! {
        #[test]
        fn equality_follows_rendering(base in "[a-z]{1,6}", sub in "[a-z0-9]{1,4}", arr in any::<bool>()) {
            let mut a = Type::named(base.clone());
            let mut b = Type::named(base);
            a.is_array = arr;
            a.is_generic = !arr;
            b.is_array = arr;
            b.is_generic = !arr;
            a.add_sub_type(Type::named(sub.clone()));
            b.add_sub_type(Type::named(sub));
            prop_assert_eq!(a.canonical(), b.canonical());
            prop_assert_eq!(a, b);
        }
    }
}
