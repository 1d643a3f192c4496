//! Definition records: the bridge between the extraction step and the importers.
//!
//! These types are host-independent. They are built once by the caller (or
//! loaded from an import plan) and only ever read by the importers.

use std::fmt;

use serde::Deserialize;

/// A scalar base type of the Type-YAML grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Void,
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    I8,
    I16,
    I32,
    I64,
    I128,
    F32,
    F64,
    F128,
}

impl BaseType {
    /// Parse a base token (`u32`, `f64`, ...). Named types are not base types.
    pub fn from_token(token: &str) -> Option<Self> {
        let base = match token {
            "void" => Self::Void,
            "bool" => Self::Bool,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "u128" => Self::U128,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "i128" => Self::I128,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "f128" => Self::F128,
            _ => return None,
        };
        Some(base)
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::U128 => "u128",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::I128 => "i128",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::F128 => "f128",
        }
    }

    /// Size in bytes. `void` has none.
    pub fn size(self) -> Option<u64> {
        match self {
            Self::Void => None,
            Self::Bool | Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::U128 | Self::I128 | Self::F128 => Some(16),
        }
    }
}

/// One node of a Type-YAML expression.
///
/// The grammar is a flat list: a base token followed by suffix operators.
/// Operators that carry data (`[n]`, argument lists, the PTMF class name)
/// are nested lists, so the same shape deserializes straight from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TyNode {
    /// Base token or operator: `i32`, `"Foo"`, `*`, `()`, `(ptmf)`.
    Token(String),
    /// Integer; only meaningful as the single element of an array suffix.
    Int(u64),
    /// `[n]`, `["\"Class\""]`, or a list of argument expressions.
    List(Vec<TyNode>),
}

/// A Type-YAML expression, e.g. `["i32", "*"]` or `["void", "()", [["u8"]]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TypeExpr(pub Vec<TyNode>);

impl TypeExpr {
    pub fn base(base: BaseType) -> Self {
        Self(vec![TyNode::Token(base.token().to_string())])
    }

    /// A reference to another registered named type.
    pub fn named(name: &str) -> Self {
        Self(vec![TyNode::Token(quote(name))])
    }

    /// Pointer-to-member-function of `class`. The host represents it as the
    /// named type `<class>_ptmf`; the leading base token is ignored.
    pub fn ptmf(class: &str, args: Vec<TypeExpr>) -> Self {
        Self(vec![
            TyNode::Token(BaseType::Void.token().to_string()),
            TyNode::Token("(ptmf)".to_string()),
            TyNode::List(vec![TyNode::Token(quote(class))]),
            args_node(args),
        ])
    }

    pub fn ptr(mut self) -> Self {
        self.0.push(TyNode::Token("*".to_string()));
        self
    }

    pub fn array(mut self, len: u64) -> Self {
        self.0.push(TyNode::List(vec![TyNode::Int(len)]));
        self
    }

    /// Turn the expression built so far into the return type of a
    /// subroutine taking `args`.
    pub fn func(mut self, args: Vec<TypeExpr>) -> Self {
        self.0.push(TyNode::Token("()".to_string()));
        self.0.push(args_node(args));
        self
    }
}

fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

fn args_node(args: Vec<TypeExpr>) -> TyNode {
    TyNode::List(args.into_iter().map(|a| TyNode::List(a.0)).collect())
}

impl From<BaseType> for TypeExpr {
    fn from(base: BaseType) -> Self {
        Self::base(base)
    }
}

impl fmt::Display for TyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TyNode::Token(t) => write!(f, "{t}"),
            TyNode::Int(n) => write!(f, "{n}"),
            TyNode::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", TyNode::List(self.0.clone()))
    }
}

/// A struct or union member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberDef {
    pub name: String,
    /// Byte offset within the owning composite. Always 0 for unions.
    #[serde(default)]
    pub offset: u64,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    /// Member is a base-class subobject.
    #[serde(default)]
    pub is_base: bool,
}

impl MemberDef {
    pub fn new(name: &str, offset: u64, ty: impl Into<TypeExpr>) -> Self {
        Self {
            name: name.to_string(),
            offset,
            ty: ty.into(),
            is_base: false,
        }
    }

    /// Union member (offset 0).
    pub fn union(name: &str, ty: impl Into<TypeExpr>) -> Self {
        Self::new(name, 0, ty)
    }

    pub fn base_class(mut self) -> Self {
        self.is_base = true;
        self
    }
}

/// A struct layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub size: u64,
    pub align: u64,
    pub members: Vec<MemberDef>,
}

/// Width of one vtable slot.
pub const VTABLE_SLOT_SIZE: u64 = 8;

impl StructDef {
    pub fn new(size: u64, align: u64, members: Vec<MemberDef>) -> Self {
        Self {
            size,
            align,
            members,
        }
    }

    /// Synthesize the vtable struct for a class: one pointer-sized member per
    /// slot, in slot order.
    pub fn vtable(slots: &[VtableSlot]) -> Self {
        let members = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| MemberDef::new(&slot.name, i as u64 * VTABLE_SLOT_SIZE, slot.ty.clone()))
            .collect();
        Self {
            size: slots.len() as u64 * VTABLE_SLOT_SIZE,
            align: 1,
            members,
        }
    }
}

/// One virtual function slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VtableSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
}

impl VtableSlot {
    pub fn new(name: &str, ty: impl Into<TypeExpr>) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.into(),
        }
    }
}

/// A union layout. Every member sits at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionDef {
    pub size: u64,
    pub align: u64,
    pub members: Vec<MemberDef>,
}

impl UnionDef {
    pub fn new(size: u64, align: u64, members: Vec<MemberDef>) -> Self {
        Self {
            size,
            align,
            members,
        }
    }
}

/// A single enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

impl Enumerator {
    pub fn new(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// An enum definition. Equality is structural and order-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    /// Underlying size in bytes, 1..=8.
    pub size: u64,
    pub enumerators: Vec<Enumerator>,
}

impl EnumDef {
    pub fn new(size: u64, enumerators: Vec<Enumerator>) -> Self {
        Self { size, enumerators }
    }

    /// Stand-in used when the host has no enum of that name yet.
    pub fn unknown() -> Self {
        Self::new(1, vec![Enumerator::new("UNKNOWN", 0)])
    }
}

/// A name with an optional type. Used for function arguments and data symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NameAndType {
    /// May be empty.
    #[serde(default)]
    pub name: String,
    /// `None` means only the name is updated.
    #[serde(default, rename = "type")]
    pub ty: Option<TypeExpr>,
}

impl NameAndType {
    pub fn new(name: &str, ty: Option<TypeExpr>) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// A function at an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDef {
    /// May be empty.
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "return")]
    pub ret: Option<TypeExpr>,
    #[serde(default)]
    pub args: Vec<NameAndType>,
}

impl FunctionDef {
    pub fn new(name: &str, ret: Option<TypeExpr>, args: Vec<NameAndType>) -> Self {
        Self {
            name: name.to_string(),
            ret,
            args,
        }
    }
}
