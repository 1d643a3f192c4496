//! Host capability interface.
//!
//! A [`Frontend`] binds the importers to one reverse-engineering host: it
//! supplies the naming rules, answers questions about what the host database
//! already holds, and hands out visitors that build or replace host types.
//!
//! Visitor calls always come in a fixed order:
//!
//! - struct / union: `alignment → member* → size → finish`
//! - enum: `size → enumerator* → finish`
//! - function: `(rettype | old_rettype | dummy_rettype) → (argument | old_argument | dummy_argument)* → finish`
//! - data: `data_type → finish`
//!
//! Visitors own their state and receive the frontend on every call, so a
//! member type can be interpreted (importing further types) while a visitor
//! is still open.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::heuristics::RuleSet;
use crate::model::{EnumDef, StructDef, UnionDef};
use crate::tyyaml::TypeBackend;

/// What the host already knows about a function.
#[derive(Debug, Clone)]
pub struct ExistingFunction<S> {
    pub arg_names: Vec<String>,
    /// Opaque host signature, handed back to the function visitor.
    pub signature: S,
}

/// A struct member as emitted to a [`StructVisitor`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember<T> {
    pub offset: u64,
    pub name: String,
    /// The member is the vtable pointer (`__vtable`).
    pub is_vtable: bool,
    pub is_base: bool,
    pub ty: T,
}

pub trait Frontend: TypeBackend {
    /// Opaque existing function signature.
    type Signature;
    type StructImport: StructVisitor<Self>;
    type UnionImport: UnionVisitor<Self>;
    type EnumImport: EnumVisitor<Self>;
    type FunctionImport: FunctionVisitor<Self>;
    type DataImport: DataVisitor<Self>;

    // ---------- naming ----------

    /// Rules for struct/union members, enumerators and function arguments.
    fn member_rules(&self) -> &RuleSet;

    /// Rules for function and data symbol names.
    fn symbol_rules(&self) -> &RuleSet;

    /// Name under which the vtable struct of class `owner` is stored.
    fn vtable_struct_name(&self, owner: &str) -> String;

    // ---------- existing state ----------

    fn existing_enum(&mut self, name: &str) -> Result<Option<EnumDef>>;

    /// Member names of an existing union in declaration order; empty if none.
    fn existing_union_member_names(&mut self, name: &str) -> Result<Vec<String>>;

    /// Byte offset → member name of an existing struct; empty if none.
    fn existing_struct_member_names(&mut self, name: &str) -> Result<BTreeMap<u64, String>>;

    fn existing_function(
        &mut self,
        addr: u64,
    ) -> Result<Option<ExistingFunction<Self::Signature>>>;

    fn symbol_name(&mut self, addr: u64) -> Result<Option<String>>;

    // ---------- mutation ----------

    fn set_symbol_name(&mut self, addr: u64, name: &str) -> Result<()>;

    /// Open a struct import. The named type must be usable (at least as a
    /// placeholder of `def.size`/`def.align`) once this returns.
    fn struct_visitor(&mut self, name: &str, def: &StructDef) -> Result<Self::StructImport>;

    /// Open a union import. Same placeholder contract as structs.
    fn union_visitor(&mut self, name: &str, def: &UnionDef) -> Result<Self::UnionImport>;

    fn enum_visitor(&mut self, name: &str, old: &EnumDef, new: &EnumDef)
    -> Result<Self::EnumImport>;

    fn function_visitor(&mut self, addr: u64, name: &str) -> Result<Self::FunctionImport>;

    fn data_visitor(&mut self, addr: u64, name: &str) -> Result<Self::DataImport>;
}

pub trait StructVisitor<F: Frontend + ?Sized> {
    fn visit_alignment(&mut self, frontend: &mut F, align: u64) -> Result<()>;

    fn visit_member(&mut self, frontend: &mut F, member: StructMember<F::Type>) -> Result<()>;

    /// Lay out the struct and check it against the declared size.
    fn visit_size(&mut self, frontend: &mut F, size: u64) -> Result<()>;

    fn finish(self, frontend: &mut F) -> Result<()>;
}

pub trait UnionVisitor<F: Frontend + ?Sized> {
    fn visit_alignment(&mut self, frontend: &mut F, align: u64) -> Result<()>;

    fn visit_member(&mut self, frontend: &mut F, name: &str, ty: F::Type) -> Result<()>;

    fn visit_size(&mut self, frontend: &mut F, size: u64) -> Result<()>;

    fn finish(self, frontend: &mut F) -> Result<()>;
}

pub trait EnumVisitor<F: Frontend + ?Sized> {
    fn visit_size(&mut self, frontend: &mut F, size: u64) -> Result<()>;

    fn visit_enumerator(&mut self, frontend: &mut F, name: &str, value: i64) -> Result<()>;

    fn finish(self, frontend: &mut F) -> Result<()>;
}

pub trait FunctionVisitor<F: Frontend + ?Sized> {
    fn visit_rettype(&mut self, frontend: &mut F, ty: F::Type) -> Result<()>;

    /// Keep the return type of the existing signature.
    fn visit_old_rettype(&mut self, frontend: &mut F, old: &F::Signature) -> Result<()>;

    /// Use a 64-bit signed integer as the return type.
    fn visit_dummy_rettype(&mut self, frontend: &mut F) -> Result<()>;

    fn visit_argument(&mut self, frontend: &mut F, name: &str, ty: F::Type) -> Result<()>;

    /// Argument `name` keeps the type of argument `index` of the existing signature.
    fn visit_old_argument(
        &mut self,
        frontend: &mut F,
        name: &str,
        index: usize,
        old: &F::Signature,
    ) -> Result<()>;

    /// Argument `name` typed as a 64-bit signed integer.
    fn visit_dummy_argument(&mut self, frontend: &mut F, name: &str) -> Result<()>;

    /// Build the function type from everything visited and install it.
    fn finish(self, frontend: &mut F) -> Result<()>;
}

pub trait DataVisitor<F: Frontend + ?Sized> {
    fn visit_data_type(&mut self, frontend: &mut F, ty: F::Type) -> Result<()>;

    fn finish(self, frontend: &mut F) -> Result<()>;
}
