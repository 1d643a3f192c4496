//! In-memory reference frontend.
//!
//! [`MemoryDatabase`] implements the whole capability interface over a plain
//! in-memory type database. It behaves like a real host where it matters to
//! the importers: struct and union imports start from a placeholder of the
//! declared size, layouts are checked against the declared size, and the
//! existing-state queries report what earlier runs committed.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, trace};

use crate::error::ValidationError;
use crate::frontend::{
    DataVisitor, EnumVisitor, ExistingFunction, Frontend, FunctionVisitor, StructMember,
    StructVisitor, UnionVisitor,
};
use crate::heuristics::RuleSet;
use crate::model::{BaseType, EnumDef, Enumerator, StructDef, UnionDef};
use crate::tyyaml::TypeBackend;

/// Name of the single member a placeholder struct carries.
pub const PLACEHOLDER_MEMBER: &str = "__placeholder";

/// A type handle of the in-memory database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemType {
    Base(BaseType),
    Pointer(Box<MemType>),
    Array(Box<MemType>, u64),
    Function(FuncType),
    /// Reference to a named type by name.
    Named(String),
}

/// A function type. Argument names are empty for anonymous subroutine types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    pub ret: Box<MemType>,
    pub args: Vec<FuncArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncArg {
    pub name: String,
    pub ty: MemType,
}

/// A laid-out struct or union member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutMember {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub ty: MemType,
    pub is_vtable: bool,
    pub is_base: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
    pub members: Vec<LayoutMember>,
}

/// State of a named type in the database. No slot means the type is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Forward declaration with known size and alignment but no layout.
    Placeholder { size: u64, align: u64 },
    Struct(Layout),
    Union(Layout),
    Enum(EnumDef),
}

impl Slot {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Slot::Placeholder { .. })
    }
}

/// An in-memory host type database.
#[derive(Debug)]
pub struct MemoryDatabase {
    types: BTreeMap<String, Slot>,
    symbols: BTreeMap<u64, String>,
    address_types: BTreeMap<u64, MemType>,
    member_rules: RuleSet,
    symbol_rules: RuleSet,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Empty database using the stock naming rules.
    pub fn new() -> Self {
        Self::with_rules(RuleSet::members(), RuleSet::symbols())
    }

    pub fn with_rules(member_rules: RuleSet, symbol_rules: RuleSet) -> Self {
        Self {
            types: BTreeMap::new(),
            symbols: BTreeMap::new(),
            address_types: BTreeMap::new(),
            member_rules,
            symbol_rules,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.types.get(name)
    }

    /// Seed or overwrite a named type directly, as a user editing the
    /// database would.
    pub fn insert_slot(&mut self, name: &str, slot: Slot) {
        self.types.insert(name.to_string(), slot);
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn symbol(&self, addr: u64) -> Option<&str> {
        self.symbols.get(&addr).map(String::as_str)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (u64, &str)> {
        self.symbols.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn address_type(&self, addr: u64) -> Option<&MemType> {
        self.address_types.get(&addr)
    }

    /// Seed the type at an address directly.
    pub fn set_address_type(&mut self, addr: u64, ty: MemType) {
        self.address_types.insert(addr, ty);
    }

    /// Size in bytes of a type as it would be embedded by value.
    pub fn size_of(&self, ty: &MemType) -> Result<u64> {
        match ty {
            MemType::Base(base) => base
                .size()
                .ok_or_else(|| anyhow!("`{}` has no size", base.token())),
            MemType::Pointer(_) => Ok(8),
            MemType::Array(element, len) => self
                .size_of(element)?
                .checked_mul(*len)
                .ok_or_else(|| anyhow!("size of `{element:?}[{len}]` overflows")),
            MemType::Function(_) => bail!("a subroutine type has no size"),
            MemType::Named(name) => match self.types.get(name) {
                Some(Slot::Placeholder { size, .. }) => Ok(*size),
                Some(Slot::Struct(layout) | Slot::Union(layout)) => Ok(layout.size),
                Some(Slot::Enum(def)) => Ok(def.size),
                None => bail!("type `{name}` does not exist"),
            },
        }
    }

    /// Named type embedded by value in `ty` (directly or as an array element)
    /// that has no layout yet.
    fn incomplete_embedded<'t>(&self, ty: &'t MemType) -> Option<&'t str> {
        match ty {
            MemType::Array(element, _) => self.incomplete_embedded(element),
            MemType::Named(name) => self
                .types
                .get(name)
                .is_some_and(Slot::is_placeholder)
                .then_some(name.as_str()),
            _ => None,
        }
    }

    /// Size of a member embedded by value. Types still under construction
    /// cannot be embedded.
    fn member_size(&self, member: &str, ty: &MemType) -> Result<u64> {
        if let Some(incomplete) = self.incomplete_embedded(ty) {
            return Err(ValidationError::IncompleteMember {
                member: member.to_string(),
                ty: incomplete.to_string(),
            }
            .into());
        }
        self.size_of(ty)
            .with_context(|| format!("failed to get size of member `{member}`"))
    }

    /// Make sure `name` is usable as a `size`/`align` type before its layout
    /// is known. An existing struct or union of matching shape is kept.
    fn ensure_placeholder(&mut self, name: &str, size: u64, align: u64) {
        match self.types.get(name) {
            Some(Slot::Struct(l) | Slot::Union(l)) if l.size == size && l.align == align => {
                debug!(name, size, align, "existing type");
            }
            Some(Slot::Placeholder { size: s, align: a }) if *s == size && *a == align => {}
            _ => {
                debug!(name, size, align, "creating placeholder type");
                self.types
                    .insert(name.to_string(), Slot::Placeholder { size, align });
            }
        }
    }
}

impl TypeBackend for MemoryDatabase {
    type Type = MemType;

    fn base(&mut self, base: BaseType) -> Result<MemType> {
        Ok(MemType::Base(base))
    }

    fn pointer(&mut self, pointee: MemType) -> Result<MemType> {
        Ok(MemType::Pointer(Box::new(pointee)))
    }

    fn array(&mut self, element: MemType, len: u64) -> Result<MemType> {
        Ok(MemType::Array(Box::new(element), len))
    }

    fn subroutine(&mut self, ret: MemType, args: Vec<MemType>) -> Result<MemType> {
        let args = args
            .into_iter()
            .map(|ty| FuncArg {
                name: String::new(),
                ty,
            })
            .collect();
        Ok(MemType::Function(FuncType {
            ret: Box::new(ret),
            args,
        }))
    }

    fn name(&mut self, ident: &str) -> Result<Option<String>> {
        // Names like `(anonymous namespace)::X` cannot be stored.
        Ok((!ident.starts_with('(')).then(|| ident.to_string()))
    }

    fn named(&mut self, name: &str) -> Result<MemType> {
        if !self.types.contains_key(name) {
            bail!("failed to get type by name: `{name}`");
        }
        Ok(MemType::Named(name.to_string()))
    }
}

impl Frontend for MemoryDatabase {
    type Signature = FuncType;
    type StructImport = StructImport;
    type UnionImport = UnionImport;
    type EnumImport = EnumImport;
    type FunctionImport = FunctionImport;
    type DataImport = DataImport;

    fn member_rules(&self) -> &RuleSet {
        &self.member_rules
    }

    fn symbol_rules(&self) -> &RuleSet {
        &self.symbol_rules
    }

    fn vtable_struct_name(&self, owner: &str) -> String {
        format!("{owner}_vtbl")
    }

    fn existing_enum(&mut self, name: &str) -> Result<Option<EnumDef>> {
        let Some(Slot::Enum(def)) = self.types.get(name) else {
            return Ok(None);
        };
        // Reported ordered by value, one name per value.
        let by_value: BTreeMap<i64, &str> = def
            .enumerators
            .iter()
            .map(|e| (e.value, e.name.as_str()))
            .collect();
        let enumerators = by_value
            .into_iter()
            .map(|(value, name)| Enumerator::new(name, value))
            .collect();
        Ok(Some(EnumDef::new(def.size, enumerators)))
    }

    fn existing_union_member_names(&mut self, name: &str) -> Result<Vec<String>> {
        Ok(match self.types.get(name) {
            Some(Slot::Union(layout)) => layout.members.iter().map(|m| m.name.clone()).collect(),
            _ => Vec::new(),
        })
    }

    fn existing_struct_member_names(&mut self, name: &str) -> Result<BTreeMap<u64, String>> {
        Ok(match self.types.get(name) {
            Some(Slot::Struct(layout)) => layout
                .members
                .iter()
                .map(|m| (m.offset, m.name.clone()))
                .collect(),
            Some(Slot::Placeholder { .. }) => {
                BTreeMap::from([(0, PLACEHOLDER_MEMBER.to_string())])
            }
            _ => BTreeMap::new(),
        })
    }

    fn existing_function(&mut self, addr: u64) -> Result<Option<ExistingFunction<FuncType>>> {
        Ok(match self.address_types.get(&addr) {
            Some(MemType::Function(func)) => Some(ExistingFunction {
                arg_names: func.args.iter().map(|a| a.name.clone()).collect(),
                signature: func.clone(),
            }),
            _ => None,
        })
    }

    fn symbol_name(&mut self, addr: u64) -> Result<Option<String>> {
        Ok(self.symbols.get(&addr).filter(|n| !n.is_empty()).cloned())
    }

    fn set_symbol_name(&mut self, addr: u64, name: &str) -> Result<()> {
        self.symbols.insert(addr, name.to_string());
        Ok(())
    }

    fn struct_visitor(&mut self, name: &str, def: &StructDef) -> Result<StructImport> {
        self.ensure_placeholder(name, def.size, def.align);
        Ok(StructImport {
            name: name.to_string(),
            layout: Layout {
                size: 0,
                align: 1,
                members: Vec::new(),
            },
            sized: false,
        })
    }

    fn union_visitor(&mut self, name: &str, def: &UnionDef) -> Result<UnionImport> {
        self.ensure_placeholder(name, def.size, def.align);
        Ok(UnionImport(StructImport {
            name: name.to_string(),
            layout: Layout {
                size: 0,
                align: 1,
                members: Vec::new(),
            },
            sized: false,
        }))
    }

    fn enum_visitor(&mut self, name: &str, _old: &EnumDef, _new: &EnumDef) -> Result<EnumImport> {
        Ok(EnumImport {
            name: name.to_string(),
            def: EnumDef::new(0, Vec::new()),
        })
    }

    fn function_visitor(&mut self, addr: u64, _name: &str) -> Result<FunctionImport> {
        Ok(FunctionImport {
            addr,
            ret: None,
            args: Vec::new(),
        })
    }

    fn data_visitor(&mut self, addr: u64, _name: &str) -> Result<DataImport> {
        Ok(DataImport { addr, ty: None })
    }
}

/// Builds a struct layout.
#[derive(Debug)]
pub struct StructImport {
    name: String,
    layout: Layout,
    sized: bool,
}

impl StructImport {
    fn push(&mut self, member: LayoutMember) -> Result<()> {
        if self.sized {
            bail!("member `{}` added to `{}` after its size was set", member.name, self.name);
        }
        self.layout.members.push(member);
        Ok(())
    }

    fn finish_into(self, db: &mut MemoryDatabase, wrap: fn(Layout) -> Slot) -> Result<()> {
        if !self.sized {
            bail!("`{}` finished before its size was set", self.name);
        }
        db.types.insert(self.name, wrap(self.layout));
        Ok(())
    }
}

impl StructVisitor<MemoryDatabase> for StructImport {
    fn visit_alignment(&mut self, _db: &mut MemoryDatabase, align: u64) -> Result<()> {
        if !align.is_power_of_two() {
            bail!("invalid alignment {align} for `{}`", self.name);
        }
        self.layout.align = align;
        Ok(())
    }

    fn visit_member(&mut self, db: &mut MemoryDatabase, member: StructMember<MemType>) -> Result<()> {
        let size = db.member_size(&member.name, &member.ty)?;
        if member.offset.checked_add(size).is_none() {
            return Err(ValidationError::SizeOverflow { member: member.name }.into());
        }
        self.push(LayoutMember {
            name: member.name,
            offset: member.offset,
            size,
            ty: member.ty,
            is_vtable: member.is_vtable,
            is_base: member.is_base,
        })
    }

    fn visit_size(&mut self, _db: &mut MemoryDatabase, size: u64) -> Result<()> {
        let extent = self
            .layout
            .members
            .iter()
            // Member ends were range-checked when they were added.
            .map(|m| m.offset + m.size)
            .max()
            .unwrap_or(0);
        if extent > size {
            return Err(ValidationError::SizeMismatch {
                name: self.name.clone(),
                actual: extent,
                expected: size,
            }
            .into());
        }
        if extent < size {
            trace!(name = %self.name, extent, size, "adding explicit tail padding");
            self.layout.members.push(LayoutMember {
                name: format!("__tail_{extent:x}"),
                offset: extent,
                size: size - extent,
                ty: MemType::Array(Box::new(MemType::Base(BaseType::U8)), size - extent),
                is_vtable: false,
                is_base: false,
            });
        }
        self.layout.size = size;
        self.sized = true;
        Ok(())
    }

    fn finish(self, db: &mut MemoryDatabase) -> Result<()> {
        self.finish_into(db, Slot::Struct)
    }
}

/// Builds a union layout.
#[derive(Debug)]
pub struct UnionImport(StructImport);

impl UnionVisitor<MemoryDatabase> for UnionImport {
    fn visit_alignment(&mut self, db: &mut MemoryDatabase, align: u64) -> Result<()> {
        StructVisitor::visit_alignment(&mut self.0, db, align)
    }

    fn visit_member(&mut self, db: &mut MemoryDatabase, name: &str, ty: MemType) -> Result<()> {
        let size = db.member_size(name, &ty)?;
        self.0.push(LayoutMember {
            name: name.to_string(),
            offset: 0,
            size,
            ty,
            is_vtable: false,
            is_base: false,
        })
    }

    fn visit_size(&mut self, _db: &mut MemoryDatabase, size: u64) -> Result<()> {
        let largest = self.0.layout.members.iter().map(|m| m.size).max().unwrap_or(0);
        if largest > size {
            return Err(ValidationError::SizeMismatch {
                name: self.0.name.clone(),
                actual: largest,
                expected: size,
            }
            .into());
        }
        self.0.layout.size = size;
        self.0.sized = true;
        Ok(())
    }

    fn finish(self, db: &mut MemoryDatabase) -> Result<()> {
        self.0.finish_into(db, Slot::Union)
    }
}

/// Builds an enum.
#[derive(Debug)]
pub struct EnumImport {
    name: String,
    def: EnumDef,
}

impl EnumVisitor<MemoryDatabase> for EnumImport {
    fn visit_size(&mut self, _db: &mut MemoryDatabase, size: u64) -> Result<()> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            bail!("enum size mismatch for `{}`: cannot store {size} bytes", self.name);
        }
        self.def.size = size;
        Ok(())
    }

    fn visit_enumerator(&mut self, _db: &mut MemoryDatabase, name: &str, value: i64) -> Result<()> {
        self.def.enumerators.push(Enumerator::new(name, value));
        Ok(())
    }

    fn finish(self, db: &mut MemoryDatabase) -> Result<()> {
        if self.def.size == 0 {
            bail!("enum `{}` finished before its size was set", self.name);
        }
        db.types.insert(self.name, Slot::Enum(self.def));
        Ok(())
    }
}

/// Builds the function type installed at an address.
#[derive(Debug)]
pub struct FunctionImport {
    addr: u64,
    ret: Option<MemType>,
    args: Vec<FuncArg>,
}

fn dummy_type() -> MemType {
    MemType::Base(BaseType::I64)
}

impl FunctionVisitor<MemoryDatabase> for FunctionImport {
    fn visit_rettype(&mut self, _db: &mut MemoryDatabase, ty: MemType) -> Result<()> {
        self.ret = Some(ty);
        Ok(())
    }

    fn visit_old_rettype(&mut self, _db: &mut MemoryDatabase, old: &FuncType) -> Result<()> {
        self.ret = Some(old.ret.as_ref().clone());
        Ok(())
    }

    fn visit_dummy_rettype(&mut self, _db: &mut MemoryDatabase) -> Result<()> {
        self.ret = Some(dummy_type());
        Ok(())
    }

    fn visit_argument(&mut self, _db: &mut MemoryDatabase, name: &str, ty: MemType) -> Result<()> {
        self.args.push(FuncArg {
            name: name.to_string(),
            ty,
        });
        Ok(())
    }

    fn visit_old_argument(
        &mut self,
        db: &mut MemoryDatabase,
        name: &str,
        index: usize,
        old: &FuncType,
    ) -> Result<()> {
        let Some(arg) = old.args.get(index) else {
            bail!("existing signature has no argument {index}");
        };
        self.visit_argument(db, name, arg.ty.clone())
    }

    fn visit_dummy_argument(&mut self, db: &mut MemoryDatabase, name: &str) -> Result<()> {
        self.visit_argument(db, name, dummy_type())
    }

    fn finish(self, db: &mut MemoryDatabase) -> Result<()> {
        let Some(ret) = self.ret else {
            bail!("function at {:#x} has no return type", self.addr);
        };
        let func = FuncType {
            ret: Box::new(ret),
            args: self.args,
        };
        db.address_types.insert(self.addr, MemType::Function(func));
        Ok(())
    }
}

/// Sets the type of a data symbol.
#[derive(Debug)]
pub struct DataImport {
    addr: u64,
    ty: Option<MemType>,
}

impl DataVisitor<MemoryDatabase> for DataImport {
    fn visit_data_type(&mut self, _db: &mut MemoryDatabase, ty: MemType) -> Result<()> {
        self.ty = Some(ty);
        Ok(())
    }

    fn finish(self, db: &mut MemoryDatabase) -> Result<()> {
        let Some(ty) = self.ty else {
            bail!("data at {:#x} has no type", self.addr);
        };
        db.address_types.insert(self.addr, ty);
        Ok(())
    }
}

/// Counts of what a database holds, by kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub structs: usize,
    pub unions: usize,
    pub enums: usize,
    pub placeholders: usize,
    pub symbols: usize,
    pub typed_addresses: usize,
}

impl MemoryDatabase {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            symbols: self.symbols.len(),
            typed_addresses: self.address_types.len(),
            ..Summary::default()
        };
        for slot in self.types.values() {
            match slot {
                Slot::Placeholder { .. } => summary.placeholders += 1,
                Slot::Struct(_) => summary.structs += 1,
                Slot::Union(_) => summary.unions += 1,
                Slot::Enum(_) => summary.enums += 1,
            }
        }
        summary
    }
}
