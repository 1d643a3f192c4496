//! Definition registries: filled during the build phase, read during a run.
//!
//! Registration never touches the host database. Each name or address is
//! written once; registration order is kept because the importers walk
//! definitions in that order.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::model::{EnumDef, FunctionDef, NameAndType, StructDef, UnionDef, VtableSlot};

/// A registered named type. Structs, unions and enums share one name space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedDef {
    Struct(StructDef),
    Union(UnionDef),
    Enum(EnumDef),
}

impl NamedDef {
    pub fn kind(&self) -> &'static str {
        match self {
            NamedDef::Struct(_) => "struct",
            NamedDef::Union(_) => "union",
            NamedDef::Enum(_) => "enum",
        }
    }
}

/// Named type definitions, plus the vtable structs synthesized for classes.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, NamedDef>,
    structs: Vec<String>,
    enums: Vec<String>,
    unions: Vec<String>,
    /// Maps owner struct name → its vtable struct.
    vtables: HashMap<String, StructDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a struct, with its vtable slots if it has virtual functions.
    pub fn add_struct(
        &mut self,
        name: &str,
        def: StructDef,
        vtable: Option<&[VtableSlot]>,
    ) -> Result<()> {
        self.insert(name, NamedDef::Struct(def))?;
        self.structs.push(name.to_string());
        if let Some(slots) = vtable {
            self.vtables.insert(name.to_string(), StructDef::vtable(slots));
        }
        Ok(())
    }

    pub fn add_union(&mut self, name: &str, def: UnionDef) -> Result<()> {
        self.insert(name, NamedDef::Union(def))?;
        self.unions.push(name.to_string());
        Ok(())
    }

    pub fn add_enum(&mut self, name: &str, def: EnumDef) -> Result<()> {
        self.insert(name, NamedDef::Enum(def))?;
        self.enums.push(name.to_string());
        Ok(())
    }

    fn insert(&mut self, name: &str, def: NamedDef) -> Result<()> {
        if let Some(existing) = self.types.get(name) {
            bail!(
                "type `{name}` registered twice (already a {}, now a {})",
                existing.kind(),
                def.kind()
            );
        }
        self.types.insert(name.to_string(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&NamedDef> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Vtable struct of the class `owner`, if it has one.
    pub fn vtable(&self, owner: &str) -> Option<&StructDef> {
        self.vtables.get(owner)
    }

    /// Names of classes that carry a vtable, in no particular order.
    pub fn vtable_owners(&self) -> impl Iterator<Item = &str> {
        self.vtables.keys().map(String::as_str)
    }

    /// Structs, then enums, then unions whose name contains `pattern` (all
    /// of them if `pattern` is empty), each in registration order.
    pub fn names_matching(&self, pattern: Option<&str>) -> Vec<&str> {
        let pattern = pattern.unwrap_or_default();
        self.structs
            .iter()
            .chain(&self.enums)
            .chain(&self.unions)
            .filter(|name| pattern.is_empty() || name.contains(pattern))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Compose the canonical 64-bit address from an extracted 32-bit one.
pub fn compose_address(upper: u32, addr: u64) -> u64 {
    ((upper as u64) << 32) | (addr & 0xFFFF_FFFF)
}

/// Insertion-ordered address map.
#[derive(Debug)]
struct AddrMap<T> {
    entries: Vec<(u64, T)>,
    index: HashMap<u64, usize>,
}

impl<T> Default for AddrMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> AddrMap<T> {
    fn insert(&mut self, addr: u64, value: T) -> Result<()> {
        if self.index.contains_key(&addr) {
            bail!("address {addr:#018x} registered twice");
        }
        self.index.insert(addr, self.entries.len());
        self.entries.push((addr, value));
        Ok(())
    }

    fn get(&self, addr: u64) -> Option<&T> {
        self.index.get(&addr).map(|&i| &self.entries[i].1)
    }
}

/// Functions and data symbols keyed by canonical 64-bit address.
///
/// The two maps are independent; an address may appear in both.
#[derive(Debug, Default)]
pub struct AddrRegistry {
    upper: u32,
    functions: AddrMap<FunctionDef>,
    data: AddrMap<NameAndType>,
}

impl AddrRegistry {
    /// `upper` is applied to every address added afterwards.
    pub fn new(upper: u32) -> Self {
        Self {
            upper,
            ..Self::default()
        }
    }

    pub fn upper(&self) -> u32 {
        self.upper
    }

    pub fn canonical(&self, addr: u64) -> u64 {
        compose_address(self.upper, addr)
    }

    pub fn add_function(&mut self, addr: u64, def: FunctionDef) -> Result<()> {
        self.functions.insert(self.canonical(addr), def)
    }

    pub fn add_data(&mut self, addr: u64, def: NameAndType) -> Result<()> {
        self.data.insert(self.canonical(addr), def)
    }

    pub fn function(&self, addr: u64) -> Option<&FunctionDef> {
        self.functions.get(addr)
    }

    pub fn data(&self, addr: u64) -> Option<&NameAndType> {
        self.data.get(addr)
    }

    /// Registered functions in order, as `(canonical address, def)`.
    pub fn functions(&self) -> impl Iterator<Item = (u64, &FunctionDef)> {
        self.functions.entries.iter().map(|(a, d)| (*a, d))
    }

    /// Registered data symbols in order, as `(canonical address, def)`.
    pub fn data_symbols(&self) -> impl Iterator<Item = (u64, &NameAndType)> {
        self.data.entries.iter().map(|(a, d)| (*a, d))
    }

    pub fn len(&self) -> usize {
        self.functions.entries.len() + self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
