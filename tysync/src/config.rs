//! Run options and import plans (`tysync.toml`).
//!
//! A plan is a TOML file with an optional `[options]` table and one array of
//! tables per definition kind. Type expressions are written as TOML arrays in
//! Type-YAML form:
//!
//! ```toml
//! [options]
//! upper = 0x7100
//!
//! [[struct]]
//! name = "Foo"
//! size = 8
//! align = 4
//! members = [
//!     { name = "x", offset = 0, type = ["i32"] },
//!     { name = "next", offset = 4, type = ["u8", [4]] },
//! ]
//!
//! [[function]]
//! address = 0x00102030
//! name = "_ZN3Foo6updateEv"
//! return = ["void"]
//! args = [{ name = "this", type = ["\"Foo\"", "*"] }]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{
    EnumDef, Enumerator, FunctionDef, MemberDef, NameAndType, StructDef, TypeExpr, UnionDef,
    VtableSlot,
};
use crate::registry::{AddrRegistry, TypeRegistry};

/// Options for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Only names containing this substring are imported.
    pub pattern: Option<String>,
    /// Skip the address importer.
    pub type_only: bool,
    /// Only rename symbols; leave function and data types alone.
    pub name_only: bool,
    /// Assume every referenced named type already exists in the host.
    pub skip_types: bool,
    /// Upper 32 bits of every address.
    pub upper: u32,
}

/// Root of an import plan.
#[derive(Debug, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub options: ImportOptions,
    #[serde(default, rename = "struct")]
    pub structs: Vec<PlanStruct>,
    #[serde(default, rename = "union")]
    pub unions: Vec<PlanUnion>,
    #[serde(default, rename = "enum")]
    pub enums: Vec<PlanEnum>,
    #[serde(default, rename = "function")]
    pub functions: Vec<PlanFunction>,
    #[serde(default)]
    pub data: Vec<PlanData>,
}

#[derive(Debug, Deserialize)]
pub struct PlanStruct {
    pub name: String,
    pub size: u64,
    #[serde(default = "default_align")]
    pub align: u64,
    #[serde(default)]
    pub members: Vec<MemberDef>,
    /// Virtual function slots. A non-empty list gives the struct a vtable.
    #[serde(default)]
    pub vtable: Vec<VtableSlot>,
}

#[derive(Debug, Deserialize)]
pub struct PlanUnion {
    pub name: String,
    pub size: u64,
    #[serde(default = "default_align")]
    pub align: u64,
    #[serde(default)]
    pub members: Vec<MemberDef>,
}

#[derive(Debug, Deserialize)]
pub struct PlanEnum {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub enumerators: Vec<Enumerator>,
}

#[derive(Debug, Deserialize)]
pub struct PlanFunction {
    /// Address as extracted; `options.upper` is applied on registration.
    pub address: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "return")]
    pub ret: Option<TypeExpr>,
    #[serde(default)]
    pub args: Vec<NameAndType>,
}

#[derive(Debug, Deserialize)]
pub struct PlanData {
    pub address: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeExpr>,
}

fn default_align() -> u64 {
    1
}

impl Plan {
    /// Register every definition of the plan. Registration order follows the
    /// order of the tables in the file.
    pub fn to_registries(&self) -> Result<(TypeRegistry, AddrRegistry)> {
        let mut types = TypeRegistry::new();
        for s in &self.structs {
            let def = StructDef::new(s.size, s.align, s.members.clone());
            let vtable = (!s.vtable.is_empty()).then_some(s.vtable.as_slice());
            types.add_struct(&s.name, def, vtable)?;
        }
        for u in &self.unions {
            types.add_union(&u.name, UnionDef::new(u.size, u.align, u.members.clone()))?;
        }
        for e in &self.enums {
            types.add_enum(&e.name, EnumDef::new(e.size, e.enumerators.clone()))?;
        }

        let mut addrs = AddrRegistry::new(self.options.upper);
        for f in &self.functions {
            let def = FunctionDef::new(&f.name, f.ret.clone(), f.args.clone());
            addrs.add_function(f.address, def)?;
        }
        for d in &self.data {
            addrs.add_data(d.address, NameAndType::new(&d.name, d.ty.clone()))?;
        }
        Ok((types, addrs))
    }
}

/// Parse an import plan from TOML text.
pub fn parse_plan(content: &str) -> Result<Plan> {
    toml::from_str(content).context("failed to parse import plan")
}

/// Load and parse an import plan file.
pub fn load_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read plan file {}: {}", path.display(), e))?;
    let plan: Plan = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse plan file {}: {}", path.display(), e))?;
    Ok(plan)
}
