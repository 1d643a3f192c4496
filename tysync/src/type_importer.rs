//! Composite-type importer: structs, unions and enums.
//!
//! Each named type is imported at most once per run. A type is marked
//! [`ImportState::InProgress`] before its members are walked, so a pointer
//! back to a type still under construction resolves to the host's
//! placeholder instead of recursing.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info, info_span, trace};

use crate::error::ValidationError;
use crate::frontend::{EnumVisitor, Frontend, StructMember, StructVisitor, UnionVisitor};
use crate::heuristics::RuleSet;
use crate::model::{EnumDef, StructDef, TypeExpr, UnionDef};
use crate::registry::{NamedDef, TypeRegistry};
use crate::tyyaml;

/// Member name reserved for the vtable pointer.
pub const VTABLE_MEMBER: &str = "__vtable";

/// Per-run state of a named type. A name with no state has not been touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    /// Members are being walked; the host holds a placeholder.
    InProgress,
    Complete,
}

/// Imports named types for one run.
#[derive(Debug)]
pub struct TypeImporter<'r> {
    registry: &'r TypeRegistry,
    state: HashMap<String, ImportState>,
    skipping: bool,
}

impl<'r> TypeImporter<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            state: HashMap::new(),
            skipping: false,
        }
    }

    /// Turn every named import into a no-op; referenced types are assumed to
    /// exist in the host already.
    pub fn skip(&mut self) {
        self.skipping = true;
    }

    pub fn state(&self, name: &str) -> Option<ImportState> {
        self.state.get(name).copied()
    }

    /// Import every registered type whose name contains `pattern`: structs
    /// first, then enums, then unions.
    pub fn run_import<F: Frontend>(&mut self, frontend: &mut F, pattern: Option<&str>) -> Result<()> {
        let names = self.registry.names_matching(pattern);
        let total = names.len();
        for (i, name) in names.into_iter().enumerate() {
            info!("type {}/{total}", i + 1);
            self.import_named(frontend, name)?;
        }
        Ok(())
    }

    /// Interpret a Type-YAML expression, importing the named types it refers to.
    pub fn interpret<F: Frontend>(&mut self, frontend: &mut F, expr: &TypeExpr) -> Result<F::Type> {
        tyyaml::interpret(
            frontend,
            &mut |frontend: &mut F, name: &str| self.import_named(frontend, name),
            expr,
        )
    }

    /// Import `name` unless it was already imported (or is being imported)
    /// during this run.
    pub fn import_named<F: Frontend>(&mut self, frontend: &mut F, name: &str) -> Result<()> {
        if self.skipping || self.state.contains_key(name) {
            return Ok(());
        }
        let registry = self.registry;
        let Some(def) = registry.get(name) else {
            // A vtable struct is only ever imported through its owner.
            let owner = registry
                .vtable_owners()
                .find(|owner| frontend.vtable_struct_name(owner) == name);
            return match owner {
                Some(owner) => self.import_named(frontend, owner),
                None => Err(ValidationError::UnresolvedType(name.to_string()).into()),
            };
        };

        info!("importing {name}");
        self.state.insert(name.to_string(), ImportState::InProgress);
        let _span = info_span!("import", name).entered();
        match def {
            NamedDef::Struct(def) => self
                .import_struct(frontend, name, def)
                .with_context(|| format!("importing struct `{name}`"))?,
            NamedDef::Union(def) => self
                .import_union(frontend, name, def)
                .with_context(|| format!("importing union `{name}`"))?,
            NamedDef::Enum(def) => self
                .import_enum(frontend, name, def)
                .with_context(|| format!("importing enum `{name}`"))?,
        }
        self.state.insert(name.to_string(), ImportState::Complete);
        Ok(())
    }

    fn import_struct<F: Frontend>(&mut self, frontend: &mut F, name: &str, def: &StructDef) -> Result<()> {
        debug!("struct {name}");
        for m in &def.members {
            if m.offset >= def.size {
                return Err(ValidationError::MemberOutOfBounds {
                    member: m.name.clone(),
                    offset: m.offset,
                    size: def.size,
                }
                .into());
            }
        }
        let old_names = frontend.existing_struct_member_names(name)?;

        // Opening the visitor gives the host its placeholder, so vtable slots
        // may point back at the owner.
        let mut visitor = frontend.struct_visitor(name, def)?;

        let registry = self.registry;
        if let Some(vtable) = registry.vtable(name) {
            let vtable_name = frontend.vtable_struct_name(name);
            if !self.state.contains_key(&vtable_name) {
                info!("importing vtable for {name}");
                self.state.insert(vtable_name.clone(), ImportState::InProgress);
                self.import_struct(frontend, &vtable_name, vtable)
                    .with_context(|| format!("importing vtable `{vtable_name}`"))?;
                self.state.insert(vtable_name, ImportState::Complete);
            }
        }

        visitor.visit_alignment(frontend, def.align)?;
        for m in &def.members {
            let member_name = reconcile(
                frontend.member_rules(),
                "struct member",
                &m.name,
                old_names.get(&m.offset).map(String::as_str),
            );
            let ty = self.interpret(frontend, &m.ty)?;
            let member = StructMember {
                offset: m.offset,
                is_vtable: member_name == VTABLE_MEMBER,
                name: member_name,
                is_base: m.is_base,
                ty,
            };
            visitor.visit_member(frontend, member)?;
        }
        visitor.visit_size(frontend, def.size)?;
        visitor.finish(frontend)
    }

    fn import_union<F: Frontend>(&mut self, frontend: &mut F, name: &str, def: &UnionDef) -> Result<()> {
        debug!("union {name}");
        if let Some(m) = def.members.iter().find(|m| m.offset != 0) {
            return Err(ValidationError::UnionMemberOffset {
                member: m.name.clone(),
                offset: m.offset,
            }
            .into());
        }
        let old_names = frontend.existing_union_member_names(name)?;
        // Positional reuse only makes sense if the member count is unchanged.
        let reuse = old_names.len() == def.members.len();
        if !reuse {
            debug!("not reusing names because member count changed");
        }

        let mut visitor = frontend.union_visitor(name, def)?;
        visitor.visit_alignment(frontend, def.align)?;
        for (i, m) in def.members.iter().enumerate() {
            let old = if reuse { old_names.get(i).map(String::as_str) } else { None };
            let member_name = reconcile(frontend.member_rules(), "union member", &m.name, old);
            let ty = self.interpret(frontend, &m.ty)?;
            visitor.visit_member(frontend, &member_name, ty)?;
        }
        visitor.visit_size(frontend, def.size)?;
        visitor.finish(frontend)
    }

    fn import_enum<F: Frontend>(&mut self, frontend: &mut F, name: &str, new: &EnumDef) -> Result<()> {
        debug!("enum {name}");
        let old = frontend.existing_enum(name)?.unwrap_or_else(EnumDef::unknown);
        check_enum_size("new", new.size)?;
        check_enum_size("old", old.size)?;
        if *new == old {
            trace!("skipped (existing definition matches)");
            return Ok(());
        }

        let mut old_by_value = HashMap::new();
        for e in &old.enumerators {
            old_by_value.insert(e.value, e.name.as_str());
        }

        let mut visitor = frontend.enum_visitor(name, &old, new)?;
        visitor.visit_size(frontend, new.size)?;
        for e in &new.enumerators {
            let enumerator = reconcile(
                frontend.member_rules(),
                "enumerator",
                &e.name,
                old_by_value.get(&e.value).copied(),
            );
            visitor
                .visit_enumerator(frontend, &enumerator, e.value)
                .with_context(|| format!("adding enumerator `{enumerator}` = {}", e.value))?;
        }
        visitor.finish(frontend)
    }
}

fn check_enum_size(which: &'static str, size: u64) -> Result<()> {
    if (1..=8).contains(&size) {
        Ok(())
    } else {
        Err(ValidationError::EnumSize { which, size }.into())
    }
}

/// Pick between a new name and the one the host already uses at the same
/// position. The old name stays unless the rules prefer the new one.
pub(crate) fn reconcile(rules: &RuleSet, what: &str, new: &str, old: Option<&str>) -> String {
    match old {
        Some(old) if old != new && !rules.prefers_first(new, old) => {
            trace!("keep {what} name: {old}");
            old.to_string()
        }
        Some(old) if old != new => {
            trace!("rename {what}: {old} -> {new}");
            new.to_string()
        }
        Some(_) => new.to_string(),
        None => {
            trace!("add {what}: {new}");
            new.to_string()
        }
    }
}
