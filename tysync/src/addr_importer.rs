//! Address importer: function and data symbols.
//!
//! Every registered address is visited once per run. Symbol renames go
//! through the symbol rules; argument renames go through the member rules.

use anyhow::{Context, Result};
use tracing::{debug, info, trace};

use crate::frontend::{DataVisitor, Frontend, FunctionVisitor};
use crate::model::{FunctionDef, NameAndType};
use crate::registry::AddrRegistry;
use crate::type_importer::{TypeImporter, reconcile};

/// Imports registered addresses for one run.
#[derive(Debug)]
pub struct AddrImporter<'r> {
    registry: &'r AddrRegistry,
    name_only: bool,
}

impl<'r> AddrImporter<'r> {
    pub fn new(registry: &'r AddrRegistry) -> Self {
        Self {
            registry,
            name_only: false,
        }
    }

    /// Import every data symbol, then every function, whose name contains
    /// `pattern`. With `name_only`, only symbol names are touched.
    pub fn run_import<F: Frontend>(
        &mut self,
        frontend: &mut F,
        types: &mut TypeImporter<'_>,
        name_only: bool,
        pattern: Option<&str>,
    ) -> Result<()> {
        self.name_only = name_only;
        let pattern = pattern.unwrap_or_default();
        let matches = |name: &str| pattern.is_empty() || name.contains(pattern);

        for (addr, def) in self.registry.data_symbols().filter(|(_, d)| matches(d.name.as_str())) {
            self.import_data(frontend, types, addr, def)
                .with_context(|| format!("importing data {addr:#x} `{}`", def.name))?;
        }
        for (addr, def) in self.registry.functions().filter(|(_, d)| matches(d.name.as_str())) {
            self.import_function(frontend, types, addr, def)
                .with_context(|| format!("importing function {addr:#x} `{}`", def.name))?;
        }
        Ok(())
    }

    fn import_data<F: Frontend>(
        &self,
        frontend: &mut F,
        types: &mut TypeImporter<'_>,
        addr: u64,
        def: &NameAndType,
    ) -> Result<()> {
        info!("importing data {addr:#x}: {}", def.name);
        if !def.name.is_empty() {
            set_name(frontend, addr, &def.name)?;
        }
        if self.name_only {
            return Ok(());
        }
        if let Some(expr) = &def.ty {
            let mut visitor = frontend.data_visitor(addr, &def.name)?;
            let ty = types.interpret(frontend, expr)?;
            visitor.visit_data_type(frontend, ty)?;
            visitor.finish(frontend)?;
        }
        Ok(())
    }

    fn import_function<F: Frontend>(
        &self,
        frontend: &mut F,
        types: &mut TypeImporter<'_>,
        addr: u64,
        def: &FunctionDef,
    ) -> Result<()> {
        info!("importing function {addr:#x}: {}", def.name);
        if !def.name.is_empty() {
            set_name(frontend, addr, &def.name)?;
        }
        if self.name_only {
            return Ok(());
        }

        let existing = frontend.existing_function(addr)?;
        let old_names = existing.as_ref().map(|e| e.arg_names.as_slice()).unwrap_or_default();
        let reuse_names = existing.is_some() && old_names.len() == def.args.len();
        if !reuse_names {
            debug!("not reusing argument names because the argument count changed");
        }

        let mut visitor = frontend.function_visitor(addr, &def.name)?;

        match (&def.ret, &existing) {
            (Some(expr), _) => {
                debug!("using new return type");
                let ty = types.interpret(frontend, expr)?;
                visitor.visit_rettype(frontend, ty)?;
            }
            (None, Some(old)) => {
                debug!("keeping existing return type");
                visitor.visit_old_rettype(frontend, &old.signature)?;
            }
            (None, None) => {
                debug!("using dummy return type");
                visitor.visit_dummy_rettype(frontend)?;
            }
        }

        for (i, arg) in def.args.iter().enumerate() {
            let old_name = if reuse_names { old_names.get(i).map(String::as_str) } else { None };
            let name = reconcile(frontend.member_rules(), "argument", &arg.name, old_name);

            match (&arg.ty, &existing) {
                (Some(expr), _) => {
                    let ty = types.interpret(frontend, expr)?;
                    visitor.visit_argument(frontend, &name, ty)?;
                }
                (None, Some(old)) if i < old.arg_names.len() => {
                    trace!("keeping existing type of argument {i}");
                    visitor.visit_old_argument(frontend, &name, i, &old.signature)?;
                }
                _ => {
                    trace!("using dummy type for argument {i}");
                    visitor.visit_dummy_argument(frontend, &name)?;
                }
            }
        }
        visitor.finish(frontend)
    }
}

/// Rename the symbol at `addr` unless the host's current name is preferred.
fn set_name<F: Frontend>(frontend: &mut F, addr: u64, name: &str) -> Result<()> {
    let existing = frontend.symbol_name(addr)?;
    match existing.as_deref() {
        Some(old) if old == name => Ok(()),
        Some(old) if !old.is_empty() && !frontend.symbol_rules().prefers_first(name, old) => {
            trace!("keep symbol name: {old}");
            Ok(())
        }
        old => {
            debug!("rename: {} -> {name}", old.unwrap_or("<none>"));
            frontend.set_symbol_name(addr, name)
        }
    }
}
