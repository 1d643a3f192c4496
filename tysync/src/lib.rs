//! tysync: push extracted C/C++ type definitions into a reverse-engineering
//! database.
//!
//! Definitions (structs, unions, enums, function signatures, data symbols)
//! are registered up front, then imported in one run through a host
//! [`Frontend`]. Imports are idempotent: running the same registries again
//! leaves the host unchanged, and names the user has improved by hand are
//! kept according to the frontend's naming rules.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! let plan = tysync::config::load_plan(Path::new("tysync.toml")).unwrap();
//! let db = tysync::run_plan(&plan, 1).unwrap();
//! println!("{:?}", db.summary());
//! ```
//!
//! Or drive the importers against your own frontend:
//!
//! ```no_run
//! use tysync::{ImportOptions, MemoryDatabase, TypeRegistry, AddrRegistry};
//!
//! let types = TypeRegistry::new();
//! let addrs = AddrRegistry::new(0x7100);
//! let mut db = MemoryDatabase::new();
//! tysync::run_import(&mut db, &types, &addrs, &ImportOptions::default()).unwrap();
//! ```

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info};

pub mod addr_importer;
pub mod config;
pub mod error;
pub mod frontend;
pub mod heuristics;
pub mod memory;
pub mod model;
pub mod registry;
pub mod type_importer;
pub mod tyyaml;

pub use addr_importer::AddrImporter;
pub use config::{ImportOptions, Plan};
pub use error::{ValidationError, find_validation};
pub use frontend::Frontend;
pub use memory::MemoryDatabase;
pub use registry::{AddrRegistry, TypeRegistry};
pub use type_importer::TypeImporter;

/// One import run with fresh per-run state: named types first (unless
/// `skip_types`), then addresses (unless `type_only`).
pub fn run_import<F: Frontend>(
    frontend: &mut F,
    types: &TypeRegistry,
    addrs: &AddrRegistry,
    options: &ImportOptions,
) -> Result<()> {
    let pattern = options.pattern.as_deref();
    let mut type_importer = TypeImporter::new(types);
    if options.skip_types {
        info!("skipping type import");
        type_importer.skip();
    } else {
        type_importer.run_import(frontend, pattern)?;
    }

    if options.type_only {
        return Ok(());
    }
    AddrImporter::new(addrs).run_import(frontend, &mut type_importer, options.name_only, pattern)
}

/// [`run_import`], logging the elapsed time whether or not it succeeds.
pub fn run<F: Frontend>(
    frontend: &mut F,
    types: &TypeRegistry,
    addrs: &AddrRegistry,
    options: &ImportOptions,
) -> Result<()> {
    let start = Instant::now();
    let result = run_import(frontend, types, addrs, options);
    info!("Done in {}", format_elapsed(start.elapsed()));
    if let Err(e) = &result {
        error!("import failed: {e:#}");
    }
    result
}

/// Register a plan and run it `passes` times against a fresh
/// [`MemoryDatabase`].
pub fn run_plan(plan: &Plan, passes: usize) -> Result<MemoryDatabase> {
    let (types, addrs) = plan.to_registries()?;
    info!(
        types = types.len(),
        addresses = addrs.len(),
        "registered definitions"
    );
    let mut db = MemoryDatabase::new();
    for pass in 1..=passes {
        info!(pass, "starting import");
        run(&mut db, &types, &addrs, &plan.options)?;
    }
    Ok(db)
}

/// `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
