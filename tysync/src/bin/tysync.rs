//! CLI entry point for tysync.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;

/// tysync: import extracted type definitions into a type database.
#[derive(Parser, Debug)]
#[command(name = "tysync", version, about)]
struct Cli {
    /// Path to the import plan.
    #[arg(default_value = "tysync.toml")]
    plan: PathBuf,

    /// Only import names containing this substring (overrides the plan).
    #[arg(short, long)]
    pattern: Option<String>,

    /// Only rename functions and data symbols.
    #[arg(long)]
    name_only: bool,

    /// Import named types only.
    #[arg(long)]
    type_only: bool,

    /// Assume referenced named types already exist.
    #[arg(long)]
    skip_types: bool,

    /// Upper 32 bits of every address, e.g. `0x7100` (overrides the plan).
    #[arg(long, value_parser = parse_u32)]
    upper: Option<u32>,

    /// Number of import passes over the same database.
    #[arg(long, default_value_t = 1)]
    passes: usize,

    /// Print every named type and symbol of the resulting database.
    #[arg(long)]
    dump: bool,
}

fn parse_u32(s: &str) -> Result<u32> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(value)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tysync=info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.passes == 0 {
        bail!("--passes must be at least 1");
    }

    let mut plan = tysync::config::load_plan(&cli.plan)?;
    let options = &mut plan.options;
    if cli.pattern.is_some() {
        options.pattern = cli.pattern;
    }
    if let Some(upper) = cli.upper {
        options.upper = upper;
    }
    options.name_only |= cli.name_only;
    options.type_only |= cli.type_only;
    options.skip_types |= cli.skip_types;

    let db = tysync::run_plan(&plan, cli.passes)?;
    let summary = db.summary();
    info!(
        structs = summary.structs,
        unions = summary.unions,
        enums = summary.enums,
        placeholders = summary.placeholders,
        symbols = summary.symbols,
        typed_addresses = summary.typed_addresses,
        "database summary"
    );

    if cli.dump {
        for (name, slot) in db.types() {
            println!("{name}: {slot:?}");
        }
        for (addr, name) in db.symbols() {
            match db.address_type(addr) {
                Some(ty) => println!("{addr:#018x} {name}: {ty:?}"),
                None => println!("{addr:#018x} {name}"),
            }
        }
    }
    Ok(())
}
