//! Path command
//!
//! Resolves the cheapest converter chain from a set of valid kinds.

use crate::PathArgs;
use anyhow::{Result, bail};
use reprs_engine::EngineConfig;
use tracing::debug;

pub fn run(args: PathArgs, config: &EngineConfig, verbose: bool) -> Result<()> {
    let registry = super::registry(config)?;
    debug!(sources = ?args.from, target = %args.to, "resolving path");

    let Some(path) = registry.find_path(&args.from, args.to) else {
        bail!("no conversion path from {:?} to {}", args.from, args.to);
    };

    if path.is_empty() {
        println!("{} is already valid", args.to);
        return Ok(());
    }

    println!("{path}  (cost {}, {} edges)", path.cost(), path.len());
    if verbose {
        for (i, name) in path.edge_names().iter().enumerate() {
            println!("  {}. {name}", i + 1);
        }
    }
    Ok(())
}
