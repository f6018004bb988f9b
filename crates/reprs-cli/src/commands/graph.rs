//! Graph command
//!
//! Prints registered converters and packages, optionally with reachability.

use crate::GraphArgs;
use anyhow::Result;
use reprs_core::ReprKind;
use reprs_engine::EngineConfig;

pub fn run(args: GraphArgs, config: &EngineConfig, verbose: bool) -> Result<()> {
    let registry = super::registry(config)?;
    print!("{}", registry.describe());

    if args.reach {
        println!();
        for kind in ReprKind::ALL {
            println!("{:>8} -> {}", kind.name(), registry.reachable_from(kind));
        }
    }

    if verbose {
        println!();
        let cache = if config.path_cache { "on" } else { "off" };
        println!("{} edges, path cache {cache}", registry.len());
    }
    Ok(())
}
