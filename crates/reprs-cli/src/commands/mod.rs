//! CLI command implementations

pub mod backends;
pub mod demo;
pub mod graph;
pub mod path;

use anyhow::Result;
use reprs_engine::{ConverterRegistry, EngineConfig};

/// Default converter registry honoring the configured path cache.
pub fn registry(config: &EngineConfig) -> Result<ConverterRegistry> {
    Ok(ConverterRegistry::with_defaults()?.with_path_cache(config.path_cache))
}

/// Print the effective configuration as YAML.
pub fn print_config(config: &EngineConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
