//! Engine configuration.
//!
//! Loaded from YAML, then overridden by environment variables:
//!
//! - `REPRS_SOURCE_ORDER` - `authoritative` or `declaration`
//! - `REPRS_SYNC_TIMEOUT_MS` - acquire timeout for shared objects
//! - `REPRS_DISABLE_PATH_CACHE` - any value disables path memoization
//! - `REPRS_MEM_MB` - device memory budget (read by the backend)
//!
//! ```yaml
//! source_order: authoritative_first
//! sync_timeout_ms: 1000
//! path_cache: true
//! memory_budget_mb: 2048
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use reprs_core::{Error, Result};

/// Default acquire timeout.
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 1000;

/// Order in which valid source kinds seed the path search.
///
/// Only matters when equally cheap paths start from different kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrder {
    /// Authoritative kind first, then the others in declaration order.
    #[default]
    AuthoritativeFirst,
    /// All valid kinds in declaration order.
    Declaration,
}

impl std::str::FromStr for SourceOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authoritative" | "authoritative_first" => Ok(Self::AuthoritativeFirst),
            "declaration" => Ok(Self::Declaration),
            _ => Err(Error::Config(format!("unknown source order '{s}'"))),
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seeding order of the path search.
    pub source_order: SourceOrder,
    /// Acquire timeout for shared objects.
    pub sync_timeout_ms: u64,
    /// Memoize path search results.
    pub path_cache: bool,
    /// Device memory budget for the soft device; `None` uses system memory.
    pub memory_budget_mb: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_order: SourceOrder::default(),
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            path_cache: true,
            memory_budget_mb: None,
        }
    }
}

impl EngineConfig {
    /// Parse from a YAML string. Missing fields take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply environment overrides. Malformed values are logged and ignored.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("REPRS_SOURCE_ORDER") {
            match v.parse() {
                Ok(order) => self.source_order = order,
                Err(e) => warn!(value = %v, "ignoring REPRS_SOURCE_ORDER: {e}"),
            }
        }
        if let Ok(v) = std::env::var("REPRS_SYNC_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) => self.sync_timeout_ms = ms,
                Err(_) => warn!(value = %v, "ignoring REPRS_SYNC_TIMEOUT_MS"),
            }
        }
        if std::env::var_os("REPRS_DISABLE_PATH_CACHE").is_some() {
            self.path_cache = false;
        }
        self
    }

    /// Acquire timeout as a duration.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Memory budget in bytes, if configured.
    pub fn memory_budget_bytes(&self) -> Option<u64> {
        self.memory_budget_mb.map(|mb| mb * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.source_order, SourceOrder::AuthoritativeFirst);
        assert_eq!(cfg.sync_timeout(), Duration::from_secs(1));
        assert!(cfg.path_cache);
        assert_eq!(cfg.memory_budget_bytes(), None);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "source_order: declaration\nmemory_budget_mb: 2\n";
        let cfg = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.source_order, SourceOrder::Declaration);
        assert_eq!(cfg.memory_budget_bytes(), Some(2 * 1024 * 1024));
        assert_eq!(cfg.sync_timeout_ms, DEFAULT_SYNC_TIMEOUT_MS);
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reprs.yaml");
        let cfg = EngineConfig {
            path_cache: false,
            sync_timeout_ms: 50,
            ..Default::default()
        };
        std::fs::write(&path, cfg.to_yaml().unwrap()).unwrap();
        assert_eq!(EngineConfig::from_yaml_file(&path).unwrap(), cfg);
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            EngineConfig::from_yaml_str("sync_timeout_ms: soon"),
            Err(Error::Config(_))
        ));
        assert!("sideways".parse::<SourceOrder>().is_err());
    }
}
