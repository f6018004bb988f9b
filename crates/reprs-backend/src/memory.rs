//! Memory budgeting.
//!
//! Provides system memory detection and environment variable overrides for
//! the device memory budget.
//!
//! # Environment Variables
//!
//! - `REPRS_MEM_MB` - Explicit device budget in megabytes
//! - `REPRS_RAM_PCT` - Budget as percentage of system RAM (10-95)

use std::env;
use std::sync::OnceLock;

/// Default safety margin - use at most 80% of system memory.
pub const SAFE_MEMORY_FRACTION: f64 = 0.80;

/// Cache for system memory detection.
static SYSTEM_MEMORY: OnceLock<u64> = OnceLock::new();

/// Detect total system RAM in bytes.
pub fn system_memory() -> u64 {
    *SYSTEM_MEMORY.get_or_init(|| {
        sys_info::mem_info()
            .map(|m| m.total * 1024) // KB to bytes
            .unwrap_or(8 * 1024 * 1024 * 1024) // 8 GB fallback
    })
}

/// Get the device memory budget considering environment overrides.
///
/// Priority:
/// 1. `REPRS_MEM_MB` - explicit MB limit
/// 2. `REPRS_RAM_PCT` - percentage of system RAM
/// 3. Default: 80% of system RAM
pub fn available_memory() -> u64 {
    if let Some(mb) = env_mem_mb() {
        return mb * 1024 * 1024;
    }

    let pct = env_ram_pct().unwrap_or((SAFE_MEMORY_FRACTION * 100.0) as u64);
    let pct = pct.clamp(10, 95);

    system_memory() * pct / 100
}

fn env_mem_mb() -> Option<u64> {
    env::var("REPRS_MEM_MB").ok().and_then(|v| v.parse().ok())
}

fn env_ram_pct() -> Option<u64> {
    env::var("REPRS_RAM_PCT").ok().and_then(|v| v.parse().ok())
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
