//! Backends command
//!
//! Lists device backends, their availability and interop support.

use anyhow::Result;
use reprs_backend::{detect_backends, memory, select_best_backend};

pub fn run(verbose: bool) -> Result<()> {
    let best = select_best_backend();
    for info in detect_backends() {
        let marker = if info.backend == best { "*" } else { " " };
        let status = if info.available { "available" } else { "unavailable" };
        let sharing = if info.sharing { "sharing" } else { "no sharing" };
        println!("{marker} {:<6} {status:<12} {sharing:<11} {}", info.name, info.description);
        if verbose {
            println!("         priority {}", info.priority);
        }
    }

    if verbose {
        println!();
        println!(
            "Host memory: {} of {} available",
            memory::format_bytes(memory::available_memory()),
            memory::format_bytes(memory::system_memory())
        );
    }
    Ok(())
}
