//! Backend detection and auto-selection.

use super::Backend;

/// Information about a device backend.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    /// Backend type.
    pub backend: Backend,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether backend is available.
    pub available: bool,
    /// Whether graphics objects can be wrapped for compute access.
    pub sharing: bool,
    /// Priority for auto-selection (higher = preferred).
    pub priority: u32,
    /// Description.
    pub description: &'static str,
}

/// Detect all backends, highest priority first.
pub fn detect_backends() -> Vec<BackendInfo> {
    #[allow(unused_mut)]
    let mut backends = vec![BackendInfo {
        backend: Backend::Soft,
        name: "soft",
        available: true,
        sharing: true,
        priority: 10,
        description: "host-memory graphics + compute with zero-copy sharing",
    }];

    #[cfg(feature = "wgpu")]
    {
        let wgpu_available = super::WgpuGraphics::is_available();
        backends.push(BackendInfo {
            backend: Backend::Wgpu,
            name: "wgpu",
            available: wgpu_available,
            sharing: false,
            priority: if wgpu_available { 100 } else { 0 },
            description: "graphics objects via wgpu (Vulkan/Metal/DX12)",
        });
    }

    backends.sort_by(|a, b| b.priority.cmp(&a.priority));
    backends
}

/// Select the best available graphics backend.
pub fn select_best_backend() -> Backend {
    detect_backends()
        .into_iter()
        .filter(|b| b.available)
        .max_by_key(|b| b.priority)
        .map(|b| b.backend)
        .unwrap_or(Backend::Soft)
}

/// Get description of available backends.
pub fn describe_backends() -> String {
    let mut desc = String::new();
    for info in detect_backends() {
        let status = if info.available { "+" } else { "-" };
        let sharing = if info.sharing { "sharing" } else { "no sharing" };
        desc.push_str(&format!("[{}] {}: {} ({})\n", status, info.name, info.description, sharing));
    }
    desc
}
