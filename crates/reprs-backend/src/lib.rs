//! Graphics and compute device abstractions.
//!
//! Representations never talk to a device API directly; they go through the
//! [`GraphicsBackend`] and [`ComputeBackend`] traits defined here.
//!
//! # Architecture
//!
//! ```text
//! GraphicsBackend (objects: textures / buffers used for rendering)
//!     +-- SoftDevice   (host memory reference device)
//!     +-- WgpuGraphics (Vulkan/Metal/DX12, feature "wgpu")
//!
//! ComputeBackend (buffers + zero-copy wraps of graphics objects)
//!     +-- SoftDevice
//! ```
//!
//! A graphics object exports its storage as [`SharedMemory`]; a compute
//! backend wraps that into a [`ComputeHandle`] which may only be touched
//! between `acquire_shared` and `release_shared`.

mod detect;
mod device;
pub mod memory;
mod soft;

#[cfg(feature = "wgpu")]
mod wgpu_backend;

pub use detect::{BackendInfo, describe_backends, detect_backends, select_best_backend};
pub use device::{
    ComputeBackend, ComputeHandle, GraphicsBackend, ObjectDesc, ObjectId, ObjectTarget,
    SharedMemory,
};
pub use soft::{DeviceStats, SoftDevice};

#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuGraphics;

use reprs_core::Error;

/// Available device backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Auto-select best available (wgpu > soft).
    #[default]
    Auto,
    /// Host-memory reference device.
    Soft,
    /// wgpu graphics device (Vulkan/Metal/DX12).
    Wgpu,
}

impl Backend {
    /// Check if this backend is available on current system.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Auto => true,
            Self::Soft => true,
            #[cfg(feature = "wgpu")]
            Self::Wgpu => WgpuGraphics::is_available(),
            #[cfg(not(feature = "wgpu"))]
            Self::Wgpu => false,
        }
    }

    /// Get human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Soft => "soft",
            Self::Wgpu => "wgpu",
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "soft" | "cpu" => Ok(Self::Soft),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            _ => Err(Error::InvalidArgument(format!("unknown backend '{s}'"))),
        }
    }
}
