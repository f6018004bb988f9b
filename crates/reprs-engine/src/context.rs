//! Engine context: devices, sharing registry and configuration.

use std::sync::Arc;

use tracing::{debug, info};

use reprs_backend::{Backend, ComputeBackend, GraphicsBackend, SoftDevice, select_best_backend};
use reprs_core::Result;

use crate::config::EngineConfig;
use crate::sharing::SharingRegistry;

/// Handles shared by every representation created through one engine.
///
/// Devices are created first and the sharing registry on top of them.
/// The registry is declared first so it is dropped before the devices.
#[derive(Clone)]
pub struct EngineContext {
    sharing: Arc<SharingRegistry>,
    graphics: Arc<dyn GraphicsBackend>,
    compute: Arc<dyn ComputeBackend>,
    config: Arc<EngineConfig>,
}

impl EngineContext {
    /// Assemble a context from explicit devices.
    pub fn new(
        graphics: Arc<dyn GraphicsBackend>,
        compute: Arc<dyn ComputeBackend>,
        config: EngineConfig,
    ) -> Self {
        let sharing = Arc::new(SharingRegistry::new(graphics.clone(), compute.clone()));
        debug!(graphics = graphics.name(), compute = compute.name(), "engine context created");
        Self {
            sharing,
            graphics,
            compute,
            config: Arc::new(config),
        }
    }

    /// Context on a single soft device serving both graphics and compute.
    pub fn from_soft(device: Arc<SoftDevice>, config: EngineConfig) -> Self {
        Self::new(device.clone(), device, config)
    }

    /// Context on a fresh soft device sized by the config budget.
    pub fn soft(config: EngineConfig) -> Self {
        let device = match config.memory_budget_bytes() {
            Some(budget) => SoftDevice::with_budget(budget),
            None => SoftDevice::new(),
        };
        Self::from_soft(Arc::new(device), config)
    }

    /// Context on the requested backend.
    ///
    /// wgpu provides graphics only; compute and sharing fall back to a soft
    /// device, so interop conversions report `Unsupported` there.
    pub fn from_backend(backend: Backend, config: EngineConfig) -> Result<Self> {
        let backend = match backend {
            Backend::Auto => select_best_backend(),
            b => b,
        };
        info!(backend = backend.name(), "selecting device backend");
        match backend {
            Backend::Soft | Backend::Auto => Ok(Self::soft(config)),
            #[cfg(feature = "wgpu")]
            Backend::Wgpu => {
                let graphics = Arc::new(reprs_backend::WgpuGraphics::new()?);
                let compute = Arc::new(match config.memory_budget_bytes() {
                    Some(budget) => SoftDevice::with_budget(budget),
                    None => SoftDevice::new(),
                });
                Ok(Self::new(graphics, compute, config))
            }
            #[cfg(not(feature = "wgpu"))]
            Backend::Wgpu => Err(reprs_core::Error::Unsupported(
                "wgpu backend not compiled in (enable feature \"wgpu\")".into(),
            )),
        }
    }

    /// Graphics device.
    #[inline]
    pub(crate) fn graphics(&self) -> &Arc<dyn GraphicsBackend> {
        &self.graphics
    }

    /// Compute device.
    #[inline]
    pub(crate) fn compute(&self) -> &Arc<dyn ComputeBackend> {
        &self.compute
    }

    /// Interop sharing registry.
    #[inline]
    pub fn sharing(&self) -> &Arc<SharingRegistry> {
        &self.sharing
    }

    /// Engine configuration.
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("graphics", &self.graphics.name())
            .field("compute", &self.compute.name())
            .field("shared_objects", &self.sharing.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprs_core::Error;

    #[test]
    fn test_soft_context() {
        let ctx = EngineContext::soft(EngineConfig {
            memory_budget_mb: Some(1),
            ..Default::default()
        });
        assert_eq!(ctx.graphics().name(), "soft");
        assert_eq!(ctx.compute().name(), "soft");
        assert!(ctx.sharing().is_empty());
    }

    #[test]
    fn test_from_backend_soft() {
        let ctx = EngineContext::from_backend(Backend::Soft, EngineConfig::default()).unwrap();
        assert_eq!(ctx.graphics().name(), "soft");
    }

    #[cfg(not(feature = "wgpu"))]
    #[test]
    fn test_wgpu_not_compiled() {
        let err = EngineContext::from_backend(Backend::Wgpu, EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
