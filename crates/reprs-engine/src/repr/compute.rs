//! Compute-resident representation.

use std::sync::Arc;

use tracing::trace;

use reprs_backend::{ComputeBackend, ComputeHandle, ObjectDesc};
use reprs_core::{DataFormat, Dimensions, ReprKind, Result};

use crate::context::EngineContext;
use crate::representation::{AsAny, DataRepresentation, TypedRepresentation};

/// Plain compute buffer owned by this representation.
pub struct ComputeRepr {
    backend: Arc<dyn ComputeBackend>,
    handle: ComputeHandle,
    desc: ObjectDesc,
}

impl ComputeRepr {
    /// Allocate a buffer, optionally initialized with `data`.
    pub fn new(
        ctx: &EngineContext,
        dims: Dimensions,
        format: DataFormat,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        let desc = ObjectDesc::new(dims, format);
        let backend = ctx.compute().clone();
        let handle = backend.create_buffer(&desc, data)?;
        Ok(Self { backend, handle, desc })
    }

    /// Backend handle.
    pub fn handle(&self) -> ComputeHandle {
        self.handle
    }

    /// Read full contents. Blocks until complete.
    pub fn read(&self) -> Result<Vec<u8>> {
        self.backend.read_buffer(self.handle)
    }

    /// Overwrite full contents.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.backend.write_buffer(self.handle, data)
    }
}

impl Drop for ComputeRepr {
    fn drop(&mut self) {
        self.backend.release_buffer(self.handle);
        trace!(handle = %self.handle, "compute buffer released");
    }
}

impl std::fmt::Debug for ComputeRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeRepr")
            .field("handle", &self.handle)
            .field("desc", &self.desc)
            .finish()
    }
}

impl AsAny for ComputeRepr {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl DataRepresentation for ComputeRepr {
    fn kind(&self) -> ReprKind {
        ReprKind::Compute
    }

    fn dimensions(&self) -> Dimensions {
        self.desc.dims
    }

    fn format(&self) -> DataFormat {
        self.desc.format
    }

    fn duplicate(&self, ctx: &EngineContext) -> Result<Box<dyn DataRepresentation>> {
        let data = self.read()?;
        Ok(Box::new(Self::new(ctx, self.desc.dims, self.desc.format, Some(&data))?))
    }
}

impl TypedRepresentation for ComputeRepr {
    const KIND: ReprKind = ReprKind::Compute;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use reprs_backend::SoftDevice;

    #[test]
    fn test_buffer_lifecycle() {
        let dev = Arc::new(SoftDevice::with_budget(1 << 20));
        let ctx = EngineContext::from_soft(dev.clone(), EngineConfig::default());

        let data = [1, 0, 2, 0];
        let mut repr =
            ComputeRepr::new(&ctx, Dimensions::buffer(2), DataFormat::U16, Some(&data)).unwrap();
        assert_eq!(repr.read().unwrap(), vec![1, 0, 2, 0]);
        repr.write(&[0, 0, 0, 9]).unwrap();

        let copy = repr.duplicate(&ctx).unwrap();
        assert_eq!(copy.byte_size(), 4);
        assert_eq!(dev.buffer_count(), 2);

        drop(repr);
        drop(copy);
        assert_eq!(dev.buffer_count(), 0);
        assert_eq!(dev.used_bytes(), 0);
    }
}
