//! Built-in converters and packages.
//!
//! ```text
//! disk --> ram <--> graphics <--> interop
//!           ^
//!           +-----> compute
//!
//! packages: ram => graphics => interop
//!           disk => ram => graphics
//! ```

use std::sync::Arc;

use tracing::trace;

use reprs_core::{ReprKind, Result};

use crate::context::EngineContext;
use crate::converter::{ConverterPackage, RepresentationConverter};
use crate::repr::{ComputeRepr, DiskRepr, GraphicsRepr, InteropRepr, RamRepr};
use crate::representation::DataRepresentation;

/// Loads disk data into host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskToRam;

impl RepresentationConverter for DiskToRam {
    fn source(&self) -> ReprKind {
        ReprKind::Disk
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Ram
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let disk = src.downcast_ref::<DiskRepr>()?;
        let bytes = disk.load()?;
        Ok(Box::new(RamRepr::from_bytes(disk.dimensions(), disk.format(), &bytes)?))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let bytes = src.downcast_ref::<DiskRepr>()?.load()?;
        dst.downcast_mut::<RamRepr>()?.copy_from_bytes(&bytes)
    }
}

/// Uploads host memory to a graphics object.
#[derive(Debug, Clone, Copy, Default)]
pub struct RamToGraphics;

impl RepresentationConverter for RamToGraphics {
    fn source(&self) -> ReprKind {
        ReprKind::Ram
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Graphics
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let ram = src.downcast_ref::<RamRepr>()?;
        Ok(Box::new(GraphicsRepr::new(ctx, ram.dimensions(), ram.format(), Some(ram.as_bytes()))?))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let ram = src.downcast_ref::<RamRepr>()?;
        dst.downcast_mut::<GraphicsRepr>()?.upload(ram.as_bytes())
    }
}

/// Downloads a graphics object to host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsToRam;

impl RepresentationConverter for GraphicsToRam {
    fn source(&self) -> ReprKind {
        ReprKind::Graphics
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Ram
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let gfx = src.downcast_ref::<GraphicsRepr>()?;
        let bytes = gfx.download()?;
        Ok(Box::new(RamRepr::from_bytes(gfx.dimensions(), gfx.format(), &bytes)?))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let bytes = src.downcast_ref::<GraphicsRepr>()?.download()?;
        dst.downcast_mut::<RamRepr>()?.copy_from_bytes(&bytes)
    }
}

/// Copies host memory into a compute buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RamToCompute;

impl RepresentationConverter for RamToCompute {
    fn source(&self) -> ReprKind {
        ReprKind::Ram
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Compute
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let ram = src.downcast_ref::<RamRepr>()?;
        Ok(Box::new(ComputeRepr::new(ctx, ram.dimensions(), ram.format(), Some(ram.as_bytes()))?))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let ram = src.downcast_ref::<RamRepr>()?;
        dst.downcast_mut::<ComputeRepr>()?.write(ram.as_bytes())
    }
}

/// Reads a compute buffer back to host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeToRam;

impl RepresentationConverter for ComputeToRam {
    fn source(&self) -> ReprKind {
        ReprKind::Compute
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Ram
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let buffer = src.downcast_ref::<ComputeRepr>()?;
        let bytes = buffer.read()?;
        Ok(Box::new(RamRepr::from_bytes(buffer.dimensions(), buffer.format(), &bytes)?))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let bytes = src.downcast_ref::<ComputeRepr>()?.read()?;
        dst.downcast_mut::<RamRepr>()?.copy_from_bytes(&bytes)
    }
}

/// Wraps a graphics object for compute access without copying.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsToInterop;

impl RepresentationConverter for GraphicsToInterop {
    fn source(&self) -> ReprKind {
        ReprKind::Graphics
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Interop
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let gfx = src.downcast_ref::<GraphicsRepr>()?;
        Ok(Box::new(InteropRepr::wrap(gfx.shared_object().clone(), ctx)?))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let gfx = src.downcast_ref::<GraphicsRepr>()?;
        let interop = dst.downcast_mut::<InteropRepr>()?;
        if Arc::ptr_eq(gfx.shared_object(), interop.shared_object()) {
            trace!(object = %gfx.object().id(), "interop shares graphics object");
            return Ok(());
        }
        interop.copy_from(gfx.object())
    }

    fn source_view(&self, dst: &dyn DataRepresentation) -> Option<Box<dyn DataRepresentation>> {
        let interop = dst.downcast_ref::<InteropRepr>().ok()?;
        Some(Box::new(GraphicsRepr::from_object(interop.shared_object().clone())))
    }
}

/// Exposes the graphics object behind an interop representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteropToGraphics;

impl RepresentationConverter for InteropToGraphics {
    fn source(&self) -> ReprKind {
        ReprKind::Interop
    }

    fn destination(&self) -> ReprKind {
        ReprKind::Graphics
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        let interop = src.downcast_ref::<InteropRepr>()?;
        Ok(Box::new(GraphicsRepr::from_object(interop.shared_object().clone())))
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        _ctx: &EngineContext,
    ) -> Result<()> {
        let interop = src.downcast_ref::<InteropRepr>()?;
        let gfx = dst.downcast_mut::<GraphicsRepr>()?;
        if Arc::ptr_eq(gfx.shared_object(), interop.shared_object()) {
            return Ok(());
        }
        gfx.copy_from(interop.object())
    }
}

/// Direct converters in registration order.
pub fn default_converters() -> Vec<Arc<dyn RepresentationConverter>> {
    vec![
        Arc::new(DiskToRam),
        Arc::new(RamToGraphics),
        Arc::new(GraphicsToRam),
        Arc::new(RamToCompute),
        Arc::new(ComputeToRam),
        Arc::new(GraphicsToInterop),
        Arc::new(InteropToGraphics),
    ]
}

/// Default packages: RAM to interop and disk to graphics.
pub fn default_packages() -> Result<Vec<ConverterPackage>> {
    Ok(vec![
        ConverterPackage::new(vec![Arc::new(RamToGraphics), Arc::new(GraphicsToInterop)])?,
        ConverterPackage::new(vec![Arc::new(DiskToRam), Arc::new(RamToGraphics)])?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::repr::MemoryLoader;
    use reprs_backend::SoftDevice;
    use reprs_core::{DataFormat, Dimensions, Error};

    fn ctx() -> (Arc<SoftDevice>, EngineContext) {
        let dev = Arc::new(SoftDevice::with_budget(1 << 20));
        (dev.clone(), EngineContext::from_soft(dev, EngineConfig::default()))
    }

    fn ram(data: &[u8]) -> RamRepr {
        RamRepr::from_bytes(Dimensions::buffer(data.len() as u32), DataFormat::U8, data).unwrap()
    }

    #[test]
    fn test_disk_to_ram() {
        let (_dev, ctx) = ctx();
        let loader = Arc::new(MemoryLoader::new(vec![1u8, 2, 3]));
        let disk = DiskRepr::new(loader, Dimensions::buffer(3), DataFormat::U8);
        let out = DiskToRam.create(&disk, &ctx).unwrap();
        assert_eq!(out.downcast_ref::<RamRepr>().unwrap().as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_kind_mismatch() {
        let (_dev, ctx) = ctx();
        let err = GraphicsToRam.create(&ram(&[1]), &ctx).unwrap_err();
        assert!(matches!(
            err,
            Error::KindMismatch { expected: ReprKind::Graphics, actual: ReprKind::Ram }
        ));
    }

    #[test]
    fn test_graphics_ram_update_in_place() {
        let (dev, ctx) = ctx();
        let mut gfx = RamToGraphics.create(&ram(&[1, 2]), &ctx).unwrap();
        let allocations = dev.stats().allocations;

        RamToGraphics.update(&ram(&[7, 8]), gfx.as_mut(), &ctx).unwrap();
        assert_eq!(dev.stats().allocations, allocations);

        let mut back = ram(&[0, 0]);
        GraphicsToRam.update(gfx.as_ref(), &mut back, &ctx).unwrap();
        assert_eq!(back.as_bytes(), &[7, 8]);
    }

    #[test]
    fn test_interop_shares_object() {
        let (dev, ctx) = ctx();
        let gfx = RamToGraphics.create(&ram(&[1, 2, 3, 4]), &ctx).unwrap();
        let interop = GraphicsToInterop.create(gfx.as_ref(), &ctx).unwrap();
        assert_eq!(dev.object_count(), 1);

        let back = InteropToGraphics.create(interop.as_ref(), &ctx).unwrap();
        let back = back.downcast_ref::<GraphicsRepr>().unwrap();
        let gfx = gfx.downcast_ref::<GraphicsRepr>().unwrap();
        assert_eq!(back.object().id(), gfx.object().id());
    }

    #[test]
    fn test_interop_update_copies_foreign_object() {
        let (_dev, ctx) = ctx();
        let src = RamToGraphics.create(&ram(&[5, 6]), &ctx).unwrap();
        let mut dst: Box<dyn DataRepresentation> =
            Box::new(InteropRepr::new(&ctx, Dimensions::buffer(2), DataFormat::U8, None).unwrap());
        GraphicsToInterop.update(src.as_ref(), dst.as_mut(), &ctx).unwrap();
        assert_eq!(dst.downcast_ref::<InteropRepr>().unwrap().download().unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_compute_roundtrip() {
        let (_dev, ctx) = ctx();
        let buffer = RamToCompute.create(&ram(&[3, 1, 4]), &ctx).unwrap();
        let back = ComputeToRam.create(buffer.as_ref(), &ctx).unwrap();
        assert_eq!(back.downcast_ref::<RamRepr>().unwrap().as_bytes(), &[3, 1, 4]);
    }

    #[test]
    fn test_disk_package_skips_caching() {
        let (dev, ctx) = ctx();
        let pkg = &default_packages().unwrap()[1];
        let loader = Arc::new(MemoryLoader::new(vec![9u8, 8]));
        let disk = DiskRepr::new(loader, Dimensions::buffer(2), DataFormat::U8);
        let gfx = pkg.create(&disk, &ctx).unwrap();
        assert_eq!(gfx.kind(), ReprKind::Graphics);
        assert_eq!(gfx.downcast_ref::<GraphicsRepr>().unwrap().download().unwrap(), vec![9, 8]);
        assert_eq!(dev.object_count(), 1);
    }

    #[test]
    fn test_interop_package_refresh_reuses_object() {
        let (dev, ctx) = ctx();
        let pkg = &default_packages().unwrap()[0];
        let mut interop = pkg.create(&ram(&[1, 2, 3, 4]), &ctx).unwrap();
        let before = dev.stats();
        assert_eq!(dev.object_count(), 1);

        pkg.update(&ram(&[5, 6, 7, 8]), interop.as_mut(), &ctx).unwrap();
        pkg.update(&ram(&[9, 9, 9, 9]), interop.as_mut(), &ctx).unwrap();

        let after = dev.stats();
        assert_eq!(after.allocations, before.allocations);
        assert_eq!(after.wraps, before.wraps);
        assert_eq!(dev.object_count(), 1);
        assert_eq!(ctx.sharing().len(), 1);
        let interop = interop.downcast_ref::<InteropRepr>().unwrap();
        assert_eq!(interop.download().unwrap(), vec![9, 9, 9, 9]);
    }
}
