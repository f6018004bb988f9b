//! Interop representation: a graphics object wrapped for compute access.
//!
//! The wrap is owned by the [`SharingRegistry`]; each `InteropRepr` is one
//! holder. Holders observe the graphics object so a resize drops and
//! recreates the wrap instead of leaving it aliasing freed storage.

use std::sync::{Arc, Weak};

use tracing::debug;

use reprs_backend::{ComputeHandle, ObjectDesc, ObjectId};
use reprs_core::{DataFormat, Dimensions, ReprKind, Result};

use super::graphics::{GraphicsObject, ObserverToken, ReinitObserver};
use crate::context::EngineContext;
use crate::representation::{AsAny, DataRepresentation, TypedRepresentation};
use crate::sharing::SharingRegistry;
use crate::sync::SharedObject;

struct InteropObserver {
    sharing: Arc<SharingRegistry>,
}

impl ReinitObserver for InteropObserver {
    fn before_reinit(&self, object: ObjectId) {
        self.sharing.invalidate(object);
    }

    fn after_reinit(&self, object: ObjectId) -> Result<()> {
        self.sharing.restore(object)
    }
}

/// Graphics object shared zero-copy with the compute device.
///
/// Compute access goes through an acquire scope, see [`crate::sync`].
pub struct InteropRepr {
    observer: Arc<InteropObserver>,
    token: ObserverToken,
    sharing: Arc<SharingRegistry>,
    // Released from the registry in Drop before this reference goes away.
    object: Arc<GraphicsObject>,
}

impl InteropRepr {
    /// Become a holder of `object`, wrapping it on first use.
    pub(crate) fn wrap(object: Arc<GraphicsObject>, ctx: &EngineContext) -> Result<Self> {
        let sharing = ctx.sharing().clone();
        sharing.retain(object.id())?;

        let observer = Arc::new(InteropObserver { sharing: sharing.clone() });
        let weak: Weak<dyn ReinitObserver> =
            Arc::downgrade(&observer) as Weak<dyn ReinitObserver>;
        let token = object.observe(weak);
        debug!(
            object = %object.id(),
            holders = sharing.ref_count(object.id()),
            "interop holder added"
        );

        Ok(Self {
            observer,
            token,
            sharing,
            object,
        })
    }

    /// Allocate a new graphics object and wrap it.
    pub fn new(
        ctx: &EngineContext,
        dims: Dimensions,
        format: DataFormat,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        let object = GraphicsObject::create(ctx, ObjectDesc::new(dims, format), data)?;
        Self::wrap(object, ctx)
    }

    /// Underlying graphics object.
    pub fn object(&self) -> &GraphicsObject {
        &self.object
    }

    pub(crate) fn shared_object(&self) -> &Arc<GraphicsObject> {
        &self.object
    }

    /// Another holder of the same object.
    pub fn share(&mut self, ctx: &EngineContext) -> Result<Self> {
        Self::wrap(self.object.clone(), ctx)
    }

    /// Current compute wrap.
    pub fn handle(&self) -> Option<ComputeHandle> {
        self.sharing.handle(self.object.id())
    }

    /// Graphics-side upload; no acquire needed.
    pub fn upload(&mut self, data: &[u8]) -> Result<()> {
        self.object.upload(data)
    }

    /// Copy the contents of another object into the shared one.
    pub(crate) fn copy_from(&mut self, src: &GraphicsObject) -> Result<()> {
        self.object.copy_from(src)
    }

    /// Graphics-side download; no acquire needed.
    pub fn download(&self) -> Result<Vec<u8>> {
        self.object.download()
    }

    /// Reallocate the shared object through the reinit protocol.
    pub fn resize(&mut self, dims: Dimensions) -> Result<()> {
        let desc = self.object.desc();
        if desc.dims == dims {
            return Ok(());
        }
        self.object.reinitialize(ObjectDesc::new(dims, desc.format))
    }
}

impl Drop for InteropRepr {
    fn drop(&mut self) {
        self.object.unobserve(self.token);
        self.sharing.release(self.object.id());
        debug!(
            object = %self.object.id(),
            observers = Arc::strong_count(&self.observer),
            "interop holder released"
        );
    }
}

impl std::fmt::Debug for InteropRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteropRepr")
            .field("object", &self.object.id())
            .field("handle", &self.handle())
            .field("desc", &self.object.desc())
            .finish()
    }
}

impl SharedObject for InteropRepr {
    fn object_id(&self) -> ObjectId {
        self.object.id()
    }

    fn compute_handle(&self) -> Result<ComputeHandle> {
        self.sharing.require_handle(self.object.id())
    }
}

impl AsAny for InteropRepr {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl DataRepresentation for InteropRepr {
    fn kind(&self) -> ReprKind {
        ReprKind::Interop
    }

    fn dimensions(&self) -> Dimensions {
        self.object.desc().dims
    }

    fn format(&self) -> DataFormat {
        self.object.desc().format
    }

    fn duplicate(&self, ctx: &EngineContext) -> Result<Box<dyn DataRepresentation>> {
        let copy = GraphicsObject::create(ctx, self.object.desc(), None)?;
        copy.copy_from(&self.object)?;
        Ok(Box::new(Self::wrap(copy, ctx)?))
    }
}

impl TypedRepresentation for InteropRepr {
    const KIND: ReprKind = ReprKind::Interop;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use reprs_backend::SoftDevice;

    fn ctx() -> (Arc<SoftDevice>, EngineContext) {
        let dev = Arc::new(SoftDevice::with_budget(1 << 20));
        (dev.clone(), EngineContext::from_soft(dev, EngineConfig::default()))
    }

    #[test]
    fn test_holders_share_one_wrap() {
        let (dev, ctx) = ctx();
        let mut a = InteropRepr::new(&ctx, Dimensions::buffer(4), DataFormat::U8, None).unwrap();
        let b = a.share(&ctx).unwrap();
        let id = a.object().id();

        assert_eq!(a.handle(), b.handle());
        assert_eq!(ctx.sharing().ref_count(id), 2);
        assert_eq!(dev.stats().wraps, 1);

        drop(a);
        assert_eq!(ctx.sharing().ref_count(id), 1);
        drop(b);
        assert!(ctx.sharing().is_empty());
        assert_eq!(dev.buffer_count(), 0);
        assert_eq!(dev.object_count(), 0);
    }

    #[test]
    fn test_resize_rewraps() {
        let (dev, ctx) = ctx();
        let mut a = InteropRepr::new(&ctx, Dimensions::buffer(4), DataFormat::U8, None).unwrap();
        let _b = a.share(&ctx).unwrap();
        let before = a.handle().unwrap();

        a.resize(Dimensions::buffer(16)).unwrap();

        let after = a.handle().unwrap();
        assert_ne!(before, after);
        assert!(dev.is_current_wrap(after));
        assert_eq!(ctx.sharing().ref_count(a.object().id()), 2);
        assert_eq!(a.dimensions(), Dimensions::buffer(16));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let (_dev, ctx) = ctx();
        let a =
            InteropRepr::new(&ctx, Dimensions::buffer(2), DataFormat::U8, Some(&[5, 6])).unwrap();
        let boxed = a.duplicate(&ctx).unwrap();
        let copy = boxed.downcast_ref::<InteropRepr>().unwrap();
        assert_ne!(copy.object().id(), a.object().id());
        assert_eq!(copy.download().unwrap(), vec![5, 6]);
        assert_eq!(ctx.sharing().len(), 2);
    }
}
