//! Graphics-resident representation.
//!
//! A [`GraphicsObject`] owns one backend object. It is reference counted
//! because interop representations alias it. Reallocation goes through
//! [`GraphicsObject::reinitialize`], which brackets the backend call with
//! observer notifications:
//!
//! ```text
//! before_reinit (all observers)  -> holders drop their compute wraps
//! backend.reallocate
//! after_reinit  (all observers)  -> holders wrap the new storage
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error};

use reprs_backend::{GraphicsBackend, ObjectDesc, ObjectId};
use reprs_core::{DataFormat, Dimensions, Error, ReprKind, Result};

use crate::context::EngineContext;
use crate::representation::{AsAny, DataRepresentation, TypedRepresentation};
use crate::sharing::SharingRegistry;

use super::interop::InteropRepr;

/// Two-phase callback around a graphics object reallocation.
pub trait ReinitObserver: Send + Sync {
    /// The storage of `object` is about to be freed.
    fn before_reinit(&self, object: ObjectId);

    /// `object` has new storage.
    fn after_reinit(&self, object: ObjectId) -> Result<()>;
}

/// Registration handle returned by [`GraphicsObject::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Shared handle on one graphics backend object.
pub struct GraphicsObject {
    backend: Arc<dyn GraphicsBackend>,
    sharing: Arc<SharingRegistry>,
    id: ObjectId,
    desc: Mutex<ObjectDesc>,
    observers: Mutex<Vec<(ObserverToken, Weak<dyn ReinitObserver>)>>,
}

impl GraphicsObject {
    /// Allocate an object, optionally initialized with `data`.
    pub(crate) fn create(
        ctx: &EngineContext,
        desc: ObjectDesc,
        data: Option<&[u8]>,
    ) -> Result<Arc<Self>> {
        let backend = ctx.graphics().clone();
        let id = backend.create_object(&desc, data)?;
        debug!(%id, dims = %desc.dims, format = %desc.format, "graphics object created");
        Ok(Arc::new(Self {
            backend,
            sharing: ctx.sharing().clone(),
            id,
            desc: Mutex::new(desc),
            observers: Mutex::new(Vec::new()),
        }))
    }

    /// Backend id.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Current allocation description.
    pub fn desc(&self) -> ObjectDesc {
        *self.desc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<(ObserverToken, Weak<dyn ReinitObserver>)>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a reinit observer. The object keeps only a weak reference.
    pub fn observe(&self, observer: Weak<dyn ReinitObserver>) -> ObserverToken {
        let token = ObserverToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers();
        observers.retain(|(_, o)| o.strong_count() > 0);
        observers.push((token, observer));
        token
    }

    /// Remove a reinit observer.
    pub fn unobserve(&self, token: ObserverToken) {
        self.observers().retain(|(t, _)| *t != token);
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers().iter().filter(|(_, o)| o.strong_count() > 0).count()
    }

    fn live_observers(&self) -> Vec<Arc<dyn ReinitObserver>> {
        self.observers().iter().filter_map(|(_, o)| o.upgrade()).collect()
    }

    /// Reallocate with a new description, notifying observers around it.
    ///
    /// Contents are zeroed. A compute wrap still alive once observers have
    /// been told to drop theirs is a [`Error::ContractViolation`].
    pub(crate) fn reinitialize(&self, desc: ObjectDesc) -> Result<()> {
        let observers = self.live_observers();
        for observer in &observers {
            observer.before_reinit(self.id);
        }

        let realloc = if self.sharing.has_live_handle(self.id) {
            Err(Error::contract(format!(
                "{} reinitialized with {} live shared holders not observing it",
                self.id,
                self.sharing.ref_count(self.id)
            )))
        } else {
            self.backend.reallocate(self.id, &desc)
        };
        match &realloc {
            Ok(()) => {
                *self.desc.lock().unwrap_or_else(PoisonError::into_inner) = desc;
                debug!(
                    id = %self.id,
                    dims = %desc.dims,
                    observers = observers.len(),
                    "graphics object reinitialized"
                );
            }
            Err(e) => error!(id = %self.id, dims = %desc.dims, op = "reinitialize", "{e}"),
        }

        // Holders re-wrap whatever storage is current, even after a failure.
        let mut restored = Ok(());
        for observer in &observers {
            if let Err(e) = observer.after_reinit(self.id) {
                error!(id = %self.id, op = "after_reinit", "{e}");
                if restored.is_ok() {
                    restored = Err(e);
                }
            }
        }
        realloc.and(restored)
    }

    /// Upload full contents.
    pub(crate) fn upload(&self, data: &[u8]) -> Result<()> {
        self.backend.upload(self.id, data)
    }

    /// Download full contents. Blocks until complete.
    pub fn download(&self) -> Result<Vec<u8>> {
        self.backend.download(self.id)
    }

    /// Copy the contents of `src` into this object.
    pub(crate) fn copy_from(&self, src: &GraphicsObject) -> Result<()> {
        self.backend.copy_object(src.id, self.id)
    }
}

impl Drop for GraphicsObject {
    fn drop(&mut self) {
        self.backend.destroy_object(self.id);
        debug!(id = %self.id, "graphics object destroyed");
    }
}

impl std::fmt::Debug for GraphicsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsObject")
            .field("id", &self.id)
            .field("desc", &self.desc())
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Graphics-resident texture or buffer.
///
/// Contents change only through `&mut self`, so a handle returned by a
/// read can never drift from the authoritative representation:
///
/// ```compile_fail
/// use reprs_core::{DataFormat, Dimensions};
/// use reprs_engine::{EngineConfig, EngineContext, GraphicsRepr};
///
/// let ctx = EngineContext::soft(EngineConfig::default());
/// let repr = GraphicsRepr::new(&ctx, Dimensions::buffer(2), DataFormat::U8, None).unwrap();
/// let read: &GraphicsRepr = &repr;
/// read.upload(&[1, 2]).unwrap();
/// ```
#[derive(Debug)]
pub struct GraphicsRepr {
    object: Arc<GraphicsObject>,
}

impl GraphicsRepr {
    /// Allocate a new object.
    pub fn new(
        ctx: &EngineContext,
        dims: Dimensions,
        format: DataFormat,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        let object = GraphicsObject::create(ctx, ObjectDesc::new(dims, format), data)?;
        Ok(Self { object })
    }

    /// Representation over an existing object.
    pub(crate) fn from_object(object: Arc<GraphicsObject>) -> Self {
        Self { object }
    }

    /// Underlying object.
    pub fn object(&self) -> &GraphicsObject {
        &self.object
    }

    pub(crate) fn shared_object(&self) -> &Arc<GraphicsObject> {
        &self.object
    }

    /// New interop holder of this object.
    ///
    /// Holders alias the object, so creating one needs exclusive access.
    pub fn share(&mut self, ctx: &EngineContext) -> Result<InteropRepr> {
        InteropRepr::wrap(self.object.clone(), ctx)
    }

    /// Upload full contents.
    pub fn upload(&mut self, data: &[u8]) -> Result<()> {
        self.object.upload(data)
    }

    /// Copy the contents of another object into this one.
    pub(crate) fn copy_from(&mut self, src: &GraphicsObject) -> Result<()> {
        self.object.copy_from(src)
    }

    /// Download full contents.
    pub fn download(&self) -> Result<Vec<u8>> {
        self.object.download()
    }

    /// Reallocate to new dimensions through the reinit protocol.
    pub fn resize(&mut self, dims: Dimensions) -> Result<()> {
        let desc = self.object.desc();
        if desc.dims == dims {
            return Ok(());
        }
        self.object.reinitialize(ObjectDesc::new(dims, desc.format))
    }
}

impl AsAny for GraphicsRepr {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl DataRepresentation for GraphicsRepr {
    fn kind(&self) -> ReprKind {
        ReprKind::Graphics
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
        Ok(Box::new(Self { object: copy }))
    }
}

impl TypedRepresentation for GraphicsRepr {
    const KIND: ReprKind = ReprKind::Graphics;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use reprs_backend::SoftDevice;

    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl ReinitObserver for Recorder {
        fn before_reinit(&self, _object: ObjectId) {
            self.events.lock().unwrap().push("before");
        }

        fn after_reinit(&self, _object: ObjectId) -> Result<()> {
            self.events.lock().unwrap().push("after");
            Ok(())
        }
    }

    fn ctx() -> (Arc<SoftDevice>, EngineContext) {
        let dev = Arc::new(SoftDevice::with_budget(1 << 20));
        (dev.clone(), EngineContext::from_soft(dev, EngineConfig::default()))
    }

    #[test]
    fn test_upload_download() {
        let (_dev, ctx) = ctx();
        let data = [1, 2, 3, 4];
        let mut repr =
            GraphicsRepr::new(&ctx, Dimensions::buffer(4), DataFormat::U8, Some(&data)).unwrap();
        assert_eq!(repr.download().unwrap(), vec![1, 2, 3, 4]);
        repr.upload(&[4, 3, 2, 1]).unwrap();
        assert_eq!(repr.download().unwrap(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_resize_notifies_observers() {
        let (_dev, ctx) = ctx();
        let mut repr =
            GraphicsRepr::new(&ctx, Dimensions::layer(2, 2), DataFormat::VEC4_U8, None).unwrap();
        let recorder = Arc::new(Recorder { events: Mutex::new(Vec::new()) });
        let weak: Weak<dyn ReinitObserver> =
            Arc::downgrade(&recorder) as Weak<dyn ReinitObserver>;
        let token = repr.object().observe(weak);

        repr.resize(Dimensions::layer(4, 4)).unwrap();
        assert_eq!(repr.dimensions(), Dimensions::layer(4, 4));
        assert_eq!(repr.download().unwrap().len(), 64);
        assert_eq!(*recorder.events.lock().unwrap(), vec!["before", "after"]);

        repr.object().unobserve(token);
        repr.resize(Dimensions::layer(1, 1)).unwrap();
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dead_observers_are_skipped() {
        let (_dev, ctx) = ctx();
        let repr = GraphicsRepr::new(&ctx, Dimensions::buffer(1), DataFormat::U8, None).unwrap();
        {
            let recorder: Arc<dyn ReinitObserver> =
                Arc::new(Recorder { events: Mutex::new(Vec::new()) });
            repr.object().observe(Arc::downgrade(&recorder));
            assert_eq!(repr.object().observer_count(), 1);
        }
        assert_eq!(repr.object().observer_count(), 0);
    }

    #[test]
    fn test_unobserved_wrap_blocks_reinit() {
        let (dev, ctx) = ctx();
        let mut repr =
            GraphicsRepr::new(&ctx, Dimensions::buffer(4), DataFormat::U8, None).unwrap();
        let id = repr.object().id();
        ctx.sharing().retain(id).unwrap();

        let err = repr.resize(Dimensions::buffer(8)).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(repr.dimensions(), Dimensions::buffer(4));

        ctx.sharing().release(id);
        repr.resize(Dimensions::buffer(8)).unwrap();
        assert_eq!(dev.wrap_count(id), 0);
    }

    #[test]
    fn test_drop_destroys_object() {
        let (dev, ctx) = ctx();
        let repr = GraphicsRepr::new(&ctx, Dimensions::buffer(4), DataFormat::U8, None).unwrap();
        let copy = repr.duplicate(&ctx).unwrap();
        assert_eq!(dev.object_count(), 2);
        drop(repr);
        drop(copy);
        assert_eq!(dev.object_count(), 0);
    }
}
