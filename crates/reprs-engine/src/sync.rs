//! Scoped acquisition of shared objects.
//!
//! Every shared object touched by a compute operation is added to one
//! [`SharedAccess`], acquired in a single call, and released when the
//! returned [`AcquiredScope`] is dropped, on every exit path.
//!
//! ```rust
//! use reprs_core::{DataFormat, Dimensions};
//! use reprs_engine::{EngineConfig, EngineContext, InteropRepr, SharedAccess};
//!
//! let ctx = EngineContext::soft(EngineConfig::default());
//! let mut a = InteropRepr::new(&ctx, Dimensions::buffer(4), DataFormat::U8, None)?;
//!
//! let scope = SharedAccess::new(&ctx).add(&a).acquire()?;
//! scope.write(&mut a, &[1, 2, 3, 4])?;
//! drop(scope);
//!
//! assert_eq!(a.download()?, vec![1, 2, 3, 4]);
//! # Ok::<(), reprs_core::Error>(())
//! ```
//!
//! Writing needs exclusive access to the holder, even inside a scope:
//!
//! ```compile_fail
//! use reprs_core::{DataFormat, Dimensions};
//! use reprs_engine::{EngineConfig, EngineContext, InteropRepr, SharedAccess};
//!
//! let ctx = EngineContext::soft(EngineConfig::default());
//! let a = InteropRepr::new(&ctx, Dimensions::buffer(1), DataFormat::U8, None).unwrap();
//! let read: &InteropRepr = &a;
//! let scope = SharedAccess::new(&ctx).add(read).acquire().unwrap();
//! scope.write(read, &[1]).unwrap();
//! ```

use tracing::{trace, warn};

use reprs_backend::{ComputeHandle, ObjectId};
use reprs_core::{Error, Result};

use crate::context::EngineContext;

/// Object with a compute wrap that must be acquired before use.
pub trait SharedObject {
    /// Graphics object identity.
    fn object_id(&self) -> ObjectId;

    /// Current compute wrap.
    fn compute_handle(&self) -> Result<ComputeHandle>;
}

/// Collects shared objects to acquire together.
///
/// Only object ids are kept, so holders stay free to be borrowed mutably
/// for writes once the scope is acquired.
pub struct SharedAccess<'a> {
    ctx: &'a EngineContext,
    objects: Vec<ObjectId>,
}

impl<'a> SharedAccess<'a> {
    /// Empty set.
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self {
            ctx,
            objects: Vec::new(),
        }
    }

    /// Add an object. Objects already added are ignored.
    pub fn add(mut self, object: &dyn SharedObject) -> Self {
        self.push(object);
        self
    }

    /// Add an object in place.
    pub fn push(&mut self, object: &dyn SharedObject) {
        let id = object.object_id();
        if !self.objects.contains(&id) {
            self.objects.push(id);
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no objects were added.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Flush graphics work and acquire all objects in one call.
    pub fn acquire(self) -> Result<AcquiredScope<'a>> {
        let sharing = self.ctx.sharing();
        let handles = self
            .objects
            .iter()
            .map(|id| sharing.require_handle(*id))
            .collect::<Result<Vec<_>>>()?;
        if !handles.is_empty() {
            self.ctx.graphics().finish()?;
            self.ctx
                .compute()
                .acquire_shared(&handles, self.ctx.config().sync_timeout())?;
        }
        trace!(count = handles.len(), "shared objects acquired");
        Ok(AcquiredScope {
            ctx: self.ctx,
            handles,
        })
    }
}

/// Objects held by the compute device until dropped.
pub struct AcquiredScope<'a> {
    ctx: &'a EngineContext,
    handles: Vec<ComputeHandle>,
}

impl AcquiredScope<'_> {
    /// Handles acquired by this scope.
    pub fn handles(&self) -> &[ComputeHandle] {
        &self.handles
    }

    fn check(&self, object: &dyn SharedObject) -> Result<ComputeHandle> {
        let handle = object.compute_handle()?;
        if !self.handles.contains(&handle) {
            return Err(Error::NotAcquired(handle.0));
        }
        Ok(handle)
    }

    /// Read an acquired object through its compute wrap.
    pub fn read(&self, object: &dyn SharedObject) -> Result<Vec<u8>> {
        let handle = self.check(object)?;
        self.ctx.compute().read_buffer(handle)
    }

    /// Write an acquired object through its compute wrap.
    pub fn write(&self, object: &mut dyn SharedObject, data: &[u8]) -> Result<()> {
        let handle = self.check(object)?;
        self.ctx.compute().write_buffer(handle, data)
    }
}

impl Drop for AcquiredScope<'_> {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        match self.ctx.compute().release_shared(&self.handles) {
            Ok(()) => trace!(count = self.handles.len(), "shared objects released"),
            Err(e) => warn!(
                count = self.handles.len(),
                "failed to release shared objects: {e}"
            ),
        }
    }
}

/// Run `f` with `objects` acquired; they are released however `f` returns.
pub fn with_shared<R>(
    ctx: &EngineContext,
    objects: &[&dyn SharedObject],
    f: impl FnOnce(&AcquiredScope<'_>) -> Result<R>,
) -> Result<R> {
    let mut access = SharedAccess::new(ctx);
    for object in objects {
        access.push(*object);
    }
    let scope = access.acquire()?;
    f(&scope)
}
