//! Reference-counted compute wraps of graphics objects.
//!
//! One entry per graphics object that currently has interop holders:
//!
//! ```text
//! ObjectId -> { handle: Option<ComputeHandle>, ref_count }
//! ```
//!
//! The first holder creates the wrap, later holders reuse it. The wrap is
//! released when the last holder goes away, and always before the graphics
//! object itself is destroyed. Around a reallocation of the object the
//! handle is dropped (`invalidate`) and recreated (`restore`) while the
//! count stays put.
//!
//! The map is guarded by a mutex. Callers still serialize access through
//! the thread owning the device context; the lock only makes misuse safe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use reprs_backend::{ComputeBackend, ComputeHandle, GraphicsBackend, ObjectId};
use reprs_core::{Error, Result};

/// Snapshot of one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharingEntry {
    /// Wrapped compute handle; `None` between invalidate and restore.
    pub handle: Option<ComputeHandle>,
    /// Number of holders.
    pub ref_count: usize,
}

/// Map from graphics object to its shared compute wrap.
pub struct SharingRegistry {
    graphics: Arc<dyn GraphicsBackend>,
    compute: Arc<dyn ComputeBackend>,
    entries: Mutex<HashMap<ObjectId, SharingEntry>>,
}

impl SharingRegistry {
    /// Creates an empty registry over the given devices.
    pub fn new(graphics: Arc<dyn GraphicsBackend>, compute: Arc<dyn ComputeBackend>) -> Self {
        Self {
            graphics,
            compute,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ObjectId, SharingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wrap(&self, object: ObjectId) -> Result<ComputeHandle> {
        let memory = self.graphics.export_shared(object)?;
        self.compute.wrap_shared(&memory)
    }

    /// Adds a holder of `object`, wrapping it on first use.
    pub fn retain(&self, object: ObjectId) -> Result<ComputeHandle> {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(&object) {
            let handle = match entry.handle {
                Some(handle) => handle,
                None => {
                    let handle = self.wrap(object)?;
                    entry.handle = Some(handle);
                    handle
                }
            };
            entry.ref_count += 1;
            debug!(%object, %handle, ref_count = entry.ref_count, "sharing: reuse wrap");
            return Ok(handle);
        }

        let handle = self.wrap(object)?;
        entries.insert(object, SharingEntry { handle: Some(handle), ref_count: 1 });
        debug!(%object, %handle, "sharing: new wrap");
        Ok(handle)
    }

    /// Removes a holder of `object`; the last one releases the wrap.
    pub fn release(&self, object: ObjectId) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&object) else {
            warn!(%object, "sharing: release of unregistered object");
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            debug!(%object, ref_count = entry.ref_count, "sharing: holder released");
            return;
        }
        if let Some(handle) = entry.handle {
            self.compute.release_buffer(handle);
        }
        entries.remove(&object);
        debug!(%object, "sharing: entry removed");
    }

    /// Releases the wrap of `object` ahead of a reallocation, keeping the entry.
    pub fn invalidate(&self, object: ObjectId) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(&object) {
            if let Some(handle) = entry.handle.take() {
                self.compute.release_buffer(handle);
                debug!(%object, %handle, "sharing: wrap invalidated");
            }
        }
    }

    /// Re-wraps `object` after a reallocation if it still has holders.
    pub fn restore(&self, object: ObjectId) -> Result<()> {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&object) else {
            return Ok(());
        };
        if entry.handle.is_none() && entry.ref_count > 0 {
            let handle = self.wrap(object)?;
            entry.handle = Some(handle);
            debug!(%object, %handle, ref_count = entry.ref_count, "sharing: wrap restored");
        }
        Ok(())
    }

    /// Current wrapped handle of `object`.
    pub fn handle(&self, object: ObjectId) -> Option<ComputeHandle> {
        self.entries().get(&object).and_then(|e| e.handle)
    }

    /// Current wrapped handle of `object`, or an error naming why there is none.
    pub fn require_handle(&self, object: ObjectId) -> Result<ComputeHandle> {
        match self.entries().get(&object) {
            Some(SharingEntry { handle: Some(handle), .. }) => Ok(*handle),
            Some(_) => Err(Error::contract(format!(
                "{object} used between invalidate and restore"
            ))),
            None => Err(Error::unknown("shared object", object.0)),
        }
    }

    /// Number of holders of `object`.
    pub fn ref_count(&self, object: ObjectId) -> usize {
        self.entries().get(&object).map_or(0, |e| e.ref_count)
    }

    /// Entry snapshot.
    pub fn entry(&self, object: ObjectId) -> Option<SharingEntry> {
        self.entries().get(&object).copied()
    }

    /// Whether `object` currently has a live compute wrap.
    pub fn has_live_handle(&self, object: ObjectId) -> bool {
        self.handle(object).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Drop for SharingRegistry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (object, entry) in entries.drain() {
            warn!(%object, ref_count = entry.ref_count, "sharing: entry alive at teardown");
            if let Some(handle) = entry.handle {
                self.compute.release_buffer(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprs_backend::{ObjectDesc, SoftDevice};
    use reprs_core::{DataFormat, Dimensions};

    fn setup() -> (Arc<SoftDevice>, SharingRegistry, ObjectId) {
        let dev = Arc::new(SoftDevice::with_budget(1 << 20));
        let registry = SharingRegistry::new(dev.clone(), dev.clone());
        let desc = ObjectDesc::new(Dimensions::layer(2, 2), DataFormat::VEC4_U8);
        let id = dev.create_object(&desc, None).unwrap();
        (dev, registry, id)
    }

    #[test]
    fn test_retain_reuses_wrap() {
        let (dev, registry, id) = setup();
        let a = registry.retain(id).unwrap();
        let b = registry.retain(id).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ref_count(id), 2);
        assert_eq!(dev.stats().wraps, 1);

        registry.release(id);
        assert_eq!(registry.ref_count(id), 1);
        assert_eq!(dev.wrap_count(id), 1);
        registry.release(id);
        assert!(registry.is_empty());
        assert_eq!(dev.wrap_count(id), 0);
    }

    #[test]
    fn test_invalidate_restore_keeps_count() {
        let (dev, registry, id) = setup();
        let before = registry.retain(id).unwrap();
        registry.retain(id).unwrap();

        registry.invalidate(id);
        assert!(!registry.has_live_handle(id));
        assert_eq!(registry.ref_count(id), 2);
        assert!(registry.require_handle(id).is_err());

        registry.restore(id).unwrap();
        let after = registry.handle(id).unwrap();
        assert_ne!(before, after);
        assert!(dev.is_current_wrap(after));
        assert_eq!(registry.ref_count(id), 2);
    }

    #[test]
    fn test_release_unknown_is_ignored() {
        let (_dev, registry, id) = setup();
        registry.release(id);
        registry.invalidate(id);
        registry.restore(id).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_releases_wraps() {
        let (dev, registry, id) = setup();
        registry.retain(id).unwrap();
        drop(registry);
        assert_eq!(dev.wrap_count(id), 0);
    }
}
