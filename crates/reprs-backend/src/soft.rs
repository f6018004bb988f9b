//! Host-memory reference device.
//!
//! [`SoftDevice`] implements both [`GraphicsBackend`] and [`ComputeBackend`]
//! on plain host allocations. Graphics objects keep their bytes in
//! [`SharedMemory`], so compute wraps alias them exactly like a driver-level
//! interop would. It enforces the same rules a real device does:
//!
//! - wrapped handles are only readable/writable while acquired
//! - an object with live wraps cannot be reallocated
//! - allocations beyond the memory budget fail
//!
//! Counters and failure injection make it the device of choice for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{trace, warn};

use reprs_core::{Error, ReprKind, Result};

use super::device::{
    ComputeBackend, ComputeHandle, GraphicsBackend, ObjectDesc, ObjectId, SharedMemory,
};
use super::memory::{available_memory, format_bytes};

const NAME: &str = "soft";

/// Operation counters of a [`SoftDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Graphics objects and compute buffers allocated (including reallocations).
    pub allocations: u64,
    /// Host-to-device transfers.
    pub uploads: u64,
    /// Device-to-host transfers.
    pub downloads: u64,
    /// Device-to-device copies.
    pub copies: u64,
    /// Compute wraps created.
    pub wraps: u64,
    /// Compute buffers and wraps released.
    pub releases: u64,
    /// Acquire calls (one per scope, regardless of object count).
    pub acquires: u64,
}

struct SoftObject {
    desc: ObjectDesc,
    memory: SharedMemory,
}

enum SoftBuffer {
    Owned { data: Vec<u8> },
    Wrapped { memory: SharedMemory },
}

impl SoftBuffer {
    fn byte_size(&self) -> usize {
        match self {
            Self::Owned { data } => data.len(),
            Self::Wrapped { .. } => 0,
        }
    }
}

#[derive(Default)]
struct SoftState {
    next_id: u64,
    objects: HashMap<ObjectId, SoftObject>,
    buffers: HashMap<ComputeHandle, SoftBuffer>,
    acquired: HashSet<ComputeHandle>,
    used_bytes: u64,
    stats: DeviceStats,
    fail_allocations: u32,
    fail_acquires: u32,
}

impl SoftState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Reserve `bytes` of the budget, honoring injected failures.
    fn reserve(&mut self, budget: u64, kind: ReprKind, desc: &ObjectDesc) -> Result<()> {
        let bytes = desc.byte_size();
        if self.fail_allocations > 0 {
            self.fail_allocations -= 1;
            return Err(Error::AllocationFailed { kind, dims: desc.dims, bytes });
        }
        if self.used_bytes + bytes as u64 > budget {
            warn!(
                requested = %format_bytes(bytes as u64),
                used = %format_bytes(self.used_bytes),
                budget = %format_bytes(budget),
                "soft device out of memory"
            );
            return Err(Error::AllocationFailed { kind, dims: desc.dims, bytes });
        }
        self.used_bytes += bytes as u64;
        self.stats.allocations += 1;
        Ok(())
    }

    fn free(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes as u64);
    }

    fn object(&self, id: ObjectId) -> Result<&SoftObject> {
        self.objects.get(&id).ok_or(Error::unknown("graphics object", id.0))
    }

    fn live_wraps(&self, id: ObjectId) -> usize {
        self.buffers
            .values()
            .filter(|b| matches!(b, SoftBuffer::Wrapped { memory } if memory.object() == id))
            .count()
    }
}

/// Host-memory graphics + compute device.
pub struct SoftDevice {
    state: Mutex<SoftState>,
    budget: u64,
}

impl SoftDevice {
    /// Create with the default memory budget.
    pub fn new() -> Self {
        Self::with_budget(available_memory())
    }

    /// Create with an explicit memory budget in bytes.
    pub fn with_budget(budget: u64) -> Self {
        Self {
            state: Mutex::new(SoftState::default()),
            budget,
        }
    }

    /// Memory budget in bytes.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Bytes currently allocated.
    pub fn used_bytes(&self) -> u64 {
        self.state().used_bytes
    }

    /// Snapshot of operation counters.
    pub fn stats(&self) -> DeviceStats {
        self.state().stats
    }

    /// Number of live graphics objects.
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Number of live compute buffers and wraps.
    pub fn buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    /// Number of live wraps of `id`.
    pub fn wrap_count(&self, id: ObjectId) -> usize {
        self.state().live_wraps(id)
    }

    /// Whether `handle` is a live wrap aliasing the current allocation of its object.
    pub fn is_current_wrap(&self, handle: ComputeHandle) -> bool {
        let state = self.state();
        match state.buffers.get(&handle) {
            Some(SoftBuffer::Wrapped { memory }) => state
                .objects
                .get(&memory.object())
                .is_some_and(|obj| obj.memory.aliases(memory)),
            _ => false,
        }
    }

    /// Make the next `count` allocations fail.
    pub fn fail_next_allocations(&self, count: u32) {
        self.state().fail_allocations = count;
    }

    /// Make the next `count` acquire calls time out.
    pub fn fail_next_acquires(&self, count: u32) {
        self.state().fail_acquires = count;
    }

    fn state(&self) -> MutexGuard<'_, SoftState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for SoftDevice {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_object(&self, desc: &ObjectDesc, data: Option<&[u8]>) -> Result<ObjectId> {
        if let Some(data) = data {
            desc.check_len(data)?;
        }
        let mut state = self.state();
        state.reserve(self.budget, ReprKind::Graphics, desc)?;

        let id = ObjectId(state.next_id());
        let bytes = match data {
            Some(data) => {
                state.stats.uploads += 1;
                data.to_vec()
            }
            None => vec![0; desc.byte_size()],
        };
        state.objects.insert(id, SoftObject {
            desc: *desc,
            memory: SharedMemory::new(id, 0, bytes),
        });
        trace!(%id, dims = %desc.dims, format = %desc.format, "soft: create object");
        Ok(id)
    }

    fn reallocate(&self, id: ObjectId, desc: &ObjectDesc) -> Result<()> {
        let mut state = self.state();
        let wraps = state.live_wraps(id);
        if wraps > 0 {
            return Err(Error::contract(format!(
                "{id} reallocated while {wraps} compute wraps are alive"
            )));
        }
        let (old_size, generation) = {
            let obj = state.object(id)?;
            (obj.desc.byte_size(), obj.memory.generation())
        };
        state.free(old_size);
        if let Err(e) = state.reserve(self.budget, ReprKind::Graphics, desc) {
            // Keep the old allocation accounted; it is still alive.
            state.used_bytes += old_size as u64;
            return Err(e);
        }
        let obj = state
            .objects
            .get_mut(&id)
            .ok_or(Error::unknown("graphics object", id.0))?;
        obj.desc = *desc;
        obj.memory = SharedMemory::new(id, generation + 1, vec![0; desc.byte_size()]);
        trace!(%id, dims = %desc.dims, generation = generation + 1, "soft: reallocate object");
        Ok(())
    }

    fn upload(&self, id: ObjectId, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        let obj = state.object(id)?;
        obj.desc.check_len(data)?;
        obj.memory.write(data)?;
        state.stats.uploads += 1;
        Ok(())
    }

    fn download(&self, id: ObjectId) -> Result<Vec<u8>> {
        let mut state = self.state();
        let data = state.object(id)?.memory.read();
        state.stats.downloads += 1;
        Ok(data)
    }

    fn copy_object(&self, src: ObjectId, dst: ObjectId) -> Result<()> {
        let mut state = self.state();
        let data = state.object(src)?.memory.read();
        state.object(dst)?.memory.write(&data)?;
        state.stats.copies += 1;
        Ok(())
    }

    fn destroy_object(&self, id: ObjectId) {
        let mut state = self.state();
        let wraps = state.live_wraps(id);
        if wraps > 0 {
            warn!(%id, wraps, "soft: destroying graphics object with live compute wraps");
        }
        if let Some(obj) = state.objects.remove(&id) {
            state.free(obj.desc.byte_size());
            trace!(%id, "soft: destroy object");
        }
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }

    fn export_shared(&self, id: ObjectId) -> Result<SharedMemory> {
        Ok(self.state().object(id)?.memory.clone())
    }
}

impl ComputeBackend for SoftDevice {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_buffer(&self, desc: &ObjectDesc, data: Option<&[u8]>) -> Result<ComputeHandle> {
        if let Some(data) = data {
            desc.check_len(data)?;
        }
        let mut state = self.state();
        state.reserve(self.budget, ReprKind::Compute, desc)?;

        let handle = ComputeHandle(state.next_id());
        let data = match data {
            Some(data) => {
                state.stats.uploads += 1;
                data.to_vec()
            }
            None => vec![0; desc.byte_size()],
        };
        state.buffers.insert(handle, SoftBuffer::Owned { data });
        trace!(%handle, dims = %desc.dims, "soft: create buffer");
        Ok(handle)
    }

    fn write_buffer(&self, handle: ComputeHandle, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        let acquired = state.acquired.contains(&handle);
        match state.buffers.get_mut(&handle) {
            Some(SoftBuffer::Owned { data: dst }) => {
                if dst.len() != data.len() {
                    return Err(Error::SizeMismatch { expected: dst.len(), actual: data.len() });
                }
                dst.copy_from_slice(data);
            }
            Some(SoftBuffer::Wrapped { memory }) => {
                if !acquired {
                    return Err(Error::NotAcquired(handle.0));
                }
                memory.write(data)?;
            }
            None => return Err(Error::unknown("compute buffer", handle.0)),
        }
        state.stats.uploads += 1;
        Ok(())
    }

    fn read_buffer(&self, handle: ComputeHandle) -> Result<Vec<u8>> {
        let mut state = self.state();
        let data = match state.buffers.get(&handle) {
            Some(SoftBuffer::Owned { data }) => data.clone(),
            Some(SoftBuffer::Wrapped { memory }) => {
                if !state.acquired.contains(&handle) {
                    return Err(Error::NotAcquired(handle.0));
                }
                memory.read()
            }
            None => return Err(Error::unknown("compute buffer", handle.0)),
        };
        state.stats.downloads += 1;
        Ok(data)
    }

    fn release_buffer(&self, handle: ComputeHandle) {
        let mut state = self.state();
        if let Some(buffer) = state.buffers.remove(&handle) {
            state.free(buffer.byte_size());
            state.acquired.remove(&handle);
            state.stats.releases += 1;
            trace!(%handle, "soft: release buffer");
        }
    }

    fn wrap_shared(&self, memory: &SharedMemory) -> Result<ComputeHandle> {
        let mut state = self.state();
        let current = state.object(memory.object())?;
        if !current.memory.aliases(memory) {
            return Err(Error::backend(
                NAME,
                "wrap",
                format!(
                    "stale export of {} (generation {}, current {})",
                    memory.object(),
                    memory.generation(),
                    current.memory.generation()
                ),
            ));
        }
        let handle = ComputeHandle(state.next_id());
        state.buffers.insert(handle, SoftBuffer::Wrapped { memory: memory.clone() });
        state.stats.wraps += 1;
        trace!(%handle, object = %memory.object(), "soft: wrap shared object");
        Ok(handle)
    }

    fn acquire_shared(&self, handles: &[ComputeHandle], timeout: Duration) -> Result<()> {
        let mut state = self.state();
        if state.fail_acquires > 0 {
            state.fail_acquires -= 1;
            return Err(Error::AcquireTimeout {
                count: handles.len(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        for handle in handles {
            match state.buffers.get(handle) {
                Some(SoftBuffer::Wrapped { .. }) => {}
                Some(SoftBuffer::Owned { .. }) => {
                    return Err(Error::backend(
                        NAME,
                        "acquire",
                        format!("{handle} is not a shared object"),
                    ));
                }
                None => return Err(Error::unknown("compute buffer", handle.0)),
            }
            if state.acquired.contains(handle) {
                return Err(Error::backend(NAME, "acquire", format!("{handle} already acquired")));
            }
        }
        state.acquired.extend(handles.iter().copied());
        state.stats.acquires += 1;
        Ok(())
    }

    fn release_shared(&self, handles: &[ComputeHandle]) -> Result<()> {
        let mut state = self.state();
        let mut missing = Vec::new();
        for handle in handles {
            if !state.acquired.remove(handle) {
                missing.push(handle.0);
            }
        }
        if !missing.is_empty() {
            return Err(Error::backend(
                NAME,
                "release",
                format!("handles not acquired: {missing:?}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprs_core::{DataFormat, Dimensions};

    fn desc(w: u32, h: u32) -> ObjectDesc {
        ObjectDesc::new(Dimensions::layer(w, h), DataFormat::VEC4_U8)
    }

    #[test]
    fn test_object_roundtrip() {
        let dev = SoftDevice::with_budget(1 << 20);
        let data: Vec<u8> = (0..16).collect();
        let id = dev.create_object(&desc(2, 2), Some(&data)).unwrap();
        assert_eq!(dev.download(id).unwrap(), data);
        assert_eq!(dev.stats().allocations, 1);
        assert_eq!(dev.used_bytes(), 16);

        dev.destroy_object(id);
        assert_eq!(dev.object_count(), 0);
        assert_eq!(dev.used_bytes(), 0);
    }

    #[test]
    fn test_budget_exceeded() {
        let dev = SoftDevice::with_budget(32);
        dev.create_object(&desc(2, 2), None).unwrap();
        dev.create_object(&desc(2, 2), None).unwrap();
        let err = dev.create_object(&desc(2, 2), None).unwrap_err();
        assert!(matches!(err, Error::AllocationFailed { kind: ReprKind::Graphics, bytes: 16, .. }));
    }

    #[test]
    fn test_injected_allocation_failure() {
        let dev = SoftDevice::with_budget(1 << 20);
        dev.fail_next_allocations(1);
        assert!(ComputeBackend::create_buffer(&dev, &desc(1, 1), None).is_err());
        assert!(ComputeBackend::create_buffer(&dev, &desc(1, 1), None).is_ok());
    }

    #[test]
    fn test_wrap_requires_acquire() {
        let dev = SoftDevice::with_budget(1 << 20);
        let id = dev.create_object(&desc(1, 1), Some(&[1, 2, 3, 4])).unwrap();
        let shared = dev.export_shared(id).unwrap();
        let h = dev.wrap_shared(&shared).unwrap();

        assert!(matches!(dev.read_buffer(h), Err(Error::NotAcquired(_))));

        dev.acquire_shared(&[h], Duration::from_millis(10)).unwrap();
        assert_eq!(dev.read_buffer(h).unwrap(), vec![1, 2, 3, 4]);
        dev.write_buffer(h, &[9, 9, 9, 9]).unwrap();
        dev.release_shared(&[h]).unwrap();

        // Zero copy: the graphics object sees the compute write.
        assert_eq!(dev.download(id).unwrap(), vec![9, 9, 9, 9]);
        assert!(dev.release_shared(&[h]).is_err());
    }

    #[test]
    fn test_reallocate_with_live_wrap_is_contract_violation() {
        let dev = SoftDevice::with_budget(1 << 20);
        let id = dev.create_object(&desc(1, 1), None).unwrap();
        let h = dev.wrap_shared(&dev.export_shared(id).unwrap()).unwrap();

        let err = dev.reallocate(id, &desc(2, 2)).unwrap_err();
        assert!(!err.is_recoverable());

        dev.release_buffer(h);
        dev.reallocate(id, &desc(2, 2)).unwrap();
        assert_eq!(dev.download(id).unwrap().len(), 16);
    }

    #[test]
    fn test_stale_export_rejected() {
        let dev = SoftDevice::with_budget(1 << 20);
        let id = dev.create_object(&desc(1, 1), None).unwrap();
        let old = dev.export_shared(id).unwrap();
        dev.reallocate(id, &desc(1, 1)).unwrap();
        assert!(dev.wrap_shared(&old).is_err());

        let h = dev.wrap_shared(&dev.export_shared(id).unwrap()).unwrap();
        assert!(dev.is_current_wrap(h));
    }

    #[test]
    fn test_acquire_timeout_injection() {
        let dev = SoftDevice::with_budget(1 << 20);
        let id = dev.create_object(&desc(1, 1), None).unwrap();
        let h = dev.wrap_shared(&dev.export_shared(id).unwrap()).unwrap();
        dev.fail_next_acquires(1);
        let err = dev.acquire_shared(&[h], Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, Error::AcquireTimeout { count: 1, timeout_ms: 5 }));
        dev.acquire_shared(&[h], Duration::from_millis(5)).unwrap();
        assert_eq!(dev.stats().acquires, 1);
    }
}
