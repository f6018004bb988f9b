//! Device traits and handle types.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reprs_core::{DataFormat, Dimensions, Error, Result};

/// Identity of a graphics object on its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gfx#{}", self.0)
    }
}

/// Handle to a compute buffer or a compute wrap of a graphics object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputeHandle(pub u64);

impl std::fmt::Display for ComputeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmp#{}", self.0)
    }
}

/// Device object shape derived from dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectTarget {
    /// Linear buffer.
    Buffer,
    /// 2D texture.
    Texture2D,
    /// 3D texture.
    Texture3D,
}

/// Allocation description of a device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDesc {
    /// Extent in elements.
    pub dims: Dimensions,
    /// Element format.
    pub format: DataFormat,
}

impl ObjectDesc {
    /// Creates a description.
    pub const fn new(dims: Dimensions, format: DataFormat) -> Self {
        Self { dims, format }
    }

    /// Storage size in bytes.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.dims.byte_size(self.format)
    }

    /// Object shape for these dimensions.
    pub fn target(&self) -> ObjectTarget {
        match self.dims.rank() {
            1 => ObjectTarget::Buffer,
            2 => ObjectTarget::Texture2D,
            _ => ObjectTarget::Texture3D,
        }
    }

    /// Fails with [`Error::SizeMismatch`] unless `data` fills the object exactly.
    pub fn check_len(&self, data: &[u8]) -> Result<()> {
        let expected = self.byte_size();
        if data.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(())
    }
}

/// Exported storage of one allocation of a graphics object.
///
/// Each reallocation of the object produces a new generation with new
/// storage; a wrap of an older generation aliases freed memory.
#[derive(Clone)]
pub struct SharedMemory {
    object: ObjectId,
    generation: u64,
    store: Arc<RwLock<Vec<u8>>>,
}

impl SharedMemory {
    /// Creates exported storage for `object`.
    pub fn new(object: ObjectId, generation: u64, bytes: Vec<u8>) -> Self {
        Self {
            object,
            generation,
            store: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Owning graphics object.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Allocation generation of the owning object.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the contents out.
    pub fn read(&self) -> Vec<u8> {
        self.store.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Overwrites the contents. Length must match.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        if store.len() != data.len() {
            return Err(Error::SizeMismatch {
                expected: store.len(),
                actual: data.len(),
            });
        }
        store.copy_from_slice(data);
        Ok(())
    }

    /// Whether two exports alias the same storage.
    pub fn aliases(&self, other: &SharedMemory) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("object", &self.object)
            .field("generation", &self.generation)
            .field("len", &self.len())
            .finish()
    }
}

/// Graphics device: objects used for rendering.
///
/// All calls are issued from the thread owning the device context.
pub trait GraphicsBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Allocate an object, optionally initialized with `data`.
    fn create_object(&self, desc: &ObjectDesc, data: Option<&[u8]>) -> Result<ObjectId>;

    /// Replace the storage of an object with a new (zeroed) allocation.
    ///
    /// Must not be called while compute wraps of the object are alive.
    fn reallocate(&self, id: ObjectId, desc: &ObjectDesc) -> Result<()>;

    /// Upload the full contents of an object.
    fn upload(&self, id: ObjectId, data: &[u8]) -> Result<()>;

    /// Download the full contents of an object. Blocks until complete.
    fn download(&self, id: ObjectId) -> Result<Vec<u8>>;

    /// Copy the contents of `src` into `dst` (same size).
    fn copy_object(&self, src: ObjectId, dst: ObjectId) -> Result<()>;

    /// Destroy an object. Unknown ids are ignored.
    fn destroy_object(&self, id: ObjectId);

    /// Wait for all submitted work.
    fn finish(&self) -> Result<()>;

    /// Export the storage of an object for compute sharing.
    fn export_shared(&self, id: ObjectId) -> Result<SharedMemory> {
        Err(Error::Unsupported(format!(
            "{} cannot share {id} with a compute device",
            self.name()
        )))
    }
}

/// Compute device: plain buffers plus wraps of graphics objects.
pub trait ComputeBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Allocate a buffer, optionally initialized with `data`.
    fn create_buffer(&self, desc: &ObjectDesc, data: Option<&[u8]>) -> Result<ComputeHandle>;

    /// Overwrite a buffer. Wrapped handles must be acquired.
    fn write_buffer(&self, handle: ComputeHandle, data: &[u8]) -> Result<()>;

    /// Read a buffer. Blocks until complete. Wrapped handles must be acquired.
    fn read_buffer(&self, handle: ComputeHandle) -> Result<Vec<u8>>;

    /// Release a buffer or a wrap. Unknown handles are ignored.
    fn release_buffer(&self, handle: ComputeHandle);

    /// Wrap exported graphics storage without copying.
    fn wrap_shared(&self, memory: &SharedMemory) -> Result<ComputeHandle>;

    /// Acquire all wrapped handles in one synchronization point.
    fn acquire_shared(&self, handles: &[ComputeHandle], timeout: Duration) -> Result<()>;

    /// Hand all wrapped handles back to the graphics device.
    fn release_shared(&self, handles: &[ComputeHandle]) -> Result<()>;
}
