//! wgpu graphics device.
//!
//! Graphics objects are storage buffers on a wgpu device. Downloads go
//! through a staging buffer and block on `map_async`. wgpu exposes no
//! external-memory export, so `export_shared` keeps the trait default and
//! interop conversions report `Unsupported`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;
use wgpu::util::DeviceExt;

use reprs_core::{Error, ReprKind, Result};

use super::device::{GraphicsBackend, ObjectDesc, ObjectId};

const NAME: &str = "wgpu";

/// Buffer copies and mapped sizes must be multiples of this.
const ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

fn padded(size: usize) -> u64 {
    let size = size as u64;
    size.div_ceil(ALIGN) * ALIGN
}

struct WgpuObject {
    buffer: wgpu::Buffer,
    desc: ObjectDesc,
}

/// wgpu graphics backend.
pub struct WgpuGraphics {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    objects: Mutex<HashMap<ObjectId, WgpuObject>>,
    next_id: AtomicU64,
    max_buffer_bytes: u64,
}

impl WgpuGraphics {
    /// Check if a wgpu adapter is available.
    pub fn is_available() -> bool {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .is_some()
        })
    }

    /// Create a device on the best adapter.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Create a device on the best adapter asynchronously.
    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::backend(NAME, "init", "no suitable adapter"))?;

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("reprs_graphics_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| Error::backend(NAME, "init", e.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            objects: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_buffer_bytes: adapter_limits.max_buffer_size,
        })
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<ObjectId, WgpuObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self, desc: &ObjectDesc, data: Option<&[u8]>) -> Result<wgpu::Buffer> {
        let size = padded(desc.byte_size());
        if size > self.max_buffer_bytes {
            return Err(Error::AllocationFailed {
                kind: ReprKind::Graphics,
                dims: desc.dims,
                bytes: desc.byte_size(),
            });
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let buffer = match data {
            Some(data) => {
                let mut contents = data.to_vec();
                contents.resize(size as usize, 0);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("graphics_object"),
                    contents: &contents,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("graphics_object"),
                size,
                usage,
                mapped_at_creation: false,
            }),
        };
        Ok(buffer)
    }
}

impl GraphicsBackend for WgpuGraphics {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_object(&self, desc: &ObjectDesc, data: Option<&[u8]>) -> Result<ObjectId> {
        if let Some(data) = data {
            desc.check_len(data)?;
        }
        let buffer = self.allocate(desc, data)?;
        let id = ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.objects().insert(id, WgpuObject { buffer, desc: *desc });
        trace!(%id, dims = %desc.dims, "wgpu: create object");
        Ok(id)
    }

    fn reallocate(&self, id: ObjectId, desc: &ObjectDesc) -> Result<()> {
        let buffer = self.allocate(desc, None)?;
        let mut objects = self.objects();
        let obj = objects.get_mut(&id).ok_or(Error::unknown("graphics object", id.0))?;
        obj.buffer.destroy();
        obj.buffer = buffer;
        obj.desc = *desc;
        Ok(())
    }

    fn upload(&self, id: ObjectId, data: &[u8]) -> Result<()> {
        let objects = self.objects();
        let obj = objects.get(&id).ok_or(Error::unknown("graphics object", id.0))?;
        obj.desc.check_len(data)?;
        let mut contents = data.to_vec();
        contents.resize(padded(data.len()) as usize, 0);
        self.queue.write_buffer(&obj.buffer, 0, &contents);
        self.queue.submit(std::iter::empty());
        Ok(())
    }

    fn download(&self, id: ObjectId) -> Result<Vec<u8>> {
        let objects = self.objects();
        let obj = objects.get(&id).ok_or(Error::unknown("graphics object", id.0))?;
        let len = obj.desc.byte_size();
        let size = padded(len);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(&obj.buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| Error::backend(NAME, "download", "map channel closed"))?
            .map_err(|e| Error::backend(NAME, "download", format!("map failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let mut result = mapped.to_vec();
        drop(mapped);
        staging.unmap();

        result.truncate(len);
        Ok(result)
    }

    fn copy_object(&self, src: ObjectId, dst: ObjectId) -> Result<()> {
        let objects = self.objects();
        let s = objects.get(&src).ok_or(Error::unknown("graphics object", src.0))?;
        let d = objects.get(&dst).ok_or(Error::unknown("graphics object", dst.0))?;
        if s.desc.byte_size() != d.desc.byte_size() {
            return Err(Error::SizeMismatch {
                expected: d.desc.byte_size(),
                actual: s.desc.byte_size(),
            });
        }
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(&s.buffer, 0, &d.buffer, 0, padded(s.desc.byte_size()));
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn destroy_object(&self, id: ObjectId) {
        if let Some(obj) = self.objects().remove(&id) {
            obj.buffer.destroy();
        }
    }

    fn finish(&self) -> Result<()> {
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
