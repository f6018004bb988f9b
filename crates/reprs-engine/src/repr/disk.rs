//! Disk-backed representation.
//!
//! A [`DiskRepr`] holds no data, only a [`DataLoader`] that knows how to
//! produce the bytes. The Disk -> RAM converter invokes it on demand.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use reprs_core::{DataFormat, Dimensions, Error, ReprKind, Result};

use crate::context::EngineContext;
use crate::representation::{AsAny, DataRepresentation, TypedRepresentation};

/// Source of raw bytes for a disk representation.
pub trait DataLoader: Send + Sync {
    /// Read exactly `len` bytes.
    fn load(&self, len: usize) -> Result<Vec<u8>>;

    /// Human-readable origin.
    fn describe(&self) -> String;
}

/// Raw file with a header of `offset` bytes.
#[derive(Debug, Clone)]
pub struct RawFileLoader {
    path: PathBuf,
    offset: u64,
}

impl RawFileLoader {
    /// Loader reading from the start of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    /// Skip `offset` bytes before the data.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataLoader for RawFileLoader {
    fn load(&self, len: usize) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut data = vec![0; len];
        file.read_exact(&mut data)?;
        debug!(path = %self.path.display(), offset = self.offset, len, "loaded raw data");
        Ok(data)
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path.display(), self.offset)
    }
}

/// In-memory blob, for generated data and tests.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    bytes: Arc<[u8]>,
}

impl MemoryLoader {
    /// Loader over `bytes`.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { bytes: bytes.into() }
    }
}

impl DataLoader for MemoryLoader {
    fn load(&self, len: usize) -> Result<Vec<u8>> {
        if self.bytes.len() != len {
            return Err(Error::SizeMismatch {
                expected: len,
                actual: self.bytes.len(),
            });
        }
        Ok(self.bytes.to_vec())
    }

    fn describe(&self) -> String {
        format!("memory[{}]", self.bytes.len())
    }
}

/// Lazily loaded data.
#[derive(Clone)]
pub struct DiskRepr {
    loader: Arc<dyn DataLoader>,
    dims: Dimensions,
    format: DataFormat,
}

impl DiskRepr {
    /// Disk representation read through `loader`.
    pub fn new(loader: Arc<dyn DataLoader>, dims: Dimensions, format: DataFormat) -> Self {
        Self { loader, dims, format }
    }

    /// Raw file at `path`.
    pub fn raw_file(path: impl Into<PathBuf>, dims: Dimensions, format: DataFormat) -> Self {
        Self::new(Arc::new(RawFileLoader::new(path)), dims, format)
    }

    /// Read the full contents.
    pub fn load(&self) -> Result<Vec<u8>> {
        self.loader.load(self.byte_size())
    }

    /// Loader origin.
    pub fn source(&self) -> String {
        self.loader.describe()
    }
}

impl std::fmt::Debug for DiskRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskRepr")
            .field("source", &self.loader.describe())
            .field("dims", &self.dims)
            .field("format", &self.format)
            .finish()
    }
}

impl AsAny for DiskRepr {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl DataRepresentation for DiskRepr {
    fn kind(&self) -> ReprKind {
        ReprKind::Disk
    }

    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn format(&self) -> DataFormat {
        self.format
    }

    fn duplicate(&self, _ctx: &EngineContext) -> Result<Box<dyn DataRepresentation>> {
        Ok(Box::new(self.clone()))
    }
}

impl TypedRepresentation for DiskRepr {
    const KIND: ReprKind = ReprKind::Disk;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_raw_file_offset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xAA, 0xBB, 1, 2, 3, 4]).unwrap();

        let loader = RawFileLoader::new(file.path()).with_offset(2);
        let disk = DiskRepr::new(Arc::new(loader), Dimensions::buffer(4), DataFormat::U8);
        assert_eq!(disk.load().unwrap(), vec![1, 2, 3, 4]);
        assert!(disk.source().ends_with("@2"));
    }

    #[test]
    fn test_short_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2]).unwrap();
        let disk = DiskRepr::raw_file(file.path(), Dimensions::buffer(4), DataFormat::U8);
        assert!(matches!(disk.load(), Err(Error::Io(_))));
    }

    #[test]
    fn test_memory_loader() {
        let disk = DiskRepr::new(
            Arc::new(MemoryLoader::new(vec![1u8, 2, 3, 4])),
            Dimensions::buffer(2),
            DataFormat::U16,
        );
        assert_eq!(disk.load().unwrap(), vec![1, 2, 3, 4]);

        let short = Arc::new(MemoryLoader::new(vec![1u8]));
        let wrong = DiskRepr::new(short, Dimensions::buffer(2), DataFormat::U8);
        assert!(matches!(wrong.load(), Err(Error::SizeMismatch { expected: 2, actual: 1 })));
    }
}
