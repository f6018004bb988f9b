//! Host-memory representation.

use half::f16;
use rayon::prelude::*;

use reprs_core::{DataFormat, Dimensions, Error, ReprKind, Result, ScalarType};

use crate::context::EngineContext;
use crate::representation::{AsAny, DataRepresentation, TypedRepresentation};

/// Typed host storage.
#[derive(Debug, Clone, PartialEq)]
pub enum RamBuffer {
    /// 8-bit unsigned.
    U8(Vec<u8>),
    /// 16-bit unsigned.
    U16(Vec<u16>),
    /// 32-bit unsigned.
    U32(Vec<u32>),
    /// Half float.
    F16(Vec<f16>),
    /// Float.
    F32(Vec<f32>),
}

impl RamBuffer {
    /// Zeroed storage of `len` scalars.
    pub fn zeroed(scalar: ScalarType, len: usize) -> Self {
        match scalar {
            ScalarType::U8 => Self::U8(vec![0; len]),
            ScalarType::U16 => Self::U16(vec![0; len]),
            ScalarType::U32 => Self::U32(vec![0; len]),
            ScalarType::F16 => Self::F16(vec![f16::ZERO; len]),
            ScalarType::F32 => Self::F32(vec![0.0; len]),
        }
    }

    /// Scalar type of the storage.
    pub fn scalar(&self) -> ScalarType {
        match self {
            Self::U8(_) => ScalarType::U8,
            Self::U16(_) => ScalarType::U16,
            Self::U32(_) => ScalarType::U32,
            Self::F16(_) => ScalarType::F16,
            Self::F32(_) => ScalarType::F32,
        }
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    /// Whether the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes, native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U8(v) => v,
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::F16(v) => bytemuck::cast_slice(v),
            Self::F32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Mutable raw bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::U8(v) => v,
            Self::U16(v) => bytemuck::cast_slice_mut(v),
            Self::U32(v) => bytemuck::cast_slice_mut(v),
            Self::F16(v) => bytemuck::cast_slice_mut(v),
            Self::F32(v) => bytemuck::cast_slice_mut(v),
        }
    }

    /// Values as f32, integers normalized to [0, 1].
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Self::U8(v) => v.par_iter().map(|&x| x as f32 / 255.0).collect(),
            Self::U16(v) => v.par_iter().map(|&x| x as f32 / 65535.0).collect(),
            Self::U32(v) => v.par_iter().map(|&x| (x as f64 / u32::MAX as f64) as f32).collect(),
            Self::F16(v) => v.par_iter().map(|x| x.to_f32()).collect(),
            Self::F32(v) => v.clone(),
        }
    }
}

/// Host-memory array.
#[derive(Debug, Clone)]
pub struct RamRepr {
    dims: Dimensions,
    format: DataFormat,
    data: RamBuffer,
}

impl RamRepr {
    /// Zeroed array.
    pub fn new(dims: Dimensions, format: DataFormat) -> Self {
        let len = dims.element_count() * format.components as usize;
        Self {
            dims,
            format,
            data: RamBuffer::zeroed(format.scalar, len),
        }
    }

    /// Array initialized from raw bytes.
    pub fn from_bytes(dims: Dimensions, format: DataFormat, bytes: &[u8]) -> Result<Self> {
        let mut repr = Self::new(dims, format);
        repr.copy_from_bytes(bytes)?;
        Ok(repr)
    }

    /// Array wrapping existing typed storage.
    pub fn from_buffer(dims: Dimensions, components: u8, data: RamBuffer) -> Result<Self> {
        let format = DataFormat::new(data.scalar(), components);
        let expected = dims.element_count() * format.components as usize;
        if data.len() != expected {
            return Err(Error::SizeMismatch {
                expected: expected * format.scalar.bytes(),
                actual: data.len() * format.scalar.bytes(),
            });
        }
        Ok(Self { dims, format, data })
    }

    /// Typed storage.
    pub fn buffer(&self) -> &RamBuffer {
        &self.data
    }

    /// Mutable typed storage.
    pub fn buffer_mut(&mut self) -> &mut RamBuffer {
        &mut self.data
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Mutable raw bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_bytes_mut()
    }

    /// Overwrite all bytes. Length must match.
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let dst = self.data.as_bytes_mut();
        if dst.len() != bytes.len() {
            return Err(Error::SizeMismatch {
                expected: dst.len(),
                actual: bytes.len(),
            });
        }
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Values as f32, integers normalized to [0, 1].
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.to_f32()
    }

    /// Reallocate to new dimensions. Contents are zeroed.
    pub fn resize(&mut self, dims: Dimensions) {
        if dims != self.dims {
            *self = Self::new(dims, self.format);
        }
    }
}

impl AsAny for RamRepr {
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

impl DataRepresentation for RamRepr {
    fn kind(&self) -> ReprKind {
        ReprKind::Ram
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

impl TypedRepresentation for RamRepr {
    const KIND: ReprKind = ReprKind::Ram;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_byte_views() {
        let dims = Dimensions::buffer(2);
        let mut ram = RamRepr::new(dims, DataFormat::F32);
        assert_eq!(ram.as_bytes().len(), 8);
        ram.copy_from_bytes(&1.5f32.to_ne_bytes().repeat(2)).unwrap();
        assert_eq!(ram.buffer(), &RamBuffer::F32(vec![1.5, 1.5]));
        assert!(ram.copy_from_bytes(&[0; 7]).is_err());
    }

    #[test]
    fn test_half_storage() {
        let data = RamBuffer::F16(vec![f16::from_f32(0.25), f16::from_f32(-2.0)]);
        let ram = RamRepr::from_buffer(Dimensions::buffer(1), 2, data).unwrap();
        assert_eq!(ram.format(), DataFormat::new(ScalarType::F16, 2));
        assert_eq!(ram.byte_size(), 4);
        assert_eq!(ram.to_f32(), vec![0.25, -2.0]);
    }

    #[test]
    fn test_to_f32_normalizes() {
        let buffer = RamBuffer::U8(vec![0, 51, 255]);
        let ram = RamRepr::from_buffer(Dimensions::buffer(3), 1, buffer).unwrap();
        let values = ram.to_f32();
        assert_relative_eq!(values[0], 0.0);
        assert_relative_eq!(values[1], 0.2);
        assert_relative_eq!(values[2], 1.0);
    }

    #[test]
    fn test_from_buffer_size_check() {
        let buffer = RamBuffer::U16(vec![0; 8]);
        let err = RamRepr::from_buffer(Dimensions::layer(2, 2), 4, buffer).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 32, actual: 16 }));
    }

    #[test]
    fn test_resize_zeroes() {
        let mut ram = RamRepr::from_bytes(Dimensions::buffer(2), DataFormat::U8, &[7, 7]).unwrap();
        ram.resize(Dimensions::buffer(2));
        assert_eq!(ram.as_bytes(), &[7, 7]);
        ram.resize(Dimensions::layer(2, 2));
        assert_eq!(ram.as_bytes(), &[0; 4]);
    }
}
