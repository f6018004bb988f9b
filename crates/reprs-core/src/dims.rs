//! Dimensions of a datum.
//!
//! Buffers, layers and volumes share one 3D extent type. A buffer of `n`
//! elements is `n x 1 x 1`, an image layer is `w x h x 1`.

use std::str::FromStr;

use glam::UVec3;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::format::DataFormat;

/// 3D extent of a datum in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions(pub UVec3);

impl Dimensions {
    /// 1D buffer of `len` elements.
    #[inline]
    pub const fn buffer(len: u32) -> Self {
        Self(UVec3::new(len, 1, 1))
    }

    /// 2D layer.
    #[inline]
    pub const fn layer(width: u32, height: u32) -> Self {
        Self(UVec3::new(width, height, 1))
    }

    /// 3D volume.
    #[inline]
    pub const fn volume(x: u32, y: u32, z: u32) -> Self {
        Self(UVec3::new(x, y, z))
    }

    /// Width (x extent).
    #[inline]
    pub const fn width(&self) -> u32 {
        self.0.x
    }

    /// Height (y extent).
    #[inline]
    pub const fn height(&self) -> u32 {
        self.0.y
    }

    /// Depth (z extent).
    #[inline]
    pub const fn depth(&self) -> u32 {
        self.0.z
    }

    /// Underlying vector.
    #[inline]
    pub const fn as_uvec3(&self) -> UVec3 {
        self.0
    }

    /// Total number of elements.
    #[inline]
    pub fn element_count(&self) -> usize {
        (self.0.x as usize) * (self.0.y as usize) * (self.0.z as usize)
    }

    /// Storage size in bytes for `format`.
    #[inline]
    pub fn byte_size(&self, format: DataFormat) -> usize {
        self.element_count() * format.bytes_per_element()
    }

    /// Whether any extent is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }

    /// Number of dimensions with extent greater than one (at least 1).
    pub fn rank(&self) -> u32 {
        if self.0.z > 1 {
            3
        } else if self.0.y > 1 {
            2
        } else {
            1
        }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::buffer(0)
    }
}

impl From<UVec3> for Dimensions {
    fn from(v: UVec3) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.0.x, self.0.y, self.0.z)
    }
}

impl FromStr for Dimensions {
    type Err = Error;

    /// Parses "N", "WxH" or "XxYxZ".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(['x', 'X'])
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidArgument(format!("invalid dimensions '{s}': {e}")))?;
        match parts.as_slice() {
            [n] => Ok(Self::buffer(*n)),
            [w, h] => Ok(Self::layer(*w, *h)),
            [x, y, z] => Ok(Self::volume(*x, *y, *z)),
            _ => Err(Error::InvalidArgument(format!("invalid dimensions '{s}'"))),
        }
    }
}
