//! Element formats.
//!
//! This module provides the canonical definitions for element data formats
//! shared by every representation of a datum.
//!
//! # Types
//!
//! - [`ScalarType`] - Runtime scalar type (U8, U16, U32, F16, F32)
//! - [`DataFormat`] - Scalar type plus component count (1-4)
//!
//! # Usage
//!
//! ```rust
//! use reprs_core::format::{DataFormat, ScalarType};
//!
//! let rgba8 = DataFormat::VEC4_U8;
//! assert_eq!(rgba8.bytes_per_element(), 4);
//!
//! let parsed: DataFormat = "vec3f32".parse().unwrap();
//! assert_eq!(parsed, DataFormat::new(ScalarType::F32, 3));
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Runtime scalar storage type.
///
/// Only byte-aligned types are representable; every backend can store them
/// without repacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// 8-bit unsigned integer.
    #[default]
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 16-bit half-precision float.
    F16,
    /// 32-bit single-precision float.
    F32,
}

impl ScalarType {
    /// All scalar types in declaration order.
    pub const ALL: [ScalarType; 5] = [Self::U8, Self::U16, Self::U32, Self::F16, Self::F32];

    /// Number of bytes per scalar.
    #[inline]
    pub const fn bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::F16 => 2,
            Self::F32 => 4,
        }
    }

    /// Number of bits per scalar.
    #[inline]
    pub const fn bits(&self) -> u32 {
        (self.bytes() * 8) as u32
    }

    /// Whether this is a floating-point type.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    /// Whether this is an integer type.
    #[inline]
    pub const fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Normalization factor for converting to [0, 1] float range.
    #[inline]
    pub fn normalize_factor(&self) -> f32 {
        match self {
            Self::U8 => 255.0,
            Self::U16 => 65535.0,
            Self::U32 => 4294967295.0,
            Self::F16 | Self::F32 => 1.0,
        }
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::F16 => "f16",
            Self::F32 => "f32",
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScalarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown scalar type '{s}'")))
    }
}

/// Element format of a datum: a scalar type and 1 to 4 components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFormat {
    /// Scalar storage type.
    pub scalar: ScalarType,
    /// Components per element (1-4).
    pub components: u8,
}

impl DataFormat {
    /// Single 8-bit unsigned scalar.
    pub const U8: Self = Self::new(ScalarType::U8, 1);
    /// RGBA 8-bit unsigned.
    pub const VEC4_U8: Self = Self::new(ScalarType::U8, 4);
    /// Single 16-bit unsigned scalar.
    pub const U16: Self = Self::new(ScalarType::U16, 1);
    /// Single 32-bit unsigned scalar.
    pub const U32: Self = Self::new(ScalarType::U32, 1);
    /// Single half float.
    pub const F16: Self = Self::new(ScalarType::F16, 1);
    /// RGBA half float.
    pub const VEC4_F16: Self = Self::new(ScalarType::F16, 4);
    /// Single float.
    pub const F32: Self = Self::new(ScalarType::F32, 1);
    /// RGB float.
    pub const VEC3_F32: Self = Self::new(ScalarType::F32, 3);
    /// RGBA float.
    pub const VEC4_F32: Self = Self::new(ScalarType::F32, 4);

    /// Creates a format. Component count is clamped to 1-4.
    #[inline]
    pub const fn new(scalar: ScalarType, components: u8) -> Self {
        let components = if components == 0 {
            1
        } else if components > 4 {
            4
        } else {
            components
        };
        Self { scalar, components }
    }

    /// Bytes per element (all components).
    #[inline]
    pub const fn bytes_per_element(&self) -> usize {
        self.scalar.bytes() * self.components as usize
    }

    /// Whether the scalar type is floating point.
    #[inline]
    pub const fn is_float(&self) -> bool {
        self.scalar.is_float()
    }
}

impl Default for DataFormat {
    fn default() -> Self {
        Self::VEC4_U8
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.components == 1 {
            write!(f, "{}", self.scalar)
        } else {
            write!(f, "vec{}{}", self.components, self.scalar)
        }
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    /// Parses "f32", "u8", "vec4u8", "vec3f32", ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.strip_prefix("vec") {
            Some(rest) => {
                let mut chars = rest.chars();
                let components = chars
                    .next()
                    .and_then(|c| c.to_digit(10))
                    .filter(|n| (2..=4).contains(n))
                    .ok_or_else(|| Error::InvalidArgument(format!("invalid format '{s}'")))?;
                let scalar = chars.as_str().parse()?;
                Ok(Self::new(scalar, components as u8))
            }
            None => Ok(Self::new(lower.parse()?, 1)),
        }
    }
}
