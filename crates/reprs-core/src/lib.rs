//! # reprs-core
//!
//! Core types shared by every reprs crate.
//!
//! - [`DataFormat`], [`ScalarType`] - element formats of a datum
//! - [`Dimensions`] - extent of a buffer, layer or volume
//! - [`ReprKind`], [`KindSet`] - closed enumeration of representation kinds
//! - [`Error`], [`Result`] - unified error handling
//!
//! ## Crate Structure
//!
//! ```text
//! reprs-core (this crate)
//!    ^
//!    |
//!    +-- reprs-backend (graphics / compute devices)
//!    +-- reprs-engine  (representations, converters, sharing)
//!    +-- reprs-cli
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod dims;
pub mod error;
pub mod format;
pub mod kind;

pub use dims::Dimensions;
pub use error::{Error, Result};
pub use format::{DataFormat, ScalarType};
pub use kind::{KindSet, ReprKind};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dims::Dimensions;
    pub use crate::error::{Error, Result};
    pub use crate::format::{DataFormat, ScalarType};
    pub use crate::kind::{KindSet, ReprKind};
}
