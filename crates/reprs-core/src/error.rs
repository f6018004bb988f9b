//! Error types for reprs operations.
//!
//! A single [`Error`] enum covers the three failure families of the engine:
//!
//! - **Missing conversion path**: [`PathNotFound`](Error::PathNotFound). The
//!   `Representable` absorbs it and hands out an empty handle instead.
//! - **Backend failures**: [`Backend`](Error::Backend),
//!   [`AllocationFailed`](Error::AllocationFailed),
//!   [`AcquireTimeout`](Error::AcquireTimeout),
//!   [`NotAcquired`](Error::NotAcquired). Recoverable; the failed operation
//!   leaves nothing marked valid.
//! - **Contract violations**: [`ContractViolation`](Error::ContractViolation).
//!   A programming defect such as reallocating a graphics object that still
//!   has live compute wraps outside the reinitialization protocol.
//!
//! # Usage
//!
//! ```rust
//! use reprs_core::{Error, ReprKind, Result};
//!
//! fn require_path(found: bool) -> Result<()> {
//!     if !found {
//!         return Err(Error::PathNotFound {
//!             sources: "{ram}".into(),
//!             target: ReprKind::Interop,
//!         });
//!     }
//!     Ok(())
//! }
//! assert!(require_path(false).unwrap_err().is_recoverable());
//! ```

use thiserror::Error;

use crate::dims::Dimensions;
use crate::kind::ReprKind;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by representations, converters and backends.
#[derive(Debug, Error)]
pub enum Error {
    /// No converter chain connects an available kind to the requested kind.
    #[error("no conversion path from {sources} to {target}")]
    PathNotFound {
        /// Valid source kinds that were searched.
        sources: String,
        /// Requested kind.
        target: ReprKind,
    },

    /// A graphics or compute device rejected an operation.
    #[error("{backend} {op} failed: {message}")]
    Backend {
        /// Backend name.
        backend: &'static str,
        /// Operation that failed.
        op: &'static str,
        /// Device-provided message.
        message: String,
    },

    /// Device memory could not be allocated.
    #[error("failed to allocate {bytes} bytes for {kind} representation {dims}")]
    AllocationFailed {
        /// Kind of the representation being created.
        kind: ReprKind,
        /// Requested dimensions.
        dims: Dimensions,
        /// Requested size.
        bytes: usize,
    },

    /// Shared objects could not be acquired before the timeout expired.
    #[error("acquiring {count} shared objects timed out after {timeout_ms} ms")]
    AcquireTimeout {
        /// Number of objects in the acquire scope.
        count: usize,
        /// Timeout that expired.
        timeout_ms: u64,
    },

    /// A wrapped handle was touched outside an acquire scope.
    #[error("shared compute handle {0} used without being acquired")]
    NotAcquired(u64),

    /// Engine contract broken by the caller; not recoverable at runtime.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Data size does not match the destination.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Expected byte count.
        expected: usize,
        /// Provided byte count.
        actual: usize,
    },

    /// A representation had a different kind than the converter expected.
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        /// Expected kind.
        expected: ReprKind,
        /// Actual kind.
        actual: ReprKind,
    },

    /// Operation not supported by this backend or representation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Backend object or handle id is unknown (already destroyed).
    #[error("unknown {what} {id}")]
    UnknownObject {
        /// Object category.
        what: &'static str,
        /// Raw id.
        id: u64,
    },

    /// Converter package chain is malformed.
    #[error("invalid converter package: {0}")]
    InvalidPackage(String),

    /// Operation requires a valid representation that does not exist.
    #[error("no valid representation: {0}")]
    NoValidRepresentation(String),

    /// Invalid argument (parse errors, out-of-range values).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error while loading disk-backed data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Creates an [`Error::Backend`] error.
    #[inline]
    pub fn backend(backend: &'static str, op: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            op,
            message: message.into(),
        }
    }

    /// Creates an [`Error::UnknownObject`] error.
    #[inline]
    pub fn unknown(what: &'static str, id: u64) -> Self {
        Self::UnknownObject { what, id }
    }

    /// Creates an [`Error::ContractViolation`] error.
    #[inline]
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    /// Whether the caller can continue after this error.
    ///
    /// Contract violations indicate a programming defect and are the only
    /// unrecoverable category.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ContractViolation(_))
    }

    /// Whether this is a device-side failure (backend, allocation, acquire).
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. }
                | Self::AllocationFailed { .. }
                | Self::AcquireTimeout { .. }
                | Self::NotAcquired(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::AllocationFailed {
            kind: ReprKind::Graphics,
            dims: Dimensions::layer(64, 64),
            bytes: 16384,
        };
        let msg = err.to_string();
        assert!(msg.contains("graphics"));
        assert!(msg.contains("64x64x1"));
        assert!(msg.contains("16384"));
    }

    #[test]
    fn test_categories() {
        assert!(!Error::contract("resize with live wraps").is_recoverable());
        assert!(Error::backend("soft", "upload", "lost").is_recoverable());
        assert!(Error::backend("soft", "upload", "lost").is_backend_failure());
        assert!(Error::NotAcquired(3).is_backend_failure());
        assert!(!Error::unknown("object", 1).is_backend_failure());
    }

    #[test]
    fn test_io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.raw");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
