//! # reprs-engine
//!
//! Keeps one logical datum materialized in several backend forms at once
//! (host memory, graphics objects, compute buffers, zero-copy interop wraps)
//! and converts between them on demand.
//!
//! ## Architecture
//!
//! ```text
//! Representable ----------- one datum: authoritative repr + cached reprs
//!     |
//!     +-- ConverterRegistry - converter graph, uniform-cost path search
//!     |       +-- RepresentationConverter (Disk->Ram, Ram<->Graphics, ...)
//!     |       +-- ConverterPackage        (Ram=>Graphics=>Interop, ...)
//!     |
//!     +-- EngineContext ----- devices + SharingRegistry + EngineConfig
//!             +-- GraphicsBackend / ComputeBackend (reprs-backend)
//!             +-- SharingRegistry (refcounted compute wraps)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reprs_core::{DataFormat, Dimensions, ReprKind};
//! use reprs_engine::{
//!     ConverterRegistry, EngineConfig, EngineContext, GraphicsRepr, RamRepr, Representable,
//! };
//!
//! let ctx = EngineContext::soft(EngineConfig::default());
//! let registry = Arc::new(ConverterRegistry::with_defaults()?);
//! let ram = RamRepr::from_bytes(Dimensions::buffer(4), DataFormat::U8, &[1, 2, 3, 4])?;
//! let mut data = Representable::from_repr(ram, registry, ctx);
//!
//! let gfx = data.representation::<GraphicsRepr>()?.expect("ram -> graphics");
//! assert_eq!(gfx.download()?, vec![1, 2, 3, 4]);
//! assert_eq!(data.authoritative_kind(), ReprKind::Ram);
//! # Ok::<(), reprs_core::Error>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod converter;
pub mod converters;
pub mod registry;
pub mod repr;
pub mod representable;
pub mod representation;
pub mod sharing;
pub mod sync;

pub use config::{EngineConfig, SourceOrder};
pub use context::EngineContext;
pub use converter::{ConverterPackage, RepresentationConverter};
pub use registry::{ConversionPath, ConverterRegistry, PathCacheStats};
pub use repr::{
    ComputeRepr, DataLoader, DiskRepr, GraphicsObject, GraphicsRepr, InteropRepr, MemoryLoader,
    ObserverToken, RamBuffer, RamRepr, RawFileLoader, ReinitObserver,
};
pub use representable::{Representable, RepresentableStats};
pub use representation::{AsAny, DataRepresentation, TypedRepresentation};
pub use sharing::{SharingEntry, SharingRegistry};
pub use sync::{AcquiredScope, SharedAccess, SharedObject, with_shared};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        ConverterRegistry, DataRepresentation, EngineConfig, EngineContext, GraphicsRepr,
        InteropRepr, RamRepr, Representable, SharedAccess, TypedRepresentation,
    };
    pub use reprs_core::prelude::*;
}

/// Build a context on `backend` and the default converter registry.
pub fn init(
    backend: reprs_backend::Backend,
    config: EngineConfig,
) -> reprs_core::Result<(EngineContext, std::sync::Arc<ConverterRegistry>)> {
    let registry = ConverterRegistry::with_defaults()?.with_path_cache(config.path_cache);
    let ctx = EngineContext::from_backend(backend, config)?;
    Ok((ctx, std::sync::Arc::new(registry)))
}
