//! Concrete representations, one per [`ReprKind`](reprs_core::ReprKind).

mod compute;
mod disk;
mod graphics;
mod interop;
mod ram;

pub use compute::ComputeRepr;
pub use disk::{DataLoader, DiskRepr, MemoryLoader, RawFileLoader};
pub use graphics::{GraphicsObject, GraphicsRepr, ObserverToken, ReinitObserver};
pub use interop::InteropRepr;
pub use ram::{RamBuffer, RamRepr};
