//! The representation abstraction.

use reprs_core::{DataFormat, Dimensions, Error, ReprKind, Result};

use crate::context::EngineContext;

/// Helper trait for downcasting.
pub trait AsAny: 'static {
    /// Upcast to `Any`.
    fn as_any(&self) -> &dyn std::any::Any;
    /// Upcast to mutable `Any`.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// One backend-specific materialization of a datum.
pub trait DataRepresentation: Send + Sync + AsAny + 'static {
    /// Kind tag. Stable for the lifetime of the value.
    fn kind(&self) -> ReprKind;

    /// Extent in elements.
    fn dimensions(&self) -> Dimensions;

    /// Element format.
    fn format(&self) -> DataFormat;

    /// Storage size in bytes.
    fn byte_size(&self) -> usize {
        self.dimensions().byte_size(self.format())
    }

    /// Deep copy in the same kind.
    fn duplicate(&self, ctx: &EngineContext) -> Result<Box<dyn DataRepresentation>>;
}

/// Representation type with a statically known kind.
pub trait TypedRepresentation: DataRepresentation + Sized {
    /// Kind of every value of this type.
    const KIND: ReprKind;
}

impl dyn DataRepresentation {
    /// Downcast to a concrete representation.
    pub fn downcast_ref<T: TypedRepresentation>(&self) -> Result<&T> {
        let actual = self.kind();
        self.as_any()
            .downcast_ref::<T>()
            .ok_or(Error::KindMismatch { expected: T::KIND, actual })
    }

    /// Downcast to a mutable concrete representation.
    pub fn downcast_mut<T: TypedRepresentation>(&mut self) -> Result<&mut T> {
        let actual = self.kind();
        self.as_any_mut()
            .downcast_mut::<T>()
            .ok_or(Error::KindMismatch { expected: T::KIND, actual })
    }

    /// Whether dimensions and format match `other`, so `other` can be updated in place.
    pub fn same_layout(&self, other: &dyn DataRepresentation) -> bool {
        self.dimensions() == other.dimensions() && self.format() == other.format()
    }
}

impl std::fmt::Debug for dyn DataRepresentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{} {}]", self.kind(), self.dimensions(), self.format())
    }
}
