//! Owner of every materialized form of one datum.
//!
//! The authoritative representation is stored apart from the cached ones,
//! so there is always exactly one and it is always valid. Cached
//! representations carry a validity bit; stale ones are refreshed in place
//! when their layout still matches, otherwise recreated.
//!
//! ```text
//! representation(K)           editable_representation(K)
//!   valid?  -> hit              same as read, then
//!   path?   -> run edges          K becomes authoritative
//!   none    -> Ok(None)           every other kind goes stale
//! ```
//!
//! Borrows returned by the editable accessors end before the next call, so
//! a caller can never hold a handle across an authority change.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use reprs_core::{DataFormat, Dimensions, Error, KindSet, ReprKind, Result};

use crate::config::SourceOrder;
use crate::context::EngineContext;
use crate::converter::RepresentationConverter;
use crate::registry::ConverterRegistry;
use crate::representation::{DataRepresentation, TypedRepresentation};

struct Slot {
    repr: Box<dyn DataRepresentation>,
    valid: bool,
}

/// Conversion counters of one [`Representable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepresentableStats {
    /// Representations created by a converter.
    pub creates: u64,
    /// Representations refreshed in place.
    pub updates: u64,
    /// Requests served by an already valid representation.
    pub cache_hits: u64,
    /// Requests with no conversion path.
    pub missing_paths: u64,
    /// Converter calls that failed.
    pub failures: u64,
}

enum Outcome {
    Updated(Slot, Result<()>),
    Created(Result<Box<dyn DataRepresentation>>),
}

/// Multi-backend cache for one logical datum.
pub struct Representable {
    primary: Box<dyn DataRepresentation>,
    cached: BTreeMap<ReprKind, Slot>,
    converters: Arc<ConverterRegistry>,
    ctx: EngineContext,
    stats: RepresentableStats,
}

impl Representable {
    /// Datum whose only representation is `initial`.
    pub fn new(
        initial: Box<dyn DataRepresentation>,
        converters: Arc<ConverterRegistry>,
        ctx: EngineContext,
    ) -> Self {
        debug!(
            kind = %initial.kind(),
            dims = %initial.dimensions(),
            format = %initial.format(),
            "representable created"
        );
        Self {
            primary: initial,
            cached: BTreeMap::new(),
            converters,
            ctx,
            stats: RepresentableStats::default(),
        }
    }

    /// Datum from a concrete representation.
    pub fn from_repr<R: DataRepresentation>(
        initial: R,
        converters: Arc<ConverterRegistry>,
        ctx: EngineContext,
    ) -> Self {
        Self::new(Box::new(initial), converters, ctx)
    }

    /// Kind of the authoritative representation.
    #[inline]
    pub fn authoritative_kind(&self) -> ReprKind {
        self.primary.kind()
    }

    /// The authoritative representation.
    pub fn authoritative(&self) -> &dyn DataRepresentation {
        self.primary.as_ref()
    }

    /// Dimensions of the authoritative representation.
    pub fn dimensions(&self) -> Dimensions {
        self.primary.dimensions()
    }

    /// Format of the authoritative representation.
    pub fn format(&self) -> DataFormat {
        self.primary.format()
    }

    /// Whether `kind` exists and is valid. No side effects.
    pub fn has_valid_representation(&self, kind: ReprKind) -> bool {
        kind == self.primary.kind() || self.cached.get(&kind).is_some_and(|s| s.valid)
    }

    /// Typed form of [`has_valid_representation`](Self::has_valid_representation).
    pub fn has_valid<T: TypedRepresentation>(&self) -> bool {
        self.has_valid_representation(T::KIND)
    }

    /// Whether `kind` exists, valid or not.
    pub fn has_representation(&self, kind: ReprKind) -> bool {
        kind == self.primary.kind() || self.cached.contains_key(&kind)
    }

    /// Kinds currently valid.
    pub fn valid_kinds(&self) -> KindSet {
        ReprKind::ALL
            .into_iter()
            .filter(|k| self.has_valid_representation(*k))
            .collect()
    }

    /// Kinds currently present.
    pub fn kinds(&self) -> KindSet {
        ReprKind::ALL
            .into_iter()
            .filter(|k| self.has_representation(*k))
            .collect()
    }

    /// Conversion counters.
    pub fn stats(&self) -> RepresentableStats {
        self.stats
    }

    /// Engine context.
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Converter registry.
    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// Read-only representation of `kind`, converting if needed.
    ///
    /// `Ok(None)` when no converter chain reaches `kind`; the datum is left
    /// untouched. `Err` when a device operation fails; the failed kind is
    /// left stale.
    pub fn representation_of(&mut self, kind: ReprKind) -> Result<Option<&dyn DataRepresentation>> {
        if !self.ensure_valid(kind)? {
            return Ok(None);
        }
        Ok(self.get(kind))
    }

    /// Typed read-only representation.
    pub fn representation<T: TypedRepresentation>(&mut self) -> Result<Option<&T>> {
        match self.representation_of(T::KIND)? {
            Some(repr) => repr.downcast_ref::<T>().map(Some),
            None => Ok(None),
        }
    }

    /// Editable representation of `kind`.
    ///
    /// On success `kind` becomes authoritative and every other kind stale.
    pub fn editable_representation_of(
        &mut self,
        kind: ReprKind,
    ) -> Result<Option<&mut dyn DataRepresentation>> {
        if !self.ensure_valid(kind)? {
            return Ok(None);
        }
        self.promote(kind)?;
        Ok(Some(self.primary.as_mut()))
    }

    /// Typed editable representation.
    pub fn editable_representation<T: TypedRepresentation>(&mut self) -> Result<Option<&mut T>> {
        match self.editable_representation_of(T::KIND)? {
            Some(repr) => repr.downcast_mut::<T>().map(Some),
            None => Ok(None),
        }
    }

    /// Insert `repr` as the new authoritative representation.
    ///
    /// Every other kind goes stale. Returns the representation it replaced
    /// in the same kind, if any.
    pub fn add_representation(
        &mut self,
        repr: Box<dyn DataRepresentation>,
    ) -> Option<Box<dyn DataRepresentation>> {
        let kind = repr.kind();
        let replaced = if kind == self.primary.kind() {
            Some(std::mem::replace(&mut self.primary, repr))
        } else {
            let replaced = self.cached.remove(&kind).map(|s| s.repr);
            let old = std::mem::replace(&mut self.primary, repr);
            self.cached.insert(old.kind(), Slot { repr: old, valid: false });
            replaced
        };
        self.invalidate_all_other();
        debug!(%kind, "representation added as authoritative");
        replaced
    }

    /// Remove the representation of `kind`.
    ///
    /// Removing the authoritative one hands authority to the first valid
    /// cached kind; fails when there is none.
    pub fn remove_representation(
        &mut self,
        kind: ReprKind,
    ) -> Result<Option<Box<dyn DataRepresentation>>> {
        if kind != self.primary.kind() {
            return Ok(self.cached.remove(&kind).map(|s| s.repr));
        }
        let successor = self
            .cached
            .iter()
            .find(|(_, s)| s.valid)
            .map(|(k, _)| *k)
            .ok_or_else(|| {
                Error::NoValidRepresentation(format!(
                    "cannot remove the only valid representation ({kind})"
                ))
            })?;
        let slot = self
            .cached
            .remove(&successor)
            .ok_or(Error::NoValidRepresentation(successor.to_string()))?;
        let old = std::mem::replace(&mut self.primary, slot.repr);
        debug!(removed = %kind, authority = %successor, "authoritative representation removed");
        Ok(Some(old))
    }

    /// Drop every representation except the authoritative one.
    pub fn remove_other_representations(&mut self) {
        self.cached.clear();
    }

    /// Mark every cached representation stale, e.g. after editing the
    /// authoritative one through a handle obtained earlier.
    pub fn invalidate_all_other(&mut self) {
        for slot in self.cached.values_mut() {
            slot.valid = false;
        }
    }

    /// New datum holding a deep copy of the authoritative representation only.
    pub fn try_clone(&self) -> Result<Self> {
        let copy = self.primary.duplicate(&self.ctx)?;
        Ok(Self::new(copy, self.converters.clone(), self.ctx.clone()))
    }

    fn get(&self, kind: ReprKind) -> Option<&dyn DataRepresentation> {
        if kind == self.primary.kind() {
            return Some(self.primary.as_ref());
        }
        self.cached.get(&kind).map(|s| s.repr.as_ref())
    }

    fn valid_source(&self, kind: ReprKind) -> Option<&dyn DataRepresentation> {
        if kind == self.primary.kind() {
            return Some(self.primary.as_ref());
        }
        self.cached.get(&kind).filter(|s| s.valid).map(|s| s.repr.as_ref())
    }

    fn source_order(&self) -> Vec<ReprKind> {
        let valid = self.valid_kinds();
        match self.ctx.config().source_order {
            SourceOrder::AuthoritativeFirst => {
                let primary = self.primary.kind();
                std::iter::once(primary)
                    .chain(valid.iter().filter(|k| *k != primary))
                    .collect()
            }
            SourceOrder::Declaration => valid.iter().collect(),
        }
    }

    fn promote(&mut self, kind: ReprKind) -> Result<()> {
        if kind != self.primary.kind() {
            let slot = self
                .cached
                .remove(&kind)
                .ok_or_else(|| Error::NoValidRepresentation(kind.to_string()))?;
            let old = std::mem::replace(&mut self.primary, slot.repr);
            self.cached.insert(old.kind(), Slot { repr: old, valid: false });
            debug!(authority = %kind, "authority transferred");
        }
        self.invalidate_all_other();
        Ok(())
    }

    /// Make `kind` valid. `Ok(false)` when no path exists.
    fn ensure_valid(&mut self, kind: ReprKind) -> Result<bool> {
        if self.has_valid_representation(kind) {
            self.stats.cache_hits += 1;
            return Ok(true);
        }

        let sources = self.source_order();
        let Some(path) = self.converters.find_path(&sources, kind) else {
            self.stats.missing_paths += 1;
            warn!(
                target_kind = %kind,
                valid = %self.valid_kinds(),
                dims = %self.dimensions(),
                "no conversion path"
            );
            return Ok(false);
        };

        trace!(%path, "converting");
        for edge in path.edges() {
            self.run_edge(edge.as_ref())?;
        }
        Ok(true)
    }

    fn run_edge(&mut self, edge: &dyn RepresentationConverter) -> Result<()> {
        let (from, to) = (edge.source(), edge.destination());
        if to == self.primary.kind() {
            return Err(Error::contract(format!(
                "converter '{}' targets the authoritative kind",
                edge.name()
            )));
        }

        let existing = self.cached.remove(&to);
        let Some(src) = self.valid_source(from) else {
            if let Some(slot) = existing {
                self.cached.insert(to, slot);
            }
            return Err(Error::NoValidRepresentation(format!(
                "{from} is not valid while converting to {to}"
            )));
        };
        let dims = src.dimensions();

        let outcome = match existing {
            Some(mut slot) if slot.repr.same_layout(src) => {
                let result = edge.update(src, slot.repr.as_mut(), &self.ctx);
                Outcome::Updated(slot, result)
            }
            existing => {
                // Layout changed: free the old one before allocating.
                drop(existing);
                Outcome::Created(edge.create(src, &self.ctx))
            }
        };

        match outcome {
            Outcome::Updated(mut slot, Ok(())) => {
                slot.valid = true;
                self.cached.insert(to, slot);
                self.stats.updates += 1;
                debug!(%from, %to, %dims, "representation updated");
                Ok(())
            }
            Outcome::Updated(mut slot, Err(e)) => {
                slot.valid = false;
                self.cached.insert(to, slot);
                Err(self.report(e, edge, "update", dims))
            }
            Outcome::Created(Ok(repr)) => {
                if repr.kind() != to {
                    let e = Error::KindMismatch { expected: to, actual: repr.kind() };
                    return Err(self.report(e, edge, "create", dims));
                }
                self.cached.insert(to, Slot { repr, valid: true });
                self.stats.creates += 1;
                debug!(%from, %to, %dims, "representation created");
                Ok(())
            }
            Outcome::Created(Err(e)) => Err(self.report(e, edge, "create", dims)),
        }
    }

    fn report(
        &mut self,
        e: Error,
        edge: &dyn RepresentationConverter,
        op: &'static str,
        dims: Dimensions,
    ) -> Error {
        self.stats.failures += 1;
        error!(
            kind = %edge.destination(),
            from = %edge.source(),
            converter = %edge.name(),
            %dims,
            op,
            "conversion failed: {e}"
        );
        e
    }
}

impl std::fmt::Debug for Representable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Representable")
            .field("authoritative", &self.primary)
            .field("valid", &self.valid_kinds().to_string())
            .field("present", &self.kinds().to_string())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::repr::{GraphicsRepr, RamRepr};
    use reprs_backend::SoftDevice;

    fn setup(data: &[u8]) -> (Arc<SoftDevice>, Representable) {
        let dev = Arc::new(SoftDevice::with_budget(1 << 20));
        let ctx = EngineContext::from_soft(dev.clone(), EngineConfig::default());
        let registry = Arc::new(ConverterRegistry::with_defaults().unwrap());
        let dims = Dimensions::buffer(data.len() as u32);
        let ram = RamRepr::from_bytes(dims, DataFormat::U8, data).unwrap();
        (dev, Representable::from_repr(ram, registry, ctx))
    }

    #[test]
    fn test_read_keeps_authority() {
        let (_dev, mut data) = setup(&[1, 2, 3]);
        let gfx = data.representation::<GraphicsRepr>().unwrap().unwrap();
        assert_eq!(gfx.download().unwrap(), vec![1, 2, 3]);
        assert_eq!(data.authoritative_kind(), ReprKind::Ram);
        assert!(data.has_valid_representation(ReprKind::Graphics));
        assert_eq!(data.stats().creates, 1);
    }

    #[test]
    fn test_edit_transfers_authority() {
        let (_dev, mut data) = setup(&[1, 2]);
        data.representation::<GraphicsRepr>().unwrap();

        let gfx = data.editable_representation::<GraphicsRepr>().unwrap().unwrap();
        gfx.upload(&[8, 9]).unwrap();

        assert_eq!(data.authoritative_kind(), ReprKind::Graphics);
        assert!(!data.has_valid_representation(ReprKind::Ram));

        let ram = data.representation::<RamRepr>().unwrap().unwrap();
        assert_eq!(ram.as_bytes(), &[8, 9]);
        assert_eq!(data.stats().updates, 1);
    }

    #[test]
    fn test_typed_mismatch_is_error() {
        let (_dev, mut data) = setup(&[1]);
        let repr = data.representation_of(ReprKind::Ram).unwrap().unwrap();
        assert!(repr.downcast_ref::<GraphicsRepr>().is_err());
    }

    #[test]
    fn test_add_representation() {
        let (_dev, mut data) = setup(&[1, 2]);
        data.representation::<GraphicsRepr>().unwrap();
        let replacement =
            RamRepr::from_bytes(Dimensions::buffer(2), DataFormat::U8, &[5, 5]).unwrap();
        let old = data.add_representation(Box::new(replacement)).unwrap();
        assert_eq!(old.kind(), ReprKind::Ram);
        assert!(!data.has_valid_representation(ReprKind::Graphics));
        assert!(data.has_representation(ReprKind::Graphics));
    }

    #[test]
    fn test_remove_authoritative() {
        let (_dev, mut data) = setup(&[1, 2]);
        assert!(matches!(
            data.remove_representation(ReprKind::Ram),
            Err(Error::NoValidRepresentation(_))
        ));

        data.representation::<GraphicsRepr>().unwrap();
        let removed = data.remove_representation(ReprKind::Ram).unwrap().unwrap();
        assert_eq!(removed.kind(), ReprKind::Ram);
        assert_eq!(data.authoritative_kind(), ReprKind::Graphics);
        assert_eq!(data.valid_kinds(), KindSet::single(ReprKind::Graphics));
    }

    #[test]
    fn test_remove_others_and_clone() {
        let (dev, mut data) = setup(&[4, 2]);
        data.representation::<GraphicsRepr>().unwrap();
        let copy = data.try_clone().unwrap();
        assert_eq!(copy.kinds(), KindSet::single(ReprKind::Ram));

        data.remove_other_representations();
        assert_eq!(data.kinds(), KindSet::single(ReprKind::Ram));
        assert_eq!(dev.object_count(), 0);
    }

    #[test]
    fn test_failed_create_leaves_nothing_valid() {
        let (dev, mut data) = setup(&[1, 2]);
        dev.fail_next_allocations(1);
        let err = data.representation::<GraphicsRepr>().unwrap_err();
        assert!(matches!(err, Error::AllocationFailed { kind: ReprKind::Graphics, .. }));
        assert!(!data.has_representation(ReprKind::Graphics));
        assert_eq!(data.stats().failures, 1);

        assert!(data.representation::<GraphicsRepr>().unwrap().is_some());
    }
}
