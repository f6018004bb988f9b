//! Converters: edges of the representation graph.

use std::sync::Arc;

use tracing::trace;

use reprs_core::{Error, ReprKind, Result};

use crate::context::EngineContext;
use crate::representation::DataRepresentation;

/// Directed edge creating or refreshing one kind from another.
pub trait RepresentationConverter: Send + Sync {
    /// Source kind.
    fn source(&self) -> ReprKind;

    /// Destination kind.
    fn destination(&self) -> ReprKind;

    /// Search cost. One per hop.
    fn cost(&self) -> u32 {
        1
    }

    /// Display name.
    fn name(&self) -> String {
        format!("{} -> {}", self.source(), self.destination())
    }

    /// Allocate and fill a destination from `src`.
    fn create(
        &self,
        src: &dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>>;

    /// Refresh `dst` in place from `src`. Layouts are equal.
    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<()>;

    /// Source-kind view over storage that `dst` aliases, if any.
    ///
    /// Refreshing the view refreshes `dst`, so a package can update its
    /// earlier hops in place instead of building new intermediates.
    fn source_view(&self, _dst: &dyn DataRepresentation) -> Option<Box<dyn DataRepresentation>> {
        None
    }
}

/// Precomposed chain of converters exposed as a single edge.
///
/// Intermediate representations are temporaries; they are never cached.
/// On update, a last hop that aliases its destination (graphics to
/// interop) has its source refreshed in place, so nothing is allocated.
pub struct ConverterPackage {
    chain: Vec<Arc<dyn RepresentationConverter>>,
}

impl ConverterPackage {
    /// Validate and build a chain of at least two contiguous converters.
    pub fn new(chain: Vec<Arc<dyn RepresentationConverter>>) -> Result<Self> {
        if chain.len() < 2 {
            return Err(Error::InvalidPackage(format!(
                "package needs at least two converters, got {}",
                chain.len()
            )));
        }
        for pair in chain.windows(2) {
            if pair[0].destination() != pair[1].source() {
                return Err(Error::InvalidPackage(format!(
                    "'{}' does not feed '{}'",
                    pair[0].name(),
                    pair[1].name()
                )));
            }
        }
        let source = chain[0].source();
        if chain.iter().any(|c| c.destination() == source) {
            return Err(Error::InvalidPackage(format!("chain loops back to {source}")));
        }
        Ok(Self { chain })
    }

    /// Converters in order.
    pub fn chain(&self) -> &[Arc<dyn RepresentationConverter>] {
        &self.chain
    }

    fn first(&self) -> &Arc<dyn RepresentationConverter> {
        &self.chain[0]
    }

    fn last(&self) -> &Arc<dyn RepresentationConverter> {
        &self.chain[self.chain.len() - 1]
    }
}

fn create_chain(
    chain: &[Arc<dyn RepresentationConverter>],
    src: &dyn DataRepresentation,
    ctx: &EngineContext,
) -> Result<Box<dyn DataRepresentation>> {
    let (head, rest) = chain
        .split_first()
        .ok_or_else(|| Error::InvalidPackage("empty chain".into()))?;
    let mut current = head.create(src, ctx)?;
    for converter in rest {
        current = converter.create(current.as_ref(), ctx)?;
    }
    Ok(current)
}

fn update_chain(
    chain: &[Arc<dyn RepresentationConverter>],
    src: &dyn DataRepresentation,
    dst: &mut dyn DataRepresentation,
    ctx: &EngineContext,
) -> Result<()> {
    let (last, init) = chain
        .split_last()
        .ok_or_else(|| Error::InvalidPackage("empty chain".into()))?;
    if init.is_empty() {
        return last.update(src, dst, ctx);
    }

    let intermediate = match last.source_view(&*dst) {
        Some(mut view) if view.same_layout(&*dst) => {
            trace!(converter = %last.name(), "refreshing aliased intermediate in place");
            update_chain(init, src, view.as_mut(), ctx)?;
            view
        }
        _ => create_chain(init, src, ctx)?,
    };
    last.update(intermediate.as_ref(), dst, ctx)
}

impl RepresentationConverter for ConverterPackage {
    fn source(&self) -> ReprKind {
        self.first().source()
    }

    fn destination(&self) -> ReprKind {
        self.last().destination()
    }

    fn cost(&self) -> u32 {
        self.chain.iter().map(|c| c.cost()).sum()
    }

    fn name(&self) -> String {
        let mut name = self.source().to_string();
        for converter in &self.chain {
            name.push_str(" => ");
            name.push_str(converter.destination().name());
        }
        name
    }

    fn create(
        &self,
        src: &dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<Box<dyn DataRepresentation>> {
        create_chain(&self.chain, src, ctx)
    }

    fn update(
        &self,
        src: &dyn DataRepresentation,
        dst: &mut dyn DataRepresentation,
        ctx: &EngineContext,
    ) -> Result<()> {
        update_chain(&self.chain, src, dst, ctx)
    }
}
