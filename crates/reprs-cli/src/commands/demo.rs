//! Demo command
//!
//! Builds a datum in host memory, materializes it on every device kind,
//! edits it on the graphics side and reads it back. A second object shows
//! refcounted sharing and resize under live holders.

use crate::DemoArgs;
use anyhow::{Context, Result, bail};
use std::time::Instant;
use tracing::{debug, info};

use reprs_backend::Backend;
use reprs_core::ReprKind;
use reprs_engine::{
    EngineConfig, EngineContext, GraphicsRepr, InteropRepr, RamRepr, Representable, SharedAccess,
};

pub fn run(args: DemoArgs, backend: Backend, config: EngineConfig, verbose: bool) -> Result<()> {
    let (ctx, registry) = reprs_engine::init(backend, config)?;
    if verbose {
        println!("{ctx:?}");
    }

    let mut ram = RamRepr::new(args.dims, args.format);
    for (i, b) in ram.as_bytes_mut().iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    let original = ram.as_bytes().to_vec();
    println!("Datum: {} {} ({} bytes)", args.dims, args.format, original.len());

    let mut data = Representable::from_repr(ram, registry, ctx.clone());
    for kind in [ReprKind::Graphics, ReprKind::Compute, ReprKind::Interop] {
        let start = Instant::now();
        match data.representation_of(kind) {
            Ok(Some(_)) => {
                let elapsed = start.elapsed();
                println!("  {kind:<8} ready in {elapsed:.2?}, valid {}", data.valid_kinds());
            }
            Ok(None) => println!("  {kind:<8} no conversion path"),
            Err(e) if e.is_recoverable() => println!("  {kind:<8} failed: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    // Edit on the graphics side, then read back through host memory.
    let gfx = data
        .editable_representation::<GraphicsRepr>()?
        .context("no path to graphics")?;
    let mut edited = gfx.download()?;
    edited.iter_mut().for_each(|b| *b = b.wrapping_add(1));
    gfx.upload(&edited)?;
    println!(
        "Edited on graphics: authority {}, valid {}",
        data.authoritative_kind(),
        data.valid_kinds()
    );

    let back = data.representation::<RamRepr>()?.context("no path back to ram")?;
    if back.as_bytes() != edited.as_slice() {
        bail!("round trip through graphics lost data");
    }
    println!("Round trip: ok");
    println!("Stats: {:?}", data.stats());

    share(&ctx, &args, &original)
}

fn share(ctx: &EngineContext, args: &DemoArgs, contents: &[u8]) -> Result<()> {
    let mut gfx = GraphicsRepr::new(ctx, args.dims, args.format, Some(contents))?;
    let id = gfx.object().id();

    let holders = (0..args.holders)
        .map(|_| gfx.share(ctx))
        .collect::<reprs_core::Result<Vec<InteropRepr>>>()?;
    println!(
        "Sharing {id}: {} holders, ref count {}",
        holders.len(),
        ctx.sharing().ref_count(id)
    );

    if let Some(first) = holders.first() {
        let scope = SharedAccess::new(ctx).add(first).acquire()?;
        let read = scope.read(first)?;
        debug!(bytes = read.len(), "read through compute wrap");
        if read != contents {
            bail!("compute wrap does not alias the graphics object");
        }
    }

    if let Some(dims) = args.resize {
        let before = ctx.sharing().handle(id);
        gfx.resize(dims)?;
        let after = ctx.sharing().handle(id);
        info!(%id, %dims, "resized shared object");
        println!(
            "Resized to {dims}: handle {} -> {}, ref count {}",
            before.map(|h| h.to_string()).unwrap_or_else(|| "-".into()),
            after.map(|h| h.to_string()).unwrap_or_else(|| "-".into()),
            ctx.sharing().ref_count(id)
        );
    }

    drop(holders);
    println!("Released: {} shared entries left", ctx.sharing().len());
    Ok(())
}
