//! Behavioral properties of the representation cache.

use std::sync::Arc;

use reprs_backend::SoftDevice;
use reprs_core::{DataFormat, Dimensions, KindSet, ReprKind};
use reprs_engine::{
    ComputeRepr, ConverterRegistry, DataRepresentation, EngineConfig, EngineContext, GraphicsRepr,
    InteropRepr, RamBuffer, RamRepr, Representable,
};

fn setup() -> (Arc<SoftDevice>, EngineContext, Arc<ConverterRegistry>) {
    let dev = Arc::new(SoftDevice::with_budget(64 << 20));
    let ctx = EngineContext::from_soft(dev.clone(), EngineConfig::default());
    let registry = Arc::new(ConverterRegistry::with_defaults().unwrap());
    (dev, ctx, registry)
}

fn ramp(dims: Dimensions, format: DataFormat) -> RamRepr {
    let mut ram = RamRepr::new(dims, format);
    for (i, b) in ram.as_bytes_mut().iter_mut().enumerate() {
        *b = (i * 7 % 251) as u8;
    }
    ram
}

fn datum(ram: RamRepr, ctx: &EngineContext, registry: &Arc<ConverterRegistry>) -> Representable {
    Representable::from_repr(ram, registry.clone(), ctx.clone())
}

fn assert_single_authority(data: &Representable) {
    let valid = data.valid_kinds();
    assert!(valid.contains(data.authoritative_kind()));
    assert!(data.has_valid_representation(data.authoritative_kind()));
}

#[test]
fn test_authority_uniqueness() {
    let (_dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::layer(8, 8), DataFormat::VEC4_U8), &ctx, &registry);
    assert_single_authority(&data);

    for kind in [ReprKind::Graphics, ReprKind::Compute, ReprKind::Interop, ReprKind::Ram] {
        data.representation_of(kind).unwrap().unwrap();
        assert_eq!(data.authoritative_kind(), ReprKind::Ram);
        assert_single_authority(&data);
    }

    for kind in [ReprKind::Interop, ReprKind::Compute, ReprKind::Graphics] {
        data.editable_representation_of(kind).unwrap().unwrap();
        assert_eq!(data.authoritative_kind(), kind);
        assert_single_authority(&data);
    }
}

#[test]
fn test_stale_on_write() {
    let (_dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::buffer(64), DataFormat::F32), &ctx, &registry);
    data.representation::<GraphicsRepr>().unwrap();
    data.representation::<ComputeRepr>().unwrap();
    data.representation::<InteropRepr>().unwrap();
    assert_eq!(data.valid_kinds().len(), 4);

    data.editable_representation::<ComputeRepr>().unwrap().unwrap();

    assert_eq!(data.valid_kinds(), KindSet::single(ReprKind::Compute));
    for kind in [ReprKind::Ram, ReprKind::Graphics, ReprKind::Interop] {
        assert!(!data.has_valid_representation(kind));
        assert!(data.has_representation(kind));
    }
}

#[test]
fn test_idempotent_read() {
    let (dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::volume(4, 4, 4), DataFormat::U16), &ctx, &registry);

    let first = data.representation::<GraphicsRepr>().unwrap().unwrap().download();
    let before = dev.stats();
    let second = data.representation::<GraphicsRepr>().unwrap().unwrap().download();
    let after = dev.stats();

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(after.allocations, before.allocations);
    assert_eq!(after.uploads, before.uploads);
    assert_eq!(data.stats().creates, 1);
    assert_eq!(data.stats().cache_hits, 1);
}

#[test]
fn test_stale_read_updates_without_allocating() {
    let (dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::buffer(16), DataFormat::U8), &ctx, &registry);
    data.representation::<GraphicsRepr>().unwrap();

    let ram = data.editable_representation::<RamRepr>().unwrap().unwrap();
    ram.as_bytes_mut().fill(3);

    let before = dev.stats().allocations;
    let gfx = data.representation::<GraphicsRepr>().unwrap().unwrap();
    assert_eq!(gfx.download().unwrap(), vec![3; 16]);
    assert_eq!(dev.stats().allocations, before);
    assert_eq!(data.stats().updates, 1);
}

#[test]
fn test_layout_change_recreates() {
    let (dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::buffer(16), DataFormat::U8), &ctx, &registry);
    data.representation::<GraphicsRepr>().unwrap();

    data.editable_representation::<RamRepr>().unwrap().unwrap().resize(Dimensions::buffer(32));

    let gfx = data.representation::<GraphicsRepr>().unwrap().unwrap();
    assert_eq!(gfx.dimensions(), Dimensions::buffer(32));
    assert_eq!(dev.object_count(), 1);
    assert_eq!(data.stats().creates, 2);
}

/// Bytes of every valid representation, read without editing.
fn valid_contents(data: &mut Representable) -> Vec<(ReprKind, Vec<u8>)> {
    let mut contents = Vec::new();
    for kind in data.valid_kinds().iter() {
        let repr = data.representation_of(kind).unwrap().unwrap();
        let bytes = match kind {
            ReprKind::Ram => repr.downcast_ref::<RamRepr>().unwrap().as_bytes().to_vec(),
            ReprKind::Graphics => {
                repr.downcast_ref::<GraphicsRepr>().unwrap().download().unwrap()
            }
            ReprKind::Compute => repr.downcast_ref::<ComputeRepr>().unwrap().read().unwrap(),
            ReprKind::Interop => {
                repr.downcast_ref::<InteropRepr>().unwrap().download().unwrap()
            }
            ReprKind::Disk => continue,
        };
        contents.push((kind, bytes));
    }
    contents
}

fn write_through(data: &mut Representable, kind: ReprKind, fill: &[u8]) {
    match kind {
        ReprKind::Graphics => {
            let gfx = data.editable_representation::<GraphicsRepr>().unwrap().unwrap();
            gfx.upload(fill).unwrap();
        }
        ReprKind::Compute => {
            let buffer = data.editable_representation::<ComputeRepr>().unwrap().unwrap();
            buffer.write(fill).unwrap();
        }
        ReprKind::Interop => {
            let interop = data.editable_representation::<InteropRepr>().unwrap().unwrap();
            interop.upload(fill).unwrap();
        }
        other => panic!("no writer for {other}"),
    }
}

#[test]
fn test_valid_reads_match_authority() {
    let (_dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::buffer(8), DataFormat::U8), &ctx, &registry);

    for (step, kind) in [ReprKind::Graphics, ReprKind::Compute, ReprKind::Interop]
        .into_iter()
        .enumerate()
    {
        let fill = vec![step as u8 + 10; 8];
        write_through(&mut data, kind, &fill);

        for other in [ReprKind::Ram, ReprKind::Graphics, ReprKind::Compute, ReprKind::Interop] {
            data.representation_of(other).unwrap().unwrap();
        }
        assert_eq!(data.authoritative_kind(), kind);
        let contents = valid_contents(&mut data);
        assert_eq!(contents.len(), 4);
        for (other, bytes) in contents {
            assert_eq!(bytes, fill, "{other} after writing {kind}");
        }
    }
}

#[test]
fn test_interop_refresh_reuses_object() {
    let (dev, ctx, registry) = setup();
    let mut data = datum(ramp(Dimensions::buffer(16), DataFormat::U8), &ctx, &registry);
    data.representation::<InteropRepr>().unwrap().unwrap();
    assert_eq!(data.kinds(), KindSet::from_iter([ReprKind::Ram, ReprKind::Interop]));
    let before = dev.stats();

    for fill in 1..=3u8 {
        let ram = data.editable_representation::<RamRepr>().unwrap().unwrap();
        ram.as_bytes_mut().fill(fill);
        let interop = data.representation::<InteropRepr>().unwrap().unwrap();
        assert_eq!(interop.download().unwrap(), vec![fill; 16]);
    }

    let after = dev.stats();
    assert_eq!(after.allocations, before.allocations);
    assert_eq!(after.wraps, before.wraps);
    assert_eq!(dev.object_count(), 1);
    assert_eq!(data.stats().creates, 1);
    assert_eq!(data.stats().updates, 3);
}

#[test]
fn test_roundtrip_lossless() {
    let (_dev, ctx, registry) = setup();
    let formats = [
        DataFormat::VEC4_U8,
        DataFormat::U16,
        DataFormat::VEC4_F16,
        DataFormat::VEC3_F32,
    ];
    for format in formats {
        let original = ramp(Dimensions::layer(5, 3), format);
        let bytes = original.as_bytes().to_vec();
        let mut data = Representable::from_repr(original, registry.clone(), ctx.clone());

        data.editable_representation::<GraphicsRepr>().unwrap().unwrap();
        let back = data.representation::<RamRepr>().unwrap().unwrap();
        assert_eq!(back.as_bytes(), bytes.as_slice(), "format {format}");
        assert_eq!(back.format(), format);
    }
}

#[test]
fn test_roundtrip_typed_values() {
    let (_dev, ctx, registry) = setup();
    let values = vec![0.0f32, 0.5, -1.25, 1e-3];
    let buffer = RamBuffer::F32(values.clone());
    let ram = RamRepr::from_buffer(Dimensions::buffer(4), 1, buffer).unwrap();
    let mut data = Representable::from_repr(ram, registry, ctx);

    data.editable_representation::<ComputeRepr>().unwrap();
    let back = data.representation::<RamRepr>().unwrap().unwrap();
    for (a, b) in back.to_f32().iter().zip(&values) {
        approx::assert_relative_eq!(*a, *b);
    }
}

#[test]
fn test_refcount_correctness() {
    let (dev, ctx, _registry) = setup();
    let mut gfx =
        GraphicsRepr::new(&ctx, Dimensions::layer(4, 4), DataFormat::VEC4_U8, None).unwrap();
    let id = gfx.object().id();

    const N: usize = 5;
    let holders: Vec<_> = (0..N).map(|_| gfx.share(&ctx).unwrap()).collect();

    assert_eq!(ctx.sharing().len(), 1);
    assert_eq!(ctx.sharing().ref_count(id), N);
    assert_eq!(dev.stats().wraps, 1);
    assert!(holders.iter().all(|h| h.handle() == holders[0].handle()));

    drop(holders);
    assert!(ctx.sharing().is_empty());
    assert_eq!(dev.wrap_count(id), 0);
}

#[test]
fn test_resize_safety() {
    let (dev, ctx, _registry) = setup();
    let mut gfx =
        GraphicsRepr::new(&ctx, Dimensions::layer(4, 4), DataFormat::VEC4_U8, None).unwrap();
    let id = gfx.object().id();
    let holders: Vec<_> = (0..3).map(|_| gfx.share(&ctx).unwrap()).collect();
    let before = ctx.sharing().handle(id).unwrap();

    gfx.resize(Dimensions::layer(16, 16)).unwrap();

    let after = ctx.sharing().handle(id).unwrap();
    assert_ne!(before, after);
    assert!(dev.is_current_wrap(after));
    assert!(!dev.is_current_wrap(before));
    assert_eq!(ctx.sharing().ref_count(id), 3);
    assert_eq!(dev.wrap_count(id), 1);
    assert!(holders.iter().all(|h| h.dimensions() == Dimensions::layer(16, 16)));
}

#[test]
fn test_path_determinism() {
    let (_dev, _ctx, registry) = setup();
    let queries = [
        (vec![ReprKind::Ram], ReprKind::Interop),
        (vec![ReprKind::Disk], ReprKind::Interop),
        (vec![ReprKind::Compute, ReprKind::Graphics], ReprKind::Ram),
        (vec![ReprKind::Graphics, ReprKind::Compute], ReprKind::Ram),
    ];
    for (sources, target) in &queries {
        let reference = registry.find_path(sources, *target).unwrap();
        for _ in 0..10 {
            let fresh = ConverterRegistry::with_defaults().unwrap();
            let again = fresh.find_path(sources, *target).unwrap();
            assert_eq!(again.to_string(), reference.to_string());
            assert_eq!(again.edge_names(), reference.edge_names());
            let cached = registry.find_path(sources, *target).unwrap();
            assert_eq!(cached.edge_names(), reference.edge_names());
        }
    }
}

#[test]
fn test_no_path_leaves_state() {
    let (dev, ctx, _registry) = setup();
    let mut sparse = ConverterRegistry::new();
    sparse.register(Arc::new(reprs_engine::converters::RamToGraphics));
    let sparse = Arc::new(sparse);
    let mut data = datum(ramp(Dimensions::buffer(8), DataFormat::U8), &ctx, &sparse);
    data.representation::<GraphicsRepr>().unwrap().unwrap();

    let kinds = data.kinds();
    let valid = data.valid_kinds();
    let authority = data.authoritative_kind();
    let device = dev.stats();

    assert!(data.representation::<ComputeRepr>().unwrap().is_none());
    assert!(data.editable_representation::<InteropRepr>().unwrap().is_none());
    assert!(data.representation_of(ReprKind::Disk).unwrap().is_none());

    assert_eq!(data.kinds(), kinds);
    assert_eq!(data.valid_kinds(), valid);
    assert_eq!(data.authoritative_kind(), authority);
    assert_eq!(dev.stats(), device);
    assert_eq!(data.stats().missing_paths, 3);
}
