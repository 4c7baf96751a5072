//! End-to-end allocator scenarios on the host backend.

use crate::fixtures::{mapped_2d, mapped_3d, ui_batch, unmapped_2d, unmapped_3d};
use crate::harness::HostHarness;
use tessera_core::math::align_up;
use tessera_core::{AssetId, TextureId};
use tessera_memory::{
    AllocatorConfig, BackendEvent, BufferSectionInfo, HostBackend, OffsetFinder, PhysicalBuffer,
    Section, UniformRegionManager, VertexPacking,
};

fn separate(asset_cap: u64) -> AllocatorConfig {
    AllocatorConfig::new()
        .with_capacities(asset_cap, 1024, 1024)
        .with_packing(VertexPacking::Separate)
}

#[test]
fn textured_mesh_offsets() {
    let mut harness = HostHarness::new(separate(1024)).unwrap();
    let offsets = harness
        .context_mut()
        .register_asset(mapped_3d(1, 100, 150))
        .unwrap();

    assert_eq!(offsets.pos, 0);
    assert_eq!(offsets.tex, Some(1200));
    assert_eq!(offsets.nor, Some(2000));
    assert_eq!(offsets.ind, 3200);
    assert_eq!(offsets.index_section, Section::Asset);

    let placement = *harness.context().placement(AssetId(1)).unwrap();
    assert_eq!(placement.index_count, 150);
    // 150 four-byte indices for each of the three attributes.
    assert_eq!(placement.index_bytes, 3 * 600);
    let snapshot = harness.snapshot().unwrap();
    harness.verify(&snapshot).unwrap();
}

#[test]
fn full_section_grows_by_half() {
    // 96 + 96 bytes of vertices and 2 * 32 bytes of indices.
    let asset = |id| unmapped_3d(id, 8, 8);

    let finder = OffsetFinder::new(
        VertexPacking::Separate,
        BufferSectionInfo::new(1024, 1024, 1024, 256),
    );
    let partial = finder.recompute_offsets(&[asset(1), asset(2), asset(3)], &[]);
    assert!(!partial.sections.needs_growth(Section::Asset));

    let full = finder.recompute_offsets(&[asset(1), asset(2), asset(3), asset(4)], &[]);
    let mut sections = full.sections;
    assert_eq!(sections.get(Section::Asset).size, 1024);
    assert!(sections.needs_growth(Section::Asset));
    assert_eq!(sections.grow_capacity(Section::Asset), align_up(1024 * 3 / 2, 4));

    let mut harness = HostHarness::new(separate(1024)).unwrap();
    harness.register_all([asset(1), asset(2), asset(3)]).unwrap();
    assert_eq!(harness.context().section_usage(Section::Asset).size, 768);
    assert_eq!(harness.reallocations(), 0);

    harness.context_mut().register_asset(asset(4)).unwrap();
    let usage = harness.context().section_usage(Section::Asset);
    assert_eq!(usage.size, 1024);
    assert_eq!(usage.cap, 1536);
    assert_eq!(harness.reallocations(), 1);
}

#[test]
fn uniform_region_follows_global_chunk() {
    let mut backend = HostBackend::new().with_uniform_alignment(256);
    let config = AllocatorConfig::new().with_frames_in_flight(2);
    let mut uniforms = UniformRegionManager::new(&mut backend, &config, 256).unwrap();

    let global = uniforms.reserve_global_chunk();
    let reservation = uniforms
        .reserve_asset_region(&mut backend, AssetId(1), 80)
        .unwrap();
    let region = reservation.region;

    assert!(!reservation.reallocated);
    assert_eq!(region.chunk, 256);
    assert_eq!(region.offset, global.end);
    assert_eq!(region.frame_offset(1), global.end + 256);
    assert_eq!(uniforms.usage().size, global.end + 2 * 256);
    uniforms.destroy(&mut backend);
}

#[test]
fn reallocation_preserves_live_data() {
    for packing in [VertexPacking::Separate, VertexPacking::Interleaved] {
        let config = AllocatorConfig::new()
            .with_capacities(512, 256, 256)
            .with_packing(packing);
        let mut harness = HostHarness::new(config).unwrap();
        harness
            .register_all([mapped_3d(1, 6, 9), unmapped_2d(2, 4, 6), mapped_2d(3, 5, 5)])
            .unwrap();
        harness
            .context_mut()
            .set_ui_batches(vec![ui_batch(2)])
            .unwrap();
        let before = harness.snapshot().unwrap();
        let ui_before = harness.context().ui_placements()[0];
        let old_buffer = harness.context().buffers().vertex_buffer().id();
        let reallocations = harness.reallocations();

        harness.log().clear();
        harness
            .context_mut()
            .register_asset(unmapped_3d(4, 64, 96))
            .unwrap();

        assert_eq!(harness.reallocations(), reallocations + 1, "{packing:?}");
        harness.verify(&before).unwrap();

        // UI data moved with the buffer.
        let ui_after = harness.context().ui_placements()[0];
        assert_eq!(ui_after.vertex_region(), ui_before.vertex_region());
        let ui_bytes = harness
            .context_mut()
            .read_region(ui_after.vertex_region())
            .unwrap();
        assert_eq!(ui_bytes, ui_batch(2).vertex_bytes());

        // The old buffer is only released once in-flight frames are done.
        let log = harness.log();
        let waited = log.position(|e| *e == BackendEvent::WaitFrames).unwrap();
        let destroyed = log
            .position(|e| *e == BackendEvent::Destroy { buffer: old_buffer })
            .unwrap();
        assert!(waited < destroyed, "{packing:?}");
    }
}

#[test]
fn removal_recomputes_from_survivors() {
    let mut harness = HostHarness::new(separate(4096)).unwrap();
    harness
        .register_all([mapped_3d(1, 10, 15), unmapped_2d(2, 6, 6), mapped_3d(3, 4, 6)])
        .unwrap();
    let removed_at = harness.context().asset_offsets(AssetId(1)).unwrap().pos;

    harness.context_mut().remove_asset(AssetId(1)).unwrap();
    let mut snapshot = harness.snapshot().unwrap();
    assert!(!snapshot.contains(AssetId(1)));

    // Survivors shift down in registration order.
    assert_eq!(harness.context().asset_offsets(AssetId(2)).unwrap().pos, 0);

    let last = harness.context().placement(AssetId(3)).unwrap().index_region();
    let fresh = harness
        .context_mut()
        .register_asset(unmapped_3d(4, 8, 8))
        .unwrap();
    assert_eq!(fresh.pos, align_up(last.end(), 4));
    assert_ne!(fresh.pos, removed_at);

    // Offsets equal a clean layout of the surviving list.
    let survivors = [unmapped_2d(2, 6, 6), mapped_3d(3, 4, 6), unmapped_3d(4, 8, 8)];
    let expected = OffsetFinder::new(
        VertexPacking::Separate,
        BufferSectionInfo::new(4096, 1024, 1024, 256),
    )
    .recompute_offsets(&survivors, &[]);
    for (id, placement) in &expected.assets {
        assert_eq!(harness.context().placement(*id).unwrap(), placement);
    }

    snapshot.forget(AssetId(1));
    harness.verify(&snapshot).unwrap();
}

#[test]
fn texture_swap_keeps_vertex_data() {
    let mut harness = HostHarness::new(AllocatorConfig::new()).unwrap();
    harness
        .register_all([mapped_3d(1, 4, 6), mapped_2d(2, 4, 6)])
        .unwrap();
    let before = harness.snapshot().unwrap();

    harness
        .context_mut()
        .set_asset_texture(AssetId(2), Some(TextureId(8)))
        .unwrap();
    harness.verify(&before).unwrap();
    assert!(harness.context().bind_asset_descriptors(AssetId(2), 0).is_ok());
}

#[test]
fn teardown_releases_everything() {
    let mut harness = HostHarness::new(separate(256)).unwrap();
    harness
        .register_all((1..=8).map(|id| mapped_3d(id, 16, 24)))
        .unwrap();
    assert!(harness.reallocations() > 0);
    assert!(harness.context().buffers().vertex_buffer().capacity() >= 256);

    let backend = harness.finish().unwrap();
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.live_bytes(), 0);
}
