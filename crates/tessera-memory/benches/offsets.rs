use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Vec2, Vec3};
use tessera_core::{Asset, AssetId, AttributeIndices, VertexData, VertexLayout};
use tessera_memory::{
    AllocatorConfig, BufferSectionInfo, HostBackend, HostDescriptors, OffsetFinder,
    RenderContext, VertexPacking,
};

criterion_group!(benches, recompute_offsets, register_and_remove);
criterion_main!(benches);

fn mesh(id: u64, vertices: usize) -> Asset {
    let data = VertexData::Mapped3D {
        positions: vec![Vec3::new(id as f32, 0.0, 1.0); vertices],
        tex_coords: vec![Vec2::ZERO; vertices],
        normals: vec![Vec3::Y; vertices],
    };
    let indices = (0..vertices as u32).collect();
    Asset::new(
        AssetId(id),
        "bench",
        data,
        AttributeIndices::shared(indices, VertexLayout::Mapped3D),
    )
    .unwrap()
}

fn recompute_offsets(c: &mut Criterion) {
    let mut group = c.benchmark_group("recompute_offsets");
    for count in [16_u64, 256, 4096] {
        let assets: Vec<Asset> = (0..count).map(|id| mesh(id, 24)).collect();
        for packing in [VertexPacking::Separate, VertexPacking::Interleaved] {
            let finder = OffsetFinder::new(packing, BufferSectionInfo::new(1 << 20, 1 << 20, 1 << 16, 256));
            group.bench_with_input(
                BenchmarkId::new(format!("{packing:?}"), count),
                &assets,
                |b, assets| b.iter(|| finder.recompute_offsets(assets, &[])),
            );
        }
    }
    group.finish();
}

fn register_and_remove(c: &mut Criterion) {
    c.bench_function("register_remove_64", |b| {
        b.iter(|| {
            let backend = HostBackend::new();
            let descriptors = HostDescriptors::new(backend.log());
            let config = AllocatorConfig::new().with_capacities(4096, 1024, 1024);
            let mut context = RenderContext::new(backend, descriptors, config).unwrap();
            context.register_assets((0..64).map(|id| mesh(id, 24))).unwrap();
            for id in (0..64).step_by(2) {
                context.remove_asset(AssetId(id)).unwrap();
            }
            context.destroy().unwrap()
        });
    });
}
