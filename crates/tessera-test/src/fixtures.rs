//! Deterministic asset fixtures.
//!
//! Vertex values are derived from the asset id and the vertex index, so the
//! bytes of two fixtures never coincide and a misplaced copy shows up in a
//! content comparison.

use glam::{Vec2, Vec3};
use tessera_core::{Asset, AssetId, AttributeIndices, UiBatch, UiVertex, VertexData, VertexLayout};

fn position_3d(id: u64, i: usize) -> Vec3 {
    Vec3::new(id as f32, i as f32, 0.25)
}

fn position_2d(id: u64, i: usize) -> Vec2 {
    Vec2::new(id as f32, i as f32)
}

fn tex_coord(id: u64, i: usize) -> Vec2 {
    Vec2::new(i as f32 / 64.0, id as f32 / 64.0)
}

fn normal(id: u64, i: usize) -> Vec3 {
    Vec3::new(0.0, id as f32, -(i as f32))
}

/// Indices cycling over `vertices`.
fn cycling(vertices: usize, count: usize) -> Vec<u32> {
    (0..count).map(|i| (i % vertices.max(1)) as u32).collect()
}

fn build(id: u64, name: &str, data: VertexData, indices: usize) -> Asset {
    let layout = data.layout();
    let vertices = data.vertex_count();
    let indices = if indices == 0 {
        AttributeIndices::empty(layout)
    } else {
        AttributeIndices::shared(cycling(vertices, indices), layout)
    };
    match Asset::new(AssetId(id), name, data, indices) {
        Ok(asset) => asset,
        Err(e) => panic!("fixture {name} is inconsistent: {e}"),
    }
}

/// Textured 3D mesh.
pub fn mapped_3d(id: u64, vertices: usize, indices: usize) -> Asset {
    let data = VertexData::Mapped3D {
        positions: (0..vertices).map(|i| position_3d(id, i)).collect(),
        tex_coords: (0..vertices).map(|i| tex_coord(id, i)).collect(),
        normals: (0..vertices).map(|i| normal(id, i)).collect(),
    };
    build(id, "mapped_3d", data, indices)
}

/// Untextured 3D mesh.
pub fn unmapped_3d(id: u64, vertices: usize, indices: usize) -> Asset {
    let data = VertexData::Unmapped3D {
        positions: (0..vertices).map(|i| position_3d(id, i)).collect(),
        normals: (0..vertices).map(|i| normal(id, i)).collect(),
    };
    build(id, "unmapped_3d", data, indices)
}

/// Textured sprite.
pub fn mapped_2d(id: u64, vertices: usize, indices: usize) -> Asset {
    let data = VertexData::Mapped2D {
        positions: (0..vertices).map(|i| position_2d(id, i)).collect(),
        tex_coords: (0..vertices).map(|i| tex_coord(id, i)).collect(),
    };
    build(id, "mapped_2d", data, indices)
}

/// Flat-colored 2D shape.
pub fn unmapped_2d(id: u64, vertices: usize, indices: usize) -> Asset {
    let data = VertexData::Unmapped2D {
        positions: (0..vertices).map(|i| position_2d(id, i)).collect(),
    };
    build(id, "unmapped_2d", data, indices)
}

/// A UI batch of `quads` quads, two triangles each.
pub fn ui_batch(quads: usize) -> UiBatch {
    let vertices = (0..quads * 4)
        .map(|i| UiVertex {
            pos: [i as f32, (i / 4) as f32],
            uv: [(i % 2) as f32, ((i / 2) % 2) as f32],
            color: 0xff00_00ff | ((i as u32 & 0xff) << 8),
        })
        .collect();
    let indices = (0..quads as u16)
        .flat_map(|q| {
            let base = q * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect();
    match UiBatch::new(vertices, indices) {
        Ok(batch) => batch,
        Err(e) => panic!("ui fixture is inconsistent: {e}"),
    }
}
