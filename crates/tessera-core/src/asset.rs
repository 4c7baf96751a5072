//! Assets: validated vertex data, per-attribute indices and material.

use crate::error::{Error, Result};
use crate::layout::{Attribute, VertexData, VertexLayout};
use crate::types::{AssetId, AssetUniform2D, AssetUniform3D, Material, TextureId};
use hashbrown::HashMap;
use std::sync::OnceLock;

/// Index arrays, one per attribute stream.
///
/// Positions are always indexed; texture coordinates and normals carry their
/// own index arrays when the layout has them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeIndices {
    pub position: Vec<u32>,
    pub tex_coord: Option<Vec<u32>>,
    pub normal: Option<Vec<u32>>,
}

impl AttributeIndices {
    /// Empty index arrays matching `layout`.
    pub fn empty(layout: VertexLayout) -> Self {
        Self {
            position: Vec::new(),
            tex_coord: layout.is_mapped().then(Vec::new),
            normal: layout.is_3d().then(Vec::new),
        }
    }

    /// Use one index array for every attribute of `layout`.
    pub fn shared(indices: Vec<u32>, layout: VertexLayout) -> Self {
        Self {
            tex_coord: layout.is_mapped().then(|| indices.clone()),
            normal: layout.is_3d().then(|| indices.clone()),
            position: indices,
        }
    }

    /// Number of indices (taken from the position array).
    #[inline]
    pub fn count(&self) -> usize {
        self.position.len()
    }

    /// Index array for `attribute`.
    pub fn for_attribute(&self, attribute: Attribute) -> Option<&[u32]> {
        match attribute {
            Attribute::Position2D | Attribute::Position3D => Some(&self.position),
            Attribute::TexCoord => self.tex_coord.as_deref(),
            Attribute::Normal => self.normal.as_deref(),
        }
    }

    fn for_attribute_mut(&mut self, attribute: Attribute) -> Option<&mut Vec<u32>> {
        match attribute {
            Attribute::Position2D | Attribute::Position3D => Some(&mut self.position),
            Attribute::TexCoord => self.tex_coord.as_mut(),
            Attribute::Normal => self.normal.as_mut(),
        }
    }
}

/// One mesh primitive as produced by an asset loader.
#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub vertices: VertexData,
    pub indices: AttributeIndices,
}

/// Single-stream form of an asset used by interleaved packing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterleavedMesh {
    /// Interleaved vertex bytes
    pub vertices: Vec<u8>,
    /// Number of unique vertices
    pub vertex_count: usize,
    /// One index per original index tuple
    pub indices: Vec<u32>,
}

/// A validated renderable asset.
#[derive(Clone, Debug)]
pub struct Asset {
    id: AssetId,
    /// Human readable name
    pub name: String,
    vertices: VertexData,
    indices: AttributeIndices,
    /// Surface material
    pub material: Material,
    texture: Option<TextureId>,
    interleaved: OnceLock<InterleavedMesh>,
}

impl Asset {
    /// Create an asset, validating indices against the vertex streams.
    pub fn new(
        id: AssetId,
        name: impl Into<String>,
        vertices: VertexData,
        indices: AttributeIndices,
    ) -> Result<Self> {
        validate(&vertices, &indices)?;
        Ok(Self {
            id,
            name: name.into(),
            vertices,
            indices,
            material: Material::default(),
            texture: None,
            interleaved: OnceLock::new(),
        })
    }

    /// Merge several primitives of the same layout into one asset.
    ///
    /// Indices of later primitives are rebased onto the merged streams.
    pub fn from_primitives(
        id: AssetId,
        name: impl Into<String>,
        layout: VertexLayout,
        primitives: impl IntoIterator<Item = Primitive>,
    ) -> Result<Self> {
        let mut vertices = VertexData::empty(layout);
        let mut indices = AttributeIndices::empty(layout);

        for primitive in primitives {
            if primitive.vertices.layout() != layout {
                return Err(Error::LayoutMismatch {
                    expected: layout,
                    found: primitive.vertices.layout(),
                });
            }

            for &attribute in layout.attributes() {
                let base = vertices.stream(attribute).map_or(0, |s| s.len) as u32;
                let source = primitive
                    .indices
                    .for_attribute(attribute)
                    .ok_or(Error::MissingIndices(attribute))?;
                let target = indices
                    .for_attribute_mut(attribute)
                    .ok_or(Error::MissingIndices(attribute))?;
                target.extend(source.iter().map(|&i| i + base));
            }
            vertices.extend(&primitive.vertices)?;
        }

        Self::new(id, name, vertices, indices)
    }

    /// Set the material.
    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Set the texture.
    #[must_use]
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Swap in new vertex streams and index arrays of the same layout and
    /// return the previous ones.
    pub fn replace_data(
        &mut self,
        vertices: VertexData,
        indices: AttributeIndices,
    ) -> Result<(VertexData, AttributeIndices)> {
        if vertices.layout() != self.layout() {
            return Err(Error::LayoutMismatch {
                expected: self.layout(),
                found: vertices.layout(),
            });
        }
        validate(&vertices, &indices)?;
        self.interleaved = OnceLock::new();
        Ok((
            std::mem::replace(&mut self.vertices, vertices),
            std::mem::replace(&mut self.indices, indices),
        ))
    }

    /// Asset identifier.
    #[inline]
    pub const fn id(&self) -> AssetId {
        self.id
    }

    /// Vertex layout.
    #[inline]
    pub const fn layout(&self) -> VertexLayout {
        self.vertices.layout()
    }

    /// Vertex streams.
    #[inline]
    pub const fn vertices(&self) -> &VertexData {
        &self.vertices
    }

    /// Per-attribute index arrays.
    #[inline]
    pub const fn indices(&self) -> &AttributeIndices {
        &self.indices
    }

    /// Bound texture, if any.
    #[inline]
    pub const fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Replace the bound texture.
    pub fn set_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
    }

    /// Index arrays in attribute order, one per present attribute.
    pub fn index_arrays(&self) -> Vec<&[u32]> {
        self.layout()
            .attributes()
            .iter()
            .filter_map(|&a| self.indices.for_attribute(a))
            .collect()
    }

    /// Check the asset still satisfies its layout invariants.
    pub fn validate(&self) -> Result<()> {
        validate(&self.vertices, &self.indices)
    }

    /// Size of this asset's per-frame uniform block.
    pub const fn uniform_size(&self) -> u64 {
        if self.layout().is_3d() {
            std::mem::size_of::<AssetUniform3D>() as u64
        } else {
            std::mem::size_of::<AssetUniform2D>() as u64
        }
    }

    /// Uniform block bytes derived from the material.
    pub fn uniform_bytes(&self) -> Vec<u8> {
        let layout = self.layout();
        if layout.is_3d() {
            bytemuck::bytes_of(&self.material.to_uniform_3d(layout.is_mapped())).to_vec()
        } else {
            bytemuck::bytes_of(&self.material.to_uniform_2d(layout.is_mapped())).to_vec()
        }
    }

    /// Interleaved form, built on first use.
    ///
    /// Identical index tuples collapse into a single vertex.
    pub fn interleaved(&self) -> &InterleavedMesh {
        self.interleaved.get_or_init(|| self.build_interleaved())
    }

    fn build_interleaved(&self) -> InterleavedMesh {
        let streams = self.vertices.streams();
        let arrays = self.index_arrays();
        let stride = self.layout().interleaved_stride() as usize;

        let mut unique: HashMap<Vec<u32>, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(self.indices.count());

        for i in 0..self.indices.count() {
            let key: Vec<u32> = arrays.iter().map(|a| a[i]).collect();
            let next = unique.len() as u32;
            let index = *unique.entry(key).or_insert_with_key(|key| {
                vertices.reserve(stride);
                for (stream, &element) in streams.iter().zip(key.iter()) {
                    vertices.extend_from_slice(stream.element(element as usize));
                }
                next
            });
            indices.push(index);
        }

        InterleavedMesh {
            vertex_count: unique.len(),
            vertices,
            indices,
        }
    }
}

fn validate(vertices: &VertexData, indices: &AttributeIndices) -> Result<()> {
    let layout = vertices.layout();
    let count = indices.count();

    if indices.tex_coord.is_some() && !layout.is_mapped() {
        return Err(Error::UnexpectedIndices(Attribute::TexCoord));
    }
    if indices.normal.is_some() && !layout.is_3d() {
        return Err(Error::UnexpectedIndices(Attribute::Normal));
    }

    for stream in vertices.streams() {
        let attribute = stream.attribute;
        let array = indices
            .for_attribute(attribute)
            .ok_or(Error::MissingIndices(attribute))?;
        if array.len() != count {
            return Err(Error::IndexCountMismatch {
                attribute,
                expected: count,
                found: array.len(),
            });
        }
        if let Some(&index) = array.iter().find(|&&i| i as usize >= stream.len) {
            return Err(Error::IndexOutOfRange {
                attribute,
                index,
                len: stream.len,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn quad_2d() -> Primitive {
        Primitive {
            vertices: VertexData::Mapped2D {
                positions: vec![
                    Vec2::new(0.0, 0.0),
                    Vec2::new(1.0, 0.0),
                    Vec2::new(1.0, 1.0),
                    Vec2::new(0.0, 1.0),
                ],
                tex_coords: vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            },
            indices: AttributeIndices::shared(vec![0, 1, 2, 2, 3, 0], VertexLayout::Mapped2D),
        }
    }

    #[test]
    fn accepts_valid_asset() {
        let quad = quad_2d();
        let asset = Asset::new(AssetId(1), "quad", quad.vertices, quad.indices).unwrap();
        assert_eq!(asset.layout(), VertexLayout::Mapped2D);
        assert_eq!(asset.index_arrays().len(), 2);
        assert_eq!(asset.uniform_size(), 32);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut quad = quad_2d();
        quad.indices.position[2] = 4;
        let err = Asset::new(AssetId(1), "quad", quad.vertices, quad.indices).unwrap_err();
        assert_eq!(
            err,
            Error::IndexOutOfRange {
                attribute: Attribute::Position2D,
                index: 4,
                len: 4,
            }
        );
    }

    #[test]
    fn rejects_missing_and_unexpected_indices() {
        let quad = quad_2d();
        let mut indices = quad.indices.clone();
        indices.tex_coord = None;
        assert_eq!(
            Asset::new(AssetId(1), "quad", quad.vertices.clone(), indices).unwrap_err(),
            Error::MissingIndices(Attribute::TexCoord)
        );

        let mut indices = quad.indices;
        indices.normal = Some(vec![0; 6]);
        assert_eq!(
            Asset::new(AssetId(1), "quad", quad.vertices, indices).unwrap_err(),
            Error::UnexpectedIndices(Attribute::Normal)
        );
    }

    #[test]
    fn rejects_index_count_mismatch() {
        let quad = quad_2d();
        let mut indices = quad.indices;
        indices.tex_coord = Some(vec![0, 1, 2]);
        assert!(matches!(
            Asset::new(AssetId(1), "quad", quad.vertices, indices),
            Err(Error::IndexCountMismatch {
                expected: 6,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn merges_primitives_with_rebased_indices() {
        let asset = Asset::from_primitives(
            AssetId(7),
            "two quads",
            VertexLayout::Mapped2D,
            [quad_2d(), quad_2d()],
        )
        .unwrap();

        assert_eq!(asset.vertices().vertex_count(), 8);
        assert_eq!(asset.indices().count(), 12);
        assert_eq!(&asset.indices().position[6..], &[4, 5, 6, 6, 7, 4]);
        assert_eq!(
            asset.indices().tex_coord.as_deref().map(|t| t[11]),
            Some(4)
        );
    }

    #[test]
    fn merge_rejects_heterogeneous_layouts() {
        let other = Primitive {
            vertices: VertexData::Unmapped2D {
                positions: vec![Vec2::ZERO],
            },
            indices: AttributeIndices::shared(vec![0], VertexLayout::Unmapped2D),
        };
        let err = Asset::from_primitives(
            AssetId(1),
            "mixed",
            VertexLayout::Mapped2D,
            [quad_2d(), other],
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::LayoutMismatch {
                expected: VertexLayout::Mapped2D,
                found: VertexLayout::Unmapped2D,
            }
        );
    }

    #[test]
    fn interleaving_deduplicates_tuples() {
        let quad = quad_2d();
        let asset = Asset::new(AssetId(1), "quad", quad.vertices, quad.indices).unwrap();
        let mesh = asset.interleaved();

        assert_eq!(mesh.vertex_count, 4);
        assert_eq!(mesh.vertices.len(), 4 * 16);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);

        // Third unique vertex: position (1, 1), uv (1, 1).
        let third: &[f32] = bytemuck::cast_slice(&mesh.vertices[32..48]);
        assert_eq!(third, &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn interleaving_splits_distinct_normals() {
        let vertices = VertexData::Unmapped3D {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z, Vec3::NEG_Z],
        };
        let indices = AttributeIndices {
            position: vec![0, 1, 2, 0, 1, 2],
            tex_coord: None,
            normal: Some(vec![0, 0, 0, 1, 1, 1]),
        };
        let asset = Asset::new(AssetId(3), "two-sided", vertices, indices).unwrap();
        let mesh = asset.interleaved();
        assert_eq!(mesh.vertex_count, 6);
        assert_eq!(mesh.vertices.len(), 6 * 24);
    }

    #[test]
    fn replacing_data_keeps_layout_and_resets_interleaving() {
        let quad = quad_2d();
        let mut asset = Asset::new(AssetId(1), "quad", quad.vertices, quad.indices).unwrap();
        assert_eq!(asset.interleaved().indices.len(), 6);

        let triangle = VertexData::Mapped2D {
            positions: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            tex_coords: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
        };
        let indices = AttributeIndices::shared(vec![0, 1, 2], VertexLayout::Mapped2D);
        let (old_vertices, _) = asset.replace_data(triangle, indices).unwrap();
        assert_eq!(old_vertices.vertex_count(), 4);
        assert_eq!(asset.interleaved().indices, vec![0, 1, 2]);

        let solid = VertexData::Unmapped3D {
            positions: vec![Vec3::ZERO],
            normals: vec![Vec3::Z],
        };
        let err = asset
            .replace_data(solid, AttributeIndices::shared(vec![0], VertexLayout::Unmapped3D))
            .unwrap_err();
        assert!(matches!(err, Error::LayoutMismatch { .. }));
        assert_eq!(asset.indices().count(), 3);
    }
}
