//! Vertex layout variants and their attribute streams.
//!
//! Every asset is one of four layouts. [`VertexLayout::attributes`] is the only
//! place that decides which attribute streams a layout carries; the offset
//! pass, the upload path and the descriptor layer all go through it.

use crate::error::{Error, Result};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Vertex layout of an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexLayout {
    /// 2D positions only
    Unmapped2D,
    /// 2D positions with texture coordinates
    Mapped2D,
    /// 3D positions with normals
    Unmapped3D,
    /// 3D positions with texture coordinates and normals
    Mapped3D,
}

impl VertexLayout {
    /// All layouts, in descriptor category order.
    pub const ALL: [Self; 4] = [
        Self::Unmapped2D,
        Self::Mapped2D,
        Self::Unmapped3D,
        Self::Mapped3D,
    ];

    /// Returns true for 3D layouts.
    #[inline]
    pub const fn is_3d(self) -> bool {
        matches!(self, Self::Unmapped3D | Self::Mapped3D)
    }

    /// Returns true for layouts carrying texture coordinates.
    #[inline]
    pub const fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped2D | Self::Mapped3D)
    }

    /// Attribute streams present in this layout, in packing order.
    pub const fn attributes(self) -> &'static [Attribute] {
        match self {
            Self::Unmapped2D => &[Attribute::Position2D],
            Self::Mapped2D => &[Attribute::Position2D, Attribute::TexCoord],
            Self::Unmapped3D => &[Attribute::Position3D, Attribute::Normal],
            Self::Mapped3D => &[
                Attribute::Position3D,
                Attribute::TexCoord,
                Attribute::Normal,
            ],
        }
    }

    /// Size of one interleaved vertex in bytes.
    pub fn interleaved_stride(self) -> u64 {
        self.attributes().iter().map(|a| a.element_size()).sum()
    }

    /// Byte offset of `attribute` inside an interleaved vertex.
    pub fn attribute_offset(self, attribute: Attribute) -> Option<u64> {
        let mut offset = 0;
        for &a in self.attributes() {
            if a == attribute {
                return Some(offset);
            }
            offset += a.element_size();
        }
        None
    }
}

/// A single per-vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Position2D,
    Position3D,
    TexCoord,
    Normal,
}

impl Attribute {
    /// Size of one element of this attribute in bytes.
    #[inline]
    pub const fn element_size(self) -> u64 {
        match self {
            Self::Position2D | Self::TexCoord => 8,
            Self::Position3D | Self::Normal => 12,
        }
    }

    /// Returns true for either position attribute.
    #[inline]
    pub const fn is_position(self) -> bool {
        matches!(self, Self::Position2D | Self::Position3D)
    }
}

/// One attribute stream borrowed from [`VertexData`].
#[derive(Clone, Copy, Debug)]
pub struct VertexStream<'a> {
    pub attribute: Attribute,
    /// Number of elements
    pub len: usize,
    /// Raw element bytes
    pub bytes: &'a [u8],
}

impl VertexStream<'_> {
    /// Size of the stream in bytes.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Bytes of element `index`.
    pub fn element(&self, index: usize) -> &[u8] {
        let size = self.attribute.element_size() as usize;
        &self.bytes[index * size..(index + 1) * size]
    }
}

/// Decoded vertex attribute arrays, tagged by layout.
///
/// A present stream may be empty; it still produces a zero-sized region.
#[derive(Clone, Debug, PartialEq)]
pub enum VertexData {
    Unmapped2D {
        positions: Vec<Vec2>,
    },
    Mapped2D {
        positions: Vec<Vec2>,
        tex_coords: Vec<Vec2>,
    },
    Unmapped3D {
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
    },
    Mapped3D {
        positions: Vec<Vec3>,
        tex_coords: Vec<Vec2>,
        normals: Vec<Vec3>,
    },
}

impl VertexData {
    /// Empty vertex data of the given layout.
    pub const fn empty(layout: VertexLayout) -> Self {
        match layout {
            VertexLayout::Unmapped2D => Self::Unmapped2D {
                positions: Vec::new(),
            },
            VertexLayout::Mapped2D => Self::Mapped2D {
                positions: Vec::new(),
                tex_coords: Vec::new(),
            },
            VertexLayout::Unmapped3D => Self::Unmapped3D {
                positions: Vec::new(),
                normals: Vec::new(),
            },
            VertexLayout::Mapped3D => Self::Mapped3D {
                positions: Vec::new(),
                tex_coords: Vec::new(),
                normals: Vec::new(),
            },
        }
    }

    /// Layout of this data.
    pub const fn layout(&self) -> VertexLayout {
        match self {
            Self::Unmapped2D { .. } => VertexLayout::Unmapped2D,
            Self::Mapped2D { .. } => VertexLayout::Mapped2D,
            Self::Unmapped3D { .. } => VertexLayout::Unmapped3D,
            Self::Mapped3D { .. } => VertexLayout::Mapped3D,
        }
    }

    /// Stream for one attribute, if the layout carries it.
    pub fn stream(&self, attribute: Attribute) -> Option<VertexStream<'_>> {
        let (len, bytes): (usize, &[u8]) = match (self, attribute) {
            (
                Self::Unmapped2D { positions } | Self::Mapped2D { positions, .. },
                Attribute::Position2D,
            ) => (positions.len(), bytemuck::cast_slice(positions)),
            (
                Self::Unmapped3D { positions, .. } | Self::Mapped3D { positions, .. },
                Attribute::Position3D,
            ) => (positions.len(), bytemuck::cast_slice(positions)),
            (
                Self::Mapped2D { tex_coords, .. } | Self::Mapped3D { tex_coords, .. },
                Attribute::TexCoord,
            ) => (tex_coords.len(), bytemuck::cast_slice(tex_coords)),
            (
                Self::Unmapped3D { normals, .. } | Self::Mapped3D { normals, .. },
                Attribute::Normal,
            ) => (normals.len(), bytemuck::cast_slice(normals)),
            _ => return None,
        };
        Some(VertexStream {
            attribute,
            len,
            bytes,
        })
    }

    /// All attribute streams in packing order.
    pub fn streams(&self) -> Vec<VertexStream<'_>> {
        self.layout()
            .attributes()
            .iter()
            .filter_map(|&a| self.stream(a))
            .collect()
    }

    /// Number of position elements.
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Unmapped2D { positions } | Self::Mapped2D { positions, .. } => positions.len(),
            Self::Unmapped3D { positions, .. } | Self::Mapped3D { positions, .. } => {
                positions.len()
            }
        }
    }

    /// Append another primitive's streams to this one.
    pub fn extend(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Self::Unmapped2D { positions }, Self::Unmapped2D { positions: p }) => {
                positions.extend_from_slice(p);
            }
            (
                Self::Mapped2D {
                    positions,
                    tex_coords,
                },
                Self::Mapped2D {
                    positions: p,
                    tex_coords: t,
                },
            ) => {
                positions.extend_from_slice(p);
                tex_coords.extend_from_slice(t);
            }
            (
                Self::Unmapped3D { positions, normals },
                Self::Unmapped3D {
                    positions: p,
                    normals: n,
                },
            ) => {
                positions.extend_from_slice(p);
                normals.extend_from_slice(n);
            }
            (
                Self::Mapped3D {
                    positions,
                    tex_coords,
                    normals,
                },
                Self::Mapped3D {
                    positions: p,
                    tex_coords: t,
                    normals: n,
                },
            ) => {
                positions.extend_from_slice(p);
                tex_coords.extend_from_slice(t);
                normals.extend_from_slice(n);
            }
            (this, other) => {
                return Err(Error::LayoutMismatch {
                    expected: this.layout(),
                    found: other.layout(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_presence_per_layout() {
        assert_eq!(VertexLayout::Unmapped2D.attributes().len(), 1);
        assert!(VertexLayout::Mapped2D
            .attributes()
            .contains(&Attribute::TexCoord));
        assert!(!VertexLayout::Unmapped3D
            .attributes()
            .contains(&Attribute::TexCoord));
        assert!(VertexLayout::Unmapped3D
            .attributes()
            .contains(&Attribute::Normal));
        assert_eq!(VertexLayout::Mapped3D.attributes().len(), 3);
    }

    #[test]
    fn interleaved_strides() {
        assert_eq!(VertexLayout::Unmapped2D.interleaved_stride(), 8);
        assert_eq!(VertexLayout::Mapped2D.interleaved_stride(), 16);
        assert_eq!(VertexLayout::Unmapped3D.interleaved_stride(), 24);
        assert_eq!(VertexLayout::Mapped3D.interleaved_stride(), 32);
    }

    #[test]
    fn interleaved_attribute_offsets() {
        let layout = VertexLayout::Mapped3D;
        assert_eq!(layout.attribute_offset(Attribute::Position3D), Some(0));
        assert_eq!(layout.attribute_offset(Attribute::TexCoord), Some(12));
        assert_eq!(layout.attribute_offset(Attribute::Normal), Some(20));
        assert_eq!(
            VertexLayout::Unmapped2D.attribute_offset(Attribute::Normal),
            None
        );
    }

    #[test]
    fn empty_stream_is_still_present() {
        let data = VertexData::Mapped2D {
            positions: vec![Vec2::ZERO; 4],
            tex_coords: Vec::new(),
        };
        let streams = data.streams();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[1].attribute, Attribute::TexCoord);
        assert_eq!(streams[1].byte_size(), 0);
        assert!(data.stream(Attribute::Normal).is_none());
    }

    #[test]
    fn stream_bytes_match_elements() {
        let data = VertexData::Unmapped3D {
            positions: vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)],
            normals: vec![Vec3::Z, Vec3::Z],
        };
        let positions = data.stream(Attribute::Position3D).unwrap();
        assert_eq!(positions.byte_size(), 24);
        let second: &[f32] = bytemuck::cast_slice(positions.element(1));
        assert_eq!(second, &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn extend_rejects_other_layout() {
        let mut data = VertexData::empty(VertexLayout::Mapped3D);
        let other = VertexData::empty(VertexLayout::Unmapped3D);
        assert_eq!(
            data.extend(&other),
            Err(Error::LayoutMismatch {
                expected: VertexLayout::Mapped3D,
                found: VertexLayout::Unmapped3D,
            })
        );
    }
}
