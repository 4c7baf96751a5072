//! UI draw batches.

use crate::error::{Error, Result};
use crate::types::UiVertex;

/// One UI draw list: vertices plus 16-bit indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiBatch {
    vertices: Vec<UiVertex>,
    indices: Vec<u16>,
}

impl UiBatch {
    /// Create a batch, checking every index refers to a vertex.
    pub fn new(vertices: Vec<UiVertex>, indices: Vec<u16>) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| usize::from(i) >= vertices.len()) {
            return Err(Error::UiIndexOutOfRange {
                index,
                len: vertices.len(),
            });
        }
        Ok(Self { vertices, indices })
    }

    pub fn vertices(&self) -> &[UiVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Vertex bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
