//! Core types for the Tessera renderer.
//!
//! This crate provides the data that the sub-allocator packs into GPU buffers:
//! - Asset and texture identifiers
//! - Vertex layout variants and their attribute streams
//! - Uniform block structs shared with shaders
//! - UI draw batches
//! - Alignment helpers and common error types

pub mod asset;
pub mod error;
pub mod layout;
pub mod math;
pub mod types;
pub mod ui;

pub use asset::{Asset, AttributeIndices, InterleavedMesh, Primitive};
pub use error::{Error, Result};
pub use layout::{Attribute, VertexData, VertexLayout, VertexStream};
pub use types::{
    AssetId, AssetUniform2D, AssetUniform3D, Camera2DUniform, Camera3DUniform, LightingUniform,
    Material, PointLight, TextureId, UiVertex,
};
pub use ui::UiBatch;

/// Engine-wide constants
pub mod constants {
    /// Size of an asset index element in bytes (`u32`)
    pub const INDEX_SIZE: u64 = 4;
    /// Size of a UI index element in bytes (`u16`)
    pub const UI_INDEX_SIZE: u64 = 2;
    /// Alignment of vertex data inside the ASSET and UI sections
    pub const VERTEX_ALIGNMENT: u64 = 4;
    /// Maximum number of point lights in the lighting block
    pub const MAX_POINT_LIGHTS: usize = 8;
}
