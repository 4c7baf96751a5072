//! Identifiers, materials and GPU uniform block layouts.

use crate::constants::MAX_POINT_LIGHTS;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a registered asset.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// Identifier of a texture owned by the texture store.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct TextureId(pub u64);

impl TextureId {
    /// Placeholder texture bound when a mapped asset has no texture yet
    pub const MISSING: Self = Self(u64::MAX);
}

/// Surface material of an asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    /// Ambient color (RGBA)
    pub ambient: Vec4,
    /// Diffuse color (RGBA)
    pub diffuse: Vec4,
    /// Specular color (RGBA)
    pub specular: Vec4,
    /// Phong exponent
    pub phong_exp: f32,
    /// Draw without the camera transform
    pub ignore_transform: bool,
    /// Render with material colors even when texture coordinates exist
    pub force_unmap: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            specular: Vec4::new(0.5, 0.5, 0.5, 1.0),
            phong_exp: 32.0,
            ignore_transform: false,
            force_unmap: false,
        }
    }
}

impl Material {
    /// Build the per-asset uniform block for a 3D asset.
    pub fn to_uniform_3d(&self, is_mapped: bool) -> AssetUniform3D {
        AssetUniform3D {
            ambient: self.ambient,
            diffuse: self.diffuse,
            specular: self.specular,
            phong_exp: self.phong_exp,
            ignore_transform: u32::from(self.ignore_transform),
            is_unmapped: u32::from(self.force_unmap || !is_mapped),
            _pad: 0,
        }
    }

    /// Build the per-asset uniform block for a 2D asset.
    pub fn to_uniform_2d(&self, is_mapped: bool) -> AssetUniform2D {
        AssetUniform2D {
            color: self.diffuse,
            ignore_transform: u32::from(self.ignore_transform),
            is_unmapped: u32::from(self.force_unmap || !is_mapped),
            _pad: [0; 2],
        }
    }
}

/// Global 3D camera block.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Camera3DUniform {
    /// Projection multiplied by view
    pub transform: Mat4,
    /// View matrix alone, used for lighting
    pub view: Mat4,
}

/// Global 2D camera block (a 3x3 transform in std140 row padding).
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Camera2DUniform {
    pub rows: [Vec4; 3],
}

/// A single point light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PointLight {
    /// World position (w unused)
    pub position: Vec4,
    /// RGB color with intensity in w
    pub color: Vec4,
}

/// Global lighting block.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct LightingUniform {
    pub lights: [PointLight; MAX_POINT_LIGHTS],
    pub light_count: u32,
    pub _pad: [u32; 3],
}

impl LightingUniform {
    /// Pack up to [`MAX_POINT_LIGHTS`] lights; the rest are dropped.
    pub fn from_lights(lights: &[PointLight]) -> Self {
        let mut block = Self::default();
        let count = lights.len().min(MAX_POINT_LIGHTS);
        block.lights[..count].copy_from_slice(&lights[..count]);
        block.light_count = count as u32;
        block
    }
}

/// Per-asset uniform block for 3D assets.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct AssetUniform3D {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub phong_exp: f32,
    pub ignore_transform: u32,
    pub is_unmapped: u32,
    pub _pad: u32,
}

/// Per-asset uniform block for 2D assets.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct AssetUniform2D {
    pub color: Vec4,
    pub ignore_transform: u32,
    pub is_unmapped: u32,
    pub _pad: [u32; 2],
}

/// UI vertex as produced by the immediate-mode UI layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct UiVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    /// Packed RGBA8 color
    pub color: u32,
}
