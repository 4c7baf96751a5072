//! Allocator configuration.

use crate::offsets::VertexPacking;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::TextureId;

/// Initial capacities and policies of the sub-allocator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Initial ASSET section capacity in bytes
    pub asset_capacity: u64,
    /// Initial UI section capacity in bytes
    pub ui_capacity: u64,
    /// Initial INDICES section capacity in bytes (interleaved packing only)
    pub index_capacity: u64,
    /// Number of per-asset uniform regions the uniform buffer starts with
    pub initial_uniform_assets: u32,
    /// Frames that may be in flight at once
    pub frames_in_flight: u32,
    /// Vertex packing, or the backend's preference when unset
    pub packing: Option<VertexPacking>,
    /// Upper bound on any fence wait
    pub fence_timeout: Duration,
    /// Initial descriptor sets per pool category
    pub descriptor_pool_capacity: u32,
    /// Raise the uniform offset alignment above the device limit
    pub min_uniform_alignment: Option<u64>,
    /// Texture bound to mapped assets that have none
    pub fallback_texture: TextureId,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            asset_capacity: 64 * 1024,
            ui_capacity: 32 * 1024,
            index_capacity: 32 * 1024,
            initial_uniform_assets: 32,
            frames_in_flight: 2,
            packing: None,
            fence_timeout: Duration::from_secs(5),
            descriptor_pool_capacity: 32,
            min_uniform_alignment: None,
            fallback_texture: TextureId::MISSING,
        }
    }
}

impl AllocatorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial ASSET, UI and INDICES capacities.
    #[must_use]
    pub fn with_capacities(mut self, asset: u64, ui: u64, indices: u64) -> Self {
        self.asset_capacity = asset;
        self.ui_capacity = ui;
        self.index_capacity = indices;
        self
    }

    #[must_use]
    pub fn with_initial_uniform_assets(mut self, count: u32) -> Self {
        self.initial_uniform_assets = count;
        self
    }

    /// Set the number of frames in flight (at least one).
    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    #[must_use]
    pub fn with_packing(mut self, packing: VertexPacking) -> Self {
        self.packing = Some(packing);
        self
    }

    #[must_use]
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_descriptor_pool_capacity(mut self, sets: u32) -> Self {
        self.descriptor_pool_capacity = sets;
        self
    }

    #[must_use]
    pub fn with_min_uniform_alignment(mut self, alignment: u64) -> Self {
        self.min_uniform_alignment = Some(alignment);
        self
    }

    #[must_use]
    pub fn with_fallback_texture(mut self, texture: TextureId) -> Self {
        self.fallback_texture = texture;
        self
    }

    /// Effective uniform alignment for a device reporting `device_limit`.
    ///
    /// An override can only raise the device limit, never lower it.
    pub fn uniform_alignment(&self, device_limit: u64) -> u64 {
        self.min_uniform_alignment
            .map_or(device_limit, |a| a.max(device_limit))
            .max(1)
    }

    /// Effective packing given the backend's preference.
    pub fn packing_or(&self, preferred: VertexPacking) -> VertexPacking {
        self.packing.unwrap_or(preferred)
    }
}
