//! Descriptor pools and per-asset descriptor sets.
//!
//! Every asset owns one set per frame in flight, allocated from the pool of
//! its category. Sets point at the asset's uniform region, the global chunk
//! of the same frame and, for mapped layouts, a texture.

use crate::backend::BufferBackend;
use crate::error::{Error, Result};
use crate::sync::wait_frames_idle;
use crate::uniform::{GlobalRanges, UniformRange, UniformRegionManager};
use bitflags::bitflags;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tessera_core::math::next_pow2;
use tessera_core::{Asset, AssetId, TextureId, VertexLayout};

/// Pool category. One pool exists per category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorCategory {
    Unmapped2D,
    Mapped2D,
    Unmapped3D,
    Mapped3D,
    Ui,
}

impl DescriptorCategory {
    pub const ALL: [Self; 5] = [
        Self::Unmapped2D,
        Self::Mapped2D,
        Self::Unmapped3D,
        Self::Mapped3D,
        Self::Ui,
    ];

    /// Category of assets with `layout`.
    pub const fn for_layout(layout: VertexLayout) -> Self {
        match layout {
            VertexLayout::Unmapped2D => Self::Unmapped2D,
            VertexLayout::Mapped2D => Self::Mapped2D,
            VertexLayout::Unmapped3D => Self::Unmapped3D,
            VertexLayout::Mapped3D => Self::Mapped3D,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Reallocation bit of this category.
    pub const fn bit(self) -> PoolReallocBits {
        match self {
            Self::Unmapped2D => PoolReallocBits::UNMAPPED_2D,
            Self::Mapped2D => PoolReallocBits::MAPPED_2D,
            Self::Unmapped3D => PoolReallocBits::UNMAPPED_3D,
            Self::Mapped3D => PoolReallocBits::MAPPED_3D,
            Self::Ui => PoolReallocBits::UI,
        }
    }

    /// Binding table of sets in this category.
    pub const fn bindings(self) -> &'static [BindingSlot] {
        match self {
            Self::Unmapped2D => UNMAPPED_2D_BINDINGS,
            Self::Mapped2D => MAPPED_2D_BINDINGS,
            Self::Unmapped3D => UNMAPPED_3D_BINDINGS,
            Self::Mapped3D => MAPPED_3D_BINDINGS,
            Self::Ui => UI_BINDINGS,
        }
    }
}

const UNMAPPED_2D_BINDINGS: &[BindingSlot] = &[
    BindingSlot::new(0, BindingSource::Camera2D),
    BindingSlot::new(1, BindingSource::AssetUniform),
];
const MAPPED_2D_BINDINGS: &[BindingSlot] = &[
    BindingSlot::new(0, BindingSource::Camera2D),
    BindingSlot::new(1, BindingSource::AssetUniform),
    BindingSlot::new(2, BindingSource::Texture),
];
const UNMAPPED_3D_BINDINGS: &[BindingSlot] = &[
    BindingSlot::new(0, BindingSource::Camera3D),
    BindingSlot::new(1, BindingSource::AssetUniform),
    BindingSlot::new(2, BindingSource::Lighting),
];
const MAPPED_3D_BINDINGS: &[BindingSlot] = &[
    BindingSlot::new(0, BindingSource::Camera3D),
    BindingSlot::new(1, BindingSource::AssetUniform),
    BindingSlot::new(2, BindingSource::Lighting),
    BindingSlot::new(3, BindingSource::Texture),
];
const UI_BINDINGS: &[BindingSlot] = &[BindingSlot::new(0, BindingSource::Texture)];

bitflags! {
    /// Pools that must be recreated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PoolReallocBits: u8 {
        const UNMAPPED_2D = 1 << 0;
        const MAPPED_2D = 1 << 1;
        const UNMAPPED_3D = 1 << 2;
        const MAPPED_3D = 1 << 3;
        const UI = 1 << 4;
    }
}

/// Where a binding's resource comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingSource {
    Camera3D,
    Camera2D,
    Lighting,
    AssetUniform,
    Texture,
}

/// One entry of a category's binding table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    pub binding: u32,
    pub source: BindingSource,
}

impl BindingSlot {
    pub const fn new(binding: u32, source: BindingSource) -> Self {
        Self { binding, source }
    }
}

/// A binding with its resource resolved, ready to be written into a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedBinding {
    Uniform {
        binding: u32,
        /// Native uniform buffer handle
        buffer: u64,
        offset: u64,
        range: u64,
    },
    Texture {
        binding: u32,
        texture: TextureId,
    },
}

impl ResolvedBinding {
    pub const fn binding(&self) -> u32 {
        match self {
            Self::Uniform { binding, .. } | Self::Texture { binding, .. } => *binding,
        }
    }
}

/// Resolve `category`'s binding table for one frame.
pub fn resolve_bindings(
    category: DescriptorCategory,
    buffer: u64,
    globals: &GlobalRanges,
    asset: Option<UniformRange>,
    texture: TextureId,
) -> Vec<ResolvedBinding> {
    let uniform = |binding, range: UniformRange| ResolvedBinding::Uniform {
        binding,
        buffer,
        offset: range.offset,
        range: range.range,
    };

    category
        .bindings()
        .iter()
        .filter_map(|slot| match slot.source {
            BindingSource::Camera3D => Some(uniform(slot.binding, globals.camera_3d)),
            BindingSource::Camera2D => Some(uniform(slot.binding, globals.camera_2d)),
            BindingSource::Lighting => Some(uniform(slot.binding, globals.lighting)),
            BindingSource::AssetUniform => asset.map(|range| uniform(slot.binding, range)),
            BindingSource::Texture => Some(ResolvedBinding::Texture {
                binding: slot.binding,
                texture,
            }),
        })
        .collect()
}

/// Capacity a pool grows to when `count` sets no longer fit in `cap`.
pub const fn grown_pool_capacity(cap: u32, count: u32) -> u32 {
    let doubled = cap.saturating_mul(2);
    if doubled >= count {
        doubled
    } else {
        next_pow2(count.saturating_mul(2))
    }
}

/// Tracks pool capacities and decides which pools must grow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorPlanner {
    capacities: [u32; 5],
}

impl DescriptorPlanner {
    pub fn new(initial_capacity: u32) -> Self {
        Self {
            capacities: [initial_capacity.max(1); 5],
        }
    }

    /// Current capacity in sets of `category`'s pool.
    pub const fn capacity(&self, category: DescriptorCategory) -> u32 {
        self.capacities[category.index()]
    }

    /// Record that `category`'s pool now holds `capacity` sets.
    pub fn set_capacity(&mut self, category: DescriptorCategory, capacity: u32) {
        self.capacities[category.index()] = capacity;
    }

    /// Grow every pool whose live set count exceeds its capacity.
    ///
    /// `counts` is indexed like [`DescriptorCategory::ALL`]. Returns the
    /// pools that must be recreated at their new capacity.
    pub fn check_pool_capacity(&mut self, counts: &[u32; 5]) -> PoolReallocBits {
        let mut bits = PoolReallocBits::empty();
        for category in DescriptorCategory::ALL {
            let i = category.index();
            if counts[i] > self.capacities[i] {
                let grown = grown_pool_capacity(self.capacities[i], counts[i]);
                tracing::debug!(?category, from = self.capacities[i], to = grown, "descriptor pool grows");
                self.capacities[i] = grown;
                bits |= category.bit();
            }
        }
        bits
    }
}

/// Descriptor pool and set operations implemented by each graphics backend.
pub trait DescriptorBackend {
    type Pool;
    type Set: Copy + Eq + fmt::Debug;

    /// Create a pool for up to `max_sets` sets of `category`.
    fn create_pool(&mut self, category: DescriptorCategory, max_sets: u32) -> Result<Self::Pool>;

    /// Destroy a pool and every set allocated from it.
    fn destroy_pool(&mut self, pool: Self::Pool);

    /// Allocate `count` sets. Fails with [`Error::DescriptorExhaustion`]
    /// when the pool is full.
    fn allocate_sets(&mut self, pool: &mut Self::Pool, count: u32) -> Result<Vec<Self::Set>>;

    /// Point `set` at the resolved resources.
    fn write_set(&mut self, set: Self::Set, bindings: &[ResolvedBinding]) -> Result<()>;

    /// Return sets to their pool.
    fn free_sets(&mut self, pool: &mut Self::Pool, sets: &[Self::Set]) -> Result<()>;
}

/// Sets of one owner, one per frame in flight.
#[derive(Debug)]
struct OwnedSets<S> {
    category: DescriptorCategory,
    sets: Vec<S>,
    /// Texture the sets were written with
    texture: TextureId,
    /// Uniform generation the sets were written against, `None` until every
    /// set has been written once
    generation: Option<u64>,
}

impl<S> OwnedSets<S> {
    fn unwritten(category: DescriptorCategory, sets: Vec<S>) -> Self {
        Self {
            category,
            sets,
            texture: TextureId::MISSING,
            generation: None,
        }
    }

    fn is_current(&self, texture: TextureId, generation: u64) -> bool {
        self.generation == Some(generation) && self.texture == texture
    }
}

/// What [`DescriptorRegistry::sync`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pools recreated at a larger capacity
    pub reallocated: PoolReallocBits,
    /// Sets freshly allocated
    pub allocated: u32,
    /// Sets rewritten in place
    pub rewritten: u32,
    /// Sets freed
    pub freed: u32,
}

/// Owns the descriptor pools and every asset's sets.
pub struct DescriptorRegistry<D: DescriptorBackend> {
    planner: DescriptorPlanner,
    pools: Vec<D::Pool>,
    assets: HashMap<AssetId, OwnedSets<D::Set>>,
    ui: Option<OwnedSets<D::Set>>,
    font_texture: TextureId,
    fallback_texture: TextureId,
    frames_in_flight: u32,
    fence_timeout: Duration,
}

impl<D: DescriptorBackend> DescriptorRegistry<D> {
    /// Create one pool per category.
    pub fn new(
        desc: &mut D,
        pool_capacity: u32,
        frames_in_flight: u32,
        fallback_texture: TextureId,
        fence_timeout: Duration,
    ) -> Result<Self> {
        let planner = DescriptorPlanner::new(pool_capacity);
        let mut pools = Vec::with_capacity(DescriptorCategory::ALL.len());
        for category in DescriptorCategory::ALL {
            match desc.create_pool(category, planner.capacity(category)) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    for pool in pools {
                        desc.destroy_pool(pool);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            planner,
            pools,
            assets: HashMap::new(),
            ui: None,
            font_texture: TextureId::MISSING,
            fallback_texture,
            frames_in_flight: frames_in_flight.max(1),
            fence_timeout,
        })
    }

    /// Texture sampled by mapped assets without their own.
    fn effective_texture(&self, asset: &Asset) -> TextureId {
        if asset.layout().is_mapped() {
            asset.texture().unwrap_or(self.fallback_texture)
        } else {
            TextureId::MISSING
        }
    }

    /// Bring every set in line with the live assets and uniform regions.
    ///
    /// Grows pools that can no longer hold the live sets, frees the sets of
    /// removed assets, allocates sets for new ones and rewrites sets whose
    /// uniform region moved or whose texture changed. In-flight frames are
    /// waited for once, and only when an existing set is touched.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn sync<B: BufferBackend>(
        &mut self,
        desc: &mut D,
        backend: &mut B,
        assets: &[Asset],
        uniforms: &UniformRegionManager<B>,
    ) -> Result<SyncReport> {
        let frames = self.frames_in_flight;
        let generation = uniforms.generation();

        let mut counts = [0u32; 5];
        for asset in assets {
            counts[DescriptorCategory::for_layout(asset.layout()).index()] += frames;
        }
        counts[DescriptorCategory::Ui.index()] = frames;

        let mut planned = self.planner.clone();
        let grown = planned.check_pool_capacity(&counts);

        let stale: Vec<AssetId> = self
            .assets
            .keys()
            .copied()
            .filter(|id| !assets.iter().any(|a| a.id() == *id))
            .collect();
        // Sets that were never written cannot be in use.
        let outdated = assets.iter().any(|asset| {
            self.assets.get(&asset.id()).is_some_and(|owned| {
                owned.generation.is_some()
                    && !owned.is_current(self.effective_texture(asset), generation)
            })
        });
        let ui_outdated = self
            .ui
            .as_ref()
            .is_some_and(|ui| ui.generation.is_some() && ui.texture != self.font_texture);

        if !grown.is_empty() || !stale.is_empty() || outdated || ui_outdated {
            wait_frames_idle(backend, self.fence_timeout)?;
        }

        let mut report = SyncReport {
            reallocated: grown,
            ..SyncReport::default()
        };

        for id in stale {
            if let Some(owned) = self.assets.remove(&id) {
                if !grown.contains(owned.category.bit()) {
                    desc.free_sets(&mut self.pools[owned.category.index()], &owned.sets)?;
                }
                report.freed += owned.sets.len() as u32;
            }
        }

        for category in DescriptorCategory::ALL {
            if !grown.contains(category.bit()) {
                continue;
            }
            let capacity = planned.capacity(category);
            let fresh = desc.create_pool(category, capacity)?;
            let old = std::mem::replace(&mut self.pools[category.index()], fresh);
            desc.destroy_pool(old);
            self.planner.set_capacity(category, capacity);
            self.assets.retain(|_, owned| owned.category != category);
            if category == DescriptorCategory::Ui {
                self.ui = None;
            }
            tracing::info!(?category, capacity, "descriptor pool reallocated");
        }

        for asset in assets {
            let category = DescriptorCategory::for_layout(asset.layout());
            let texture = self.effective_texture(asset);
            let i = category.index();

            let owned = match self.assets.entry(asset.id()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let sets = desc.allocate_sets(&mut self.pools[i], frames)?;
                    report.allocated += frames;
                    entry.insert(OwnedSets::unwritten(category, sets))
                }
            };
            if owned.is_current(texture, generation) {
                continue;
            }

            for (frame, &set) in (0..frames).zip(&owned.sets) {
                let globals = uniforms.global_ranges(frame)?;
                let range = uniforms.asset_range(asset.id(), frame)?;
                let bindings = resolve_bindings(
                    category,
                    uniforms.raw_handle(),
                    &globals,
                    Some(range),
                    texture,
                );
                desc.write_set(set, &bindings)?;
            }
            owned.texture = texture;
            owned.generation = Some(generation);
            report.rewritten += frames;
        }

        let ui_current = self
            .ui
            .as_ref()
            .is_some_and(|ui| ui.generation.is_some() && ui.texture == self.font_texture);
        if !ui_current {
            self.write_ui_sets(desc, uniforms, &mut report)?;
        }

        if report != SyncReport::default() {
            tracing::debug!(?report, "descriptor sets synced");
        }
        Ok(report)
    }

    fn write_ui_sets<B: BufferBackend>(
        &mut self,
        desc: &mut D,
        uniforms: &UniformRegionManager<B>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let frames = self.frames_in_flight;
        let category = DescriptorCategory::Ui;
        if self.ui.is_none() {
            let sets = desc.allocate_sets(&mut self.pools[category.index()], frames)?;
            report.allocated += frames;
            self.ui = Some(OwnedSets::unwritten(category, sets));
        }

        let font = self.font_texture;
        let Some(ui) = self.ui.as_mut() else {
            return Ok(());
        };
        for (frame, &set) in (0..frames).zip(&ui.sets) {
            let globals = uniforms.global_ranges(frame)?;
            let bindings = resolve_bindings(category, uniforms.raw_handle(), &globals, None, font);
            desc.write_set(set, &bindings)?;
        }
        ui.texture = font;
        ui.generation = Some(uniforms.generation());
        report.rewritten += frames;
        Ok(())
    }

    /// Set bound when drawing `asset` in frame `frame`.
    pub fn bind_asset_descriptors(&self, asset: AssetId, frame: u32) -> Result<D::Set> {
        self.check_frame(frame)?;
        let owned = self.assets.get(&asset).ok_or(Error::UnknownAsset(asset))?;
        if owned.generation.is_none() {
            return Err(Error::Backend(format!(
                "descriptor sets of {asset} were never written"
            )));
        }
        owned
            .sets
            .get(frame as usize)
            .copied()
            .ok_or(Error::InvalidFrame {
                frame,
                frames_in_flight: self.frames_in_flight,
            })
    }

    /// UI set of frame `frame`, once the first sync has run.
    pub fn ui_set(&self, frame: u32) -> Result<D::Set> {
        self.check_frame(frame)?;
        self.ui
            .as_ref()
            .filter(|ui| ui.generation.is_some())
            .and_then(|ui| ui.sets.get(frame as usize).copied())
            .ok_or_else(|| Error::Backend("UI descriptor sets not allocated".to_string()))
    }

    /// Font atlas bound by UI sets. Takes effect at the next sync.
    pub fn set_font_texture(&mut self, texture: TextureId) {
        self.font_texture = texture;
    }

    pub const fn font_texture(&self) -> TextureId {
        self.font_texture
    }

    /// Capacity in sets of `category`'s pool.
    pub const fn pool_capacity(&self, category: DescriptorCategory) -> u32 {
        self.planner.capacity(category)
    }

    /// Number of assets holding sets.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn check_frame(&self, frame: u32) -> Result<()> {
        if frame >= self.frames_in_flight {
            return Err(Error::InvalidFrame {
                frame,
                frames_in_flight: self.frames_in_flight,
            });
        }
        Ok(())
    }

    /// Destroy every pool. In-flight frames must have retired.
    pub fn destroy(self, desc: &mut D) {
        for pool in self.pools {
            desc.destroy_pool(pool);
        }
    }
}
