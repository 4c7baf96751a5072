//! The render context: one owner for every allocator piece.
//!
//! All mutation goes through `&mut RenderContext`, so offsets have a single
//! writer. Draw recording reads the committed offsets and descriptor sets
//! between mutations.

use crate::backend::BufferBackend;
use crate::buffers::{BufferManager, ReallocOutcome};
use crate::config::AllocatorConfig;
use crate::descriptors::{DescriptorBackend, DescriptorRegistry, SyncReport};
use crate::error::{Error, Result};
use crate::offsets::{
    AssetPlacement, BufferSectionInfo, Section, SectionUsage, UiPlacement, VertexPacking,
};
use crate::registry::AssetRegistry;
use crate::sync::wait_frames_idle;
use crate::uniform::{GlobalUniforms, UniformRegionManager};
use tessera_core::{Asset, AssetId, AttributeIndices, Material, TextureId, UiBatch, VertexData};

/// Byte offsets of a registered asset. Valid until the next mutation of the
/// context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetOffsets {
    /// Position stream (or the interleaved stream)
    pub pos: u64,
    pub tex: Option<u64>,
    pub nor: Option<u64>,
    /// First index array
    pub ind: u64,
    /// Section holding the indices
    pub index_section: Section,
    /// Frame 0 of the asset's uniform region
    pub ubo: u64,
    /// Aligned size of one frame's uniform chunk
    pub ubo_chunk: u64,
}

/// Owns the asset registry, vertex/index buffers, uniform regions and
/// descriptor sets of one renderer, together with the backends they live on.
pub struct RenderContext<B: BufferBackend, D: DescriptorBackend> {
    backend: B,
    descriptors: D,
    config: AllocatorConfig,
    registry: AssetRegistry,
    ui: Vec<UiBatch>,
    buffers: BufferManager<B>,
    uniforms: UniformRegionManager<B>,
    sets: DescriptorRegistry<D>,
}

impl<B: BufferBackend, D: DescriptorBackend> RenderContext<B, D> {
    /// Allocate the initial buffers, the global uniform chunk and the
    /// descriptor pools.
    pub fn new(mut backend: B, mut descriptors: D, config: AllocatorConfig) -> Result<Self> {
        let alignment = config.uniform_alignment(backend.min_uniform_alignment());
        let buffers = BufferManager::new(&mut backend, &config, alignment)?;
        let uniforms = match UniformRegionManager::new(&mut backend, &config, alignment) {
            Ok(uniforms) => uniforms,
            Err(e) => {
                buffers.destroy(&mut backend);
                return Err(e);
            }
        };
        let sets = match DescriptorRegistry::new(
            &mut descriptors,
            config.descriptor_pool_capacity,
            config.frames_in_flight,
            config.fallback_texture,
            config.fence_timeout,
        ) {
            Ok(sets) => sets,
            Err(e) => {
                uniforms.destroy(&mut backend);
                buffers.destroy(&mut backend);
                return Err(e);
            }
        };

        let mut context = Self {
            backend,
            descriptors,
            config,
            registry: AssetRegistry::new(),
            ui: Vec::new(),
            buffers,
            uniforms,
            sets,
        };
        context.sync_descriptors()?;

        tracing::info!(
            packing = ?context.buffers.packing(),
            uniform_alignment = alignment,
            frames_in_flight = context.config.frames_in_flight,
            "render context created"
        );
        Ok(context)
    }

    /// Register one asset and return its offsets.
    ///
    /// A rejected registration (inconsistent layout, duplicate id, failed
    /// allocation) leaves the context as it was.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn register_asset(&mut self, asset: Asset) -> Result<AssetOffsets> {
        let id = asset.id();
        self.register_assets(std::iter::once(asset))?;
        self.asset_offsets(id)
    }

    /// Register several assets with a single capacity check.
    pub fn register_assets(&mut self, assets: impl IntoIterator<Item = Asset>) -> Result<()> {
        let mut added = Vec::new();
        for asset in assets {
            let id = asset.id();
            let checked = asset
                .validate()
                .map_err(|source| Error::LayoutInconsistency { asset: id, source })
                .and_then(|()| self.registry.insert(asset));
            if let Err(e) = checked {
                self.forget(&added);
                return Err(e);
            }
            added.push(id);
        }
        if added.is_empty() {
            return Ok(());
        }

        if let Err(e) =
            self.buffers
                .check_and_reallocate(&mut self.backend, self.registry.as_slice(), &self.ui)
        {
            self.forget(&added);
            return Err(e);
        }

        for (n, &id) in added.iter().enumerate() {
            if let Err(e) = self.reserve_uniforms(id) {
                self.roll_back(&added, &added[..=n]);
                return Err(e);
            }
        }

        if let Err(e) = self.sync_descriptors() {
            self.roll_back(&added, &added);
            if let Err(cleanup) = self.sync_descriptors() {
                tracing::warn!(error = %cleanup, "failed to release descriptor sets after rollback");
            }
            return Err(e);
        }
        tracing::debug!(count = added.len(), live = self.registry.len(), "assets registered");
        Ok(())
    }

    fn reserve_uniforms(&mut self, id: AssetId) -> Result<()> {
        let asset = self.registry.get(id)?;
        let data = asset.uniform_bytes();
        self.uniforms
            .reserve_asset_region(&mut self.backend, id, asset.uniform_size())?;
        for frame in 0..self.uniforms.frames_in_flight() {
            self.uniforms
                .update_frame_region(&mut self.backend, id, frame, &data)?;
        }
        Ok(())
    }

    /// Undo a registration whose assets were laid out and whose uniform
    /// regions in `reserved` were created.
    fn roll_back(&mut self, added: &[AssetId], reserved: &[AssetId]) {
        for &id in reserved {
            self.uniforms.release_asset_region(id).ok();
        }
        self.forget(added);
        self.restore_buffers();
    }

    fn forget(&mut self, ids: &[AssetId]) {
        for &id in ids {
            self.registry.remove(id).ok();
        }
    }

    /// Re-layout the buffers after a rolled back registration.
    fn restore_buffers(&mut self) {
        if let Err(e) =
            self.buffers
                .check_and_reallocate(&mut self.backend, self.registry.as_slice(), &self.ui)
        {
            tracing::warn!(error = %e, "failed to restore layout after rollback");
        }
    }

    /// Unregister an asset. Later assets shift down; their data is re-uploaded
    /// once in-flight frames have retired.
    pub fn remove_asset(&mut self, id: AssetId) -> Result<Asset> {
        let (position, asset) = self.registry.remove(id)?;
        if let Err(e) =
            self.buffers
                .check_and_reallocate(&mut self.backend, self.registry.as_slice(), &self.ui)
        {
            self.registry.restore(position, asset);
            return Err(e);
        }
        self.uniforms.release_asset_region(id)?;
        self.sync_descriptors()?;
        tracing::debug!(%id, live = self.registry.len(), "asset removed");
        Ok(asset)
    }

    /// Replace the vertex streams and index arrays of a registered asset and
    /// upload them. The layout must not change.
    ///
    /// Data that fits the current placement is rewritten in place once
    /// in-flight frames have retired; otherwise the buffers are re-laid out.
    /// On error the asset keeps its previous data.
    pub fn update_asset_data(
        &mut self,
        id: AssetId,
        vertices: VertexData,
        indices: AttributeIndices,
    ) -> Result<AssetOffsets> {
        let (old_vertices, old_indices) = self
            .registry
            .get_mut(id)?
            .replace_data(vertices, indices)
            .map_err(|source| Error::LayoutInconsistency { asset: id, source })?;
        self.buffers.mark_asset_dirty(id);

        if let Err(e) =
            self.buffers
                .check_and_reallocate(&mut self.backend, self.registry.as_slice(), &self.ui)
        {
            if let Ok(asset) = self.registry.get_mut(id) {
                asset.replace_data(old_vertices, old_indices).ok();
            }
            return Err(e);
        }
        tracing::debug!(%id, "asset data updated");
        self.asset_offsets(id)
    }

    /// Replace the UI draw batches and upload them.
    pub fn set_ui_batches(&mut self, batches: Vec<UiBatch>) -> Result<ReallocOutcome> {
        let previous = std::mem::replace(&mut self.ui, batches);
        self.buffers.mark_ui_dirty();
        match self
            .buffers
            .check_and_reallocate(&mut self.backend, self.registry.as_slice(), &self.ui)
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.ui = previous;
                Err(e)
            }
        }
    }

    /// Swap the texture sampled by `id`. Its descriptor sets are rewritten and
    /// its uniform block is refreshed for every frame.
    pub fn set_asset_texture(&mut self, id: AssetId, texture: Option<TextureId>) -> Result<()> {
        self.registry.get_mut(id)?.set_texture(texture);
        wait_frames_idle(&mut self.backend, self.config.fence_timeout)?;
        self.refresh_uniforms(id)?;
        self.sync_descriptors()
    }

    /// Replace the material of `id` and rewrite its uniform block for every
    /// frame once in-flight frames have retired.
    pub fn set_material(&mut self, id: AssetId, material: Material) -> Result<()> {
        self.registry.get_mut(id)?.material = material;
        wait_frames_idle(&mut self.backend, self.config.fence_timeout)?;
        self.refresh_uniforms(id)
    }

    fn refresh_uniforms(&mut self, id: AssetId) -> Result<()> {
        let data = self.registry.get(id)?.uniform_bytes();
        for frame in 0..self.uniforms.frames_in_flight() {
            self.uniforms
                .update_frame_region(&mut self.backend, id, frame, &data)?;
        }
        Ok(())
    }

    /// Font atlas bound by the UI sets.
    pub fn set_font_texture(&mut self, texture: TextureId) -> Result<()> {
        self.sets.set_font_texture(texture);
        self.sync_descriptors()
    }

    /// Write the material uniform of `id` into frame `frame`'s chunk.
    pub fn update_asset_uniform(&mut self, id: AssetId, frame: u32) -> Result<()> {
        let data = self.registry.get(id)?.uniform_bytes();
        self.uniforms
            .update_frame_region(&mut self.backend, id, frame, &data)
    }

    /// Write raw uniform bytes into frame `frame`'s chunk of `id`.
    pub fn write_asset_uniform(&mut self, id: AssetId, frame: u32, data: &[u8]) -> Result<()> {
        self.uniforms
            .update_frame_region(&mut self.backend, id, frame, data)
    }

    /// Write cameras and lights for frame `frame`.
    pub fn update_global_uniforms(&mut self, frame: u32, globals: &GlobalUniforms) -> Result<()> {
        self.uniforms.update_global(&mut self.backend, frame, globals)
    }

    /// Descriptor set to bind when drawing `id` in frame `frame`.
    pub fn bind_asset_descriptors(&self, id: AssetId, frame: u32) -> Result<D::Set> {
        self.registry.get(id)?;
        self.sets.bind_asset_descriptors(id, frame)
    }

    /// Descriptor set for UI draws in frame `frame`.
    pub fn ui_descriptor(&self, frame: u32) -> Result<D::Set> {
        self.sets.ui_set(frame)
    }

    /// Framebuffer resize. Buffer layout does not depend on the surface, so
    /// only the next global uniform update changes.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        tracing::debug!(width, height, "resize; no reallocation needed");
    }

    fn sync_descriptors(&mut self) -> Result<()> {
        let _: SyncReport = self.sets.sync(
            &mut self.descriptors,
            &mut self.backend,
            self.registry.as_slice(),
            &self.uniforms,
        )?;
        Ok(())
    }

    /// Current offsets of `id`.
    pub fn asset_offsets(&self, id: AssetId) -> Result<AssetOffsets> {
        let placement = self.placement(id)?;
        let region = self.uniforms.region(id).ok_or(Error::UnknownAsset(id))?;
        Ok(AssetOffsets {
            pos: placement.pos,
            tex: placement.tex,
            nor: placement.nor,
            ind: placement.ind,
            index_section: placement.index_section,
            ubo: region.offset,
            ubo_chunk: region.chunk,
        })
    }

    /// Committed vertex/index placement of `id`.
    pub fn placement(&self, id: AssetId) -> Result<&AssetPlacement> {
        self.buffers.placement(id).ok_or(Error::UnknownAsset(id))
    }

    pub fn ui_placements(&self) -> &[UiPlacement] {
        self.buffers.ui_placements()
    }

    /// Section sizes and capacities, including the uniform buffer.
    pub fn section_info(&self) -> BufferSectionInfo {
        let mut info = *self.buffers.sections();
        info.set(Section::Uniform, self.uniforms.usage());
        info
    }

    /// Usage of one section.
    pub fn section_usage(&self, section: Section) -> SectionUsage {
        self.section_info().get(section)
    }

    pub fn asset(&self, id: AssetId) -> Result<&Asset> {
        self.registry.get(id)
    }

    /// Live assets in registration order.
    pub fn assets(&self) -> &[Asset] {
        self.registry.as_slice()
    }

    pub fn ui_batches(&self) -> &[UiBatch] {
        &self.ui
    }

    pub const fn packing(&self) -> VertexPacking {
        self.buffers.packing()
    }

    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub const fn descriptor_backend(&self) -> &D {
        &self.descriptors
    }

    pub fn descriptor_backend_mut(&mut self) -> &mut D {
        &mut self.descriptors
    }

    pub const fn buffers(&self) -> &BufferManager<B> {
        &self.buffers
    }

    pub const fn uniforms(&self) -> &UniformRegionManager<B> {
        &self.uniforms
    }

    pub const fn descriptor_sets(&self) -> &DescriptorRegistry<D> {
        &self.sets
    }

    /// Read back the bytes of a committed region.
    pub fn read_region(&mut self, region: crate::offsets::Region) -> Result<Vec<u8>> {
        self.buffers.read_region(&mut self.backend, region)
    }

    /// Read back frame `frame`'s uniform block of `id`.
    pub fn read_asset_uniform(&mut self, id: AssetId, frame: u32) -> Result<Vec<u8>> {
        self.uniforms.read_frame_region(&mut self.backend, id, frame)
    }

    /// Wait for in-flight frames, release every GPU resource and hand the
    /// backends back.
    pub fn destroy(mut self) -> Result<(B, D)> {
        wait_frames_idle(&mut self.backend, self.config.fence_timeout)?;
        self.sets.destroy(&mut self.descriptors);
        self.uniforms.destroy(&mut self.backend);
        self.buffers.destroy(&mut self.backend);
        tracing::info!("render context destroyed");
        Ok((self.backend, self.descriptors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::ResolvedBinding;
    use crate::host::{BackendEvent, HostBackend, HostDescriptors};
    use glam::{Vec2, Vec3};
    use tessera_core::{AttributeIndices, VertexData, VertexLayout};

    type HostContext = RenderContext<HostBackend, HostDescriptors>;

    fn context(config: AllocatorConfig) -> HostContext {
        let backend = HostBackend::new();
        let descriptors = HostDescriptors::new(backend.log());
        RenderContext::new(backend, descriptors, config).unwrap()
    }

    fn cube(id: u64, vertices: usize) -> Asset {
        let layout = VertexLayout::Mapped3D;
        let data = VertexData::Mapped3D {
            positions: vec![Vec3::ONE; vertices],
            tex_coords: vec![Vec2::ZERO; vertices],
            normals: vec![Vec3::Z; vertices],
        };
        let indices = (0..vertices as u32).collect();
        Asset::new(AssetId(id), "cube", data, AttributeIndices::shared(indices, layout)).unwrap()
    }

    #[test]
    fn register_returns_offsets() {
        let mut ctx = context(AllocatorConfig::new());
        let offsets = ctx.register_asset(cube(1, 4)).unwrap();
        assert_eq!(offsets.pos, 0);
        assert_eq!(offsets.tex, Some(48));
        assert_eq!(offsets.nor, Some(80));
        assert_eq!(offsets.ind, 128);
        assert_eq!(offsets.ubo % 256, 0);
        assert_eq!(ctx.assets().len(), 1);
        assert!(ctx.bind_asset_descriptors(AssetId(1), 1).is_ok());
    }

    #[test]
    fn rejected_registration_leaves_context_untouched() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_asset(cube(1, 3)).unwrap();
        let before = ctx.section_info();

        assert!(matches!(
            ctx.register_asset(cube(1, 3)),
            Err(Error::DuplicateAsset(AssetId(1)))
        ));
        assert_eq!(ctx.section_info(), before);
        assert_eq!(ctx.assets().len(), 1);
    }

    #[test]
    fn allocation_failure_rolls_back() {
        let mut ctx = context(AllocatorConfig::new().with_capacities(256, 64, 64));
        ctx.register_asset(cube(1, 3)).unwrap();
        let before = ctx.section_info();
        ctx.backend_mut().set_allocation_limit(Some(1024));

        let err = ctx.register_asset(cube(2, 500)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(ctx.asset(AssetId(2)), Err(Error::UnknownAsset(_))));
        assert_eq!(ctx.section_info(), before);
        assert!(ctx.bind_asset_descriptors(AssetId(1), 0).is_ok());
    }

    #[test]
    fn material_uniform_written_for_every_frame() {
        let mut ctx = context(AllocatorConfig::new().with_frames_in_flight(3));
        let asset = cube(1, 3).with_texture(TextureId(4));
        let expected = asset.uniform_bytes();
        ctx.register_asset(asset).unwrap();

        for frame in 0..3 {
            assert_eq!(ctx.read_asset_uniform(AssetId(1), frame).unwrap(), expected);
        }
    }

    #[test]
    fn removal_relocates_and_frees() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_assets([cube(1, 4), cube(2, 4), cube(3, 4)])
            .unwrap();
        let third = ctx.asset_offsets(AssetId(3)).unwrap();

        ctx.remove_asset(AssetId(2)).unwrap();
        let moved = ctx.asset_offsets(AssetId(3)).unwrap();
        assert!(moved.pos < third.pos);
        assert_eq!(moved.pos, ctx.placement(AssetId(1)).unwrap().index_region().end());
        assert!(ctx.bind_asset_descriptors(AssetId(2), 0).is_err());

        let region = ctx.placement(AssetId(3)).unwrap().vertex_region();
        let bytes = ctx.read_region(region).unwrap();
        assert_eq!(&bytes[..12], bytemuck::bytes_of(&Vec3::ONE));
    }

    #[test]
    fn texture_swap_rewrites_descriptors() {
        let mut ctx = context(AllocatorConfig::new().with_fallback_texture(TextureId(1)));
        ctx.register_asset(cube(1, 3)).unwrap();
        let set = ctx.bind_asset_descriptors(AssetId(1), 0).unwrap();
        let fallback = ResolvedBinding::Texture {
            binding: 3,
            texture: TextureId(1),
        };
        assert!(ctx.descriptor_backend().bindings(set).unwrap().contains(&fallback));

        ctx.set_asset_texture(AssetId(1), Some(TextureId(8))).unwrap();
        let set = ctx.bind_asset_descriptors(AssetId(1), 0).unwrap();
        assert!(ctx
            .descriptor_backend()
            .bindings(set)
            .unwrap()
            .contains(&ResolvedBinding::Texture {
                binding: 3,
                texture: TextureId(8),
            }));
        assert_eq!(
            ctx.read_asset_uniform(AssetId(1), 0).unwrap(),
            ctx.asset(AssetId(1)).unwrap().uniform_bytes()
        );
    }

    #[test]
    fn material_change_rewrites_uniforms() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_asset(cube(1, 3)).unwrap();
        let before = ctx.read_asset_uniform(AssetId(1), 1).unwrap();

        let material = Material {
            phong_exp: 64.0,
            ..Material::default()
        };
        ctx.set_material(AssetId(1), material).unwrap();
        let after = ctx.read_asset_uniform(AssetId(1), 1).unwrap();
        assert_ne!(before, after);
        assert_eq!(after, ctx.asset(AssetId(1)).unwrap().uniform_bytes());
    }

    #[test]
    fn resize_does_not_touch_buffers() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_asset(cube(1, 3)).unwrap();
        let log = ctx.backend().log();
        log.clear();

        ctx.notify_resize(1920, 1080);
        assert!(log.is_empty());
    }

    #[test]
    fn destroy_releases_everything() {
        let mut ctx = context(AllocatorConfig::new().with_packing(VertexPacking::Interleaved));
        ctx.register_asset(cube(1, 3)).unwrap();
        let (backend, _) = ctx.destroy().unwrap();
        assert_eq!(backend.live_buffers(), 0);
        assert!(backend.log().contains(&BackendEvent::WaitFrames));
    }

    #[test]
    fn descriptor_failure_rolls_back_registration() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_asset(cube(1, 3)).unwrap();
        let asset_section = ctx.section_usage(Section::Asset);
        ctx.descriptor_backend_mut().reject_texture(TextureId(5));

        let err = ctx
            .register_asset(cube(2, 3).with_texture(TextureId(5)))
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(matches!(ctx.asset(AssetId(2)), Err(Error::UnknownAsset(_))));
        assert!(ctx.uniforms().region(AssetId(2)).is_none());
        assert!(ctx.bind_asset_descriptors(AssetId(2), 0).is_err());
        assert_eq!(ctx.section_usage(Section::Asset), asset_section);
        assert_eq!(ctx.descriptor_sets().asset_count(), 1);

        ctx.descriptor_backend_mut().accept_texture(TextureId(5));
        ctx.register_asset(cube(2, 3).with_texture(TextureId(5)))
            .unwrap();
        let set = ctx.bind_asset_descriptors(AssetId(2), 1).unwrap();
        assert!(ctx
            .descriptor_backend()
            .bindings(set)
            .unwrap()
            .contains(&ResolvedBinding::Texture {
                binding: 3,
                texture: TextureId(5),
            }));
    }

    #[test]
    fn asset_data_update_rewrites_in_place() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_assets([cube(1, 4), cube(2, 4)]).unwrap();
        let before = ctx.asset_offsets(AssetId(1)).unwrap();
        let log = ctx.backend().log();
        log.clear();

        let replacement = VertexData::Mapped3D {
            positions: vec![Vec3::X; 4],
            tex_coords: vec![Vec2::ONE; 4],
            normals: vec![Vec3::Y; 4],
        };
        let indices = AttributeIndices::shared(vec![3, 2, 1, 0], VertexLayout::Mapped3D);
        let after = ctx
            .update_asset_data(AssetId(1), replacement, indices)
            .unwrap();
        assert_eq!(after, before);

        let wait = log.position(|e| *e == BackendEvent::WaitFrames).unwrap();
        let upload = log
            .position(|e| matches!(e, BackendEvent::Upload { .. }))
            .unwrap();
        assert!(wait < upload);

        let region = ctx.placement(AssetId(1)).unwrap().vertex_region();
        let bytes = ctx.read_region(region).unwrap();
        assert_eq!(&bytes[..12], bytemuck::bytes_of(&Vec3::X));
        let index_region = ctx.placement(AssetId(1)).unwrap().index_region();
        let index_bytes = ctx.read_region(index_region).unwrap();
        assert_eq!(&index_bytes[..4], bytemuck::bytes_of(&3u32));
    }

    #[test]
    fn growing_asset_data_relays_out() {
        let mut ctx = context(AllocatorConfig::new().with_capacities(512, 64, 64));
        ctx.register_assets([cube(1, 3), cube(2, 3)]).unwrap();
        let second = ctx.asset_offsets(AssetId(2)).unwrap();

        let big = cube(1, 24);
        ctx.update_asset_data(AssetId(1), big.vertices().clone(), big.indices().clone())
            .unwrap();
        assert!(ctx.asset_offsets(AssetId(2)).unwrap().pos > second.pos);
        let region = ctx.placement(AssetId(2)).unwrap().vertex_region();
        assert_eq!(&ctx.read_region(region).unwrap()[..12], bytemuck::bytes_of(&Vec3::ONE));
    }

    #[test]
    fn asset_data_update_keeps_layout() {
        let mut ctx = context(AllocatorConfig::new());
        ctx.register_asset(cube(1, 3)).unwrap();
        let flat = VertexData::Unmapped2D {
            positions: vec![Vec2::ZERO; 3],
        };
        let err = ctx
            .update_asset_data(
                AssetId(1),
                flat,
                AttributeIndices::shared(vec![0, 1, 2], VertexLayout::Unmapped2D),
            )
            .unwrap_err();
        assert!(matches!(err, Error::LayoutInconsistency { .. }));
        assert_eq!(ctx.asset(AssetId(1)).unwrap().vertices().vertex_count(), 3);
    }
}
