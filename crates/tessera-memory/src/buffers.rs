//! Vertex and index buffer management.
//!
//! The vertex buffer holds the ASSET section followed by the UI section, so UI
//! data starts at the ASSET capacity. With interleaved packing a second buffer
//! holds the INDICES section.

use crate::backend::{check_writes, ensure_in_bounds, BufferBackend, BufferRole, BufferWrite};
use crate::config::AllocatorConfig;
use crate::error::{Error, Result};
use crate::offsets::{
    AssetPlacement, BufferSectionInfo, Layout, OffsetFinder, Region, Section, UiPlacement,
    VertexPacking,
};
use crate::sync::{replace_resource, wait_frames_idle};
use hashbrown::{HashMap, HashSet};
use std::time::Duration;
use tessera_core::constants::INDEX_SIZE;
use tessera_core::{Asset, AssetId, UiBatch};

/// Physical buffers behind the vertex-side sections.
#[derive(Debug)]
pub struct PhysicalBuffers<T> {
    /// ASSET section followed by the UI section
    pub vertex: T,
    /// INDICES section (interleaved packing only)
    pub index: Option<T>,
}

/// Progress of a capacity check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReallocState {
    /// Offsets and buffers agree
    #[default]
    Stable,
    /// A section ran out of capacity; waiting for in-flight frames
    Growing,
    /// Building and filling the replacement buffers
    Reallocating,
}

/// What a capacity check did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReallocOutcome {
    /// Nothing moved and nothing new was uploaded
    Unchanged,
    /// New data was uploaded into unused space
    Uploaded { assets: usize },
    /// Live regions moved inside the existing buffers
    Relocated { assets: usize },
    /// Buffers were replaced with larger ones
    Reallocated { grown: Vec<Section> },
}

impl ReallocOutcome {
    /// Whether physical buffers were replaced.
    pub const fn is_reallocated(&self) -> bool {
        matches!(self, Self::Reallocated { .. })
    }
}

/// Owns the vertex/index buffers and the offsets of everything inside them.
pub struct BufferManager<B: BufferBackend> {
    finder: OffsetFinder,
    buffers: PhysicalBuffers<B::Buffer>,
    placements: HashMap<AssetId, AssetPlacement>,
    ui: Vec<UiPlacement>,
    ui_dirty: bool,
    /// Assets whose data changed at an unchanged placement
    dirty: HashSet<AssetId>,
    /// Per section, bytes a submitted frame may still read
    live_extent: [u64; 4],
    state: ReallocState,
    fence_timeout: Duration,
    reallocations: u64,
}

impl<B: BufferBackend> BufferManager<B> {
    /// Allocate the initial buffers.
    pub fn new(backend: &mut B, config: &AllocatorConfig, uniform_alignment: u64) -> Result<Self> {
        let packing = config.packing_or(backend.preferred_packing());
        let sections = BufferSectionInfo::new(
            config.asset_capacity,
            config.index_capacity,
            config.ui_capacity,
            uniform_alignment,
        );
        let buffers = allocate_buffers(backend, &sections, packing)?;

        tracing::info!(
            ?packing,
            asset_cap = config.asset_capacity,
            ui_cap = config.ui_capacity,
            "vertex buffers allocated"
        );

        Ok(Self {
            finder: OffsetFinder::new(packing, sections),
            buffers,
            placements: HashMap::new(),
            ui: Vec::new(),
            ui_dirty: false,
            dirty: HashSet::new(),
            live_extent: [0; 4],
            state: ReallocState::Stable,
            fence_timeout: config.fence_timeout,
            reallocations: 0,
        })
    }

    /// Recompute offsets for `assets` and `ui`, growing and re-filling the
    /// buffers when a section no longer fits.
    ///
    /// Offsets are committed only once the buffers hold the new layout; on
    /// error the previous buffers and offsets stay in place.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn check_and_reallocate(
        &mut self,
        backend: &mut B,
        assets: &[Asset],
        ui: &[UiBatch],
    ) -> Result<ReallocOutcome> {
        let layout = self.finder.recompute_offsets(assets, ui);
        let mut sections = layout.sections;
        let mut grown = Vec::new();

        for &section in self.finder.packing().buffer_sections() {
            if sections.needs_growth(section) {
                let old_cap = sections.get(section).cap;
                let new_cap = sections.grow_capacity(section);
                tracing::info!(
                    ?section,
                    size = sections.get(section).size,
                    old_cap,
                    new_cap,
                    "section capacity exhausted"
                );
                grown.push(section);
            }
        }

        if grown.is_empty() {
            self.update_in_place(backend, assets, ui, &layout)
        } else {
            self.reallocate(backend, assets, ui, &layout, sections)?;
            Ok(ReallocOutcome::Reallocated { grown })
        }
    }

    fn reallocate(
        &mut self,
        backend: &mut B,
        assets: &[Asset],
        ui: &[UiBatch],
        layout: &Layout,
        sections: BufferSectionInfo,
    ) -> Result<()> {
        let packing = self.finder.packing();
        self.state = ReallocState::Growing;

        let state = &mut self.state;
        let result = replace_resource(
            backend,
            self.fence_timeout,
            &mut self.buffers,
            |backend, _| {
                *state = ReallocState::Reallocating;
                let mut fresh = allocate_buffers(backend, &sections, packing)?;
                match upload_layout(backend, &mut fresh, sections, packing, assets, ui, layout) {
                    Ok(()) => Ok(fresh),
                    Err(e) => {
                        destroy_buffers(backend, fresh);
                        Err(e)
                    }
                }
            },
            destroy_buffers,
        );
        self.state = ReallocState::Stable;
        result?;

        self.commit(layout, sections);
        self.reset_live_extent(&sections);
        self.ui_dirty = false;
        self.reallocations += 1;

        tracing::info!(
            assets = assets.len(),
            ui_batches = ui.len(),
            asset_cap = sections.get(Section::Asset).cap,
            ui_cap = sections.get(Section::Ui).cap,
            "vertex buffers reallocated"
        );
        Ok(())
    }

    fn update_in_place(
        &mut self,
        backend: &mut B,
        assets: &[Asset],
        ui: &[UiBatch],
        layout: &Layout,
    ) -> Result<ReallocOutcome> {
        let packing = self.finder.packing();
        let mut writes = SectionWrites::new(layout.sections);
        let mut relocated = 0;
        let mut fresh = 0;

        for (asset, (id, placement)) in assets.iter().zip(&layout.assets) {
            match self.placements.get(id) {
                Some(old) if old != placement => relocated += 1,
                Some(_) if !self.dirty.contains(id) => continue,
                _ => fresh += 1,
            }
            writes.push_asset(asset, placement, packing)?;
        }

        let ui_changed = self.ui_dirty || self.ui != layout.ui;
        if ui_changed {
            for (batch, placement) in ui.iter().zip(&layout.ui) {
                writes.push_ui(batch, placement)?;
            }
        }

        if relocated == 0 && fresh == 0 && !ui_changed {
            self.commit(layout, layout.sections);
            self.raise_live_extent(&layout.sections);
            return Ok(ReallocOutcome::Unchanged);
        }

        if writes.touches(&self.live_extent) {
            tracing::debug!(relocated, "rewriting live regions");
            wait_frames_idle(backend, self.fence_timeout)?;
            self.live_extent = [0; 4];
        }
        writes.flush(backend, &mut self.buffers)?;

        self.commit(layout, layout.sections);
        self.raise_live_extent(&layout.sections);
        self.ui_dirty = false;

        Ok(if relocated > 0 {
            ReallocOutcome::Relocated { assets: relocated }
        } else {
            ReallocOutcome::Uploaded { assets: fresh }
        })
    }

    fn commit(&mut self, layout: &Layout, sections: BufferSectionInfo) {
        self.finder.commit(sections);
        self.dirty.clear();
        self.placements = layout.assets.iter().copied().collect();
        self.ui.clone_from(&layout.ui);
    }

    fn reset_live_extent(&mut self, sections: &BufferSectionInfo) {
        self.live_extent = Section::ALL.map(|s| sections.get(s).size);
    }

    fn raise_live_extent(&mut self, sections: &BufferSectionInfo) {
        for section in Section::ALL {
            let extent = &mut self.live_extent[section.index()];
            *extent = (*extent).max(sections.get(section).size);
        }
    }

    /// Re-upload `id` at the next check even if its placement is unchanged.
    pub fn mark_asset_dirty(&mut self, id: AssetId) {
        self.dirty.insert(id);
    }

    /// Mark UI batches for re-upload at the next check.
    pub fn mark_ui_dirty(&mut self) {
        self.ui_dirty = true;
    }

    /// Read a committed region back from the GPU.
    pub fn read_region(&self, backend: &mut B, region: Region) -> Result<Vec<u8>> {
        let sections = self.finder.sections();
        ensure_in_bounds(
            "section",
            region.offset,
            region.size,
            sections.get(region.section).cap,
        )?;

        match region.section {
            Section::Asset => backend.read_back(&self.buffers.vertex, region.offset, region.size),
            Section::Ui => backend.read_back(
                &self.buffers.vertex,
                self.ui_base() + region.offset,
                region.size,
            ),
            Section::Indices => {
                let index = self
                    .buffers
                    .index
                    .as_ref()
                    .ok_or_else(|| Error::Backend("no index buffer".to_string()))?;
                backend.read_back(index, region.offset, region.size)
            }
            Section::Uniform => Err(Error::Backend(
                "uniform data is not held by the vertex buffers".to_string(),
            )),
        }
    }

    /// Committed placement of `id`.
    pub fn placement(&self, id: AssetId) -> Option<&AssetPlacement> {
        self.placements.get(&id)
    }

    /// Committed UI placements, in batch order.
    pub fn ui_placements(&self) -> &[UiPlacement] {
        &self.ui
    }

    pub const fn sections(&self) -> &BufferSectionInfo {
        self.finder.sections()
    }

    pub const fn packing(&self) -> VertexPacking {
        self.finder.packing()
    }

    pub const fn state(&self) -> ReallocState {
        self.state
    }

    /// Number of completed reallocations.
    pub const fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Byte offset of the UI section inside the vertex buffer.
    pub const fn ui_base(&self) -> u64 {
        self.finder.sections().get(Section::Asset).cap
    }

    pub const fn vertex_buffer(&self) -> &B::Buffer {
        &self.buffers.vertex
    }

    pub const fn index_buffer(&self) -> Option<&B::Buffer> {
        self.buffers.index.as_ref()
    }

    /// Release the buffers. In-flight frames must have retired.
    pub fn destroy(self, backend: &mut B) {
        destroy_buffers(backend, self.buffers);
    }
}

fn allocate_buffers<B: BufferBackend>(
    backend: &mut B,
    sections: &BufferSectionInfo,
    packing: VertexPacking,
) -> Result<PhysicalBuffers<B::Buffer>> {
    let vertex_size = sections.get(Section::Asset).cap + sections.get(Section::Ui).cap;
    let vertex = backend.allocate(BufferRole::Vertex, vertex_size, "vertex buffer")?;

    let index = match packing {
        VertexPacking::Separate => None,
        VertexPacking::Interleaved => {
            let size = sections.get(Section::Indices).cap;
            match backend.allocate(BufferRole::Index, size, "index buffer") {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    backend.destroy(vertex);
                    return Err(e);
                }
            }
        }
    };

    Ok(PhysicalBuffers { vertex, index })
}

fn destroy_buffers<B: BufferBackend>(backend: &mut B, buffers: PhysicalBuffers<B::Buffer>) {
    backend.destroy(buffers.vertex);
    if let Some(index) = buffers.index {
        backend.destroy(index);
    }
}

fn upload_layout<B: BufferBackend>(
    backend: &mut B,
    buffers: &mut PhysicalBuffers<B::Buffer>,
    sections: BufferSectionInfo,
    packing: VertexPacking,
    assets: &[Asset],
    ui: &[UiBatch],
    layout: &Layout,
) -> Result<()> {
    let mut writes = SectionWrites::new(sections);
    for (asset, (_, placement)) in assets.iter().zip(&layout.assets) {
        writes.push_asset(asset, placement, packing)?;
    }
    for (batch, placement) in ui.iter().zip(&layout.ui) {
        writes.push_ui(batch, placement)?;
    }
    writes.flush(backend, buffers)
}

/// Writes grouped by physical buffer.
struct SectionWrites<'a> {
    sections: BufferSectionInfo,
    vertex: Vec<BufferWrite<'a>>,
    index: Vec<BufferWrite<'a>>,
    regions: Vec<Region>,
}

impl<'a> SectionWrites<'a> {
    fn new(sections: BufferSectionInfo) -> Self {
        Self {
            sections,
            vertex: Vec::new(),
            index: Vec::new(),
            regions: Vec::new(),
        }
    }

    fn push(&mut self, section: Section, offset: u64, data: &'a [u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as u64;
        ensure_in_bounds("section", offset, len, self.sections.get(section).cap)?;

        match section {
            Section::Asset => self.vertex.push(BufferWrite::new(offset, data)),
            Section::Ui => {
                let base = self.sections.get(Section::Asset).cap;
                self.vertex.push(BufferWrite::new(base + offset, data));
            }
            Section::Indices => self.index.push(BufferWrite::new(offset, data)),
            Section::Uniform => {
                return Err(Error::Backend(
                    "uniform data is not held by the vertex buffers".to_string(),
                ))
            }
        }
        self.regions.push(Region {
            section,
            offset,
            size: len,
        });
        Ok(())
    }

    fn push_asset(
        &mut self,
        asset: &'a Asset,
        placement: &AssetPlacement,
        packing: VertexPacking,
    ) -> Result<()> {
        match packing {
            VertexPacking::Separate => {
                for stream in asset.vertices().streams() {
                    if let Some(offset) = placement.attribute_offset(stream.attribute) {
                        self.push(Section::Asset, offset, stream.bytes)?;
                    }
                }
                let array_bytes = u64::from(placement.index_count) * INDEX_SIZE;
                for (i, array) in asset.index_arrays().into_iter().enumerate() {
                    let offset = placement.ind + i as u64 * array_bytes;
                    self.push(
                        placement.index_section,
                        offset,
                        bytemuck::cast_slice(array),
                    )?;
                }
            }
            VertexPacking::Interleaved => {
                let mesh = asset.interleaved();
                self.push(Section::Asset, placement.pos, &mesh.vertices)?;
                self.push(
                    placement.index_section,
                    placement.ind,
                    bytemuck::cast_slice(&mesh.indices),
                )?;
            }
        }
        Ok(())
    }

    fn push_ui(&mut self, batch: &'a UiBatch, placement: &UiPlacement) -> Result<()> {
        self.push(Section::Ui, placement.vertex, batch.vertex_bytes())?;
        self.push(placement.index_section, placement.index, batch.index_bytes())
    }

    /// Whether any write lands below the extent a frame may still read.
    fn touches(&self, live_extent: &[u64; 4]) -> bool {
        self.regions
            .iter()
            .any(|r| r.offset < live_extent[r.section.index()])
    }

    fn flush<B: BufferBackend>(
        self,
        backend: &mut B,
        buffers: &mut PhysicalBuffers<B::Buffer>,
    ) -> Result<()> {
        if !self.vertex.is_empty() {
            check_writes(&buffers.vertex, &self.vertex)?;
            backend.upload(&mut buffers.vertex, &self.vertex)?;
        }
        if !self.index.is_empty() {
            let index = buffers
                .index
                .as_mut()
                .ok_or_else(|| Error::Backend("no index buffer".to_string()))?;
            check_writes(index, &self.index)?;
            backend.upload(index, &self.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BackendEvent, HostBackend};
    use glam::{Vec2, Vec3};
    use tessera_core::{AttributeIndices, UiVertex, VertexData, VertexLayout};

    fn mesh(id: u64, vertices: usize) -> Asset {
        let data = VertexData::Unmapped3D {
            positions: (0..vertices)
                .map(|i| Vec3::new(i as f32, id as f32, 1.0))
                .collect(),
            normals: vec![Vec3::Y; vertices],
        };
        let indices: Vec<u32> = (0..vertices as u32).collect();
        Asset::new(
            AssetId(id),
            format!("mesh {id}"),
            data,
            AttributeIndices::shared(indices, VertexLayout::Unmapped3D),
        )
        .unwrap()
    }

    fn sprite(id: u64) -> Asset {
        let data = VertexData::Mapped2D {
            positions: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            tex_coords: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
        };
        Asset::new(
            AssetId(id),
            "sprite",
            data,
            AttributeIndices::shared(vec![0, 1, 2], VertexLayout::Mapped2D),
        )
        .unwrap()
    }

    fn manager(backend: &mut HostBackend, asset_cap: u64) -> BufferManager<HostBackend> {
        let config = AllocatorConfig::new().with_capacities(asset_cap, 256, 256);
        BufferManager::new(backend, &config, 256).unwrap()
    }

    fn vertex_bytes(
        manager: &BufferManager<HostBackend>,
        backend: &mut HostBackend,
        id: u64,
    ) -> Vec<u8> {
        let placement = *manager.placement(AssetId(id)).unwrap();
        manager
            .read_region(backend, placement.vertex_region())
            .unwrap()
    }

    fn expected_vertex_bytes(asset: &Asset) -> Vec<u8> {
        asset
            .vertices()
            .streams()
            .iter()
            .flat_map(|s| s.bytes.iter().copied())
            .collect()
    }

    #[test]
    fn first_upload_lands_at_placement() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 4096);
        let assets = vec![mesh(1, 4), sprite(2)];

        let outcome = manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        assert_eq!(outcome, ReallocOutcome::Uploaded { assets: 2 });

        for asset in &assets {
            assert_eq!(
                vertex_bytes(&manager, &mut backend, asset.id().0),
                expected_vertex_bytes(asset)
            );
        }
        // Fresh space needs no fence wait.
        assert!(!backend.log().contains(&BackendEvent::WaitFrames));
    }

    #[test]
    fn unchanged_layout_uploads_nothing() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 4096);
        let assets = vec![mesh(1, 4)];
        manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();

        let uploads = backend.log().count(|e| matches!(e, BackendEvent::Upload { .. }));
        let outcome = manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        assert_eq!(outcome, ReallocOutcome::Unchanged);
        assert_eq!(
            backend.log().count(|e| matches!(e, BackendEvent::Upload { .. })),
            uploads
        );
    }

    #[test]
    fn growth_reallocates_and_preserves_content() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 128);
        let mut assets = vec![mesh(1, 2)];
        manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        let before = vertex_bytes(&manager, &mut backend, 1);

        assets.push(mesh(2, 8));
        let outcome = manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();

        assert!(outcome.is_reallocated());
        assert_eq!(manager.reallocations(), 1);
        assert_eq!(manager.state(), ReallocState::Stable);
        let asset_usage = manager.sections().get(Section::Asset);
        assert!(asset_usage.size < asset_usage.cap);
        assert_eq!(vertex_bytes(&manager, &mut backend, 1), before);
        assert_eq!(
            vertex_bytes(&manager, &mut backend, 2),
            expected_vertex_bytes(&assets[1])
        );
    }

    #[test]
    fn reallocation_waits_before_destroying_old_buffer() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 64);
        let old = manager.vertex_buffer().id();
        manager
            .check_and_reallocate(&mut backend, &[mesh(1, 8)], &[])
            .unwrap();

        let log = backend.log();
        let wait = log.position(|e| *e == BackendEvent::WaitFrames).unwrap();
        let destroy = log
            .position(|e| *e == BackendEvent::Destroy { buffer: old })
            .unwrap();
        assert!(wait < destroy);
        assert_ne!(manager.vertex_buffer().id(), old);
    }

    #[test]
    fn failed_allocation_keeps_previous_state() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 128);
        let assets = vec![mesh(1, 2)];
        manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        let placement = *manager.placement(AssetId(1)).unwrap();
        let sections = *manager.sections();

        backend.set_allocation_limit(Some(256));
        let grown = vec![mesh(1, 2), mesh(2, 64)];
        let err = manager
            .check_and_reallocate(&mut backend, &grown, &[])
            .unwrap_err();

        assert!(matches!(err, Error::AllocationFailed { .. }));
        assert_eq!(manager.state(), ReallocState::Stable);
        assert_eq!(*manager.sections(), sections);
        assert_eq!(manager.placement(AssetId(1)), Some(&placement));
        assert!(manager.placement(AssetId(2)).is_none());
        assert_eq!(
            vertex_bytes(&manager, &mut backend, 1),
            expected_vertex_bytes(&assets[0])
        );
    }

    #[test]
    fn removal_relocates_survivors_after_wait() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 4096);
        let assets = vec![mesh(1, 4), mesh(2, 4), mesh(3, 4)];
        manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        let first_pos = manager.placement(AssetId(1)).unwrap().pos;

        let survivors = vec![assets[1].clone(), assets[2].clone()];
        backend.log().clear();
        let outcome = manager
            .check_and_reallocate(&mut backend, &survivors, &[])
            .unwrap();

        assert_eq!(outcome, ReallocOutcome::Relocated { assets: 2 });
        assert_eq!(manager.placement(AssetId(2)).unwrap().pos, first_pos);
        assert!(manager.placement(AssetId(1)).is_none());

        let log = backend.log();
        let wait = log.position(|e| *e == BackendEvent::WaitFrames).unwrap();
        let upload = log
            .position(|e| matches!(e, BackendEvent::Upload { .. }))
            .unwrap();
        assert!(wait < upload);

        for asset in &survivors {
            assert_eq!(
                vertex_bytes(&manager, &mut backend, asset.id().0),
                expected_vertex_bytes(asset)
            );
        }
    }

    #[test]
    fn space_of_removed_tail_is_not_rewritten_without_wait() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 4096);
        manager
            .check_and_reallocate(&mut backend, &[mesh(1, 4), mesh(2, 4)], &[])
            .unwrap();
        manager
            .check_and_reallocate(&mut backend, &[mesh(1, 4)], &[])
            .unwrap();

        backend.log().clear();
        manager
            .check_and_reallocate(&mut backend, &[mesh(1, 4), mesh(3, 4)], &[])
            .unwrap();
        assert!(backend.log().contains(&BackendEvent::WaitFrames));
    }

    #[test]
    fn ui_lives_after_asset_capacity() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 1024);
        let batch = UiBatch::new(
            vec![
                UiVertex {
                    pos: [1.0, 2.0],
                    uv: [0.5, 0.5],
                    color: 0xffff_ffff,
                };
                3
            ],
            vec![0, 1, 2],
        )
        .unwrap();
        manager.mark_ui_dirty();
        manager
            .check_and_reallocate(&mut backend, &[], std::slice::from_ref(&batch))
            .unwrap();

        let placement = manager.ui_placements()[0];
        assert_eq!(manager.ui_base(), 1024);
        let raw = backend
            .read_back(manager.vertex_buffer(), 1024, 60)
            .unwrap();
        assert_eq!(raw, batch.vertex_bytes());
        let indices = manager.read_region(&mut backend, placement.index_region()).unwrap();
        assert_eq!(indices, batch.index_bytes());
    }

    #[test]
    fn interleaved_packing_uses_index_buffer() {
        let mut backend = HostBackend::new();
        let config = AllocatorConfig::new()
            .with_capacities(1024, 256, 8)
            .with_packing(VertexPacking::Interleaved);
        let mut manager = BufferManager::new(&mut backend, &config, 256).unwrap();
        assert!(manager.index_buffer().is_some());

        let assets = vec![sprite(1)];
        let outcome = manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        // 3 indices * 4 bytes overflow the 8 byte INDICES section.
        assert_eq!(
            outcome,
            ReallocOutcome::Reallocated {
                grown: vec![Section::Indices]
            }
        );

        let placement = *manager.placement(AssetId(1)).unwrap();
        let indices = manager
            .read_region(&mut backend, placement.index_region())
            .unwrap();
        assert_eq!(indices, bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]));
        let vertices = manager
            .read_region(&mut backend, placement.vertex_region())
            .unwrap();
        assert_eq!(vertices, assets[0].interleaved().vertices);
    }

    #[test]
    fn dirty_asset_is_rewritten_after_wait() {
        let mut backend = HostBackend::new();
        let mut manager = manager(&mut backend, 4096);
        let mut assets = vec![mesh(1, 4), mesh(2, 4)];
        manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        let placement = *manager.placement(AssetId(1)).unwrap();

        let replacement = mesh(7, 4);
        assets[0]
            .replace_data(replacement.vertices().clone(), replacement.indices().clone())
            .unwrap();
        manager.mark_asset_dirty(AssetId(1));
        backend.log().clear();
        let outcome = manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();

        assert_eq!(outcome, ReallocOutcome::Uploaded { assets: 1 });
        assert_eq!(*manager.placement(AssetId(1)).unwrap(), placement);
        let log = backend.log();
        let wait = log.position(|e| *e == BackendEvent::WaitFrames).unwrap();
        let upload = log
            .position(|e| matches!(e, BackendEvent::Upload { .. }))
            .unwrap();
        assert!(wait < upload);
        assert_eq!(
            vertex_bytes(&manager, &mut backend, 1),
            expected_vertex_bytes(&assets[0])
        );

        // The mark is consumed by the check.
        let outcome = manager
            .check_and_reallocate(&mut backend, &assets, &[])
            .unwrap();
        assert_eq!(outcome, ReallocOutcome::Unchanged);
    }

    #[test]
    fn section_capacity_never_shrinks() {
        let mut backend = HostBackend::new();
        let config = AllocatorConfig::new()
            .with_capacities(64, 16, 16)
            .with_packing(VertexPacking::Interleaved);
        let mut manager = BufferManager::new(&mut backend, &config, 256).unwrap();
        let caps = |m: &BufferManager<HostBackend>| Section::ALL.map(|s| m.sections().get(s).cap);

        let mut assets = Vec::new();
        let mut previous = caps(&manager);
        for id in 1..=12 {
            assets.push(mesh(id, id as usize * 2));
            manager
                .check_and_reallocate(&mut backend, &assets, &[])
                .unwrap();
            let current = caps(&manager);
            assert!(current.iter().zip(&previous).all(|(now, before)| now >= before));
            previous = current;
        }
        assert!(manager.reallocations() > 0);

        while assets.len() > 1 {
            assets.remove(assets.len() / 2);
            manager
                .check_and_reallocate(&mut backend, &assets, &[])
                .unwrap();
            assert_eq!(caps(&manager), previous);
        }
    }
}
