//! Offset bookkeeping for the packed vertex, index, UI and uniform sections.
//!
//! Regions are laid out back to back in registration order. There is no free
//! list: removing an asset is handled by recomputing every offset from the
//! surviving assets and re-copying whatever moved.

use serde::{Deserialize, Serialize};
use tessera_core::constants::{INDEX_SIZE, UI_INDEX_SIZE, VERTEX_ALIGNMENT};
use tessera_core::math::align_up;
use tessera_core::{Asset, AssetId, Attribute, UiBatch};

/// Logical partition of a physical buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    /// Vertex attribute data
    Asset,
    /// Index data kept apart from vertices (interleaved packing)
    Indices,
    /// UI vertex data, plus UI indices with separate packing
    Ui,
    /// Uniform data
    Uniform,
}

impl Section {
    pub const ALL: [Self; 4] = [Self::Asset, Self::Indices, Self::Ui, Self::Uniform];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Asset => 0,
            Self::Indices => 1,
            Self::Ui => 2,
            Self::Uniform => 3,
        }
    }
}

/// How vertex attributes and indices are packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexPacking {
    /// One stream per attribute, one index array per attribute, indices inline
    /// in the ASSET section. UI indices follow UI vertices in the UI section.
    #[default]
    Separate,
    /// One interleaved stream per asset and one shared index array in the
    /// INDICES section. UI indices also go to INDICES.
    Interleaved,
}

impl VertexPacking {
    /// Sections backed by the vertex/index buffers under this packing.
    pub const fn buffer_sections(self) -> &'static [Section] {
        match self {
            Self::Separate => &[Section::Asset, Section::Ui],
            Self::Interleaved => &[Section::Asset, Section::Indices, Section::Ui],
        }
    }
}

/// Required bytes vs. allocated bytes for one section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionUsage {
    pub size: u64,
    pub cap: u64,
}

impl SectionUsage {
    /// Vertex/index sections grow once they are full.
    #[inline]
    pub const fn needs_growth(self) -> bool {
        self.size >= self.cap
    }

    /// Uniform sections grow only when a reservation does not fit.
    #[inline]
    pub const fn overflows(self) -> bool {
        self.size > self.cap
    }
}

/// New capacity for a section that must grow.
///
/// `max(cap * 3/2, size * 3/2)` rounded up to `alignment`, and always strictly
/// larger than `size`.
pub const fn grown_capacity(cap: u64, size: u64, alignment: u64) -> u64 {
    let by_cap = cap * 3 / 2;
    let by_size = size * 3 / 2;
    let mut target = if by_cap > by_size { by_cap } else { by_size };
    if target <= size {
        target = size + 1;
    }
    align_up(target, alignment)
}

/// Size and capacity of every section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSectionInfo {
    usage: [SectionUsage; 4],
    uniform_alignment: u64,
}

impl BufferSectionInfo {
    /// Empty sections with the given capacities.
    pub const fn new(
        asset_cap: u64,
        indices_cap: u64,
        ui_cap: u64,
        uniform_alignment: u64,
    ) -> Self {
        Self {
            usage: [
                SectionUsage {
                    size: 0,
                    cap: asset_cap,
                },
                SectionUsage {
                    size: 0,
                    cap: indices_cap,
                },
                SectionUsage { size: 0, cap: ui_cap },
                SectionUsage { size: 0, cap: 0 },
            ],
            uniform_alignment,
        }
    }

    #[inline]
    pub const fn get(&self, section: Section) -> SectionUsage {
        self.usage[section.index()]
    }

    #[inline]
    pub fn set(&mut self, section: Section, usage: SectionUsage) {
        self.usage[section.index()] = usage;
    }

    #[inline]
    pub fn set_size(&mut self, section: Section, size: u64) {
        self.usage[section.index()].size = size;
    }

    /// Whether `section` must grow before its data fits.
    #[inline]
    pub const fn needs_growth(&self, section: Section) -> bool {
        self.get(section).needs_growth()
    }

    /// Capacity rounding for `section`.
    pub const fn alignment(&self, section: Section) -> u64 {
        match section {
            Section::Asset | Section::Ui => VERTEX_ALIGNMENT,
            Section::Indices => INDEX_SIZE,
            Section::Uniform => self.uniform_alignment,
        }
    }

    /// Grow `section`'s capacity and return the new value.
    pub fn grow_capacity(&mut self, section: Section) -> u64 {
        let alignment = self.alignment(section);
        let usage = &mut self.usage[section.index()];
        usage.cap = grown_capacity(usage.cap, usage.size, alignment);
        usage.cap
    }
}

/// Byte range inside one section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub section: Section,
    pub offset: u64,
    pub size: u64,
}

impl Region {
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Whether two regions share any byte.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.section == other.section
            && self.offset < other.end()
            && other.offset < self.end()
            && self.size > 0
            && other.size > 0
    }
}

/// Where one asset's data lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetPlacement {
    /// Position stream (or the interleaved stream)
    pub pos: u64,
    /// Texture coordinate stream, or attribute offset of the first vertex
    pub tex: Option<u64>,
    /// Normal stream, or attribute offset of the first vertex
    pub nor: Option<u64>,
    /// First index array
    pub ind: u64,
    /// Section holding the indices
    pub index_section: Section,
    /// Interleaved vertex stride
    pub stride: Option<u64>,
    /// Number of indices per array
    pub index_count: u32,
    /// Bytes of vertex data starting at `pos`
    pub vertex_bytes: u64,
    /// Bytes of index data starting at `ind`
    pub index_bytes: u64,
}

impl AssetPlacement {
    /// Offset of `attribute`'s stream.
    pub const fn attribute_offset(&self, attribute: Attribute) -> Option<u64> {
        match attribute {
            Attribute::Position2D | Attribute::Position3D => Some(self.pos),
            Attribute::TexCoord => self.tex,
            Attribute::Normal => self.nor,
        }
    }

    pub const fn vertex_region(&self) -> Region {
        Region {
            section: Section::Asset,
            offset: self.pos,
            size: self.vertex_bytes,
        }
    }

    pub const fn index_region(&self) -> Region {
        Region {
            section: self.index_section,
            offset: self.ind,
            size: self.index_bytes,
        }
    }
}

/// Where one UI batch lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UiPlacement {
    /// Vertex offset inside the UI section
    pub vertex: u64,
    pub vertex_bytes: u64,
    /// Index offset inside `index_section`
    pub index: u64,
    pub index_section: Section,
    pub index_bytes: u64,
}

impl UiPlacement {
    pub const fn vertex_region(&self) -> Region {
        Region {
            section: Section::Ui,
            offset: self.vertex,
            size: self.vertex_bytes,
        }
    }

    pub const fn index_region(&self) -> Region {
        Region {
            section: self.index_section,
            offset: self.index,
            size: self.index_bytes,
        }
    }
}

/// Result of one offset pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Placements in registration order
    pub assets: Vec<(AssetId, AssetPlacement)>,
    pub ui: Vec<UiPlacement>,
    /// Required sizes with the capacities the pass started from
    pub sections: BufferSectionInfo,
}

impl Layout {
    pub fn placement(&self, id: AssetId) -> Option<&AssetPlacement> {
        self.assets
            .iter()
            .find_map(|(asset, placement)| (*asset == id).then_some(placement))
    }

    /// Every non-empty region in the layout.
    pub fn regions(&self) -> Vec<Region> {
        let assets = self
            .assets
            .iter()
            .flat_map(|(_, p)| [p.vertex_region(), p.index_region()]);
        let ui = self
            .ui
            .iter()
            .flat_map(|p| [p.vertex_region(), p.index_region()]);
        assets.chain(ui).filter(|r| r.size > 0).collect()
    }
}

/// Computes region offsets and tracks section capacity.
#[derive(Clone, Debug)]
pub struct OffsetFinder {
    packing: VertexPacking,
    sections: BufferSectionInfo,
}

impl OffsetFinder {
    pub const fn new(packing: VertexPacking, sections: BufferSectionInfo) -> Self {
        Self { packing, sections }
    }

    #[inline]
    pub const fn packing(&self) -> VertexPacking {
        self.packing
    }

    /// Committed sizes and capacities.
    #[inline]
    pub const fn sections(&self) -> &BufferSectionInfo {
        &self.sections
    }

    /// Whether the committed `section` must grow.
    pub const fn needs_growth(&self, section: Section) -> bool {
        self.sections.needs_growth(section)
    }

    /// Grow the committed `section` and return the new capacity.
    pub fn grow_capacity(&mut self, section: Section) -> u64 {
        self.sections.grow_capacity(section)
    }

    /// Replace the committed section info after a successful reallocation.
    pub fn commit(&mut self, sections: BufferSectionInfo) {
        self.sections = sections;
    }

    /// Lay out `assets` and `ui` in order.
    ///
    /// Pure: the result depends only on the inputs and the committed
    /// capacities, which are copied into the returned section info unchanged.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn recompute_offsets<'a>(
        &self,
        assets: impl IntoIterator<Item = &'a Asset>,
        ui: &[UiBatch],
    ) -> Layout {
        let mut asset_offset = 0;
        let mut index_offset = 0;
        let mut placements = Vec::new();

        for asset in assets {
            let placement = match self.packing {
                VertexPacking::Separate => place_separate(asset, &mut asset_offset),
                VertexPacking::Interleaved => {
                    place_interleaved(asset, &mut asset_offset, &mut index_offset)
                }
            };
            placements.push((asset.id(), placement));
        }

        let mut ui_offset = 0;
        let ui_placements = ui
            .iter()
            .map(|batch| {
                let vertex = align_up(ui_offset, VERTEX_ALIGNMENT);
                let vertex_bytes = batch.vertex_bytes().len() as u64;
                ui_offset = vertex + vertex_bytes;
                let index_bytes = batch.index_bytes().len() as u64;

                let (index, index_section) = match self.packing {
                    VertexPacking::Separate => {
                        let index = align_up(ui_offset, UI_INDEX_SIZE);
                        ui_offset = index + index_bytes;
                        (index, Section::Ui)
                    }
                    VertexPacking::Interleaved => {
                        let index = align_up(index_offset, UI_INDEX_SIZE);
                        index_offset = index + index_bytes;
                        (index, Section::Indices)
                    }
                };

                UiPlacement {
                    vertex,
                    vertex_bytes,
                    index,
                    index_section,
                    index_bytes,
                }
            })
            .collect();

        let mut sections = self.sections;
        sections.set_size(Section::Asset, asset_offset);
        sections.set_size(Section::Indices, index_offset);
        sections.set_size(Section::Ui, ui_offset);

        Layout {
            assets: placements,
            ui: ui_placements,
            sections,
        }
    }
}

fn place_separate(asset: &Asset, offset: &mut u64) -> AssetPlacement {
    let pos = *offset;
    let mut tex = None;
    let mut nor = None;

    for stream in asset.vertices().streams() {
        match stream.attribute {
            Attribute::TexCoord => tex = Some(*offset),
            Attribute::Normal => nor = Some(*offset),
            Attribute::Position2D | Attribute::Position3D => {}
        }
        *offset += stream.byte_size();
    }
    let vertex_bytes = *offset - pos;

    let index_count = asset.indices().count() as u64;
    let ind = align_up(*offset, INDEX_SIZE);
    let index_bytes = asset.index_arrays().len() as u64 * index_count * INDEX_SIZE;
    *offset = align_up(ind + index_bytes, VERTEX_ALIGNMENT);

    AssetPlacement {
        pos,
        tex,
        nor,
        ind,
        index_section: Section::Asset,
        stride: None,
        index_count: index_count as u32,
        vertex_bytes,
        index_bytes,
    }
}

fn place_interleaved(asset: &Asset, offset: &mut u64, index_offset: &mut u64) -> AssetPlacement {
    let layout = asset.layout();
    let mesh = asset.interleaved();

    let pos = *offset;
    let vertex_bytes = mesh.vertices.len() as u64;
    *offset = align_up(pos + vertex_bytes, VERTEX_ALIGNMENT);

    let ind = *index_offset;
    let index_bytes = mesh.indices.len() as u64 * INDEX_SIZE;
    *index_offset = ind + index_bytes;

    AssetPlacement {
        pos,
        tex: layout
            .attribute_offset(Attribute::TexCoord)
            .map(|o| pos + o),
        nor: layout.attribute_offset(Attribute::Normal).map(|o| pos + o),
        ind,
        index_section: Section::Indices,
        stride: Some(layout.interleaved_stride()),
        index_count: mesh.indices.len() as u32,
        vertex_bytes,
        index_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use tessera_core::{AttributeIndices, UiVertex, VertexData, VertexLayout};

    fn mapped_3d(id: u64, vertices: usize, indices: usize) -> Asset {
        let data = VertexData::Mapped3D {
            positions: vec![Vec3::ZERO; vertices],
            tex_coords: vec![Vec2::ZERO; vertices],
            normals: vec![Vec3::Y; vertices],
        };
        let index: Vec<u32> = (0..indices).map(|i| (i % vertices) as u32).collect();
        Asset::new(
            AssetId(id),
            "mesh",
            data,
            AttributeIndices::shared(index, VertexLayout::Mapped3D),
        )
        .unwrap()
    }

    fn unmapped_2d(id: u64, vertices: usize) -> Asset {
        let data = VertexData::Unmapped2D {
            positions: vec![Vec2::ONE; vertices],
        };
        let index: Vec<u32> = (0..vertices as u32).collect();
        Asset::new(
            AssetId(id),
            "sprite",
            data,
            AttributeIndices::shared(index, VertexLayout::Unmapped2D),
        )
        .unwrap()
    }

    fn finder(packing: VertexPacking, asset_cap: u64) -> OffsetFinder {
        OffsetFinder::new(packing, BufferSectionInfo::new(asset_cap, 1024, 1024, 256))
    }

    #[test]
    fn mapped_3d_separate_offsets() {
        let asset = mapped_3d(1, 100, 150);
        let layout = finder(VertexPacking::Separate, 1024).recompute_offsets([&asset], &[]);
        let placement = layout.placement(AssetId(1)).unwrap();

        assert_eq!(placement.pos, 0);
        assert_eq!(placement.tex, Some(1200));
        assert_eq!(placement.nor, Some(2000));
        assert_eq!(placement.ind, 3200);
        assert_eq!(placement.index_count, 150);
        // One 600 byte index array per attribute.
        assert_eq!(placement.index_bytes, 3 * 600);
        assert_eq!(layout.sections.get(Section::Asset).size, 3200 + 1800);
        assert_eq!(layout.sections.get(Section::Asset).cap, 1024);
    }

    #[test]
    fn absent_attributes_have_no_region() {
        let asset = unmapped_2d(1, 3);
        let layout = finder(VertexPacking::Separate, 1024).recompute_offsets([&asset], &[]);
        let placement = layout.placement(AssetId(1)).unwrap();
        assert_eq!(placement.tex, None);
        assert_eq!(placement.nor, None);
        assert_eq!(placement.ind, 24);
        assert_eq!(placement.index_bytes, 12);
    }

    #[test]
    fn empty_attribute_keeps_zero_sized_region() {
        let data = VertexData::Mapped2D {
            positions: Vec::new(),
            tex_coords: Vec::new(),
        };
        let asset = Asset::new(
            AssetId(4),
            "empty",
            data,
            AttributeIndices::empty(VertexLayout::Mapped2D),
        )
        .unwrap();
        let layout = finder(VertexPacking::Separate, 64).recompute_offsets([&asset], &[]);
        let placement = layout.placement(AssetId(4)).unwrap();
        assert_eq!(placement.tex, Some(0));
        assert_eq!(placement.vertex_bytes, 0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let assets = [mapped_3d(1, 10, 30), unmapped_2d(2, 7), mapped_3d(3, 5, 9)];
        let finder = finder(VertexPacking::Separate, 4096);
        let first = finder.recompute_offsets(&assets, &[]);
        let second = finder.recompute_offsets(&assets, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn regions_are_back_to_back_without_overlap() {
        let assets = [mapped_3d(1, 10, 30), unmapped_2d(2, 7), mapped_3d(3, 5, 9)];
        let layout = finder(VertexPacking::Separate, 4096).recompute_offsets(&assets, &[]);

        let regions = layout.regions();
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }

        // Each asset starts where the previous one ended, modulo padding.
        let mut expected = 0;
        for (_, placement) in &layout.assets {
            assert_eq!(placement.pos, align_up(expected, VERTEX_ALIGNMENT));
            expected = placement.ind + placement.index_bytes;
        }
        assert_eq!(layout.sections.get(Section::Asset).size, expected);
    }

    #[test]
    fn interleaved_layout_splits_indices() {
        let assets = [mapped_3d(1, 4, 6), unmapped_2d(2, 3)];
        let layout = finder(VertexPacking::Interleaved, 4096).recompute_offsets(&assets, &[]);

        let first = layout.placement(AssetId(1)).unwrap();
        assert_eq!(first.stride, Some(32));
        assert_eq!(first.vertex_bytes, 4 * 32);
        assert_eq!(first.tex, Some(12));
        assert_eq!(first.nor, Some(20));
        assert_eq!(first.index_section, Section::Indices);
        assert_eq!(first.ind, 0);

        let second = layout.placement(AssetId(2)).unwrap();
        assert_eq!(second.pos, 128);
        assert_eq!(second.ind, 24);
        assert_eq!(layout.sections.get(Section::Indices).size, 24 + 12);
    }

    #[test]
    fn ui_index_placement_depends_on_packing() {
        let batch = UiBatch::new(vec![UiVertex::default(); 3], vec![0, 1, 2]).unwrap();
        let batches = [batch.clone(), batch];

        let none: &[Asset] = &[];
        let separate = finder(VertexPacking::Separate, 64).recompute_offsets(none, &batches);
        assert_eq!(separate.ui[0].vertex, 0);
        assert_eq!(separate.ui[0].index, 60);
        assert_eq!(separate.ui[0].index_section, Section::Ui);
        // 66 rounds up to the next vertex boundary.
        assert_eq!(separate.ui[1].vertex, 68);
        assert_eq!(separate.sections.get(Section::Ui).size, 68 + 60 + 6);

        let interleaved = finder(VertexPacking::Interleaved, 64).recompute_offsets(none, &batches);
        assert_eq!(interleaved.ui[1].vertex, 60);
        assert_eq!(interleaved.ui[1].index_section, Section::Indices);
        assert_eq!(interleaved.ui[1].index, 6);
    }

    #[test]
    fn growth_triggers_at_exact_capacity() {
        let asset = unmapped_2d(1, 8);
        // 8 positions * 8 bytes + 8 indices * 4 bytes = 96 bytes.
        let mut finder = finder(VertexPacking::Separate, 96);
        let layout = finder.recompute_offsets([&asset], &[]);
        assert_eq!(layout.sections.get(Section::Asset).size, 96);
        assert!(layout.sections.needs_growth(Section::Asset));

        finder.commit(layout.sections);
        assert_eq!(finder.grow_capacity(Section::Asset), 144);
        assert!(!finder.needs_growth(Section::Asset));
    }

    #[test]
    fn growth_law() {
        for (cap, size, alignment) in [(1024, 1024, 4), (1024, 5000, 4), (0, 0, 4), (10, 11, 256)] {
            let grown = grown_capacity(cap, size, alignment);
            let floor = cap.max(size) * 3 / 2;
            assert!(grown >= floor, "cap {cap} size {size}");
            assert!(grown > size);
            assert_eq!(grown % alignment, 0);
        }
        assert_eq!(grown_capacity(1024, 1024, 4), 1536);
        assert_eq!(grown_capacity(1000, 3001, 4), 4504);
    }

    #[test]
    fn section_alignment() {
        let info = BufferSectionInfo::new(0, 0, 0, 256);
        assert_eq!(info.alignment(Section::Asset), 4);
        assert_eq!(info.alignment(Section::Indices), 4);
        assert_eq!(info.alignment(Section::Uniform), 256);
    }

    #[test]
    fn removal_shifts_later_assets_down() {
        let a = unmapped_2d(1, 4);
        let b = unmapped_2d(2, 4);
        let c = unmapped_2d(3, 2);
        let finder = finder(VertexPacking::Separate, 1024);

        let before = finder.recompute_offsets([&a, &b, &c], &[]);
        let after = finder.recompute_offsets([&a, &c], &[]);

        let old_b = before.placement(AssetId(2)).unwrap().pos;
        assert_eq!(after.placement(AssetId(3)).unwrap().pos, old_b);
        assert!(after.placement(AssetId(2)).is_none());
    }
}
