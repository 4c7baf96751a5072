//! Uniform buffer regions.
//!
//! The buffer starts with the global chunk (one copy per frame in flight),
//! followed by one region per asset. Each asset region holds one aligned chunk
//! per frame in flight, so frame `f` of an asset lives at
//! `offset + f * chunk`.

use crate::backend::{BufferBackend, BufferRole, BufferWrite, CopyRange, PhysicalBuffer};
use crate::config::AllocatorConfig;
use crate::error::{Error, Result};
use crate::offsets::{grown_capacity, SectionUsage};
use crate::sync::replace_resource;
use std::mem::size_of;
use std::ops::Range;
use std::time::Duration;
use tessera_core::math::align_up;
use tessera_core::{AssetId, AssetUniform3D, Camera2DUniform, Camera3DUniform, LightingUniform};

/// Engine-wide uniform data written once per frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalUniforms {
    pub camera_3d: Camera3DUniform,
    pub camera_2d: Camera2DUniform,
    pub lighting: LightingUniform,
}

/// Layout of one frame's global chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalChunk {
    /// Offset of the 2D camera block inside the chunk
    pub camera_2d: u64,
    /// Offset of the lighting block inside the chunk
    pub lighting: u64,
    /// Padded size of one frame's chunk
    pub size: u64,
}

impl GlobalChunk {
    fn new(alignment: u64) -> Self {
        let camera_3d = align_up(size_of::<Camera3DUniform>() as u64, alignment);
        let camera_2d = align_up(size_of::<Camera2DUniform>() as u64, alignment);
        let lighting = align_up(size_of::<LightingUniform>() as u64, alignment);
        Self {
            camera_2d: camera_3d,
            lighting: camera_3d + camera_2d,
            size: camera_3d + camera_2d + lighting,
        }
    }
}

/// A uniform range handed to a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformRange {
    pub offset: u64,
    pub range: u64,
}

/// Global blocks of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalRanges {
    pub camera_3d: UniformRange,
    pub camera_2d: UniformRange,
    pub lighting: UniformRange,
}

/// One asset's uniform region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformRegion {
    /// Start of frame 0
    pub offset: u64,
    /// Aligned size of one frame's copy
    pub chunk: u64,
    /// Unpadded uniform block size
    pub block_size: u64,
}

impl UniformRegion {
    /// Offset of frame `frame`'s copy.
    #[inline]
    pub const fn frame_offset(&self, frame: u32) -> u64 {
        self.offset + frame as u64 * self.chunk
    }
}

/// Outcome of a region reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub region: UniformRegion,
    /// Whether the uniform buffer was replaced to make room
    pub reallocated: bool,
}

/// Carves per-asset uniform regions out of one uniform buffer.
pub struct UniformRegionManager<B: BufferBackend> {
    buffer: B::Buffer,
    usage: SectionUsage,
    alignment: u64,
    frames_in_flight: u32,
    global: Option<GlobalChunk>,
    /// Live regions in reservation order
    regions: Vec<(AssetId, UniformRegion)>,
    /// Bytes held by released regions until the next reallocation
    released: u64,
    generation: u64,
    fence_timeout: Duration,
}

impl<B: BufferBackend> UniformRegionManager<B> {
    /// Allocate the uniform buffer and reserve the global chunk.
    pub fn new(backend: &mut B, config: &AllocatorConfig, alignment: u64) -> Result<Self> {
        let frames = config.frames_in_flight.max(1);
        let global = GlobalChunk::new(alignment);
        let asset_chunk = align_up(size_of::<AssetUniform3D>() as u64, alignment);
        let cap = u64::from(frames)
            * (global.size + u64::from(config.initial_uniform_assets) * asset_chunk);

        let buffer = backend.allocate(BufferRole::Uniform, cap, "uniform buffer")?;
        tracing::info!(cap, alignment, frames, "uniform buffer allocated");

        let mut manager = Self {
            buffer,
            usage: SectionUsage { size: 0, cap },
            alignment,
            frames_in_flight: frames,
            global: None,
            regions: Vec::new(),
            released: 0,
            generation: 0,
            fence_timeout: config.fence_timeout,
        };
        manager.reserve_global_chunk();
        Ok(manager)
    }

    /// Reserve the global chunk, always the first region of the buffer.
    ///
    /// Returns the byte range covering all frames' copies.
    pub fn reserve_global_chunk(&mut self) -> Range<u64> {
        let frames = u64::from(self.frames_in_flight);
        let alignment = self.alignment;
        let chunk = *self.global.get_or_insert_with(|| GlobalChunk::new(alignment));
        let end = frames * chunk.size;
        self.usage.size = self.usage.size.max(end);
        0..end
    }

    fn global_span(&self) -> u64 {
        self.global
            .map_or(0, |g| u64::from(self.frames_in_flight) * g.size)
    }

    /// Reserve a region for `asset` holding one `block_size` block per frame.
    ///
    /// A second reservation for the same asset returns the existing region.
    /// When the buffer is full it is replaced by a larger one; live regions
    /// are compacted into it with their contents preserved.
    pub fn reserve_asset_region(
        &mut self,
        backend: &mut B,
        asset: AssetId,
        block_size: u64,
    ) -> Result<Reservation> {
        if let Some(region) = self.region(asset) {
            return Ok(Reservation {
                region,
                reallocated: false,
            });
        }

        let chunk = align_up(block_size.max(1), self.alignment);
        let span = u64::from(self.frames_in_flight) * chunk;

        let wanted = SectionUsage {
            size: self.usage.size + span,
            cap: self.usage.cap,
        };
        let reallocated = wanted.overflows();
        if reallocated {
            self.reallocate(backend, span)?;
        }

        let region = UniformRegion {
            offset: self.usage.size,
            chunk,
            block_size,
        };
        self.regions.push((asset, region));
        self.usage.size += span;
        tracing::trace!(%asset, offset = region.offset, chunk, "uniform region reserved");

        Ok(Reservation {
            region,
            reallocated,
        })
    }

    fn reallocate(&mut self, backend: &mut B, extra: u64) -> Result<()> {
        let global_span = self.global_span();
        let frames = u64::from(self.frames_in_flight);

        let mut ranges = vec![CopyRange {
            src_offset: 0,
            dst_offset: 0,
            size: global_span,
        }];
        let mut compacted = Vec::with_capacity(self.regions.len());
        let mut cursor = global_span;
        for &(asset, region) in &self.regions {
            let span = frames * region.chunk;
            ranges.push(CopyRange {
                src_offset: region.offset,
                dst_offset: cursor,
                size: span,
            });
            compacted.push((
                asset,
                UniformRegion {
                    offset: cursor,
                    ..region
                },
            ));
            cursor += span;
        }
        ranges.retain(|r| r.size > 0);

        let required = cursor + extra;
        let cap = if required > self.usage.cap {
            grown_capacity(self.usage.cap, required, self.alignment)
        } else {
            self.usage.cap
        };

        replace_resource(
            backend,
            self.fence_timeout,
            &mut self.buffer,
            |backend, old| {
                let mut fresh = backend.allocate(BufferRole::Uniform, cap, "uniform buffer")?;
                if let Err(e) = backend.copy_range(old, &mut fresh, &ranges) {
                    backend.destroy(fresh);
                    return Err(e);
                }
                Ok(fresh)
            },
            |backend, old| backend.destroy(old),
        )?;

        tracing::info!(
            old_cap = self.usage.cap,
            new_cap = cap,
            reclaimed = self.released,
            live = self.regions.len(),
            "uniform buffer reallocated"
        );

        self.regions = compacted;
        self.usage = SectionUsage { size: cursor, cap };
        self.released = 0;
        self.generation += 1;
        Ok(())
    }

    /// Write `data` into frame `frame` of `asset`'s region.
    pub fn update_frame_region(
        &mut self,
        backend: &mut B,
        asset: AssetId,
        frame: u32,
        data: &[u8],
    ) -> Result<()> {
        self.check_frame(frame)?;
        let region = self.region(asset).ok_or(Error::UnknownAsset(asset))?;
        if data.len() as u64 > region.chunk {
            return Err(Error::OutOfBounds {
                what: "uniform chunk",
                offset: region.frame_offset(frame),
                len: data.len() as u64,
                capacity: region.chunk,
            });
        }
        backend.upload(
            &mut self.buffer,
            &[BufferWrite::new(region.frame_offset(frame), data)],
        )
    }

    /// Write the global chunk of frame `frame`.
    pub fn update_global(
        &mut self,
        backend: &mut B,
        frame: u32,
        globals: &GlobalUniforms,
    ) -> Result<()> {
        let ranges = self.global_ranges(frame)?;
        backend.upload(
            &mut self.buffer,
            &[
                BufferWrite::new(ranges.camera_3d.offset, bytemuck::bytes_of(&globals.camera_3d)),
                BufferWrite::new(ranges.camera_2d.offset, bytemuck::bytes_of(&globals.camera_2d)),
                BufferWrite::new(ranges.lighting.offset, bytemuck::bytes_of(&globals.lighting)),
            ],
        )
    }

    /// Release `asset`'s region. The space is reclaimed at the next
    /// reallocation, not immediately.
    pub fn release_asset_region(&mut self, asset: AssetId) -> Result<()> {
        let index = self
            .regions
            .iter()
            .position(|(id, _)| *id == asset)
            .ok_or(Error::UnknownAsset(asset))?;
        let (_, region) = self.regions.remove(index);
        self.released += u64::from(self.frames_in_flight) * region.chunk;
        Ok(())
    }

    /// Region of `asset`, if reserved.
    pub fn region(&self, asset: AssetId) -> Option<UniformRegion> {
        self.regions
            .iter()
            .find_map(|(id, region)| (*id == asset).then_some(*region))
    }

    /// Descriptor range for frame `frame` of `asset`.
    pub fn asset_range(&self, asset: AssetId, frame: u32) -> Result<UniformRange> {
        self.check_frame(frame)?;
        let region = self.region(asset).ok_or(Error::UnknownAsset(asset))?;
        Ok(UniformRange {
            offset: region.frame_offset(frame),
            range: region.block_size,
        })
    }

    /// Descriptor ranges of frame `frame`'s global blocks.
    pub fn global_ranges(&self, frame: u32) -> Result<GlobalRanges> {
        self.check_frame(frame)?;
        let global = self
            .global
            .ok_or_else(|| Error::Backend("global uniform chunk not reserved".to_string()))?;
        let base = u64::from(frame) * global.size;
        Ok(GlobalRanges {
            camera_3d: UniformRange {
                offset: base,
                range: size_of::<Camera3DUniform>() as u64,
            },
            camera_2d: UniformRange {
                offset: base + global.camera_2d,
                range: size_of::<Camera2DUniform>() as u64,
            },
            lighting: UniformRange {
                offset: base + global.lighting,
                range: size_of::<LightingUniform>() as u64,
            },
        })
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

    /// Read back frame `frame` of `asset`'s region.
    pub fn read_frame_region(&self, backend: &mut B, asset: AssetId, frame: u32) -> Result<Vec<u8>> {
        let range = self.asset_range(asset, frame)?;
        backend.read_back(&self.buffer, range.offset, range.range)
    }

    /// Bytes used (including released regions) and allocated.
    pub const fn usage(&self) -> SectionUsage {
        self.usage
    }

    pub const fn alignment(&self) -> u64 {
        self.alignment
    }

    pub const fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    /// Bumped every time regions move; descriptors pointing at an older
    /// generation must be rewritten.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn buffer(&self) -> &B::Buffer {
        &self.buffer
    }

    /// Native handle of the uniform buffer.
    pub fn raw_handle(&self) -> u64 {
        self.buffer.raw_handle()
    }

    /// Release the buffer. In-flight frames must have retired.
    pub fn destroy(self, backend: &mut B) {
        backend.destroy(self.buffer);
    }
}
