//! Physical buffer capability traits implemented by each graphics backend.
//!
//! Offset arithmetic never lives behind these traits; a backend only moves
//! bytes into, between and out of buffers it owns.

use crate::error::{Error, Result};
use crate::offsets::VertexPacking;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a physical buffer is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferRole {
    /// ASSET and UI sections (plus inline indices with separate packing)
    Vertex,
    /// INDICES section
    Index,
    /// Global and per-asset uniform regions
    Uniform,
}

/// Bytes to place at `offset`.
#[derive(Clone, Copy, Debug)]
pub struct BufferWrite<'a> {
    pub offset: u64,
    pub data: &'a [u8],
}

impl<'a> BufferWrite<'a> {
    #[inline]
    pub const fn new(offset: u64, data: &'a [u8]) -> Self {
        Self { offset, data }
    }

    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// A buffer-to-buffer copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRange {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// A backend-owned buffer.
pub trait PhysicalBuffer {
    /// Allocated size in bytes.
    fn capacity(&self) -> u64;

    /// Native handle, used when descriptors point at the buffer.
    fn raw_handle(&self) -> u64;
}

/// Blocks until every frame in flight has retired.
pub trait FrameFences {
    /// Wait for all in-flight frames, failing with [`Error::FenceTimeout`]
    /// once `timeout` expires.
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<()>;
}

/// Allocate, fill, copy, read back and destroy physical buffers.
pub trait BufferBackend: FrameFences {
    type Buffer: PhysicalBuffer;

    /// Allocate a buffer of `size` bytes.
    fn allocate(&mut self, role: BufferRole, size: u64, name: &str) -> Result<Self::Buffer>;

    /// Copy CPU data into `buffer`. Returns once the data is visible to the GPU.
    fn upload(&mut self, buffer: &mut Self::Buffer, writes: &[BufferWrite<'_>]) -> Result<()>;

    /// Copy ranges from `src` into `dst`.
    fn copy_range(
        &mut self,
        src: &Self::Buffer,
        dst: &mut Self::Buffer,
        ranges: &[CopyRange],
    ) -> Result<()>;

    /// Read `len` bytes at `offset` back to the CPU.
    fn read_back(&mut self, buffer: &Self::Buffer, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Release `buffer`. Callers must have waited for in-flight frames.
    fn destroy(&mut self, buffer: Self::Buffer);

    /// Device limit for uniform buffer offsets.
    fn min_uniform_alignment(&self) -> u64;

    /// Packing used when the configuration does not pick one.
    fn preferred_packing(&self) -> VertexPacking {
        VertexPacking::Separate
    }
}

/// Fail with [`Error::OutOfBounds`] unless `offset..offset + len` fits in
/// `capacity`.
pub fn ensure_in_bounds(what: &'static str, offset: u64, len: u64, capacity: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(Error::OutOfBounds {
            what,
            offset,
            len,
            capacity,
        }),
    }
}

/// Bounds-check a batch of writes against `buffer`.
pub fn check_writes<T: PhysicalBuffer + ?Sized>(
    buffer: &T,
    writes: &[BufferWrite<'_>],
) -> Result<()> {
    for write in writes {
        let len = write.data.len() as u64;
        ensure_in_bounds("buffer", write.offset, len, buffer.capacity())?;
    }
    Ok(())
}

/// Bounds-check a batch of copies against both buffers.
pub fn check_copies<T: PhysicalBuffer + ?Sized>(
    src: &T,
    dst: &T,
    ranges: &[CopyRange],
) -> Result<()> {
    for range in ranges {
        let size = range.size;
        ensure_in_bounds("copy source", range.src_offset, size, src.capacity())?;
        ensure_in_bounds("copy destination", range.dst_offset, size, dst.capacity())?;
    }
    Ok(())
}
