//! OpenGL implementation of the physical buffer traits.
//!
//! All data transfers go through the `COPY_READ_BUFFER` and
//! `COPY_WRITE_BUFFER` targets so no vertex array state is disturbed.
//! The driver orders buffer access against queued draws, so frame waits
//! are no-ops.

use crate::error::{GlError, Result};
use glow::HasContext as _;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::Duration;
use tessera_memory::backend::{check_copies, check_writes, ensure_in_bounds};
use tessera_memory::{
    BufferBackend, BufferRole, BufferWrite, CopyRange, FrameFences, PhysicalBuffer,
    VertexPacking,
};

/// Convert a byte size or offset to the `GLsizei`/`GLintptr` glow takes.
pub fn gl_int(value: u64) -> Result<i32> {
    i32::try_from(value).map_err(|_| GlError::SizeOverflow(value))
}

/// Read offset, write offset and size arguments of `copy_buffer_sub_data`
/// for `range`.
pub fn copy_args(range: &CopyRange) -> Result<(i32, i32, i32)> {
    Ok((
        gl_int(range.src_offset)?,
        gl_int(range.dst_offset)?,
        gl_int(range.size)?,
    ))
}

/// Offset and length arguments of `map_buffer_range` for `len` bytes at
/// `offset`. The mapping must also end inside the GL size range.
pub fn mapping_args(offset: u64, len: u64) -> Result<(i32, i32)> {
    let end = offset.checked_add(len).ok_or(GlError::SizeOverflow(offset))?;
    gl_int(end)?;
    Ok((gl_int(offset)?, gl_int(len)?))
}

/// Usage hint of a buffer role.
pub const fn usage_hint(role: BufferRole) -> u32 {
    match role {
        BufferRole::Uniform => glow::DYNAMIC_DRAW,
        BufferRole::Vertex | BufferRole::Index => glow::STATIC_DRAW,
    }
}

/// Rebuild a buffer name from [`PhysicalBuffer::raw_handle`].
pub fn buffer_from_raw(raw: u64) -> Result<glow::Buffer> {
    u32::try_from(raw)
        .ok()
        .and_then(NonZeroU32::new)
        .map(glow::NativeBuffer)
        .ok_or(GlError::InvalidHandle(raw))
}

/// A GL buffer object owned by [`GlBackend`].
#[derive(Debug)]
pub struct GlBuffer {
    raw: glow::Buffer,
    role: BufferRole,
    capacity: u64,
}

impl GlBuffer {
    pub fn raw(&self) -> glow::Buffer {
        self.raw
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }
}

impl PhysicalBuffer for GlBuffer {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn raw_handle(&self) -> u64 {
        u64::from(self.raw.0.get())
    }
}

/// Buffer backend on a current GL context.
pub struct GlBackend {
    gl: Rc<glow::Context>,
    uniform_alignment: u64,
}

impl GlBackend {
    /// Wrap a context. The context must be current on this thread.
    pub fn new(gl: Rc<glow::Context>) -> Self {
        let alignment = unsafe { gl.get_parameter_i32(glow::UNIFORM_BUFFER_OFFSET_ALIGNMENT) };
        let uniform_alignment = u64::try_from(alignment).unwrap_or(1).max(1);
        tracing::debug!(uniform_alignment, "gl backend created");

        Self {
            gl,
            uniform_alignment,
        }
    }

    pub fn gl(&self) -> &Rc<glow::Context> {
        &self.gl
    }

    fn check_error(&self, what: &str) -> Result<()> {
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            code => Err(GlError::Gl(format!("{what} failed with 0x{code:04x}"))),
        }
    }

    /// Map `len` bytes at `offset` of the buffer bound to `target`, run `f`
    /// on the mapping and unmap.
    ///
    /// # Safety
    /// A buffer of at least `offset + len` bytes must be bound to `target`.
    unsafe fn with_mapping<R>(
        &self,
        target: u32,
        offset: u64,
        len: u64,
        access: u32,
        f: impl FnOnce(*mut u8, usize) -> R,
    ) -> Result<R> {
        let (start, length) = mapping_args(offset, len)?;
        let ptr = unsafe { self.gl.map_buffer_range(target, start, length, access) };
        if ptr.is_null() {
            return Err(GlError::Gl(format!("mapping {len} bytes at {offset} failed")));
        }
        let result = f(ptr, len as usize);
        unsafe { self.gl.unmap_buffer(target) };
        Ok(result)
    }
}

impl FrameFences for GlBackend {
    fn wait_for_frames(&mut self, _timeout: Duration) -> tessera_memory::Result<()> {
        Ok(())
    }
}

impl BufferBackend for GlBackend {
    type Buffer = GlBuffer;

    fn allocate(
        &mut self,
        role: BufferRole,
        size: u64,
        name: &str,
    ) -> tessera_memory::Result<GlBuffer> {
        let failed = |reason: String| tessera_memory::Error::AllocationFailed {
            role,
            requested: size,
            reason,
        };
        let len = gl_int(size).map_err(|e| failed(e.to_string()))?;

        let raw = unsafe { self.gl.create_buffer() }.map_err(failed)?;
        unsafe {
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(raw));
            self.gl
                .buffer_data_size(glow::COPY_WRITE_BUFFER, len, usage_hint(role));
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        if let Err(e) = self.check_error("buffer allocation") {
            unsafe { self.gl.delete_buffer(raw) };
            return Err(failed(e.to_string()));
        }

        tracing::debug!(?role, size, name, "gl buffer allocated");
        Ok(GlBuffer {
            raw,
            role,
            capacity: size,
        })
    }

    fn upload(
        &mut self,
        buffer: &mut GlBuffer,
        writes: &[BufferWrite<'_>],
    ) -> tessera_memory::Result<()> {
        check_writes(buffer, writes)?;
        unsafe { self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(buffer.raw)) };
        let result = writes
            .iter()
            .filter(|write| !write.data.is_empty())
            .try_for_each(|write| unsafe {
                self.with_mapping(
                    glow::COPY_WRITE_BUFFER,
                    write.offset,
                    write.data.len() as u64,
                    glow::MAP_WRITE_BIT | glow::MAP_INVALIDATE_RANGE_BIT,
                    |ptr, len| std::ptr::copy_nonoverlapping(write.data.as_ptr(), ptr, len),
                )
            });
        unsafe { self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None) };
        result?;
        self.check_error("buffer upload")?;
        Ok(())
    }

    fn copy_range(
        &mut self,
        src: &GlBuffer,
        dst: &mut GlBuffer,
        ranges: &[CopyRange],
    ) -> tessera_memory::Result<()> {
        check_copies(src, dst, ranges)?;
        unsafe {
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, Some(src.raw));
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(dst.raw));
        }
        let result = ranges.iter().try_for_each(|range| {
            let (from, to, len) = copy_args(range)?;
            unsafe {
                self.gl.copy_buffer_sub_data(
                    glow::COPY_READ_BUFFER,
                    glow::COPY_WRITE_BUFFER,
                    from,
                    to,
                    len,
                );
            }
            Ok::<(), GlError>(())
        });
        unsafe {
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, None);
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        result?;
        self.check_error("buffer copy")?;
        Ok(())
    }

    fn read_back(
        &mut self,
        buffer: &GlBuffer,
        offset: u64,
        len: u64,
    ) -> tessera_memory::Result<Vec<u8>> {
        ensure_in_bounds("buffer", offset, len, buffer.capacity)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        unsafe { self.gl.bind_buffer(glow::COPY_READ_BUFFER, Some(buffer.raw)) };
        let result = unsafe {
            self.with_mapping(glow::COPY_READ_BUFFER, offset, len, glow::MAP_READ_BIT, |ptr, len| {
                std::slice::from_raw_parts(ptr.cast_const(), len).to_vec()
            })
        };
        unsafe { self.gl.bind_buffer(glow::COPY_READ_BUFFER, None) };
        let bytes = result?;
        self.check_error("buffer read")?;
        Ok(bytes)
    }

    fn destroy(&mut self, buffer: GlBuffer) {
        unsafe { self.gl.delete_buffer(buffer.raw) };
    }

    fn min_uniform_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    fn preferred_packing(&self) -> VertexPacking {
        VertexPacking::Interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_beyond_i32_are_rejected() {
        assert_eq!(gl_int(4096).unwrap(), 4096);
        assert!(matches!(
            gl_int(u64::from(u32::MAX)),
            Err(GlError::SizeOverflow(_))
        ));
    }

    #[test]
    fn raw_handles_round_trip() {
        let buffer = buffer_from_raw(17).unwrap();
        assert_eq!(buffer.0.get(), 17);
        assert!(matches!(buffer_from_raw(0), Err(GlError::InvalidHandle(0))));
        assert!(buffer_from_raw(u64::MAX).is_err());
    }

    #[test]
    fn uniform_buffers_are_dynamic() {
        assert_eq!(usage_hint(BufferRole::Uniform), glow::DYNAMIC_DRAW);
        assert_eq!(usage_hint(BufferRole::Vertex), glow::STATIC_DRAW);
        assert_eq!(usage_hint(BufferRole::Index), glow::STATIC_DRAW);
    }

    #[test]
    fn copies_map_source_then_destination() {
        let range = CopyRange {
            src_offset: 128,
            dst_offset: 4096,
            size: 64,
        };
        assert_eq!(copy_args(&range).unwrap(), (128, 4096, 64));

        let far = CopyRange {
            src_offset: 0,
            dst_offset: 1 << 32,
            size: 4,
        };
        assert!(matches!(copy_args(&far), Err(GlError::SizeOverflow(v)) if v == 1 << 32));
    }

    #[test]
    fn mappings_must_end_in_range() {
        assert_eq!(mapping_args(256, 32).unwrap(), (256, 32));
        let last = 0x7fff_ffff_u64;
        assert!(mapping_args(last - 8, 8).is_ok());
        assert!(mapping_args(last - 8, 16).is_err());
        assert!(mapping_args(u64::MAX, 1).is_err());
    }
}
