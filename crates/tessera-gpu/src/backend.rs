//! Vulkan implementation of the physical buffer traits.
//!
//! Vertex and index buffers live in device-local memory and are filled
//! through a staging buffer and a copy on the graphics queue. The uniform
//! buffer is host-visible and written directly.

use crate::allocation::{BufferDesc, DeviceBuffer};
use crate::device::VulkanDevice;
use crate::error::Result;
use crate::sync::FrameFences as FrameFenceSet;
use crate::transfer::TransferQueue;
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use std::time::Duration;
use tessera_memory::backend::{check_copies, check_writes, ensure_in_bounds};
use tessera_memory::{
    BufferBackend, BufferRole, BufferWrite, CopyRange, FrameFences, PhysicalBuffer,
};

/// Usage flags and memory location of a buffer role.
pub fn buffer_usage(role: BufferRole) -> (vk::BufferUsageFlags, MemoryLocation) {
    let transfer = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    match role {
        // Separate packing keeps index arrays inline with vertices
        BufferRole::Vertex => (
            transfer | vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryLocation::GpuOnly,
        ),
        BufferRole::Index => (
            transfer | vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryLocation::GpuOnly,
        ),
        BufferRole::Uniform => (
            transfer | vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        ),
    }
}

/// Copy commands for the non-empty `ranges`, in order.
pub fn copy_regions(ranges: &[CopyRange]) -> Vec<vk::BufferCopy> {
    ranges
        .iter()
        .filter(|r| r.size > 0)
        .map(|r| vk::BufferCopy {
            src_offset: r.src_offset,
            dst_offset: r.dst_offset,
            size: r.size,
        })
        .collect()
}

/// Pack the non-empty `writes` back to back in a staging buffer.
///
/// Returns the staging size and one copy per non-empty write from its
/// packed offset to its destination offset.
pub fn staging_regions(writes: &[BufferWrite<'_>]) -> (u64, Vec<vk::BufferCopy>) {
    let mut cursor = 0;
    let regions = writes
        .iter()
        .filter(|write| !write.data.is_empty())
        .map(|write| {
            let size = write.data.len() as u64;
            let region = vk::BufferCopy {
                src_offset: cursor,
                dst_offset: write.offset,
                size,
            };
            cursor += size;
            region
        })
        .collect();
    (cursor, regions)
}

/// Copy command reading `len` bytes at `offset` into the start of a
/// staging buffer.
pub const fn readback_region(offset: u64, len: u64) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: offset,
        dst_offset: 0,
        size: len,
    }
}

/// A Vulkan buffer owned by [`VulkanBackend`].
pub struct VulkanBuffer {
    inner: DeviceBuffer,
    role: BufferRole,
}

impl VulkanBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.inner.raw()
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    fn is_mapped(&self) -> bool {
        self.inner.is_host_visible()
    }
}

impl PhysicalBuffer for VulkanBuffer {
    fn capacity(&self) -> u64 {
        self.inner.size()
    }

    fn raw_handle(&self) -> u64 {
        self.inner.raw().as_raw()
    }
}

/// Buffer backend on a [`VulkanDevice`].
pub struct VulkanBackend {
    device: Arc<VulkanDevice>,
    transfers: TransferQueue,
    frames: FrameFenceSet,
}

impl VulkanBackend {
    /// Create the transfer queue and `frames_in_flight` frame fences.
    pub fn new(device: Arc<VulkanDevice>, frames_in_flight: u32) -> Result<Self> {
        let raw = device.device();
        let transfers = unsafe { TransferQueue::new(raw, device.queue_family(), device.queue()) }?;
        let frames = unsafe { FrameFenceSet::new(raw, frames_in_flight) }.inspect_err(|_| unsafe {
            transfers.destroy(raw);
        })?;
        Ok(Self {
            device,
            transfers,
            frames,
        })
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// Fences the renderer submits frames with.
    pub fn frame_fences(&self) -> &FrameFenceSet {
        &self.frames
    }

    pub fn frame_fences_mut(&mut self) -> &mut FrameFenceSet {
        &mut self.frames
    }

    fn create(&self, desc: &BufferDesc<'_>) -> Result<DeviceBuffer> {
        self.device.allocator().lock().allocate(desc)
    }

    fn release(&self, buffer: DeviceBuffer) {
        if let Err(e) = self.device.allocator().lock().free(buffer) {
            tracing::warn!(error = %e, "failed to free buffer memory");
        }
    }

    fn copy(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) -> Result<()> {
        if regions.is_empty() {
            return Ok(());
        }
        let device = self.device.device();
        unsafe {
            self.transfers.submit_blocking(device, |cmd| {
                device.cmd_copy_buffer(cmd, src, dst, regions);
            })
        }
    }

    /// Pack all writes into one host-visible buffer and copy them over.
    fn staged_upload(&self, dst: &VulkanBuffer, writes: &[BufferWrite<'_>]) -> Result<()> {
        let (total, regions) = staging_regions(writes);
        if total == 0 {
            return Ok(());
        }
        let mut staging = self.create(&BufferDesc {
            name: "tessera staging upload",
            size: total,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
        })?;

        let result = writes
            .iter()
            .filter(|write| !write.data.is_empty())
            .zip(&regions)
            .try_for_each(|(write, region)| staging.write(region.src_offset, write.data))
            .and_then(|()| self.copy(staging.raw(), dst.handle(), &regions));
        self.release(staging);
        result
    }

    fn staged_read(&self, src: &VulkanBuffer, offset: u64, len: u64) -> Result<Vec<u8>> {
        let staging = self.create(&BufferDesc {
            name: "tessera staging read",
            size: len,
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            location: MemoryLocation::GpuToCpu,
        })?;
        let result = self
            .copy(src.handle(), staging.raw(), &[readback_region(offset, len)])
            .and_then(|()| staging.read(0, len));
        self.release(staging);
        result
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let device = self.device.device();
        unsafe {
            let _ = device.device_wait_idle();
            self.frames.destroy(device);
            self.transfers.destroy(device);
        }
    }
}

impl FrameFences for VulkanBackend {
    fn wait_for_frames(&mut self, timeout: Duration) -> tessera_memory::Result<()> {
        unsafe { self.frames.wait_all(self.device.device(), timeout) }?;
        Ok(())
    }
}

impl BufferBackend for VulkanBackend {
    type Buffer = VulkanBuffer;

    fn allocate(
        &mut self,
        role: BufferRole,
        size: u64,
        name: &str,
    ) -> tessera_memory::Result<VulkanBuffer> {
        let (usage, location) = buffer_usage(role);
        let desc = BufferDesc {
            name,
            size,
            usage,
            location,
        };
        let inner = self
            .create(&desc)
            .map_err(|e| tessera_memory::Error::AllocationFailed {
                role,
                requested: size,
                reason: e.to_string(),
            })?;
        tracing::debug!(?role, size, name, "vulkan buffer allocated");
        Ok(VulkanBuffer { inner, role })
    }

    fn upload(
        &mut self,
        buffer: &mut VulkanBuffer,
        writes: &[BufferWrite<'_>],
    ) -> tessera_memory::Result<()> {
        check_writes(buffer, writes)?;
        if buffer.is_mapped() {
            for write in writes {
                buffer.inner.write(write.offset, write.data)?;
            }
        } else {
            self.staged_upload(buffer, writes)?;
        }
        Ok(())
    }

    fn copy_range(
        &mut self,
        src: &VulkanBuffer,
        dst: &mut VulkanBuffer,
        ranges: &[CopyRange],
    ) -> tessera_memory::Result<()> {
        check_copies(src, dst, ranges)?;
        self.copy(src.handle(), dst.handle(), &copy_regions(ranges))?;
        Ok(())
    }

    fn read_back(
        &mut self,
        buffer: &VulkanBuffer,
        offset: u64,
        len: u64,
    ) -> tessera_memory::Result<Vec<u8>> {
        ensure_in_bounds("buffer", offset, len, buffer.capacity())?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let bytes = if buffer.is_mapped() {
            buffer.inner.read(offset, len)?
        } else {
            self.staged_read(buffer, offset, len)?
        };
        Ok(bytes)
    }

    fn destroy(&mut self, buffer: VulkanBuffer) {
        self.release(buffer.inner);
    }

    fn min_uniform_alignment(&self) -> u64 {
        self.device.limits().uniform_alignment()
    }
}
