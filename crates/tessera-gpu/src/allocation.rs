//! Buffers backed by gpu-allocator memory.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};
use std::ops::Range;

/// Parameters of one buffer allocation.
#[derive(Clone, Copy, Debug)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

/// Byte range `offset..offset + len` of a `size` byte buffer, as indices
/// into its mapping.
pub fn host_range(offset: u64, len: u64, size: u64) -> Result<Range<usize>> {
    let out_of_range = GpuError::OutOfRange { offset, len, size };
    let end = match offset.checked_add(len) {
        Some(end) if end <= size => end,
        _ => return Err(out_of_range),
    };
    match (usize::try_from(offset), usize::try_from(end)) {
        (Ok(start), Ok(end)) => Ok(start..end),
        _ => Err(out_of_range),
    }
}

/// A buffer and the memory bound to it.
pub struct DeviceBuffer {
    raw: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

impl DeviceBuffer {
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    /// Requested size; the allocation may be larger.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_host_visible(&self) -> bool {
        self.allocation.mapped_ptr().is_some()
    }

    /// Copy `data` into the mapping at `offset`.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let range = host_range(offset, data.len() as u64, self.size)?;
        let mapping = self.allocation.mapped_slice_mut().ok_or(GpuError::NotMapped)?;
        mapping[range].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes out of the mapping at `offset`.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let range = host_range(offset, len, self.size)?;
        let mapping = self.allocation.mapped_slice().ok_or(GpuError::NotMapped)?;
        Ok(mapping[range].to_vec())
    }
}

/// Device memory allocator with a count of what is still live.
pub struct DeviceAllocator {
    inner: Option<Allocator>,
    device: ash::Device,
    live_buffers: usize,
    live_bytes: u64,
}

impl DeviceAllocator {
    /// # Safety
    /// `device` must have been created from `adapter` of `instance`.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        adapter: vk::PhysicalDevice,
    ) -> Result<Self> {
        let debug_settings = AllocatorDebugSettings {
            log_memory_information: cfg!(debug_assertions),
            log_leaks_on_shutdown: true,
            ..Default::default()
        };
        let inner = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: adapter,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            inner: Some(inner),
            device: device.clone(),
            live_buffers: 0,
            live_bytes: 0,
        })
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Create a buffer and bind freshly allocated memory to it.
    pub fn allocate(&mut self, desc: &BufferDesc<'_>) -> Result<DeviceBuffer> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        };

        // Zero-sized buffers are invalid in Vulkan.
        let info = vk::BufferCreateInfo::default()
            .size(desc.size.max(1))
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = unsafe { self.device.create_buffer(&info, None) }?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(raw) };

        let allocated = inner.allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: desc.location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(raw, None) };
                return Err(e.into());
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(raw, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { self.device.destroy_buffer(raw, None) };
            if let Err(free) = inner.free(allocation) {
                tracing::warn!(error = %free, name = desc.name, "leaked memory of unbound buffer");
            }
            return Err(e.into());
        }

        self.live_buffers += 1;
        self.live_bytes += desc.size;
        Ok(DeviceBuffer {
            raw,
            allocation,
            size: desc.size,
        })
    }

    /// Destroy `buffer` and return its memory.
    pub fn free(&mut self, buffer: DeviceBuffer) -> Result<()> {
        let DeviceBuffer {
            raw,
            allocation,
            size,
        } = buffer;
        unsafe { self.device.destroy_buffer(raw, None) };
        self.live_buffers = self.live_buffers.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(size);

        match self.inner.as_mut() {
            Some(inner) => Ok(inner.free(allocation)?),
            None => Ok(()),
        }
    }

    /// Release all device memory. Must run before the device is destroyed.
    pub fn shutdown(&mut self) {
        if self.live_buffers > 0 {
            tracing::warn!(
                buffers = self.live_buffers,
                bytes = self.live_bytes,
                "device allocator shut down with live buffers"
            );
        }
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_inside_the_buffer_are_accepted() {
        assert_eq!(host_range(0, 16, 16).unwrap(), 0..16);
        assert_eq!(host_range(256, 80, 512).unwrap(), 256..336);
        assert_eq!(host_range(512, 0, 512).unwrap(), 512..512);
    }

    #[test]
    fn ranges_past_the_end_are_rejected() {
        assert!(matches!(
            host_range(500, 16, 512),
            Err(GpuError::OutOfRange {
                offset: 500,
                len: 16,
                size: 512
            })
        ));
        assert!(host_range(u64::MAX, 2, u64::MAX).is_err());
    }
}
