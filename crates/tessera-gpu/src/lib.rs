//! Vulkan backend for the Tessera sub-allocator.
//!
//! [`VulkanBackend`] places vertex, index and uniform buffers through
//! gpu-allocator and waits on the renderer's frame fences before memory is
//! retired. [`VulkanDescriptors`] keeps one pool per descriptor category.

pub mod allocation;
pub mod backend;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod limits;
pub mod sync;
pub mod transfer;

pub use allocation::{host_range, BufferDesc, DeviceAllocator, DeviceBuffer};
pub use backend::{
    buffer_usage, copy_regions, readback_region, staging_regions, VulkanBackend, VulkanBuffer,
};
pub use descriptors::{category_layout, descriptor_type, pool_sizes, VulkanDescriptors, VulkanPool};
pub use device::{DeviceBuilder, VulkanDevice};
pub use error::{GpuError, Result};
pub use limits::DeviceLimits;
pub use sync::{wait_for_fences, FrameFences};
pub use transfer::TransferQueue;
