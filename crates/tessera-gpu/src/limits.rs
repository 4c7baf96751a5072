//! Adapter properties that decide buffer placement.

use ash::vk;
use std::ffi::CStr;
use std::fmt;

/// Smallest uniform range Vulkan guarantees; the global block must fit.
pub const MIN_UNIFORM_RANGE: u32 = 16 * 1024;

/// Limits of one physical device.
#[derive(Debug, Clone)]
pub struct DeviceLimits {
    pub name: String,
    pub kind: vk::PhysicalDeviceType,
    pub api_version: u32,
    /// `minUniformBufferOffsetAlignment`
    pub uniform_offset_alignment: u64,
    pub max_uniform_range: u32,
    pub max_bound_sets: u32,
    pub max_allocations: u32,
    pub device_local_bytes: u64,
}

impl DeviceLimits {
    /// # Safety
    /// `instance` must be live and `adapter` one of its physical devices.
    pub unsafe fn read(instance: &ash::Instance, adapter: vk::PhysicalDevice) -> Self {
        let props = instance.get_physical_device_properties(adapter);
        let memory = instance.get_physical_device_memory_properties(adapter);

        let heaps = &memory.memory_heaps[..memory.memory_heap_count as usize];
        let device_local_bytes = heaps
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();

        Self {
            name: CStr::from_ptr(props.device_name.as_ptr())
                .to_string_lossy()
                .into_owned(),
            kind: props.device_type,
            api_version: props.api_version,
            uniform_offset_alignment: props.limits.min_uniform_buffer_offset_alignment,
            max_uniform_range: props.limits.max_uniform_buffer_range,
            max_bound_sets: props.limits.max_bound_descriptor_sets,
            max_allocations: props.limits.max_memory_allocation_count,
            device_local_bytes,
        }
    }

    pub fn uniform_alignment(&self) -> u64 {
        self.uniform_offset_alignment.max(1)
    }

    /// Reason the adapter cannot host the allocator, if any.
    pub fn rejection(&self) -> Option<String> {
        let (major, minor) = (
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
        );
        if (major, minor) < (1, 2) {
            return Some(format!("{}: Vulkan {major}.{minor} is below 1.2", self.name));
        }
        if !self.uniform_alignment().is_power_of_two() {
            return Some(format!(
                "{}: uniform alignment {} is not a power of two",
                self.name, self.uniform_offset_alignment
            ));
        }
        if self.max_uniform_range < MIN_UNIFORM_RANGE {
            return Some(format!(
                "{}: uniform range {} is too small",
                self.name, self.max_uniform_range
            ));
        }
        // Asset set and global set are bound together.
        if self.max_bound_sets < 2 {
            return Some(format!("{}: only one descriptor set may be bound", self.name));
        }
        None
    }

    /// Ordering key among acceptable adapters, higher is better.
    pub fn rank(&self) -> (u8, u64) {
        let kind = match self.kind {
            vk::PhysicalDeviceType::DISCRETE_GPU => 3,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
            _ => 0,
        };
        (kind, self.device_local_bytes)
    }
}

impl fmt::Display for DeviceLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}, Vulkan {}.{}, {} MiB local, UBO align {}]",
            self.name,
            self.kind,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            self.device_local_bytes >> 20,
            self.uniform_offset_alignment,
        )
    }
}
