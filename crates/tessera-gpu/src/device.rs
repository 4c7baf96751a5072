//! Instance, adapter and logical device setup.

use crate::allocation::DeviceAllocator;
use crate::error::{GpuError, Result};
use crate::limits::DeviceLimits;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device shared by the buffer and descriptor backends.
///
/// One queue family serves both rendering and the allocator's copies.
pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    adapter: vk::PhysicalDevice,
    device: ash::Device,
    limits: DeviceLimits,
    queue: vk::Queue,
    queue_family: u32,
    allocator: Mutex<DeviceAllocator>,
}

impl VulkanDevice {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> vk::PhysicalDevice {
        self.adapter
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn allocator(&self) -> &Mutex<DeviceAllocator> {
        &self.allocator
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.allocator.lock().shutdown();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Opens a [`VulkanDevice`].
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    app_name: String,
    validation: bool,
    adapter_hint: Option<String>,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self {
            app_name: "tessera".to_string(),
            validation: cfg!(debug_assertions),
            adapter_hint: None,
        }
    }
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Request the Khronos validation layer. Ignored when not installed.
    pub fn validation(mut self, enable: bool) -> Self {
        self.validation = enable;
        self
    }

    /// Prefer adapters whose name contains `hint`.
    pub fn adapter_hint(mut self, hint: impl Into<String>) -> Self {
        self.adapter_hint = Some(hint.into());
        self
    }

    pub fn build(self) -> Result<Arc<VulkanDevice>> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loader(e.to_string()))?;
        let instance = unsafe { create_instance(&entry, &self.app_name, self.validation) }?;

        let opened = unsafe { self.open(&instance) };
        let (adapter, limits, queue_family, device) = match opened {
            Ok(parts) => parts,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let allocator = match unsafe { DeviceAllocator::new(&instance, &device, adapter) } {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        tracing::info!(adapter = %limits, queue_family, "vulkan device opened");
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        Ok(Arc::new(VulkanDevice {
            _entry: entry,
            instance,
            adapter,
            device,
            limits,
            queue,
            queue_family,
            allocator: Mutex::new(allocator),
        }))
    }

    /// Pick the best acceptable adapter and create a device on it.
    unsafe fn open(
        &self,
        instance: &ash::Instance,
    ) -> Result<(vk::PhysicalDevice, DeviceLimits, u32, ash::Device)> {
        let mut last_rejection = "no Vulkan adapters".to_string();
        let mut candidates = Vec::new();

        for adapter in instance.enumerate_physical_devices()? {
            let limits = DeviceLimits::read(instance, adapter);
            if let Some(reason) = limits.rejection() {
                tracing::debug!(%reason, "adapter rejected");
                last_rejection = reason;
                continue;
            }
            let Some(family) = graphics_family(instance, adapter) else {
                last_rejection = format!("{}: no graphics queue", limits.name);
                continue;
            };
            candidates.push((adapter, limits, family));
        }

        let hinted = |limits: &DeviceLimits| {
            self.adapter_hint
                .as_deref()
                .is_some_and(|hint| limits.name.contains(hint))
        };
        let (adapter, limits, family) = candidates
            .into_iter()
            .max_by_key(|(_, limits, _)| (hinted(limits), limits.rank()))
            .ok_or(GpuError::NoAdapter(last_rejection))?;

        let priority = [1.0_f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family)
            .queue_priorities(&priority);
        let device_info =
            vk::DeviceCreateInfo::default().queue_create_infos(std::slice::from_ref(&queue_info));
        let device = instance.create_device(adapter, &device_info, None)?;

        Ok((adapter, limits, family, device))
    }
}

unsafe fn graphics_family(instance: &ash::Instance, adapter: vk::PhysicalDevice) -> Option<u32> {
    let families = instance.get_physical_device_queue_family_properties(adapter);
    (0_u32..)
        .zip(families)
        .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(index, _)| index)
}

unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .engine_name(c"tessera")
        .api_version(vk::API_VERSION_1_2);

    let mut layers: Vec<*const c_char> = Vec::new();
    if validation {
        let installed = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == VALIDATION_LAYER);
        if installed {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!("validation requested but the Khronos layer is not installed");
        }
    }

    #[cfg(target_os = "macos")]
    let (extensions, flags) = (
        vec![ash::khr::portability_enumeration::NAME.as_ptr()],
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR,
    );
    #[cfg(not(target_os = "macos"))]
    let (extensions, flags): (Vec<*const c_char>, _) =
        (Vec::new(), vk::InstanceCreateFlags::empty());

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .flags(flags);
    Ok(entry.create_instance(&create_info, None)?)
}
