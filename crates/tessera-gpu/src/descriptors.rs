//! Vulkan descriptor backend.
//!
//! Every category gets one set layout built from its binding table and one
//! pool per [`DescriptorBackend::create_pool`] call. Pools are created with
//! `FREE_DESCRIPTOR_SET` so removed assets hand their sets back.

use crate::device::VulkanDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use ash::vk::Handle;
use hashbrown::HashMap;
use std::sync::Arc;
use tessera_core::TextureId;
use tessera_memory::{BindingSource, DescriptorBackend, DescriptorCategory, ResolvedBinding};

const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

pub fn descriptor_type(source: BindingSource) -> vk::DescriptorType {
    match source {
        BindingSource::Texture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        BindingSource::Camera3D
        | BindingSource::Camera2D
        | BindingSource::Lighting
        | BindingSource::AssetUniform => vk::DescriptorType::UNIFORM_BUFFER,
    }
}

/// Descriptor counts a pool of `max_sets` sets of `category` needs.
pub fn pool_sizes(category: DescriptorCategory, max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for slot in category.bindings() {
        let ty = descriptor_type(slot.source);
        match sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.descriptor_count += max_sets,
            None => sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: max_sets,
            }),
        }
    }
    sizes.retain(|size| size.descriptor_count > 0);
    sizes
}

/// Set layout of `category`'s binding table.
///
/// # Safety
/// `device` must be live.
pub unsafe fn category_layout(
    device: &ash::Device,
    category: DescriptorCategory,
) -> Result<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = category
        .bindings()
        .iter()
        .map(|slot| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(slot.binding)
                .descriptor_type(descriptor_type(slot.source))
                .descriptor_count(1)
                .stage_flags(STAGES)
        })
        .collect();
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    Ok(device.create_descriptor_set_layout(&info, None)?)
}

/// A category pool and the number of sets taken from it.
pub struct VulkanPool {
    raw: vk::DescriptorPool,
    category: DescriptorCategory,
    capacity: u32,
    allocated: u32,
}

impl VulkanPool {
    pub fn raw(&self) -> vk::DescriptorPool {
        self.raw
    }

    pub fn category(&self) -> DescriptorCategory {
        self.category
    }

    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    fn exhausted(&self, requested: u32) -> tessera_memory::Error {
        tessera_memory::Error::DescriptorExhaustion {
            category: self.category,
            requested,
            capacity: self.capacity,
        }
    }
}

/// Descriptor backend on a [`VulkanDevice`].
///
/// Textures belong to the renderer, which registers their view and sampler
/// here under the id assets refer to.
pub struct VulkanDescriptors {
    device: Arc<VulkanDevice>,
    layouts: HashMap<DescriptorCategory, vk::DescriptorSetLayout>,
    textures: HashMap<TextureId, vk::DescriptorImageInfo>,
}

impl VulkanDescriptors {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let mut layouts = HashMap::with_capacity(DescriptorCategory::ALL.len());
        for category in DescriptorCategory::ALL {
            match unsafe { category_layout(device.device(), category) } {
                Ok(layout) => {
                    layouts.insert(category, layout);
                }
                Err(e) => {
                    for (_, layout) in layouts {
                        unsafe { device.device().destroy_descriptor_set_layout(layout, None) };
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            device,
            layouts,
            textures: HashMap::new(),
        })
    }

    /// Set layout of `category`, for pipeline layouts.
    pub fn layout(&self, category: DescriptorCategory) -> vk::DescriptorSetLayout {
        self.layouts
            .get(&category)
            .copied()
            .unwrap_or_else(vk::DescriptorSetLayout::null)
    }

    pub fn register_texture(&mut self, id: TextureId, view: vk::ImageView, sampler: vk::Sampler) {
        let info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .sampler(sampler)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.textures.insert(id, info);
    }

    pub fn unregister_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }
}

impl Drop for VulkanDescriptors {
    fn drop(&mut self) {
        let device = self.device.device();
        for &layout in self.layouts.values() {
            unsafe { device.destroy_descriptor_set_layout(layout, None) };
        }
    }
}

impl DescriptorBackend for VulkanDescriptors {
    type Pool = VulkanPool;
    type Set = vk::DescriptorSet;

    fn create_pool(
        &mut self,
        category: DescriptorCategory,
        max_sets: u32,
    ) -> tessera_memory::Result<VulkanPool> {
        let sizes = pool_sizes(category, max_sets);
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&sizes);
        let raw = unsafe { self.device.device().create_descriptor_pool(&info, None) }
            .map_err(GpuError::from)?;
        tracing::debug!(?category, max_sets, "descriptor pool created");

        Ok(VulkanPool {
            raw,
            category,
            capacity: max_sets,
            allocated: 0,
        })
    }

    fn destroy_pool(&mut self, pool: VulkanPool) {
        unsafe { self.device.device().destroy_descriptor_pool(pool.raw, None) };
    }

    fn allocate_sets(
        &mut self,
        pool: &mut VulkanPool,
        count: u32,
    ) -> tessera_memory::Result<Vec<vk::DescriptorSet>> {
        if pool.allocated + count > pool.capacity {
            return Err(pool.exhausted(count));
        }

        let layouts = vec![self.layout(pool.category); count as usize];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.raw)
            .set_layouts(&layouts);
        match unsafe { self.device.device().allocate_descriptor_sets(&info) } {
            Ok(sets) => {
                pool.allocated += count;
                Ok(sets)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                Err(pool.exhausted(count))
            }
            Err(e) => Err(GpuError::from(e).into()),
        }
    }

    fn write_set(
        &mut self,
        set: vk::DescriptorSet,
        bindings: &[ResolvedBinding],
    ) -> tessera_memory::Result<()> {
        // Infos must outlive the writes pointing at them.
        let mut buffers = Vec::new();
        let mut images = Vec::new();
        for binding in bindings {
            match *binding {
                ResolvedBinding::Uniform {
                    binding,
                    buffer,
                    offset,
                    range,
                } => buffers.push((
                    binding,
                    vk::DescriptorBufferInfo::default()
                        .buffer(vk::Buffer::from_raw(buffer))
                        .offset(offset)
                        .range(range),
                )),
                ResolvedBinding::Texture { binding, texture } => {
                    let info = self
                        .textures
                        .get(&texture)
                        .copied()
                        .ok_or(GpuError::UnknownTexture(texture.0))?;
                    images.push((binding, info));
                }
            }
        }

        let write = |binding: u32, ty: vk::DescriptorType| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(ty)
        };
        let writes: Vec<vk::WriteDescriptorSet<'_>> = buffers
            .iter()
            .map(|(binding, info)| {
                write(*binding, vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
            })
            .chain(images.iter().map(|(binding, info)| {
                write(*binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
            }))
            .collect();

        unsafe { self.device.device().update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    fn free_sets(
        &mut self,
        pool: &mut VulkanPool,
        sets: &[vk::DescriptorSet],
    ) -> tessera_memory::Result<()> {
        if sets.is_empty() {
            return Ok(());
        }
        unsafe { self.device.device().free_descriptor_sets(pool.raw, sets) }
            .map_err(GpuError::from)?;
        pool.allocated = pool.allocated.saturating_sub(sets.len() as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textured_3d_pools_mix_buffers_and_samplers() {
        let sizes = pool_sizes(DescriptorCategory::Mapped3D, 8);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 24);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 8);
    }

    #[test]
    fn ui_pools_only_hold_samplers() {
        let sizes = pool_sizes(DescriptorCategory::Ui, 4);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 4);
    }

    #[test]
    fn untextured_pools_hold_no_samplers() {
        for category in [DescriptorCategory::Unmapped2D, DescriptorCategory::Unmapped3D] {
            assert!(pool_sizes(category, 1)
                .iter()
                .all(|size| size.ty == vk::DescriptorType::UNIFORM_BUFFER));
        }
    }

    #[test]
    fn empty_pools_request_nothing() {
        assert!(pool_sizes(DescriptorCategory::Mapped2D, 0).is_empty());
    }
}
