//! Blocking buffer transfers on the graphics queue.

use crate::error::Result;
use ash::vk;

/// A transient command pool and a fence for one-off copies.
pub struct TransferQueue {
    queue: vk::Queue,
    pool: vk::CommandPool,
    done: vk::Fence,
}

impl TransferQueue {
    /// # Safety
    /// `queue` must belong to `family` on `device`.
    pub unsafe fn new(device: &ash::Device, family: u32, queue: vk::Queue) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = device.create_command_pool(&pool_info, None)?;

        let done = match device.create_fence(&vk::FenceCreateInfo::default(), None) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_command_pool(pool, None);
                return Err(e.into());
            }
        };
        Ok(Self { queue, pool, done })
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Record commands with `record`, submit them and block until they
    /// completed.
    ///
    /// # Safety
    /// Every handle `record` uses must stay valid until this returns.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn submit_blocking(
        &self,
        device: &ash::Device,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmds = device.allocate_command_buffers(&alloc_info)?;

        let outcome = (|| -> Result<()> {
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmds[0], &begin)?;
            record(cmds[0]);
            device.end_command_buffer(cmds[0])?;

            let submit = vk::SubmitInfo::default().command_buffers(&cmds);
            device.queue_submit(self.queue, &[submit], self.done)?;
            device.wait_for_fences(&[self.done], true, u64::MAX)?;
            device.reset_fences(&[self.done])?;
            Ok(())
        })();

        device.free_command_buffers(self.pool, &cmds);
        outcome
    }

    /// # Safety
    /// No submission may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.done, None);
        device.destroy_command_pool(self.pool, None);
    }
}
