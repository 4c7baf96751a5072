//! In-flight frame fences.
//!
//! The renderer submits frame `i` with [`FrameFences::fence`]`(i)`. Before
//! the allocator retires or rewrites live memory it waits on all of them.

use crate::error::{GpuError, Result};
use ash::vk;
use std::time::Duration;

/// `timeout` in nanoseconds, saturating at `u64::MAX`.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    timeout.as_nanos().try_into().unwrap_or(u64::MAX)
}

/// Block until every fence in `fences` signaled.
///
/// # Safety
/// The fences must belong to `device`.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fences(
    device: &ash::Device,
    fences: &[vk::Fence],
    timeout: Duration,
) -> Result<()> {
    if fences.is_empty() {
        return Ok(());
    }
    device
        .wait_for_fences(fences, true, timeout_nanos(timeout))
        .map_err(|e| match e {
            vk::Result::TIMEOUT => GpuError::FenceTimeout(timeout),
            other => other.into(),
        })
}

pub struct FrameFences {
    fences: Vec<vk::Fence>,
    current: usize,
}

impl FrameFences {
    /// Create one signaled fence per frame in flight, at least one.
    ///
    /// # Safety
    /// `device` must be live.
    pub unsafe fn new(device: &ash::Device, frames_in_flight: u32) -> Result<Self> {
        let info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let count = frames_in_flight.max(1) as usize;
        let mut fences = Vec::with_capacity(count);
        while fences.len() < count {
            match device.create_fence(&info, None) {
                Ok(fence) => fences.push(fence),
                Err(e) => {
                    fences.iter().for_each(|&f| device.destroy_fence(f, None));
                    return Err(e.into());
                }
            }
        }
        Ok(Self { fences, current: 0 })
    }

    pub fn fence(&self, frame: usize) -> Option<vk::Fence> {
        self.fences.get(frame).copied()
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.fences.len()
    }

    /// Wait until the current frame slot is free again and return its
    /// fence, reset for the next submission.
    ///
    /// # Safety
    /// `device` must own the fences.
    pub unsafe fn acquire(&self, device: &ash::Device, timeout: Duration) -> Result<vk::Fence> {
        let fence = self.fences[self.current];
        wait_for_fences(device, &[fence], timeout)?;
        device.reset_fences(&[fence])?;
        Ok(fence)
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.fences.len();
    }

    /// # Safety
    /// `device` must own the fences.
    pub unsafe fn wait_all(&self, device: &ash::Device, timeout: Duration) -> Result<()> {
        wait_for_fences(device, &self.fences, timeout)
    }

    /// # Safety
    /// No fence may guard a pending submission.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for &fence in &self.fences {
            device.destroy_fence(fence, None);
        }
    }
}
