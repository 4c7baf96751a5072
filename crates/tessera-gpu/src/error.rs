//! Errors raised by the Vulkan backend.

use ash::vk;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Vulkan loader unavailable: {0}")]
    Loader(String),

    #[error("invalid application name: {0}")]
    AppName(#[from] std::ffi::NulError),

    /// Every adapter was rejected; carries the last rejection reason.
    #[error("no adapter can host the sub-allocator ({0})")]
    NoAdapter(String),

    #[error("device memory: {0}")]
    Memory(#[from] gpu_allocator::AllocationError),

    #[error("{len} bytes at {offset} fall outside buffer of {size} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("buffer is not host visible")]
    NotMapped,

    #[error("frame fences not signaled within {0:?}")]
    FenceTimeout(Duration),

    #[error("texture {0} is not registered")]
    UnknownTexture(u64),
}

pub type Result<T> = std::result::Result<T, GpuError>;

impl From<GpuError> for tessera_memory::Error {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::FenceTimeout(timeout) => Self::FenceTimeout { timeout },
            other => Self::Backend(other.to_string()),
        }
    }
}
