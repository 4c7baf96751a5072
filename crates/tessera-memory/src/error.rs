//! Sub-allocator error types.

use crate::backend::BufferRole;
use crate::descriptors::DescriptorCategory;
use std::time::Duration;
use tessera_core::AssetId;
use thiserror::Error;

/// Errors raised while packing, allocating or binding GPU memory.
#[derive(Error, Debug)]
pub enum Error {
    /// The backend could not allocate a physical buffer.
    #[error("allocation of {requested} bytes for {role:?} buffer failed: {reason}")]
    AllocationFailed {
        role: BufferRole,
        requested: u64,
        reason: String,
    },

    /// Asset data contradicts its declared vertex layout.
    #[error("layout inconsistency in {asset}: {source}")]
    LayoutInconsistency {
        asset: AssetId,
        #[source]
        source: tessera_core::Error,
    },

    /// A descriptor pool could not hand out the requested sets.
    #[error("descriptor pool {category:?} exhausted: requested {requested}, capacity {capacity}")]
    DescriptorExhaustion {
        category: DescriptorCategory,
        requested: u32,
        capacity: u32,
    },

    /// In-flight frames did not retire in time.
    #[error("timed out after {timeout:?} waiting for in-flight frames")]
    FenceTimeout { timeout: Duration },

    /// The asset is not registered.
    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),

    /// The asset id is already registered.
    #[error("asset {0} is already registered")]
    DuplicateAsset(AssetId),

    /// A write or read falls outside a buffer or region.
    #[error("range {offset}..{end} exceeds {what} of {capacity} bytes", end = .offset + .len)]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        len: u64,
        capacity: u64,
    },

    /// Frame index beyond the configured frames in flight.
    #[error("frame {frame} out of range for {frames_in_flight} frames in flight")]
    InvalidFrame { frame: u32, frames_in_flight: u32 },

    /// Any other backend API failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Errors the renderer cannot recover from.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. }
                | Self::DescriptorExhaustion { .. }
                | Self::FenceTimeout { .. }
                | Self::Backend(_)
        )
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
