//! GPU buffer sub-allocation for the Tessera renderer.
//!
//! This crate provides:
//! - Offset bookkeeping for the ASSET, INDICES, UI and uniform sections
//! - The physical buffer traits each graphics backend implements
//! - Buffer reallocation synchronized with in-flight frames
//! - Per-asset uniform regions and descriptor sets
//! - An in-memory host backend for tests and headless runs

pub mod backend;
pub mod buffers;
pub mod config;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod host;
pub mod offsets;
pub mod registry;
pub mod sync;
pub mod uniform;

pub use backend::{
    BufferBackend, BufferRole, BufferWrite, CopyRange, FrameFences, PhysicalBuffer,
};
pub use buffers::{BufferManager, ReallocOutcome, ReallocState};
pub use config::AllocatorConfig;
pub use context::{AssetOffsets, RenderContext};
pub use descriptors::{
    BindingSlot, BindingSource, DescriptorBackend, DescriptorCategory, DescriptorPlanner,
    DescriptorRegistry, PoolReallocBits, ResolvedBinding, SyncReport,
};
pub use error::{Error, Result};
pub use host::{BackendEvent, EventLog, HostBackend, HostDescriptors};
pub use offsets::{
    AssetPlacement, BufferSectionInfo, Layout, OffsetFinder, Region, Section, SectionUsage,
    UiPlacement, VertexPacking,
};
pub use registry::AssetRegistry;
pub use sync::{replace_resource, wait_frames_idle};
pub use uniform::{GlobalUniforms, UniformRegion, UniformRegionManager};
