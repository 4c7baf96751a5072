//! Test harness for the Tessera GPU sub-allocator.
//!
//! Provides deterministic asset fixtures and a headless render context on
//! the host backend, with content snapshots to check that data survives
//! reallocations and relocations byte for byte.

pub mod fixtures;
pub mod harness;

#[cfg(test)]
mod scenarios;

pub use fixtures::{mapped_2d, mapped_3d, ui_batch, unmapped_2d, unmapped_3d};
pub use harness::{ContentSnapshot, HostContext, HostHarness};

use tessera_core::AssetId;
use tessera_memory::Region;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("Allocator error: {0}")]
    Allocator(#[from] tessera_memory::Error),
    #[error("Asset error: {0}")]
    Asset(#[from] tessera_core::Error),
    #[error("Contents of {asset:?} differ at {region:?}")]
    ContentMismatch { asset: AssetId, region: Region },
    #[error("{0:?} is missing from the snapshot")]
    Missing(AssetId),
}

pub type Result<T> = std::result::Result<T, TestError>;
