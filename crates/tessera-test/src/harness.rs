//! Headless render context on the host backend.
//!
//! The harness owns a [`RenderContext`] whose buffers are plain memory, so
//! every byte the allocator placed can be read back and compared.

use hashbrown::HashMap;
use tessera_core::{Asset, AssetId};
use tessera_memory::{
    AllocatorConfig, EventLog, HostBackend, HostDescriptors, Region, RenderContext,
};

use crate::{Result, TestError};

/// Render context on the host backends.
pub type HostContext = RenderContext<HostBackend, HostDescriptors>;

/// Vertex and index bytes of every registered asset at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentSnapshot {
    assets: HashMap<AssetId, AssetContents>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AssetContents {
    vertices: Vec<u8>,
    indices: Vec<u8>,
}

impl ContentSnapshot {
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.contains_key(&id)
    }

    /// Drop an asset, e.g. after removing it from the context.
    pub fn forget(&mut self, id: AssetId) {
        self.assets.remove(&id);
    }
}

/// Headless allocator harness.
pub struct HostHarness {
    context: HostContext,
    log: EventLog,
}

impl HostHarness {
    /// Create a harness with a 256 byte uniform alignment.
    pub fn new(config: AllocatorConfig) -> Result<Self> {
        Self::with_backend(HostBackend::new(), config)
    }

    /// Create a harness on a preconfigured backend.
    pub fn with_backend(backend: HostBackend, config: AllocatorConfig) -> Result<Self> {
        let log = backend.log();
        let descriptors = HostDescriptors::new(log.clone());
        let context = RenderContext::new(backend, descriptors, config)?;
        Ok(Self { context, log })
    }

    pub fn context(&self) -> &HostContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut HostContext {
        &mut self.context
    }

    /// Call log shared by the buffer and descriptor backends.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Register every asset in order.
    pub fn register_all(&mut self, assets: impl IntoIterator<Item = Asset>) -> Result<()> {
        self.context.register_assets(assets)?;
        Ok(())
    }

    /// Number of vertex buffer reallocations so far.
    pub fn reallocations(&self) -> u64 {
        self.context.buffers().reallocations()
    }

    /// Read back the vertex and index bytes of every registered asset.
    pub fn snapshot(&mut self) -> Result<ContentSnapshot> {
        let ids: Vec<AssetId> = self.context.assets().iter().map(Asset::id).collect();
        let mut snapshot = ContentSnapshot::default();
        for id in ids {
            let (vertex, index) = self.regions(id)?;
            let contents = AssetContents {
                vertices: self.context.read_region(vertex)?,
                indices: self.context.read_region(index)?,
            };
            snapshot.assets.insert(id, contents);
        }
        tracing::debug!(assets = snapshot.len(), "content snapshot taken");
        Ok(snapshot)
    }

    /// Check every asset in `snapshot` still holds the same bytes at its
    /// current placement.
    pub fn verify(&mut self, snapshot: &ContentSnapshot) -> Result<()> {
        for (&id, expected) in &snapshot.assets {
            if !self.context.assets().iter().any(|a| a.id() == id) {
                return Err(TestError::Missing(id));
            }
            let (vertex, index) = self.regions(id)?;
            if self.context.read_region(vertex)? != expected.vertices {
                return Err(TestError::ContentMismatch {
                    asset: id,
                    region: vertex,
                });
            }
            if self.context.read_region(index)? != expected.indices {
                return Err(TestError::ContentMismatch {
                    asset: id,
                    region: index,
                });
            }
        }
        Ok(())
    }

    fn regions(&self, id: AssetId) -> Result<(Region, Region)> {
        let placement = self.context.placement(id)?;
        Ok((placement.vertex_region(), placement.index_region()))
    }

    /// Tear the context down and return the backend for leak checks.
    pub fn finish(self) -> Result<HostBackend> {
        let (backend, _) = self.context.destroy()?;
        Ok(backend)
    }
}
