//! In-memory backend.
//!
//! Buffers are plain byte vectors and every call is appended to a shared
//! [`EventLog`], so ordering against frame waits can be asserted. Used by the
//! tests, the stress tool and headless runs.

use crate::backend::{
    check_copies, check_writes, BufferBackend, BufferRole, BufferWrite, CopyRange, FrameFences,
    PhysicalBuffer,
};
use crate::descriptors::{DescriptorBackend, DescriptorCategory, ResolvedBinding};
use crate::error::{Error, Result};
use crate::offsets::VertexPacking;
use tessera_core::TextureId;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A recorded backend call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    Allocate {
        buffer: u64,
        role: BufferRole,
        size: u64,
    },
    Upload {
        buffer: u64,
        writes: usize,
        bytes: u64,
    },
    Copy {
        src: u64,
        dst: u64,
        ranges: usize,
    },
    WaitFrames,
    Destroy {
        buffer: u64,
    },
    CreatePool {
        category: DescriptorCategory,
        max_sets: u32,
    },
    DestroyPool {
        category: DescriptorCategory,
    },
    AllocateSets {
        category: DescriptorCategory,
        count: u32,
    },
    WriteSet {
        set: u64,
    },
    FreeSets {
        category: DescriptorCategory,
        count: u32,
    },
}

/// Shared, append-only call log.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BackendEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: BackendEvent) {
        self.events.lock().push(event);
    }

    pub fn contains(&self, event: &BackendEvent) -> bool {
        self.events.lock().contains(event)
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&BackendEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Index of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&BackendEvent) -> bool) -> Option<usize> {
        self.events.lock().iter().position(pred)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<BackendEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Handle to a host buffer. The bytes live in the owning [`HostBackend`].
#[derive(Debug, PartialEq, Eq)]
pub struct HostBuffer {
    id: u64,
    role: BufferRole,
    capacity: u64,
}

impl HostBuffer {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn role(&self) -> BufferRole {
        self.role
    }
}

impl PhysicalBuffer for HostBuffer {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn raw_handle(&self) -> u64 {
        self.id
    }
}

/// Byte-vector backend with an event log.
#[derive(Debug)]
pub struct HostBackend {
    memory: HashMap<u64, Vec<u8>>,
    next_id: u64,
    log: EventLog,
    allocation_limit: Option<u64>,
    uniform_alignment: u64,
    packing: VertexPacking,
    stalled: bool,
}

impl HostBackend {
    pub fn new() -> Self {
        Self {
            memory: HashMap::new(),
            next_id: 1,
            log: EventLog::new(),
            allocation_limit: None,
            uniform_alignment: 256,
            packing: VertexPacking::Separate,
            stalled: false,
        }
    }

    /// Set the reported uniform offset alignment.
    pub fn with_uniform_alignment(mut self, alignment: u64) -> Self {
        self.uniform_alignment = alignment;
        self
    }

    /// Set the packing reported as preferred.
    pub fn with_packing(mut self, packing: VertexPacking) -> Self {
        self.packing = packing;
        self
    }

    /// Fail every allocation larger than `limit` bytes.
    pub fn with_allocation_limit(mut self, limit: u64) -> Self {
        self.allocation_limit = Some(limit);
        self
    }

    pub fn set_allocation_limit(&mut self, limit: Option<u64>) {
        self.allocation_limit = limit;
    }

    /// Make frame waits time out, as if the GPU hung.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Handle to the shared call log.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    /// Number of buffers allocated and not yet destroyed.
    pub fn live_buffers(&self) -> usize {
        self.memory.len()
    }

    /// Bytes held by live buffers.
    pub fn live_bytes(&self) -> u64 {
        self.memory.values().map(|m| m.len() as u64).sum()
    }

    fn bytes_mut(&mut self, buffer: &HostBuffer) -> Result<&mut Vec<u8>> {
        self.memory
            .get_mut(&buffer.id)
            .ok_or_else(|| Error::Backend(format!("host buffer {} was destroyed", buffer.id)))
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameFences for HostBackend {
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<()> {
        if self.stalled {
            return Err(Error::FenceTimeout { timeout });
        }
        self.log.push(BackendEvent::WaitFrames);
        Ok(())
    }
}

impl BufferBackend for HostBackend {
    type Buffer = HostBuffer;

    fn allocate(&mut self, role: BufferRole, size: u64, name: &str) -> Result<HostBuffer> {
        if let Some(limit) = self.allocation_limit.filter(|limit| size > *limit) {
            return Err(Error::AllocationFailed {
                role,
                requested: size,
                reason: format!("host allocation limit of {limit} bytes"),
            });
        }
        let len = usize::try_from(size).map_err(|_| Error::AllocationFailed {
            role,
            requested: size,
            reason: "size exceeds address space".to_string(),
        })?;

        let id = self.next_id;
        self.next_id += 1;
        self.memory.insert(id, vec![0; len]);
        self.log.push(BackendEvent::Allocate {
            buffer: id,
            role,
            size,
        });
        tracing::trace!(id, ?role, size, name, "host buffer allocated");

        Ok(HostBuffer {
            id,
            role,
            capacity: size,
        })
    }

    fn upload(&mut self, buffer: &mut HostBuffer, writes: &[BufferWrite<'_>]) -> Result<()> {
        check_writes(buffer, writes)?;
        let memory = self.bytes_mut(buffer)?;
        let mut bytes = 0;
        for write in writes {
            let start = write.offset as usize;
            memory[start..start + write.data.len()].copy_from_slice(write.data);
            bytes += write.data.len() as u64;
        }
        self.log.push(BackendEvent::Upload {
            buffer: buffer.id,
            writes: writes.len(),
            bytes,
        });
        Ok(())
    }

    fn copy_range(
        &mut self,
        src: &HostBuffer,
        dst: &mut HostBuffer,
        ranges: &[CopyRange],
    ) -> Result<()> {
        check_copies(src, dst, ranges)?;
        let source = self
            .memory
            .get(&src.id)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("host buffer {} was destroyed", src.id)))?;
        let target = self.bytes_mut(dst)?;
        for range in ranges {
            let (from, to, len) = (
                range.src_offset as usize,
                range.dst_offset as usize,
                range.size as usize,
            );
            target[to..to + len].copy_from_slice(&source[from..from + len]);
        }
        self.log.push(BackendEvent::Copy {
            src: src.id,
            dst: dst.id,
            ranges: ranges.len(),
        });
        Ok(())
    }

    fn read_back(&mut self, buffer: &HostBuffer, offset: u64, len: u64) -> Result<Vec<u8>> {
        crate::backend::ensure_in_bounds("buffer", offset, len, buffer.capacity)?;
        let memory = self.bytes_mut(buffer)?;
        let start = offset as usize;
        Ok(memory[start..start + len as usize].to_vec())
    }

    fn destroy(&mut self, buffer: HostBuffer) {
        self.memory.remove(&buffer.id);
        self.log.push(BackendEvent::Destroy { buffer: buffer.id });
    }

    fn min_uniform_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    fn preferred_packing(&self) -> VertexPacking {
        self.packing
    }
}

/// Host descriptor pool.
#[derive(Debug)]
pub struct HostPool {
    category: DescriptorCategory,
    capacity: u32,
    allocated: u32,
}

impl HostPool {
    pub const fn category(&self) -> DescriptorCategory {
        self.category
    }

    pub const fn allocated(&self) -> u32 {
        self.allocated
    }
}

/// Host descriptor set handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostSet(pub u64);

/// Descriptor backend that records the bindings written into each set.
#[derive(Debug, Default)]
pub struct HostDescriptors {
    log: EventLog,
    next_set: u64,
    writes: HashMap<HostSet, Vec<ResolvedBinding>>,
    rejected: HashSet<TextureId>,
    pool_limit: Option<u32>,
}

impl HostDescriptors {
    /// Create a descriptor backend sharing `log` with a buffer backend.
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            next_set: 1,
            writes: HashMap::new(),
            rejected: HashSet::new(),
            pool_limit: None,
        }
    }

    /// Fail every write that binds `texture`, as if it were never created.
    pub fn reject_texture(&mut self, texture: TextureId) {
        self.rejected.insert(texture);
    }

    pub fn accept_texture(&mut self, texture: TextureId) {
        self.rejected.remove(&texture);
    }

    /// Fail every pool larger than `limit` sets.
    pub fn set_pool_limit(&mut self, limit: Option<u32>) {
        self.pool_limit = limit;
    }

    /// Bindings last written into `set`.
    pub fn bindings(&self, set: HostSet) -> Option<Vec<ResolvedBinding>> {
        self.writes.get(&set).cloned()
    }
}

impl DescriptorBackend for HostDescriptors {
    type Pool = HostPool;
    type Set = HostSet;

    fn create_pool(&mut self, category: DescriptorCategory, max_sets: u32) -> Result<HostPool> {
        if self.pool_limit.is_some_and(|limit| max_sets > limit) {
            return Err(Error::Backend(format!(
                "{category:?} pool of {max_sets} sets exceeds the host limit"
            )));
        }
        self.log.push(BackendEvent::CreatePool { category, max_sets });
        Ok(HostPool {
            category,
            capacity: max_sets,
            allocated: 0,
        })
    }

    fn destroy_pool(&mut self, pool: HostPool) {
        self.log.push(BackendEvent::DestroyPool {
            category: pool.category,
        });
    }

    fn allocate_sets(&mut self, pool: &mut HostPool, count: u32) -> Result<Vec<HostSet>> {
        if pool.allocated + count > pool.capacity {
            return Err(Error::DescriptorExhaustion {
                category: pool.category,
                requested: count,
                capacity: pool.capacity,
            });
        }
        pool.allocated += count;
        self.log.push(BackendEvent::AllocateSets {
            category: pool.category,
            count,
        });

        let first = self.next_set;
        self.next_set += u64::from(count);
        Ok((first..self.next_set).map(HostSet).collect())
    }

    fn write_set(&mut self, set: HostSet, bindings: &[ResolvedBinding]) -> Result<()> {
        let rejected = bindings.iter().find_map(|binding| match *binding {
            ResolvedBinding::Texture { texture, .. } if self.rejected.contains(&texture) => {
                Some(texture)
            }
            _ => None,
        });
        if let Some(texture) = rejected {
            return Err(Error::Backend(format!("texture {} is not registered", texture.0)));
        }
        self.writes.insert(set, bindings.to_vec());
        self.log.push(BackendEvent::WriteSet { set: set.0 });
        Ok(())
    }

    fn free_sets(&mut self, pool: &mut HostPool, sets: &[HostSet]) -> Result<()> {
        pool.allocated = pool.allocated.saturating_sub(sets.len() as u32);
        for set in sets {
            self.writes.remove(set);
        }
        self.log.push(BackendEvent::FreeSets {
            category: pool.category,
            count: sets.len() as u32,
        });
        Ok(())
    }
}
