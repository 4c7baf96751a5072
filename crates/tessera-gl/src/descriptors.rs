//! Descriptor sets emulated on GL binding points.
//!
//! GL has no descriptor objects. A set is a table of resolved bindings that
//! [`GlDescriptors::apply`] binds before a draw: uniform bindings go to the
//! indexed `UNIFORM_BUFFER` binding point of the same number and texture
//! bindings to texture unit `TEXTURE0 + binding`.

use crate::backend::{buffer_from_raw, gl_int};
use crate::error::{GlError, Result};
use glow::HasContext as _;
use hashbrown::HashMap;
use tessera_core::TextureId;
use tessera_memory::{DescriptorBackend, DescriptorCategory, ResolvedBinding};

/// GL descriptor set handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlSet(pub u32);

/// Bookkeeping for the sets of one category.
#[derive(Debug)]
pub struct GlPool {
    category: DescriptorCategory,
    capacity: u32,
    sets: Vec<GlSet>,
}

impl GlPool {
    pub fn category(&self) -> DescriptorCategory {
        self.category
    }

    pub fn allocated(&self) -> u32 {
        self.sets.len() as u32
    }
}

/// Descriptor backend for GL.
#[derive(Debug, Default)]
pub struct GlDescriptors {
    textures: HashMap<TextureId, glow::Texture>,
    tables: HashMap<GlSet, Vec<ResolvedBinding>>,
    next_set: u32,
}

impl GlDescriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` resolvable in texture bindings.
    pub fn register_texture(&mut self, id: TextureId, texture: glow::Texture) {
        self.textures.insert(id, texture);
    }

    pub fn unregister_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    /// Bindings last written into `set`.
    pub fn bindings(&self, set: GlSet) -> Option<&[ResolvedBinding]> {
        self.tables.get(&set).map(Vec::as_slice)
    }

    /// Number of live sets across all pools.
    pub fn live_sets(&self) -> usize {
        self.tables.len()
    }

    /// Bind every resource of `set` on the current context.
    pub fn apply(&self, gl: &glow::Context, set: GlSet) -> Result<()> {
        let table = self.tables.get(&set).ok_or(GlError::UnknownSet(set.0))?;
        for binding in table {
            match *binding {
                ResolvedBinding::Uniform {
                    binding,
                    buffer,
                    offset,
                    range,
                } => {
                    let buffer = buffer_from_raw(buffer)?;
                    let (offset, range) = (gl_int(offset)?, gl_int(range)?);
                    unsafe {
                        gl.bind_buffer_range(glow::UNIFORM_BUFFER, binding, Some(buffer), offset, range);
                    }
                }
                ResolvedBinding::Texture { binding, texture } => {
                    let texture = self.texture(texture)?;
                    unsafe {
                        gl.active_texture(glow::TEXTURE0 + binding);
                        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                    }
                }
            }
        }
        Ok(())
    }

    fn texture(&self, id: TextureId) -> Result<glow::Texture> {
        self.textures
            .get(&id)
            .copied()
            .ok_or(GlError::UnknownTexture(id.0))
    }
}

impl DescriptorBackend for GlDescriptors {
    type Pool = GlPool;
    type Set = GlSet;

    fn create_pool(
        &mut self,
        category: DescriptorCategory,
        max_sets: u32,
    ) -> tessera_memory::Result<GlPool> {
        Ok(GlPool {
            category,
            capacity: max_sets,
            sets: Vec::new(),
        })
    }

    fn destroy_pool(&mut self, pool: GlPool) {
        for set in &pool.sets {
            self.tables.remove(set);
        }
    }

    fn allocate_sets(&mut self, pool: &mut GlPool, count: u32) -> tessera_memory::Result<Vec<GlSet>> {
        if pool.allocated() + count > pool.capacity {
            return Err(tessera_memory::Error::DescriptorExhaustion {
                category: pool.category,
                requested: count,
                capacity: pool.capacity,
            });
        }

        let sets: Vec<GlSet> = (0..count)
            .map(|_| {
                self.next_set += 1;
                GlSet(self.next_set)
            })
            .collect();
        for &set in &sets {
            self.tables.insert(set, Vec::new());
        }
        pool.sets.extend_from_slice(&sets);
        Ok(sets)
    }

    fn write_set(&mut self, set: GlSet, bindings: &[ResolvedBinding]) -> tessera_memory::Result<()> {
        for binding in bindings {
            match *binding {
                ResolvedBinding::Uniform { buffer, .. } => {
                    buffer_from_raw(buffer)?;
                }
                ResolvedBinding::Texture { texture, .. } => {
                    self.texture(texture)?;
                }
            }
        }
        let table = self.tables.get_mut(&set).ok_or(GlError::UnknownSet(set.0))?;
        table.clear();
        table.extend_from_slice(bindings);
        Ok(())
    }

    fn free_sets(&mut self, pool: &mut GlPool, sets: &[GlSet]) -> tessera_memory::Result<()> {
        pool.sets.retain(|set| !sets.contains(set));
        for set in sets {
            self.tables.remove(set);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn texture(name: u32) -> glow::Texture {
        glow::NativeTexture(NonZeroU32::new(name).unwrap())
    }

    #[test]
    fn pool_capacity_is_enforced() {
        let mut desc = GlDescriptors::new();
        let mut pool = desc.create_pool(DescriptorCategory::Unmapped3D, 2).unwrap();

        let sets = desc.allocate_sets(&mut pool, 2).unwrap();
        assert_eq!(sets.len(), 2);
        assert_ne!(sets[0], sets[1]);

        let err = desc.allocate_sets(&mut pool, 1).unwrap_err();
        assert!(matches!(
            err,
            tessera_memory::Error::DescriptorExhaustion { capacity: 2, .. }
        ));

        desc.free_sets(&mut pool, &sets[..1]).unwrap();
        assert_eq!(pool.allocated(), 1);
        assert!(desc.allocate_sets(&mut pool, 1).is_ok());
    }

    #[test]
    fn written_bindings_are_kept_per_set() {
        let mut desc = GlDescriptors::new();
        desc.register_texture(TextureId(4), texture(11));
        let mut pool = desc.create_pool(DescriptorCategory::Mapped2D, 1).unwrap();
        let set = desc.allocate_sets(&mut pool, 1).unwrap()[0];

        let bindings = [
            ResolvedBinding::Uniform {
                binding: 0,
                buffer: 3,
                offset: 256,
                range: 32,
            },
            ResolvedBinding::Texture {
                binding: 2,
                texture: TextureId(4),
            },
        ];
        desc.write_set(set, &bindings).unwrap();
        assert_eq!(desc.bindings(set), Some(&bindings[..]));
    }

    #[test]
    fn unregistered_textures_are_rejected() {
        let mut desc = GlDescriptors::new();
        let mut pool = desc.create_pool(DescriptorCategory::Ui, 1).unwrap();
        let set = desc.allocate_sets(&mut pool, 1).unwrap()[0];

        let err = desc
            .write_set(
                set,
                &[ResolvedBinding::Texture {
                    binding: 0,
                    texture: TextureId(99),
                }],
            )
            .unwrap_err();
        assert!(matches!(err, tessera_memory::Error::Backend(_)));
        assert_eq!(desc.bindings(set), Some(&[][..]));
    }

    #[test]
    fn destroying_a_pool_drops_its_sets() {
        let mut desc = GlDescriptors::new();
        let mut pool = desc.create_pool(DescriptorCategory::Unmapped2D, 4).unwrap();
        desc.allocate_sets(&mut pool, 3).unwrap();
        assert_eq!(desc.live_sets(), 3);

        desc.destroy_pool(pool);
        assert_eq!(desc.live_sets(), 0);
    }
}
