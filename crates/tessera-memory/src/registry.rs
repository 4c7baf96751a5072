//! Live assets in registration order.

use crate::error::{Error, Result};
use hashbrown::HashMap;
use tessera_core::{Asset, AssetId};

/// Ordered asset list with id lookup.
///
/// Registration order is the order regions are laid out in.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: Vec<Asset>,
    index: HashMap<AssetId, usize>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `asset`.
    pub fn insert(&mut self, asset: Asset) -> Result<()> {
        let id = asset.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateAsset(id));
        }
        self.index.insert(id, self.assets.len());
        self.assets.push(asset);
        Ok(())
    }

    /// Remove `id`, returning the asset and its former position.
    pub fn remove(&mut self, id: AssetId) -> Result<(usize, Asset)> {
        let position = self.index.remove(&id).ok_or(Error::UnknownAsset(id))?;
        let asset = self.assets.remove(position);
        self.reindex(position);
        Ok((position, asset))
    }

    /// Put a removed asset back at its former position.
    pub fn restore(&mut self, position: usize, asset: Asset) {
        let position = position.min(self.assets.len());
        self.assets.insert(position, asset);
        self.reindex(position);
    }

    fn reindex(&mut self, from: usize) {
        for (i, asset) in self.assets.iter().enumerate().skip(from) {
            self.index.insert(asset.id(), i);
        }
    }

    pub fn get(&self, id: AssetId) -> Result<&Asset> {
        self.index
            .get(&id)
            .map(|&i| &self.assets[i])
            .ok_or(Error::UnknownAsset(id))
    }

    pub fn get_mut(&mut self, id: AssetId) -> Result<&mut Asset> {
        match self.index.get(&id) {
            Some(&i) => Ok(&mut self.assets[i]),
            None => Err(Error::UnknownAsset(id)),
        }
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.index.contains_key(&id)
    }

    /// Assets in registration order.
    pub fn as_slice(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
