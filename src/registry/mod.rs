use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type AssetId = u64;
pub type HolderId = String;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("asset {id} already exists")]
    AssetAlreadyExists { id: AssetId },
    #[error("unknown asset {id}")]
    UnknownAsset { id: AssetId },
    #[error("{holder} does not hold asset {id}")]
    NotOwner { id: AssetId, holder: HolderId },
}

/// Ownership ledger the gallery sells against. Ids are unique once minted;
/// no issuance order is assumed beyond that.
pub trait AssetLedger {
    fn mint(&mut self, holder: &HolderId, id: AssetId) -> Result<(), RegistryError>;
    fn transfer(&mut self, from: &HolderId, to: &HolderId, id: AssetId)
        -> Result<(), RegistryError>;
    fn owner_of(&self, id: AssetId) -> Result<HolderId, RegistryError>;
    fn balance_of(&self, holder: &HolderId) -> u64;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenRegistry {
    holders: BTreeMap<AssetId, HolderId>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holdings(&self) -> &BTreeMap<AssetId, HolderId> {
        &self.holders
    }

    pub fn assets_of(&self, holder: &HolderId) -> Vec<AssetId> {
        self.holders
            .iter()
            .filter(|(_, held_by)| *held_by == holder)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl AssetLedger for TokenRegistry {
    fn mint(&mut self, holder: &HolderId, id: AssetId) -> Result<(), RegistryError> {
        if self.holders.contains_key(&id) {
            return Err(RegistryError::AssetAlreadyExists { id });
        }
        self.holders.insert(id, holder.clone());
        Ok(())
    }

    fn transfer(
        &mut self,
        from: &HolderId,
        to: &HolderId,
        id: AssetId,
    ) -> Result<(), RegistryError> {
        let holder = self
            .holders
            .get_mut(&id)
            .ok_or(RegistryError::UnknownAsset { id })?;
        if *holder != *from {
            return Err(RegistryError::NotOwner {
                id,
                holder: from.clone(),
            });
        }
        *holder = to.clone();
        Ok(())
    }

    fn owner_of(&self, id: AssetId) -> Result<HolderId, RegistryError> {
        self.holders
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownAsset { id })
    }

    fn balance_of(&self, holder: &HolderId) -> u64 {
        self.holders.values().filter(|held_by| *held_by == holder).count() as u64
    }
}
