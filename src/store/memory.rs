//! In-memory identity store.

use dashmap::DashMap;

use crate::identity::{Identity, IdentityId};

use super::{IdentityStore, StoreError};

/// Identity store backed by a concurrent map. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: DashMap<IdentityId, Identity>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait::async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn put(&self, identity: &Identity) -> Result<(), StoreError> {
        self.identities.insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn get(&self, id: &IdentityId) -> Result<Identity, StoreError> {
        self.identities
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
