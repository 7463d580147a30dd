//! Identity storage and public key caching
//!
//! The core only needs a key-value view of identity records
//! ([`IdentityStore`]) and a memo of resolved public keys
//! ([`PublicKeyCache`]). Both are injected into the identity service as
//! trait objects so backends can be swapped (in-memory for tests and dev,
//! one JSON document per identity on disk for the CLI).

pub mod cache;
pub mod directory;
pub mod memory;

use thiserror::Error;

use crate::identity::{Identity, IdentityId};

pub use cache::{
    spawn_cleanup_task, CacheError, CacheStatsSnapshot, MemoryPublicKeyCache, PublicKeyCache,
    PublicKeyCacheConfig,
};
pub use directory::DirectoryIdentityStore;
pub use memory::MemoryIdentityStore;

/// Errors from an identity store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Identity not found: {0}")]
    NotFound(String),

    /// The identifier cannot be used as a storage key.
    #[error("Invalid identity key: {0}")]
    InvalidKey(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Persistent identity records, one per identifier.
///
/// Each call is independent and fail-fast; retries belong to the backend.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert or replace the record for `identity.id`.
    async fn put(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Fetch a record, failing with [`StoreError::NotFound`] if absent.
    async fn get(&self, id: &IdentityId) -> Result<Identity, StoreError>;
}
