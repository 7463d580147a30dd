//! Directory-backed identity store.
//!
//! One JSON document per identity: `<root>/<identity id>.json`. Each write
//! goes to its own temporary file and is renamed into place. Writes for the
//! same identity are serialized, so the last `put` wins and a reader never
//! sees a partially written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::identity::{Identity, IdentityId};

use super::{IdentityStore, StoreError};

const RECORD_EXTENSION: &str = "json";

/// Identity store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct DirectoryIdentityStore {
    root: PathBuf,
    /// Per-identity write locks
    writers: Arc<DashMap<IdentityId, Arc<Mutex<()>>>>,
}

impl DirectoryIdentityStore {
    /// Open a store, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            StoreError::Backend(format!("creating {}: {e}", root.display()))
        })?;
        Ok(Self {
            root,
            writers: Arc::new(DashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &IdentityId) -> Result<PathBuf, StoreError> {
        // Base58 ids contain no separators, dots or traversal sequences
        if !id.is_well_formed() {
            return Err(StoreError::InvalidKey(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.{RECORD_EXTENSION}")))
    }

    fn writer(&self, id: &IdentityId) -> Arc<Mutex<()>> {
        self.writers.entry(id.clone()).or_default().clone()
    }
}

#[async_trait::async_trait]
impl IdentityStore for DirectoryIdentityStore {
    async fn put(&self, identity: &Identity) -> Result<(), StoreError> {
        let path = self.record_path(&identity.id)?;
        let json = serde_json::to_vec_pretty(identity)
            .map_err(|e| StoreError::Backend(format!("encoding identity: {e}")))?;

        let writer = self.writer(&identity.id);
        let _guard = writer.lock().await;

        // Unique per write so other processes sharing the directory cannot clobber it
        let tmp = self.root.join(format!(
            "{}.{:016x}.tmp",
            identity.id,
            rand::random::<u64>()
        ));
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Backend(format!("writing {}: {e}", tmp.display())));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Backend(format!("renaming {}: {e}", tmp.display())));
        }

        debug!(identity_id = %identity.id, path = %path.display(), "Stored identity");
        Ok(())
    }

    async fn get(&self, id: &IdentityId) -> Result<Identity, StoreError> {
        let path = self.record_path(id)?;
        let json = match tokio::fs::read(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "reading {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_slice(&json)
            .map_err(|e| StoreError::Backend(format!("decoding {}: {e}", path.display())))
    }
}
