//! Identity Service
//!
//! Orchestrates identity creation and lookup over an injected
//! [`IdentityStore`] and [`PublicKeyCache`].
//!
//! # Responsibilities
//!
//! - Generate, seal and persist keypairs at creation
//! - Resolve public keys for envelope verification (cache, then store)
//! - Unlock a private key with the identity's password
//! - Compose envelopes on behalf of an identity

use std::sync::Arc;

use chrono::Utc;
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::envelope::{Envelope, Header, KeyResolver, SignedEnvelope};
use crate::keys::{encode_public, generate_keypair, open, seal};
use crate::store::{
    CacheError, IdentityStore, MemoryPublicKeyCache, PublicKeyCache, PublicKeyCacheConfig,
};
use crate::types::BoxError;

use super::id::{derive_identity_id, Address, IdentityId};
use super::model::{CreateIdentityParams, Identity, IdentityStatus};
use super::password::{hash_password, verify_password};
use super::IdentityError;

/// Identity operations over a store and a public key cache.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    cache: Arc<dyn PublicKeyCache>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn IdentityStore>, cache: Arc<dyn PublicKeyCache>) -> Self {
        Self { store, cache }
    }

    /// Service with an in-process public key cache.
    pub fn with_memory_cache(store: Arc<dyn IdentityStore>, config: PublicKeyCacheConfig) -> Self {
        Self::new(store, Arc::new(MemoryPublicKeyCache::new(config)))
    }

    /// Create and persist a new identity.
    ///
    /// The fresh public key is cached so the first envelopes from this
    /// identity verify without a store round trip.
    pub async fn create(&self, params: &CreateIdentityParams) -> Result<Identity, IdentityError> {
        let (signing_key, verifying_key) = generate_keypair()?;
        let id = derive_identity_id(&verifying_key);

        let sealed = seal(&signing_key, id.as_str(), &params.password)?;
        let public_key = encode_public(&verifying_key, id.as_str())
            .map_err(|e| IdentityError::Encoding(e.to_string()))?;
        let password_hash = hash_password(&params.password)?;

        let identity = Identity {
            id: id.clone(),
            created_at: Utc::now(),
            updated_at: None,
            last_logged_in_at: None,
            login_attempts: 0,
            status: IdentityStatus::Active,
            handle: params.handle.clone(),
            email: params.email.clone(),
            profile: String::new(),
            password_hash,
            private_key: sealed.to_string(),
            public_key,
        };

        self.store.put(&identity).await?;

        if let Err(e) = self.cache.set(&id, verifying_key) {
            warn!(identity_id = %id, error = %e, "Failed to cache public key of new identity");
        }

        info!(identity_id = %id, handle = %identity.handle, "Created identity");
        Ok(identity)
    }

    /// Fetch a stored identity.
    pub async fn fetch(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        Ok(self.store.get(id).await?)
    }

    /// Resolve the public key for an identity.
    ///
    /// A cache miss falls back to the store and repopulates the cache. Any
    /// other cache error is returned as is.
    pub async fn resolve_public_key(&self, id: &IdentityId) -> Result<VerifyingKey, IdentityError> {
        match self.cache.get(id) {
            Ok(key) => return Ok(key),
            Err(CacheError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        debug!(identity_id = %id, "Public key not cached, loading identity");
        let identity = self.store.get(id).await?;
        let key = identity.verifying_key()?;

        // The fetched key is still good if caching it fails
        if let Err(e) = self.cache.set(id, key.clone()) {
            warn!(identity_id = %id, error = %e, "Failed to cache public key");
        }

        Ok(key)
    }

    /// Resolve the public key for an address. Only local addresses resolve.
    pub async fn public_key_for(&self, address: &Address) -> Result<VerifyingKey, IdentityError> {
        let id = address
            .local_id()
            .ok_or_else(|| IdentityError::UnsupportedAddress(address.to_string()))?;
        self.resolve_public_key(&id).await
    }

    /// Unlock an identity's private key with its password.
    ///
    /// Records the attempt on the identity: failures bump `login_attempts`,
    /// a success resets it and stamps `last_logged_in_at`.
    pub async fn unlock(&self, id: &IdentityId, password: &str) -> Result<SigningKey, IdentityError> {
        let mut identity = self.store.get(id).await?;

        if identity.status != IdentityStatus::Active {
            debug!(identity_id = %id, status = %identity.status, "Refused unlock of inactive identity");
            return Err(IdentityError::Inactive(id.to_string()));
        }

        let now = Utc::now();
        if !verify_password(password, &identity.password_hash)? {
            identity.login_attempts = identity.login_attempts.saturating_add(1);
            identity.updated_at = Some(now);
            self.store.put(&identity).await?;

            debug!(
                identity_id = %id,
                login_attempts = identity.login_attempts,
                "Rejected unlock with wrong password"
            );
            return Err(IdentityError::InvalidCredentials);
        }

        let sealed = identity.sealed_private_key()?;
        let signing_key = open(&sealed, id.as_str(), password)?;

        identity.login_attempts = 0;
        identity.last_logged_in_at = Some(now);
        identity.updated_at = Some(now);
        self.store.put(&identity).await?;

        debug!(identity_id = %id, "Unlocked identity");
        Ok(signing_key)
    }

    /// Unlock an identity and sign `payload` as it.
    pub async fn compose<T>(
        &self,
        id: &IdentityId,
        password: &str,
        subtype: &str,
        payload: &T,
    ) -> Result<SignedEnvelope, IdentityError>
    where
        T: Serialize + ?Sized,
    {
        let signing_key = self.unlock(id, password).await?;
        let signed = Envelope::build(payload, &Address::from(id), subtype, &signing_key)?;

        debug!(identity_id = %id, envelope_id = %signed.id, subtype, "Composed envelope");
        Ok(signed)
    }
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl KeyResolver for IdentityService {
    async fn resolve(&self, header: &Header) -> Result<VerifyingKey, BoxError> {
        self.public_key_for(&header.sender())
            .await
            .map_err(|e| Box::new(e) as BoxError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeError;
    use crate::store::{MemoryIdentityStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn params(password: &str) -> CreateIdentityParams {
        CreateIdentityParams {
            handle: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: password.to_string(),
        }
    }

    fn service() -> (IdentityService, Arc<MemoryIdentityStore>, Arc<MemoryPublicKeyCache>) {
        let store = Arc::new(MemoryIdentityStore::new());
        let cache = Arc::new(MemoryPublicKeyCache::with_defaults());
        let service = IdentityService::new(store.clone(), cache.clone());
        (service, store, cache)
    }

    /// Cache whose lookups always fail with a backend error.
    struct BrokenCache;

    impl PublicKeyCache for BrokenCache {
        fn get(&self, _id: &IdentityId) -> Result<VerifyingKey, CacheError> {
            Err(CacheError::Backend("unavailable".into()))
        }

        fn set(&self, _id: &IdentityId, _key: VerifyingKey) -> Result<(), CacheError> {
            Err(CacheError::Backend("unavailable".into()))
        }
    }

    /// Cache that never holds anything and refuses writes.
    #[derive(Default)]
    struct ReadOnlyCache {
        sets: AtomicUsize,
    }

    impl PublicKeyCache for ReadOnlyCache {
        fn get(&self, id: &IdentityId) -> Result<VerifyingKey, CacheError> {
            Err(CacheError::NotFound(id.to_string()))
        }

        fn set(&self, _id: &IdentityId, _key: VerifyingKey) -> Result<(), CacheError> {
            self.sets.fetch_add(1, Ordering::Relaxed);
            Err(CacheError::Backend("read only".into()))
        }
    }

    #[tokio::test]
    async fn test_create_persists_and_caches() {
        let (service, store, cache) = service();
        let identity = service.create(&params("pw1")).await.unwrap();

        assert!(identity.id.is_well_formed());
        assert_eq!(identity.status, IdentityStatus::Active);
        assert_ne!(identity.password_hash, "pw1");
        assert_eq!(store.len(), 1);
        assert!(cache.contains(&identity.id));

        // Stored public key derives back to the identifier
        let key = identity.verifying_key().unwrap();
        assert_eq!(derive_identity_id(&key), identity.id);
    }

    #[tokio::test]
    async fn test_resolve_hits_cache_first() {
        let (service, _, cache) = service();
        let identity = service.create(&params("pw1")).await.unwrap();

        let key = service.resolve_public_key(&identity.id).await.unwrap();
        assert_eq!(derive_identity_id(&key), identity.id);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_store() {
        let (service, _, cache) = service();
        let identity = service.create(&params("pw1")).await.unwrap();
        cache.remove(&identity.id);

        let key = service.resolve_public_key(&identity.id).await.unwrap();
        assert_eq!(derive_identity_id(&key), identity.id);
        assert!(cache.contains(&identity.id));
    }

    #[tokio::test]
    async fn test_resolve_returns_key_when_cache_write_fails() {
        let store = Arc::new(MemoryIdentityStore::new());
        let cache = Arc::new(ReadOnlyCache::default());
        let service = IdentityService::new(store, cache.clone());
        let identity = service.create(&params("pw1")).await.unwrap();

        let key = service.resolve_public_key(&identity.id).await.unwrap();
        assert_eq!(derive_identity_id(&key), identity.id);
        assert_eq!(cache.sets.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_resolve_propagates_cache_backend_errors() {
        let store = Arc::new(MemoryIdentityStore::new());
        let service = IdentityService::new(store, Arc::new(BrokenCache));
        let identity = service.create(&params("pw1")).await.unwrap();

        let result = service.resolve_public_key(&identity.id).await;
        assert!(matches!(result, Err(IdentityError::Cache(CacheError::Backend(_)))));
    }

    #[tokio::test]
    async fn test_resolve_unknown_identity() {
        let (service, _, _) = service();
        let result = service
            .resolve_public_key(&IdentityId::from("3GFQNuSg3dPqDD1emxv5bqX42oxq"))
            .await;
        assert!(matches!(result, Err(IdentityError::Store(StoreError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_remote_address_is_unsupported() {
        let (service, _, _) = service();
        let result = service
            .public_key_for(&Address::from("3GFQNuSg3dPqDD1emxv5bqX42oxq@elsewhere.example"))
            .await;
        assert!(matches!(result, Err(IdentityError::UnsupportedAddress(_))));
    }

    #[tokio::test]
    async fn test_unlock() {
        let (service, store, _) = service();
        let identity = service.create(&params("pw1")).await.unwrap();

        let signing_key = service.unlock(&identity.id, "pw1").await.unwrap();
        assert_eq!(derive_identity_id(signing_key.verifying_key()), identity.id);

        let stored = store.get(&identity.id).await.unwrap();
        assert!(stored.last_logged_in_at.is_some());
        assert_eq!(stored.login_attempts, 0);
    }

    #[tokio::test]
    async fn test_unlock_wrong_password() {
        let (service, store, _) = service();
        let identity = service.create(&params("pw1")).await.unwrap();

        for _ in 0..2 {
            let result = service.unlock(&identity.id, "pw1x").await;
            assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
        }
        assert_eq!(store.get(&identity.id).await.unwrap().login_attempts, 2);

        service.unlock(&identity.id, "pw1").await.unwrap();
        assert_eq!(store.get(&identity.id).await.unwrap().login_attempts, 0);
    }

    #[tokio::test]
    async fn test_unlock_inactive_identity() {
        let (service, store, _) = service();
        let mut identity = service.create(&params("pw1")).await.unwrap();
        identity.status = IdentityStatus::Locked;
        store.put(&identity).await.unwrap();

        let result = service.unlock(&identity.id, "pw1").await;
        assert!(matches!(result, Err(IdentityError::Inactive(_))));
    }

    #[tokio::test]
    async fn test_compose_and_verify_with_service() {
        let (service, _, _) = service();
        let identity = service.create(&params("pw1")).await.unwrap();

        let payload = serde_json::json!({ "data": "hello" });
        let signed = service
            .compose(&identity.id, "pw1", "post", &payload)
            .await
            .unwrap();

        let envelope = Envelope::parse_with(&signed.text, &service).await.unwrap();
        assert_eq!(envelope.sender(), &Address::from(&identity.id));
        assert_eq!(envelope.content_type(), "post");
        assert_eq!(envelope.payload_json::<serde_json::Value>().unwrap(), payload);
    }

    #[tokio::test]
    async fn test_resolver_error_for_unknown_sender() {
        let (service, _, _) = service();
        let (signing_key, verifying_key) = generate_keypair().unwrap();
        let sender = Address::from(derive_identity_id(&verifying_key));
        let signed = Envelope::build(&"hi", &sender, "post", &signing_key).unwrap();

        let result = Envelope::parse_with(&signed.text, &service).await;
        assert!(matches!(result, Err(EnvelopeError::KeyResolution(_))));
    }
}
