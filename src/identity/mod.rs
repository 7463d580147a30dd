//! Identities
//!
//! An identity is a P-256 keypair plus the record that keeps it usable:
//! - `id`: identifier derived from the public key ([`derive_identity_id`])
//! - `model`: the stored [`Identity`] record and its public view
//! - `password`: Argon2 verifier gating interactive unlock
//! - `service`: creation, lookup, unlock and public key resolution

pub mod id;
pub mod model;
pub mod password;
pub mod service;

use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::keys::{KeyCodecError, KeyGenerationError, VaultError};
use crate::store::{CacheError, StoreError};
use crate::types::ErrorClass;

pub use id::{derive_identity_id, Address, IdentityId};
pub use model::{CreateIdentityParams, Identity, IdentityStatus, PublicProfile};
pub use password::{hash_password, verify_password};
pub use service::IdentityService;

/// Errors from identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Wrong password for an existing identity.
    #[error("Invalid identity or password")]
    InvalidCredentials,

    #[error("Identity is not active: {0}")]
    Inactive(String),

    /// The address names an identity on another host.
    #[error("Unsupported address: {0}")]
    UnsupportedAddress(String),

    #[error("Password hash error: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Vault(VaultError),

    #[error(transparent)]
    Codec(#[from] KeyCodecError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl From<VaultError> for IdentityError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidCredentials => IdentityError::InvalidCredentials,
            other => IdentityError::Vault(other),
        }
    }
}

impl From<KeyGenerationError> for IdentityError {
    fn from(err: KeyGenerationError) -> Self {
        IdentityError::KeyGeneration(err.to_string())
    }
}

impl IdentityError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IdentityError::InvalidCredentials | IdentityError::Inactive(_) => {
                ErrorClass::Unauthorized
            }
            IdentityError::UnsupportedAddress(_) => ErrorClass::BadRequest,
            IdentityError::Store(StoreError::NotFound(_)) => ErrorClass::NotFound,
            IdentityError::Store(StoreError::InvalidKey(_)) => ErrorClass::BadRequest,
            IdentityError::Codec(KeyCodecError::Decode(_)) => ErrorClass::BadRequest,
            IdentityError::Vault(e) => e.class(),
            IdentityError::Envelope(e) => e.class(),
            IdentityError::KeyGeneration(_)
            | IdentityError::Encoding(_)
            | IdentityError::PasswordHash(_)
            | IdentityError::Store(_)
            | IdentityError::Cache(_)
            | IdentityError::Codec(_) => ErrorClass::Internal,
        }
    }
}
