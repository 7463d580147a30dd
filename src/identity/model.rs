//! Identity records.

use std::fmt;

use chrono::{DateTime, Utc};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::keys::{decode_public, KeyCodecError, SealedPrivateKey, VaultError};

use super::id::IdentityId;

/// Lifecycle state of an identity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Pending,
    #[default]
    Active,
    Locked,
    Deleted,
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            IdentityStatus::Pending => "pending",
            IdentityStatus::Active => "active",
            IdentityStatus::Locked => "locked",
            IdentityStatus::Deleted => "deleted",
        };
        f.write_str(status)
    }
}

/// Input for creating a new identity.
#[derive(Deserialize, Clone)]
pub struct CreateIdentityParams {
    pub handle: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for CreateIdentityParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateIdentityParams")
            .field("handle", &self.handle)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Identity record as held by the identity store.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Derived from the public key, never changes
    pub id: IdentityId,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_logged_in_at: Option<DateTime<Utc>>,

    /// Failed unlock attempts since the last successful one
    #[serde(default)]
    pub login_attempts: u32,

    #[serde(default)]
    pub status: IdentityStatus,

    pub handle: String,
    pub email: String,

    #[serde(default)]
    pub profile: String,

    /// Argon2 PHC string
    pub password_hash: String,

    /// Sealed private key (`nonce.ciphertext`)
    pub private_key: String,

    /// Base64-wrapped public key object
    pub public_key: String,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// Decode the stored public key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyCodecError> {
        decode_public(&self.public_key)
    }

    /// Parse the stored sealed private key.
    pub fn sealed_private_key(&self) -> Result<SealedPrivateKey, VaultError> {
        self.private_key.parse()
    }

    /// View safe to hand to other identities.
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            status: self.status,
            handle: self.handle.clone(),
            email: self.email.clone(),
            profile: self.profile.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

/// Identity without the password verifier or sealed private key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: IdentityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: IdentityStatus,
    pub handle: String,
    pub email: String,
    pub profile: String,
    pub public_key: String,
}
