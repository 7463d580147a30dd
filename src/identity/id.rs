//! Identity identifiers and addresses.
//!
//! An identity id is `base58(SHA-256(x || y))` over the fixed-width public
//! key coordinates. It is derived once at creation and is the only field that
//! ties an identity record to its keypair.

use std::fmt;

use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derived identifier of a local identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this id could have come from [`derive_identity_id`].
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && bs58::decode(&self.0).into_vec().is_ok()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Derive the identity id for a public key.
pub fn derive_identity_id(public_key: &VerifyingKey) -> IdentityId {
    // Uncompressed SEC1: 0x04 || x (32 bytes) || y (32 bytes)
    let point = public_key.to_encoded_point(false);
    let digest = Sha256::digest(&point.as_bytes()[1..]);
    IdentityId(bs58::encode(digest).into_string())
}

/// A possibly remote identity reference: `<id>` or `<id>@<host>`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part, if this address names another server.
    pub fn host(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, host)| host)
    }

    pub fn is_remote(&self) -> bool {
        self.host().is_some()
    }

    /// The identity id for a local address.
    pub fn local_id(&self) -> Option<IdentityId> {
        if self.is_remote() {
            None
        } else {
            Some(IdentityId(self.0.clone()))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IdentityId> for Address {
    fn from(id: IdentityId) -> Self {
        Self(id.0)
    }
}

impl From<&IdentityId> for Address {
    fn from(id: &IdentityId) -> Self {
        Self(id.0.clone())
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}
