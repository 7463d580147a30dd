//! Key custody for Propolis identities
//!
//! Every identity owns a P-256 signing keypair:
//! - The public key is stored as a base64-wrapped EC key object ([`codec`])
//! - The private key is sealed under a key derived from the identity id and
//!   the account password (SHA-256 + AES-256-GCM, see [`vault`])
//!
//! Neither the password nor an unencrypted private key is ever persisted.

pub mod codec;
pub mod vault;

pub use codec::{
    decode_private, decode_public, encode_private, encode_public, EcJwk, KeyCodecError,
    COORDINATE_LEN, CURVE_P256,
};
pub use vault::{derive_vault_key, open, seal, SealedPrivateKey, VaultError, NONCE_LEN};

pub use p256::ecdsa::{SigningKey, VerifyingKey};

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Algorithm tag for ECDSA over P-256 with SHA-256.
pub const ALGORITHM_ES256: &str = "ES256";

/// Failure to produce a new keypair.
#[derive(Debug, Error)]
#[error("Key generation failed: {0}")]
pub struct KeyGenerationError(String);

/// Generate a new P-256 signing keypair from the OS random source.
pub fn generate_keypair() -> Result<(SigningKey, VerifyingKey), KeyGenerationError> {
    let mut scalar = Zeroizing::new([0u8; COORDINATE_LEN]);
    OsRng
        .try_fill_bytes(&mut scalar[..])
        .map_err(|e| KeyGenerationError(format!("OS random source: {e}")))?;

    // Zero or above the group order, with probability around 2^-32
    let signing_key = SigningKey::from_slice(&scalar[..])
        .map_err(|_| KeyGenerationError("random scalar out of range".into()))?;
    let verifying_key = signing_key.verifying_key().clone();
    Ok((signing_key, verifying_key))
}
