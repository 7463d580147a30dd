//! Password sealing for private keys.
//!
//! # Algorithms
//!
//! - **Key Derivation**: SHA-256 over the raw identity id bytes (base58
//!   decoded) followed by the UTF-8 password. The same password therefore
//!   yields a different vault key for every identity.
//! - **Encryption**: AES-256-GCM, 12-byte random nonce, no associated data.
//!
//! # Wire Format
//!
//! `base64(nonce) + "." + base64(ciphertext)`, standard padded base64.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

use super::codec::{decode_private, encode_private, KeyCodecError};

/// Nonce length for AES-256-GCM (12 bytes)
pub const NONCE_LEN: usize = 12;

/// Vault key length (32 bytes)
pub const VAULT_KEY_LEN: usize = 32;

/// Errors from sealing or opening a private key.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The sealed text or identity id is not in the expected shape.
    #[error("Invalid sealed key format: {0}")]
    Format(String),

    /// Authentication failed: wrong identity id or password.
    #[error("Invalid identity or password")]
    InvalidCredentials,

    #[error("Cipher failure: {0}")]
    Cipher(String),

    #[error(transparent)]
    Key(#[from] KeyCodecError),
}

impl VaultError {
    pub fn class(&self) -> crate::types::ErrorClass {
        use crate::types::ErrorClass;
        match self {
            VaultError::Format(_) => ErrorClass::BadRequest,
            VaultError::InvalidCredentials => ErrorClass::Unauthorized,
            VaultError::Cipher(_) | VaultError::Key(_) => ErrorClass::Internal,
        }
    }
}

/// A private key encrypted under a password-derived vault key.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPrivateKey {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl SealedPrivateKey {
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

impl fmt::Display for SealedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            BASE64.encode(self.nonce),
            BASE64.encode(&self.ciphertext)
        )
    }
}

impl fmt::Debug for SealedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedPrivateKey")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

impl FromStr for SealedPrivateKey {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 {
            return Err(VaultError::Format(format!(
                "expected 2 parts, got {}",
                parts.len()
            )));
        }

        let nonce = BASE64
            .decode(parts[0])
            .map_err(|e| VaultError::Format(format!("invalid nonce encoding: {e}")))?;
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| VaultError::Format("invalid nonce length".into()))?;

        let ciphertext = BASE64
            .decode(parts[1])
            .map_err(|e| VaultError::Format(format!("invalid ciphertext encoding: {e}")))?;

        Ok(Self { nonce, ciphertext })
    }
}

/// Derive the vault key for an identity.
///
/// Fails with [`VaultError::Format`] if the identity id is not base58.
pub fn derive_vault_key(
    identity_id: &str,
    password: &str,
) -> Result<Zeroizing<[u8; VAULT_KEY_LEN]>, VaultError> {
    let raw_id = bs58::decode(identity_id)
        .into_vec()
        .map_err(|e| VaultError::Format(format!("identity id is not base58: {e}")))?;

    let digest = Sha256::new()
        .chain_update(&raw_id)
        .chain_update(password.as_bytes())
        .finalize();

    let mut key = Zeroizing::new([0u8; VAULT_KEY_LEN]);
    key.copy_from_slice(&digest);
    Ok(key)
}

/// Seal a private key for an identity under its password.
pub fn seal(
    private_key: &SigningKey,
    identity_id: &str,
    password: &str,
) -> Result<SealedPrivateKey, VaultError> {
    let plaintext = encode_private(private_key, identity_id)?;
    let vault_key = derive_vault_key(identity_id, password)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| VaultError::Cipher(format!("nonce generation failed: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(vault_key.as_slice()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| VaultError::Cipher(format!("encryption failed: {e}")))?;

    Ok(SealedPrivateKey { nonce, ciphertext })
}

/// Open a sealed private key.
///
/// Any authentication failure, whether from the identity id or the password,
/// is reported as [`VaultError::InvalidCredentials`].
pub fn open(
    sealed: &SealedPrivateKey,
    identity_id: &str,
    password: &str,
) -> Result<SigningKey, VaultError> {
    let vault_key = derive_vault_key(identity_id, password)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(vault_key.as_slice()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| VaultError::InvalidCredentials)?;

    Ok(decode_private(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_identity_id;
    use crate::keys::generate_keypair;

    fn identity() -> (SigningKey, String) {
        let (signing_key, verifying_key) = generate_keypair().unwrap();
        let id = derive_identity_id(&verifying_key);
        (signing_key, id.into_string())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (signing_key, id) = identity();

        let sealed = seal(&signing_key, &id, "pw1").unwrap();
        let opened = open(&sealed, &id, "pw1").unwrap();

        assert_eq!(opened.to_bytes(), signing_key.to_bytes());
        assert_eq!(opened.verifying_key(), signing_key.verifying_key());
    }

    #[test]
    fn test_wire_format_roundtrip() {
        let (signing_key, id) = identity();
        let sealed = seal(&signing_key, &id, "pw1").unwrap();

        let text = sealed.to_string();
        let (nonce, ciphertext) = text.split_once('.').unwrap();
        assert_eq!(BASE64.decode(nonce).unwrap().len(), NONCE_LEN);
        assert!(!ciphertext.is_empty());

        let parsed: SealedPrivateKey = text.parse().unwrap();
        assert_eq!(parsed, sealed);
        assert_eq!(
            open(&parsed, &id, "pw1").unwrap().to_bytes(),
            signing_key.to_bytes()
        );
    }

    #[test]
    fn test_wrong_password_is_invalid_credentials() {
        let (signing_key, id) = identity();
        let sealed = seal(&signing_key, &id, "pw1").unwrap();

        let result = open(&sealed, &id, "pw1x");
        assert!(matches!(result, Err(VaultError::InvalidCredentials)));
    }

    #[test]
    fn test_wrong_identity_is_invalid_credentials() {
        let (signing_key, id) = identity();
        let (_, other_id) = identity();
        let sealed = seal(&signing_key, &id, "pw1").unwrap();

        let result = open(&sealed, &other_id, "pw1");
        assert!(matches!(result, Err(VaultError::InvalidCredentials)));
    }

    #[test]
    fn test_same_password_different_identities() {
        let (_, id_a) = identity();
        let (_, id_b) = identity();

        let key_a = derive_vault_key(&id_a, "shared").unwrap();
        let key_b = derive_vault_key(&id_b, "shared").unwrap();
        assert_ne!(*key_a, *key_b);

        // Deterministic for the same inputs
        let key_a2 = derive_vault_key(&id_a, "shared").unwrap();
        assert_eq!(*key_a, *key_a2);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let (signing_key, id) = identity();
        let first = seal(&signing_key, &id, "pw").unwrap();
        let second = seal(&signing_key, &id, "pw").unwrap();

        assert_ne!(first.nonce(), second.nonce());
        assert_ne!(first.ciphertext(), second.ciphertext());
    }

    #[test]
    fn test_malformed_sealed_text() {
        for text in ["", "onlyonepart", "a.b.c", "!!!.AAAA", "AAAA.!!!"] {
            let result = text.parse::<SealedPrivateKey>();
            assert!(matches!(result, Err(VaultError::Format(_))), "{text:?}");
        }

        // Valid base64 but the nonce is the wrong size
        let short_nonce = format!("{}.{}", BASE64.encode([0u8; 4]), BASE64.encode([0u8; 32]));
        assert!(matches!(
            short_nonce.parse::<SealedPrivateKey>(),
            Err(VaultError::Format(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let (signing_key, id) = identity();
        let mut sealed = seal(&signing_key, &id, "pw").unwrap();
        sealed.ciphertext[0] ^= 0x01;

        assert!(matches!(
            open(&sealed, &id, "pw"),
            Err(VaultError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_non_base58_identity_is_format_error() {
        let (signing_key, _) = identity();
        let result = seal(&signing_key, "not-base58-0OIl", "pw");
        assert!(matches!(result, Err(VaultError::Format(_))));
    }
}
