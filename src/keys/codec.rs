//! EC key objects (JWK shape) for P-256 keys.
//!
//! Public keys are stored as base64 of the JSON object; private keys are
//! returned as raw JSON bytes so the vault can encrypt them. Coordinates and
//! the private scalar are always the full 32 bytes, never stripped of
//! leading zeros.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine as _,
};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use super::ALGORITHM_ES256;

/// Curve name carried in key objects.
pub const CURVE_P256: &str = "P-256";

/// Size of a P-256 coordinate or scalar in bytes.
pub const COORDINATE_LEN: usize = 32;

const KEY_TYPE_EC: &str = "EC";
const KEY_USE_SIGNING: &str = "sig";

/// Errors from encoding or decoding key objects.
#[derive(Debug, Error)]
pub enum KeyCodecError {
    #[error("Key decode failed: {0}")]
    Decode(String),

    #[error("Key encoding failed: {0}")]
    Encoding(String),
}

/// JSON key object for an EC key.
///
/// `d` is only present for private keys and is wiped on drop.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EcJwk {
    pub kty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    pub crv: String,
    pub x: String,
    pub y: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl Drop for EcJwk {
    fn drop(&mut self) {
        self.d.zeroize();
    }
}

impl EcJwk {
    /// Build the public key object for a verifying key.
    pub fn from_verifying_key(key: &VerifyingKey, key_id: &str) -> Result<Self, KeyCodecError> {
        let point = key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| KeyCodecError::Encoding("public key has no x coordinate".into()))?;
        let y = point
            .y()
            .ok_or_else(|| KeyCodecError::Encoding("public key has no y coordinate".into()))?;

        Ok(Self {
            kty: KEY_TYPE_EC.to_string(),
            kid: Some(key_id.to_string()),
            key_use: Some(KEY_USE_SIGNING.to_string()),
            alg: Some(ALGORITHM_ES256.to_string()),
            crv: CURVE_P256.to_string(),
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
            d: None,
        })
    }

    /// Build the private key object (public coordinates plus scalar).
    pub fn from_signing_key(key: &SigningKey, key_id: &str) -> Result<Self, KeyCodecError> {
        let mut jwk = Self::from_verifying_key(key.verifying_key(), key_id)?;
        let scalar = Zeroizing::new(key.to_bytes().to_vec());
        jwk.d = Some(URL_SAFE_NO_PAD.encode(scalar.as_slice()));
        Ok(jwk)
    }

    /// Reconstruct the public key described by this object.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyCodecError> {
        if self.kty != KEY_TYPE_EC {
            return Err(KeyCodecError::Decode(format!(
                "unsupported key type: {}",
                self.kty
            )));
        }
        if self.crv != CURVE_P256 {
            return Err(KeyCodecError::Decode(format!(
                "unsupported curve: {}",
                self.crv
            )));
        }

        let x = FieldBytes::clone_from_slice(&decode_field(&self.x, "x")?);
        let y = FieldBytes::clone_from_slice(&decode_field(&self.y, "y")?);
        let point = EncodedPoint::from_affine_coordinates(&x, &y, false);

        VerifyingKey::from_encoded_point(&point)
            .map_err(|_| KeyCodecError::Decode("coordinates are not a point on P-256".into()))
    }

    /// Reconstruct the private key described by this object.
    ///
    /// The embedded public coordinates must match the scalar.
    pub fn signing_key(&self) -> Result<SigningKey, KeyCodecError> {
        let embedded = self.verifying_key()?;

        let d = self
            .d
            .as_deref()
            .ok_or_else(|| KeyCodecError::Decode("missing private scalar".into()))?;
        let scalar = Zeroizing::new(decode_field(d, "d")?);

        let signing_key = SigningKey::from_slice(&scalar)
            .map_err(|_| KeyCodecError::Decode("private scalar out of range".into()))?;

        if signing_key.verifying_key() != &embedded {
            return Err(KeyCodecError::Decode(
                "public coordinates do not match private scalar".into(),
            ));
        }

        Ok(signing_key)
    }
}

/// Encode a public key as base64 of its JSON key object.
pub fn encode_public(key: &VerifyingKey, key_id: &str) -> Result<String, KeyCodecError> {
    let jwk = EcJwk::from_verifying_key(key, key_id)?;
    let json = serde_json::to_vec(&jwk).map_err(|e| KeyCodecError::Encoding(e.to_string()))?;
    Ok(BASE64.encode(json))
}

/// Decode a public key produced by [`encode_public`].
pub fn decode_public(encoded: &str) -> Result<VerifyingKey, KeyCodecError> {
    let json = BASE64
        .decode(encoded.trim())
        .map_err(|e| KeyCodecError::Decode(format!("invalid base64: {e}")))?;
    let jwk: EcJwk = serde_json::from_slice(&json)
        .map_err(|e| KeyCodecError::Decode(format!("invalid key object: {e}")))?;
    jwk.verifying_key()
}

/// Encode a private key as raw JSON bytes (to be encrypted by the caller).
pub fn encode_private(key: &SigningKey, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyCodecError> {
    let jwk = EcJwk::from_signing_key(key, key_id)?;
    serde_json::to_vec(&jwk)
        .map(Zeroizing::new)
        .map_err(|e| KeyCodecError::Encoding(e.to_string()))
}

/// Decode a private key produced by [`encode_private`].
pub fn decode_private(json: &[u8]) -> Result<SigningKey, KeyCodecError> {
    let jwk: EcJwk = serde_json::from_slice(json)
        .map_err(|e| KeyCodecError::Decode(format!("invalid key object: {e}")))?;
    jwk.signing_key()
}

fn decode_field(value: &str, name: &str) -> Result<Vec<u8>, KeyCodecError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| KeyCodecError::Decode(format!("invalid {name}: {e}")))?;

    if bytes.len() != COORDINATE_LEN {
        return Err(KeyCodecError::Decode(format!(
            "{name} must be {COORDINATE_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    Ok(bytes)
}
