//! Envelope construction and verification.

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD as BASE64, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::identity::Address;
use crate::types::BoxError;

use super::header::Header;
use super::EnvelopeError;

/// Raw signature length: 32-byte `r` followed by 32-byte `s`.
pub const SIGNATURE_LEN: usize = 64;

/// URL-safe base64, written unpadded, read with or without padding.
const SEGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Source of verifying keys for envelope senders.
///
/// Implemented by [`crate::identity::IdentityService`]; tests can supply an
/// in-memory fake.
#[async_trait::async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, header: &Header) -> Result<VerifyingKey, BoxError>;
}

/// Output of [`Envelope::build`].
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Wire text: `header.payload.signature`
    pub text: String,

    /// `base58(SHA-256(r || s)).sender`
    pub id: String,
}

/// A verified envelope.
///
/// Only obtainable from [`Envelope::parse`] or [`Envelope::parse_with`], so
/// holding one means its signature checked out against the sender's key.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    id: String,
    header: Header,
    content_type: String,
    #[serde(serialize_with = "serialize_payload")]
    payload: Vec<u8>,
    sender: Address,
    #[serde(skip)]
    raw: String,
}

impl Envelope {
    /// Sign `payload` (serialized as JSON) as `sender`.
    pub fn build<T>(
        payload: &T,
        sender: &Address,
        subtype: &str,
        signing_key: &SigningKey,
    ) -> Result<SignedEnvelope, EnvelopeError>
    where
        T: Serialize + ?Sized,
    {
        let payload_bytes =
            serde_json::to_vec(payload).map_err(|e| EnvelopeError::Encoding(e.to_string()))?;
        if payload_bytes == b"null" {
            return Err(EnvelopeError::MissingPayload);
        }

        Self::build_raw(&payload_bytes, &Header::new(sender, subtype), signing_key)
    }

    /// Sign pre-encoded payload bytes under an explicit header.
    pub fn build_raw(
        payload: &[u8],
        header: &Header,
        signing_key: &SigningKey,
    ) -> Result<SignedEnvelope, EnvelopeError> {
        let header_bytes =
            serde_json::to_vec(header).map_err(|e| EnvelopeError::Encoding(e.to_string()))?;

        let mut text = SEGMENT.encode(header_bytes);
        text.push('.');
        text.push_str(&SEGMENT.encode(payload));

        let digest = Sha256::digest(text.as_bytes());
        let signature: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|e| EnvelopeError::Encoding(format!("signing failed: {e}")))?;

        // Fixed width: r and s are each 32 big-endian bytes
        let signature_bytes = signature.to_bytes();

        text.push('.');
        text.push_str(&SEGMENT.encode(&signature_bytes));

        Ok(SignedEnvelope {
            text,
            id: envelope_id(&signature_bytes, &header.key_id),
        })
    }

    /// Parse and verify an envelope, resolving the sender key synchronously.
    pub fn parse<F, E>(text: &str, resolve: F) -> Result<Envelope, EnvelopeError>
    where
        F: FnOnce(&Header) -> Result<VerifyingKey, E>,
        E: Into<BoxError>,
    {
        let unverified = Unverified::decode(text)?;
        let key = resolve(&unverified.header)
            .map_err(|e| EnvelopeError::KeyResolution(e.into()))?;
        unverified.verify(&key)
    }

    /// Parse and verify an envelope against an async key resolver.
    pub async fn parse_with<R>(text: &str, resolver: &R) -> Result<Envelope, EnvelopeError>
    where
        R: KeyResolver + ?Sized,
    {
        let unverified = Unverified::decode(text)?;
        let key = resolver
            .resolve(&unverified.header)
            .await
            .map_err(EnvelopeError::KeyResolution)?;
        unverified.verify(&key)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Subtype from the header type tag.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Deserialize the payload as JSON.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.header.sent_at()
    }

    /// The wire text this envelope was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Decoded, validated, not yet verified. Never leaves this module.
struct Unverified<'a> {
    text: &'a str,
    segments: [&'a str; 3],
    header: Header,
    content_type: String,
    signature_bytes: Vec<u8>,
    signature: Signature,
}

impl<'a> Unverified<'a> {
    fn decode(text: &'a str) -> Result<Self, EnvelopeError> {
        let parts: Vec<&str> = text.split('.').collect();
        let segments: [&str; 3] = parts.try_into().map_err(|parts: Vec<&str>| {
            EnvelopeError::Malformed(format!("expected 3 segments, got {}", parts.len()))
        })?;

        let header_bytes = SEGMENT
            .decode(segments[0])
            .map_err(|e| EnvelopeError::Malformed(format!("decoding header: {e}")))?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|e| EnvelopeError::Malformed(format!("unmarshalling header: {e}")))?;

        let content_type = header.validate()?.to_string();

        let signature_bytes = SEGMENT
            .decode(segments[2])
            .map_err(|e| EnvelopeError::Malformed(format!("decoding signature: {e}")))?;
        if signature_bytes.len() != SIGNATURE_LEN {
            return Err(EnvelopeError::InvalidSignature);
        }
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| EnvelopeError::InvalidSignature)?;

        Ok(Self {
            text,
            segments,
            header,
            content_type,
            signature_bytes,
            signature,
        })
    }

    fn verify(self, key: &VerifyingKey) -> Result<Envelope, EnvelopeError> {
        // The original encoded text, not a re-encoding
        let signing_input = &self.text[..self.segments[0].len() + 1 + self.segments[1].len()];
        let digest = Sha256::digest(signing_input.as_bytes());

        key.verify_prehash(&digest, &self.signature)
            .map_err(|_| EnvelopeError::InvalidSignature)?;

        let payload = SEGMENT
            .decode(self.segments[1])
            .map_err(|e| EnvelopeError::Malformed(format!("decoding payload: {e}")))?;

        let id = envelope_id(&self.signature_bytes, &self.header.key_id);
        let sender = self.header.sender();

        Ok(Envelope {
            id,
            header: self.header,
            content_type: self.content_type,
            payload,
            sender,
            raw: self.text.to_string(),
        })
    }
}

fn envelope_id(signature: &[u8], sender: &str) -> String {
    let digest = Sha256::digest(signature);
    format!("{}.{}", bs58::encode(digest).into_string(), sender)
}

fn serialize_payload<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(payload))
}
