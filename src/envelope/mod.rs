//! Signed message envelopes
//!
//! An envelope is three unpadded URL-safe base64 segments joined by `.`:
//!
//! ```text
//! base64url(header JSON) . base64url(payload) . base64url(r || s)
//! ```
//!
//! The signature is ES256 (ECDSA P-256) over `SHA-256(segment0 "." segment1)`,
//! with `r` and `s` each encoded as exactly 32 big-endian bytes. The envelope
//! id is `base58(SHA-256(r || s)) "." sender`.
//!
//! Building and parsing are the only entry points. Parsing either returns a
//! verified [`Envelope`] or an error; interpreting the payload is a separate
//! step handled by [`ContentRegistry`].

pub mod codec;
pub mod content;
pub mod header;

use thiserror::Error;

use crate::types::{BoxError, ErrorClass};

pub use codec::{Envelope, KeyResolver, SignedEnvelope, SIGNATURE_LEN};
pub use content::{
    Attachment, Content, ContentDecoder, ContentError, ContentRegistry, Post, CONTENT_TYPE_JSON,
    CONTENT_TYPE_POST, CONTENT_TYPE_TEXT,
};
pub use header::{Header, ENVELOPE_VERSION, TYPE_PROPOLIS_MESSAGE};

/// Errors from building or parsing envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Missing payload")]
    MissingPayload,

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Public key resolution failed: {0}")]
    KeyResolution(#[source] BoxError),

    #[error("Envelope encoding failed: {0}")]
    Encoding(String),
}

impl EnvelopeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EnvelopeError::MissingPayload
            | EnvelopeError::Malformed(_)
            | EnvelopeError::UnsupportedAlgorithm(_)
            | EnvelopeError::UnsupportedType(_)
            | EnvelopeError::UnsupportedVersion(_) => ErrorClass::BadRequest,
            EnvelopeError::InvalidSignature | EnvelopeError::KeyResolution(_) => {
                ErrorClass::Unauthorized
            }
            EnvelopeError::Encoding(_) => ErrorClass::Internal,
        }
    }
}
