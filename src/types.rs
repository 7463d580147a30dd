//! Crate-wide error and result types.
//!
//! Each module owns a focused error enum; [`Error`] aggregates them so
//! outer layers (handlers, the CLI) can propagate with `?` and classify a
//! failure once with [`Error::class`].

use thiserror::Error;

use crate::envelope::{ContentError, EnvelopeError};
use crate::identity::IdentityError;
use crate::keys::{KeyCodecError, VaultError};
use crate::store::{CacheError, StoreError};

/// Boxed error used where a capability is supplied by the caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the Propolis core.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    KeyCodec(#[from] KeyCodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a failure for user-facing surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unsupported input
    BadRequest,
    /// Signature or credential failure
    Unauthorized,
    /// Referenced identity does not exist
    NotFound,
    /// Key generation, encoding, or backend failure
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Envelope(e) => e.class(),
            Error::Content(_) => ErrorClass::BadRequest,
            Error::Identity(e) => e.class(),
            Error::Vault(e) => e.class(),
            Error::KeyCodec(KeyCodecError::Decode(_)) => ErrorClass::BadRequest,
            Error::KeyCodec(KeyCodecError::Encoding(_)) => ErrorClass::Internal,
            Error::Store(StoreError::NotFound(_)) => ErrorClass::NotFound,
            Error::Store(StoreError::InvalidKey(_)) => ErrorClass::BadRequest,
            Error::Store(StoreError::Backend(_)) => ErrorClass::Internal,
            Error::Cache(_) => ErrorClass::Internal,
            Error::Config(_) => ErrorClass::Internal,
        }
    }
}
