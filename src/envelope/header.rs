//! Envelope header (segment 0).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Address;
use crate::keys::ALGORITHM_ES256;

use super::EnvelopeError;

/// Base type carried before the `;` in the header type tag.
pub const TYPE_PROPOLIS_MESSAGE: &str = "x-propolis-message";

/// The only envelope version understood.
pub const ENVELOPE_VERSION: &str = "1";

/// Signing context of an envelope.
///
/// Field order is the serialized order: `kid`, `alg`, `typ`, `v`, `ts`.
/// Absent fields decode to empty values and are rejected by [`Header::validate`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Sender identity id
    #[serde(rename = "kid", default)]
    pub key_id: String,

    #[serde(rename = "alg", default)]
    pub algorithm: String,

    /// `x-propolis-message;<subtype>`
    #[serde(rename = "typ", default)]
    pub message_type: String,

    #[serde(rename = "v", default)]
    pub version: String,

    /// Milliseconds since the Unix epoch (UTC)
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
}

impl Header {
    /// Header for a message sent now.
    pub fn new(sender: &Address, subtype: &str) -> Self {
        Self::at(sender, subtype, Utc::now().timestamp_millis())
    }

    /// Header with an explicit timestamp.
    pub fn at(sender: &Address, subtype: &str, timestamp: i64) -> Self {
        Self {
            key_id: sender.as_str().to_string(),
            algorithm: ALGORITHM_ES256.to_string(),
            message_type: format!("{TYPE_PROPOLIS_MESSAGE};{subtype}"),
            version: ENVELOPE_VERSION.to_string(),
            timestamp,
        }
    }

    /// Check algorithm, type and version, returning the content type.
    pub fn validate(&self) -> Result<&str, EnvelopeError> {
        if self.algorithm != ALGORITHM_ES256 {
            return Err(EnvelopeError::UnsupportedAlgorithm(self.algorithm.clone()));
        }

        let content_type = match self.message_type.split_once(';') {
            Some((base, subtype)) if base == TYPE_PROPOLIS_MESSAGE => subtype,
            _ => return Err(EnvelopeError::UnsupportedType(self.message_type.clone())),
        };

        if self.version != ENVELOPE_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(self.version.clone()));
        }

        Ok(content_type)
    }

    pub fn sender(&self) -> Address {
        Address::new(self.key_id.clone())
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}
