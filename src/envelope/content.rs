//! Payload dispatch by content type.
//!
//! A [`ContentRegistry`] is built at startup and maps an envelope's content
//! type to a decoder. Dispatch failures are independent of signature
//! verification: an envelope with an unknown content type is still a
//! verified envelope.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::codec::Envelope;

pub const CONTENT_TYPE_POST: &str = "x-propolis-post";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Errors from decoding a payload into a typed value.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    #[error("Invalid {content_type} payload: {reason}")]
    Payload {
        content_type: String,
        reason: String,
    },
}

/// A social post.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub content: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost_of: Option<String>,
}

/// Media referenced by a post.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    #[serde(rename = "URL")]
    pub url: String,

    #[serde(rename = "Signature")]
    pub signature: String,

    #[serde(rename = "ContentType")]
    pub content_type: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Attachment>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Attachment>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payloads understood by [`ContentRegistry::standard`].
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Content {
    Post(Post),
    Json(serde_json::Value),
    Text(String),
}

/// Decoder for one content type.
pub type ContentDecoder<T> = Box<dyn Fn(&[u8]) -> Result<T, ContentError> + Send + Sync>;

/// Content type to decoder mapping.
pub struct ContentRegistry<T = Content> {
    decoders: HashMap<String, ContentDecoder<T>>,
}

impl<T> ContentRegistry<T> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register (or replace) the decoder for a content type.
    pub fn register<F>(&mut self, content_type: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<T, ContentError> + Send + Sync + 'static,
    {
        self.decoders.insert(content_type.into(), Box::new(decoder));
        self
    }

    pub fn with<F>(mut self, content_type: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, ContentError> + Send + Sync + 'static,
    {
        self.register(content_type, decoder);
        self
    }

    pub fn supports(&self, content_type: &str) -> bool {
        self.decoders.contains_key(media_type(content_type))
    }

    /// Decode a verified envelope's payload.
    pub fn decode(&self, envelope: &Envelope) -> Result<T, ContentError> {
        self.decode_bytes(envelope.content_type(), envelope.payload())
    }

    /// Decode raw payload bytes. Parameters after `;` are ignored.
    pub fn decode_bytes(&self, content_type: &str, payload: &[u8]) -> Result<T, ContentError> {
        let decoder = self
            .decoders
            .get(media_type(content_type))
            .ok_or_else(|| ContentError::UnknownContentType(content_type.to_string()))?;
        decoder(payload)
    }
}

impl ContentRegistry<Content> {
    /// Posts, JSON documents and plain text.
    pub fn standard() -> Self {
        Self::new()
            .with(CONTENT_TYPE_POST, |payload| {
                json_payload::<Post>(CONTENT_TYPE_POST, payload).map(Content::Post)
            })
            .with(CONTENT_TYPE_JSON, |payload| {
                json_payload(CONTENT_TYPE_JSON, payload).map(Content::Json)
            })
            .with(CONTENT_TYPE_TEXT, |payload| {
                // JSON-encoded string when built with Envelope::build, raw UTF-8 otherwise
                if let Ok(text) = serde_json::from_slice::<String>(payload) {
                    return Ok(Content::Text(text));
                }
                String::from_utf8(payload.to_vec())
                    .map(Content::Text)
                    .map_err(|e| ContentError::Payload {
                        content_type: CONTENT_TYPE_TEXT.to_string(),
                        reason: e.to_string(),
                    })
            })
    }
}

impl<T> Default for ContentRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ContentRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut content_types: Vec<&String> = self.decoders.keys().collect();
        content_types.sort();
        f.debug_struct("ContentRegistry")
            .field("content_types", &content_types)
            .finish()
    }
}

/// Deserialize a JSON payload, tagging failures with the content type.
pub fn json_payload<T: serde::de::DeserializeOwned>(
    content_type: &str,
    payload: &[u8],
) -> Result<T, ContentError> {
    serde_json::from_slice(payload).map_err(|e| ContentError::Payload {
        content_type: content_type.to_string(),
        reason: e.to_string(),
    })
}

fn media_type(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(media, _)| media)
        .trim()
}
