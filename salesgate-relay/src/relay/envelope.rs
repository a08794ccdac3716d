//! Envelope references and their bus encoding
//!
//! Wire form: `<bucket>:<object as unpadded URL-safe base64>`. Bucket names
//! never contain `:`, and the base64 alphabet is ASCII, so any object name
//! round-trips.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope reference is not ASCII")]
    NotAscii,

    #[error("envelope reference has no ':' separator")]
    MissingSeparator,

    #[error("envelope reference names no bucket")]
    EmptyBucket,

    #[error("envelope reference names no object")]
    EmptyObject,

    #[error("envelope object is not valid base64: {0}")]
    Base64(String),

    #[error("envelope object name is not UTF-8")]
    NotUtf8,
}

/// `{bucket, object}` reference to one container in the object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeRef {
    pub bucket: String,
    pub object: String,
}

impl EnvelopeRef {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// Bus payload for this reference
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!(
            "{}:{}",
            self.bucket,
            URL_SAFE_NO_PAD.encode(self.object.as_bytes())
        ))
    }

    /// Parse a bus payload
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        if !payload.is_ascii() {
            return Err(EnvelopeError::NotAscii);
        }
        // ASCII is valid UTF-8
        let text = std::str::from_utf8(payload).map_err(|_| EnvelopeError::NotAscii)?;
        let (bucket, encoded) = text
            .split_once(':')
            .ok_or(EnvelopeError::MissingSeparator)?;
        if bucket.is_empty() {
            return Err(EnvelopeError::EmptyBucket);
        }

        let object = URL_SAFE_NO_PAD
            .decode(encoded.trim_end())
            .map_err(|e| EnvelopeError::Base64(e.to_string()))?;
        let object = String::from_utf8(object).map_err(|_| EnvelopeError::NotUtf8)?;
        if object.is_empty() {
            return Err(EnvelopeError::EmptyObject);
        }

        Ok(Self::new(bucket, object))
    }
}

impl fmt::Display for EnvelopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form_is_ascii_and_lossless() {
        let envelope = EnvelopeRef::new("inbound", "звіт 2024:01/ü?.bin");
        let payload = envelope.encode();

        assert!(payload.is_ascii());
        assert!(payload.starts_with(b"inbound:"));
        assert_eq!(EnvelopeRef::decode(&payload).unwrap(), envelope);
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(EnvelopeRef::decode(b"inbound"), Err(EnvelopeError::MissingSeparator));
        assert_eq!(EnvelopeRef::decode(b":YQ"), Err(EnvelopeError::EmptyBucket));
        assert_eq!(EnvelopeRef::decode(b"inbound:"), Err(EnvelopeError::EmptyObject));
        assert_eq!(EnvelopeRef::decode("inbound:ü".as_bytes()), Err(EnvelopeError::NotAscii));
        assert!(matches!(
            EnvelopeRef::decode(b"inbound:!!"),
            Err(EnvelopeError::Base64(_))
        ));
        // 0xff 0xfe
        assert_eq!(EnvelopeRef::decode(b"inbound:__4"), Err(EnvelopeError::NotUtf8));
    }

    #[test]
    fn test_display() {
        assert_eq!(EnvelopeRef::new("errors", "x.bin").to_string(), "errors/x.bin");
    }
}
