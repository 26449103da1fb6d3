//! Canonical encoding for records persisted by the local store.
//!
//! Uses postcard for byte-stable encoding.

use serde::{Deserialize, Serialize};

/// Trait for canonical serialization
pub trait CanonicalEncode: Serialize {
    /// Encode to canonical bytes
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be represented in postcard
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        postcard::to_allocvec(self).map_err(|e| EncodeError::Serialize(e.to_string()))
    }
}

/// Trait for canonical deserialization
pub trait CanonicalDecode<'de>: Deserialize<'de> {
    /// Decode from canonical bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid encoding of `Self`
    fn decode(data: &'de [u8]) -> Result<Self, DecodeError>
    where
        Self: Sized,
    {
        postcard::from_bytes(data).map_err(|_| DecodeError::InvalidEncoding)
    }
}

impl<'de, T: Deserialize<'de>> CanonicalDecode<'de> for T {}

/// Encoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Serializer rejected the value
    #[error("canonical encoding failed: {0}")]
    Serialize(String),
}

/// Decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Invalid encoding
    #[error("invalid canonical encoding")]
    InvalidEncoding,
}
