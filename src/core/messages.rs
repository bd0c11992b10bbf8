//! Boundary messages exchanged between a node and the server.
//!
//! These are plain data carriers. Encoding them on the wire (JSON, form
//! fields, ...) is the transport's business; every type derives `serde` so the
//! transport can pick. Binary fields are carried as standard base64.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{DecodeError, ENVELOPE_TAG_SIZE};

/// Node → server: announce a node's identifier and public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// The node's identifier.
    pub node_id: String,
    /// The node's X25519 public key, base64.
    pub public_key: String,
}

/// Server → node: the server's identity, returned once registration succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// The server's identifier.
    pub server_node_id: String,
    /// The server's X25519 public key, base64.
    pub server_public_key: String,
}

/// A protected request from a registered node.
///
/// `tag` is an HMAC over the node id, nonce and payload keyed by the node's
/// shared secret, so possession of the secret is proven without sending it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The claimed node identifier.
    pub node_id: String,
    /// Strictly increasing per-agreement counter.
    pub nonce: u64,
    /// Opaque request body for the possession-proof layer.
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
    /// HMAC-SHA256 tag.
    #[serde(with = "b64_tag")]
    pub tag: [u8; ENVELOPE_TAG_SIZE],
}

/// Encode bytes as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64 into exactly `N` bytes.
pub fn decode_base64_array<const N: usize>(text: &str) -> Result<[u8; N], DecodeError> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
    bytes.as_slice().try_into().map_err(|_| DecodeError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

/// Decode standard base64 of any length.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))
}

mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_base64(&text).map_err(serde::de::Error::custom)
    }
}

mod b64_tag {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::core::ENVELOPE_TAG_SIZE;

    pub fn serialize<S: Serializer>(
        tag: &[u8; ENVELOPE_TAG_SIZE],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(tag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; ENVELOPE_TAG_SIZE], D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_base64_array(&text).map_err(serde::de::Error::custom)
    }
}
