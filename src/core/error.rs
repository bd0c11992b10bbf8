//! Error types for pdp-auth.

use thiserror::Error;

use super::NodeId;

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The entropy source could not produce random bytes.
    #[error("entropy source unavailable: {0}")]
    RngFailure(String),

    /// Public key is malformed, off-curve, or outside the prime-order subgroup.
    #[error("invalid public key point")]
    InvalidPoint,

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Envelope nonce counter exhausted - the node must re-register.
    #[error("envelope nonce counter exhausted")]
    NonceExhausted,
}

/// Errors from the agreement registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An unrevoked agreement already exists for this node.
    #[error("node {0} already has an active agreement")]
    AlreadyRegistered(NodeId),

    /// No active agreement for this node.
    #[error("no active agreement for node")]
    NotFound,

    /// The registry is tracking its maximum number of nodes.
    #[error("registry full ({0} nodes)")]
    CapacityExceeded(usize),
}

/// Why an authorization check denied a request.
///
/// Internal only: callers outside the trust boundary see [`Rejection::NotAuthorized`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No active agreement for the claimed node.
    #[error("unknown node")]
    UnknownNode,

    /// The presented secret or tag does not match the agreement.
    #[error("secret mismatch")]
    SecretMismatch,

    /// The envelope nonce was already used or is below the replay window.
    #[error("replayed envelope")]
    Replayed,
}

/// Errors when loading or writing a registry snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// I/O error.
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot is not valid JSON for the expected shape.
    #[cfg(feature = "server")]
    #[error("snapshot decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported snapshot version.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    /// A record failed validation.
    #[error("invalid snapshot record: {0}")]
    InvalidRecord(String),
}

/// Errors decoding boundary messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Node identifier is empty, too long, or not printable ASCII.
    #[error("malformed node id")]
    MalformedNodeId,

    /// Invalid base64 text.
    #[error("invalid base64: {0}")]
    InvalidEncoding(String),

    /// Decoded value has the wrong length.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Externally visible outcome of a failed request.
///
/// Deliberately coarse: the distinction between an unknown node and a wrong
/// secret, or between the different ways a registration can fail, only
/// appears in logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The request did not pass authorization.
    #[error("not authorized")]
    NotAuthorized,

    /// The request was malformed or could not be accepted.
    #[error("request rejected")]
    RequestRejected,
}

/// Top-level pdp-auth errors.
#[derive(Debug, Error)]
pub enum PdpError {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Decode error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Snapshot error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<DenyReason> for Rejection {
    fn from(_: DenyReason) -> Self {
        Rejection::NotAuthorized
    }
}

impl From<RegistryError> for Rejection {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound => Rejection::NotAuthorized,
            RegistryError::AlreadyRegistered(_) | RegistryError::CapacityExceeded(_) => {
                Rejection::RequestRejected
            }
        }
    }
}

impl From<CryptoError> for Rejection {
    fn from(_: CryptoError) -> Self {
        Rejection::RequestRejected
    }
}

impl From<DecodeError> for Rejection {
    fn from(_: DecodeError) -> Self {
        Rejection::RequestRejected
    }
}

impl From<PdpError> for Rejection {
    fn from(err: PdpError) -> Self {
        match err {
            PdpError::Registry(err) => err.into(),
            _ => Rejection::RequestRejected,
        }
    }
}
