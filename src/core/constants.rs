//! Fixed parameters of the pdp-auth agreement scheme.
//!
//! These values are part of the wire and derivation contract between nodes
//! and the server. Changing any of them breaks every existing agreement.

// =============================================================================
// KEY SIZES
// =============================================================================

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of the raw X25519 shared point (u-coordinate).
pub const SHARED_POINT_SIZE: usize = 32;

/// Size of a derived shared secret.
pub const SHARED_SECRET_SIZE: usize = 32;

/// HMAC-SHA256 envelope tag size.
pub const ENVELOPE_TAG_SIZE: usize = 32;

// =============================================================================
// KEY DERIVATION LABELS
// =============================================================================

/// HKDF salt for shared-secret derivation.
pub const AGREEMENT_KDF_SALT: &[u8] = b"pdp-auth v1 agreement salt";

/// HKDF info prefix for shared-secret derivation.
///
/// Both public keys follow in lexicographic order.
pub const AGREEMENT_KDF_INFO: &[u8] = b"pdp-auth v1 shared secret";

/// Domain separation prefix for envelope tags.
pub const ENVELOPE_TAG_LABEL: &[u8] = b"pdp-auth v1 envelope";

// =============================================================================
// NODE IDENTIFIERS
// =============================================================================

/// Maximum accepted length of a node identifier, in bytes.
pub const MAX_NODE_ID_LEN: usize = 128;

// =============================================================================
// ANTI-REPLAY
// =============================================================================

/// Envelope replay window size in nonces.
pub const REPLAY_WINDOW_SIZE: usize = 2048;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Registry snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Default cap on the number of nodes a registry tracks.
pub const DEFAULT_MAX_NODES: usize = 100_000;
