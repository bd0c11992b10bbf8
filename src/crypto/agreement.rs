//! Key agreement engine.
//!
//! Turns an X25519 shared point into a [`SharedSecret`] with HKDF-SHA256, and
//! computes the HMAC tags that protected-request envelopes carry.
//!
//! ```text
//! point  = X25519(private, peer_public)
//! info   = "pdp-auth v1 shared secret" || min(pk_local, pk_peer) || max(pk_local, pk_peer)
//! secret = HKDF-SHA256(salt = "pdp-auth v1 agreement salt", ikm = point, info, 32)
//! ```
//!
//! Ordering the two public keys makes `info` identical on both sides, which
//! keeps `derive_secret(a, B) == derive_secret(b, A)`.

use std::fmt;

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::curve::{PrivateKey, PublicKey, derive_shared_point};
use crate::core::{
    AGREEMENT_KDF_INFO, AGREEMENT_KDF_SALT, CryptoError, DecodeError, ENVELOPE_TAG_LABEL,
    ENVELOPE_TAG_SIZE, PUBLIC_KEY_SIZE, SHARED_SECRET_SIZE, decode_base64_array, encode_base64,
};

type HmacSha256 = Hmac<Sha256>;

/// A derived shared secret.
///
/// Zeroized on drop. Equality is constant time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Wrap raw secret bytes (e.g. restored from a snapshot).
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 secret.
    pub fn from_base64(text: &str) -> Result<Self, DecodeError> {
        let mut bytes: [u8; SHARED_SECRET_SIZE] = decode_base64_array(text)?;
        let secret = Self(bytes);
        bytes.zeroize();
        Ok(secret)
    }

    /// Raw secret bytes.
    ///
    /// # Security
    /// Handle with care - this exposes the secret.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }

    /// Base64 encoding of the secret.
    pub fn to_base64(&self) -> String {
        encode_base64(&self.0)
    }
}

impl ConstantTimeEq for SharedSecret {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0[..].ct_eq(&other.0[..])
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for SharedSecret {}

impl AsRef<[u8]> for SharedSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Derive the shared secret between `private` and `peer_public`.
///
/// # Errors
/// Propagates `InvalidPoint` from the curve layer, and `KeyDerivationFailed`
/// if HKDF rejects the output length.
pub fn derive_secret(
    private: &PrivateKey,
    peer_public: &PublicKey,
) -> Result<SharedSecret, CryptoError> {
    let point = derive_shared_point(private, peer_public)?;

    let local_public = private.public_key();
    let (low, high) = if local_public <= *peer_public {
        (local_public, *peer_public)
    } else {
        (*peer_public, local_public)
    };

    let mut info = Vec::with_capacity(AGREEMENT_KDF_INFO.len() + 2 * PUBLIC_KEY_SIZE);
    info.extend_from_slice(AGREEMENT_KDF_INFO);
    info.extend_from_slice(low.as_bytes());
    info.extend_from_slice(high.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(AGREEMENT_KDF_SALT), point.as_bytes());
    let mut okm = [0u8; SHARED_SECRET_SIZE];
    hk.expand(&info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    let secret = SharedSecret(okm);
    okm.zeroize();
    Ok(secret)
}

/// Validate an encoded peer key, then derive the shared secret.
pub fn derive_secret_from_encoded(
    private: &PrivateKey,
    peer_public: &[u8],
) -> Result<SharedSecret, CryptoError> {
    let peer_public = PublicKey::from_bytes(peer_public)?;
    derive_secret(private, &peer_public)
}

/// HMAC tag binding an envelope's node id, nonce and payload to `secret`.
///
/// ```text
/// HMAC-SHA256(secret, "pdp-auth v1 envelope" || be64(len(node_id)) || node_id || be64(nonce) || payload)
/// ```
pub fn envelope_tag(
    secret: &SharedSecret,
    node_id: &str,
    nonce: u64,
    payload: &[u8],
) -> Result<[u8; ENVELOPE_TAG_SIZE], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    mac.update(ENVELOPE_TAG_LABEL);
    mac.update(&(node_id.len() as u64).to_be_bytes());
    mac.update(node_id.as_bytes());
    mac.update(&nonce.to_be_bytes());
    mac.update(payload);

    let mut tag = [0u8; ENVELOPE_TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}
