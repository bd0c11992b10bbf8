//! X25519 curve primitives.
//!
//! Keypair generation, public key validation and the raw Diffie-Hellman
//! scalar multiplication. Everything above this module works with the
//! validated [`PublicKey`] type, so an unchecked point can never reach the
//! key agreement engine.

use std::fmt;

use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{
    CryptoError, DecodeError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE, SHARED_POINT_SIZE,
    decode_base64_array, encode_base64,
};

/// An X25519 private scalar.
///
/// Zeroized on drop. Never serialized, and its `Debug` output is redacted.
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    /// Build a private key from raw key material.
    ///
    /// Any 32 bytes are usable: the scalar is clamped into the valid range.
    pub fn from_bytes(mut bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        Self(secret)
    }

    /// The public key `self · base_point`.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(*x25519_dalek::PublicKey::from(&self.0).as_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A validated X25519 public key.
///
/// Only obtainable from [`PrivateKey::public_key`] or through validation in
/// [`PublicKey::from_bytes`], so holding one means the point is canonical, on
/// the curve and in the prime-order subgroup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Validate and wrap a received public key encoding.
    ///
    /// # Errors
    /// `InvalidPoint` if the encoding is the wrong length, non-canonical, not
    /// on Curve25519, of small order, or has a torsion component.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPoint)?;
        validate(&bytes)?;
        Ok(Self(bytes))
    }

    /// Decode and validate a base64 public key.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            decode_base64_array(text).map_err(|_: DecodeError| CryptoError::InvalidPoint)?;
        Self::from_bytes(&bytes)
    }

    /// The canonical 32-byte encoding.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Base64 encoding for the wire.
    pub fn to_base64(&self) -> String {
        encode_base64(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Raw X25519 output. Only the key agreement engine consumes it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedPoint([u8; SHARED_POINT_SIZE]);

impl SharedPoint {
    /// The u-coordinate bytes.
    pub(crate) fn as_bytes(&self) -> &[u8; SHARED_POINT_SIZE] {
        &self.0
    }
}

/// Generate a keypair from the operating system CSPRNG.
///
/// # Errors
/// `RngFailure` if the OS entropy source is unavailable. There is no fallback.
pub fn generate_keypair() -> Result<(PrivateKey, PublicKey), CryptoError> {
    generate_keypair_with(&mut OsRng)
}

/// Generate a keypair from a caller-supplied CSPRNG.
pub fn generate_keypair_with<R>(rng: &mut R) -> Result<(PrivateKey, PublicKey), CryptoError>
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; PRIVATE_KEY_SIZE];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RngFailure(e.to_string()))?;
    let private = PrivateKey::from_bytes(bytes);
    bytes.zeroize();
    let public = private.public_key();
    Ok((private, public))
}

/// Compute `private · public`.
///
/// # Errors
/// `InvalidPoint` if the result is the identity (non-contributory exchange).
pub fn derive_shared_point(
    private: &PrivateKey,
    public: &PublicKey,
) -> Result<SharedPoint, CryptoError> {
    let peer = x25519_dalek::PublicKey::from(public.0);
    let shared = private.0.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPoint);
    }
    Ok(SharedPoint(*shared.as_bytes()))
}

/// Reject anything that is not a canonical prime-order point.
fn validate(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<(), CryptoError> {
    if !is_canonical(bytes) {
        tracing::debug!("rejected public key: non-canonical encoding");
        return Err(CryptoError::InvalidPoint);
    }

    // The birational map fails for u = -1 and for twist points, whose
    // Edwards x-coordinate has no square root.
    let Some(point) = MontgomeryPoint(*bytes).to_edwards(0) else {
        tracing::debug!("rejected public key: not on curve25519");
        return Err(CryptoError::InvalidPoint);
    };

    if point.is_small_order() {
        tracing::debug!("rejected public key: small-order point");
        return Err(CryptoError::InvalidPoint);
    }
    if !point.is_torsion_free() {
        tracing::debug!("rejected public key: mixed-order point");
        return Err(CryptoError::InvalidPoint);
    }
    Ok(())
}

/// Whether `bytes` is the unique little-endian encoding of some u < 2^255 - 19.
fn is_canonical(bytes: &[u8; PUBLIC_KEY_SIZE]) -> bool {
    if bytes[31] & 0x80 != 0 {
        return false;
    }
    let at_least_p =
        bytes[31] == 0x7f && bytes[1..31].iter().all(|&b| b == 0xff) && bytes[0] >= 0xed;
    !at_least_p
}
