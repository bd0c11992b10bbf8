//! pdp-auth - Crypto Layer
//!
//! - `curve`: X25519 keypairs, public key validation, raw DH
//! - `agreement`: HKDF shared-secret derivation and envelope tags
//! - `identity`: node id plus keypair

mod agreement;
mod curve;
mod identity;

pub use agreement::*;
pub use curve::*;
pub use identity::*;
