//! # pdp-auth
//!
//! Node-to-server key agreement and authorization for a provable data
//! possession service.
//!
//! Every node holds an X25519 identity. On registration the node sends its
//! public key; the server validates it, derives a shared secret with
//! HKDF-SHA256 and records the agreement. Later protected requests are
//! admitted only if they prove knowledge of that secret, either by presenting
//! it or by carrying an HMAC-tagged [`Envelope`].
//!
//! ## Feature Flags
//!
//! - `client` (default): node-side registration and envelope sealing
//! - `server` (default): agreement registry, verifier, snapshots, [`server::Authority`]
//!
//! ## Modules
//!
//! - [`core`]: constants, errors, node ids and boundary messages (always included)
//! - [`crypto`]: curve operations, key agreement and identities (always included)
//! - [`client`]: the node role (requires `client` feature)
//! - [`server`]: the server role (requires `server` feature)
//!
//! ## Example
//!
//! ```rust
//! # #[cfg(all(feature = "client", feature = "server"))]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use pdp_auth::prelude::*;
//!
//! let authority = Authority::new(AuthorityConfig::default())?;
//! let node = NodeClient::generate()?;
//!
//! let response = authority.handle_registration(&node.registration_request())?;
//! let mut binding = node.complete_registration(&response)?;
//!
//! let envelope = binding.seal(b"challenge".to_vec())?;
//! authority.authorize_envelope(&envelope)?;
//! # Ok(())
//! # }
//! # #[cfg(not(all(feature = "client", feature = "server")))]
//! # fn main() {}
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Always included
pub mod core;
pub mod crypto;

// Node API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::crypto::*;

    #[cfg(feature = "client")]
    pub use crate::client::*;

    #[cfg(feature = "server")]
    pub use crate::server::*;
}

// Re-export commonly used items at crate root
pub use core::{
    CryptoError, DecodeError, DenyReason, Envelope, NodeId, PdpError, RegistrationRequest,
    RegistrationResponse, RegistryError, Rejection,
};
pub use crypto::{Identity, PrivateKey, PublicKey, SharedSecret, derive_secret};
