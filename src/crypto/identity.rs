//! Party identity: a node id plus its X25519 keypair.

use std::fmt;

use super::agreement::{SharedSecret, derive_secret};
use super::curve::{PrivateKey, PublicKey, generate_keypair};
use crate::core::{CryptoError, NodeId};

/// One party's long-lived identity.
///
/// Created once per process at startup and never mutated afterwards. The
/// private key never leaves this value: callers derive secrets through
/// [`Identity::derive_secret`], which lends it to the agreement engine for the
/// duration of one derivation.
pub struct Identity {
    node_id: NodeId,
    private: PrivateKey,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh identity with a random node id.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_id(NodeId::generate())
    }

    /// Generate a fresh keypair for a given node id.
    pub fn generate_with_id(node_id: NodeId) -> Result<Self, CryptoError> {
        let (private, public) = generate_keypair()?;
        Ok(Self {
            node_id,
            private,
            public,
        })
    }

    /// Build an identity from an existing private key.
    pub fn from_private_key(node_id: NodeId, private: PrivateKey) -> Self {
        let public = private.public_key();
        Self {
            node_id,
            private,
            public,
        }
    }

    /// The node id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Derive the shared secret with a peer.
    pub fn derive_secret(&self, peer_public: &PublicKey) -> Result<SharedSecret, CryptoError> {
        derive_secret(&self.private, peer_public)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("node_id", &self.node_id)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
