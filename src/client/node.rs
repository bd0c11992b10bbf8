//! Node-side registration flow.
//!
//! ```text
//! NodeClient ── RegistrationRequest ──▶ Authority
//!            ◀─ RegistrationResponse ──
//! NodeClient::complete_registration ─▶ ServerBinding ─ seal() ─▶ Envelope
//! ```

use crate::core::{CryptoError, Envelope, NodeId, RegistrationRequest, RegistrationResponse};
use crate::crypto::{Identity, PublicKey, SharedSecret, envelope_tag};

/// A node's client-side state.
#[derive(Debug)]
pub struct NodeClient {
    identity: Identity,
}

impl NodeClient {
    /// Create a client with a freshly generated identity.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::new(Identity::generate()?))
    }

    /// Create a client around an existing identity.
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// The node identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The request announcing this node to a server.
    pub fn registration_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            node_id: self.identity.node_id().to_string(),
            public_key: self.identity.public_key().to_base64(),
        }
    }

    /// Validate the server's reply and derive the shared secret.
    ///
    /// # Errors
    /// `InvalidPoint` if the server key fails validation.
    pub fn complete_registration(
        &self,
        response: &RegistrationResponse,
    ) -> Result<ServerBinding, CryptoError> {
        let server_public_key = PublicKey::from_base64(&response.server_public_key)?;
        let secret = self.identity.derive_secret(&server_public_key)?;

        tracing::debug!(
            node_id = %self.identity.node_id(),
            server_node_id = %response.server_node_id,
            "registration completed"
        );

        Ok(ServerBinding {
            node_id: self.identity.node_id().clone(),
            server_node_id: response.server_node_id.clone(),
            server_public_key,
            secret,
            next_nonce: 0,
        })
    }
}

/// An established agreement as seen from the node.
#[derive(Debug)]
pub struct ServerBinding {
    node_id: NodeId,
    server_node_id: String,
    server_public_key: PublicKey,
    secret: SharedSecret,
    next_nonce: u64,
}

impl ServerBinding {
    /// The node this binding belongs to.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The server's node id, as it announced it.
    pub fn server_node_id(&self) -> &str {
        &self.server_node_id
    }

    /// The server's public key.
    pub fn server_public_key(&self) -> &PublicKey {
        &self.server_public_key
    }

    /// The shared secret.
    pub fn secret(&self) -> &SharedSecret {
        &self.secret
    }

    /// Nonce the next sealed envelope will carry.
    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    /// Wrap `payload` in an envelope tagged with the shared secret.
    ///
    /// # Errors
    /// `NonceExhausted` once every nonce has been used; the node must
    /// re-register.
    pub fn seal(&mut self, payload: impl Into<Vec<u8>>) -> Result<Envelope, CryptoError> {
        if self.next_nonce == u64::MAX {
            return Err(CryptoError::NonceExhausted);
        }
        let nonce = self.next_nonce;
        let payload = payload.into();
        let tag = envelope_tag(&self.secret, self.node_id.as_str(), nonce, &payload)?;
        self.next_nonce += 1;

        Ok(Envelope {
            node_id: self.node_id.to_string(),
            nonce,
            payload,
            tag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encode_base64;

    fn server_response(server: &Identity) -> RegistrationResponse {
        RegistrationResponse {
            server_node_id: server.node_id().to_string(),
            server_public_key: server.public_key().to_base64(),
        }
    }

    #[test]
    fn test_registration_request_carries_identity() {
        let client = NodeClient::generate().unwrap();
        let request = client.registration_request();
        assert_eq!(request.node_id, client.identity().node_id().as_str());
        assert_eq!(
            PublicKey::from_base64(&request.public_key).unwrap(),
            *client.identity().public_key()
        );
    }

    #[test]
    fn test_both_sides_agree() {
        let client = NodeClient::generate().unwrap();
        let server = Identity::generate().unwrap();

        let binding = client.complete_registration(&server_response(&server)).unwrap();
        let server_side = server.derive_secret(client.identity().public_key()).unwrap();
        assert_eq!(*binding.secret(), server_side);
        assert_eq!(binding.server_node_id(), server.node_id().as_str());
        assert_eq!(binding.server_public_key(), server.public_key());
    }

    #[test]
    fn test_rejects_invalid_server_key() {
        let client = NodeClient::generate().unwrap();
        for key in [encode_base64(&[0u8; 32]), encode_base64(&[1u8; 5]), "%%%".to_owned()] {
            let response = RegistrationResponse {
                server_node_id: "server".into(),
                server_public_key: key,
            };
            assert_eq!(
                client.complete_registration(&response).unwrap_err(),
                CryptoError::InvalidPoint
            );
        }
    }

    #[test]
    fn test_seal_increments_nonce() {
        let client = NodeClient::generate().unwrap();
        let server = Identity::generate().unwrap();
        let mut binding = client.complete_registration(&server_response(&server)).unwrap();

        let first = binding.seal(b"one".to_vec()).unwrap();
        let second = binding.seal("two").unwrap();
        assert_eq!(first.nonce, 0);
        assert_eq!(second.nonce, 1);
        assert_eq!(binding.next_nonce(), 2);
        assert_eq!(first.node_id, client.identity().node_id().as_str());
        assert_eq!(
            first.tag,
            envelope_tag(binding.secret(), &first.node_id, 0, b"one").unwrap()
        );
    }

    #[test]
    fn test_seal_nonce_exhausted() {
        let client = NodeClient::generate().unwrap();
        let server = Identity::generate().unwrap();
        let mut binding = client.complete_registration(&server_response(&server)).unwrap();
        binding.next_nonce = u64::MAX - 1;

        assert!(binding.seal("last").is_ok());
        assert_eq!(binding.seal("over").unwrap_err(), CryptoError::NonceExhausted);
    }
}
