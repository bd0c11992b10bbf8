//! The server role.
//!
//! [`Authority`] owns the server identity and the agreement registry and
//! implements the boundary operations a transport handler calls: node
//! registration and authorization of protected requests. It is `Send + Sync`;
//! share it behind an `Arc`.

use super::config::AuthorityConfig;
use super::registry::{AgreementHandle, AgreementRegistry};
use super::verifier::Verifier;
use crate::core::{
    Envelope, NodeId, PdpError, RegistrationRequest, RegistrationResponse, RegistryError,
    Rejection, SHARED_SECRET_SIZE,
};
use crate::crypto::{Identity, PublicKey, SharedSecret};

/// Server-side authorization authority.
#[derive(Debug)]
pub struct Authority {
    identity: Identity,
    registry: AgreementRegistry,
    config: AuthorityConfig,
}

impl Authority {
    /// Create an authority with a freshly generated server identity.
    ///
    /// If `config.snapshot_path` names an existing file, the registry is
    /// restored from it.
    pub fn new(config: AuthorityConfig) -> Result<Self, PdpError> {
        let identity = Identity::generate()?;
        Self::with_identity(identity, config)
    }

    /// Create an authority around an existing server identity.
    pub fn with_identity(identity: Identity, config: AuthorityConfig) -> Result<Self, PdpError> {
        let registry = match &config.snapshot_path {
            Some(path) if path.exists() => AgreementRegistry::load_from(path, config.max_nodes)?,
            _ => AgreementRegistry::with_capacity(config.max_nodes),
        };

        tracing::info!(
            server_node_id = %identity.node_id(),
            agreements = registry.len(),
            persistent = config.snapshot_path.is_some(),
            "authority ready"
        );

        Ok(Self {
            identity,
            registry,
            config,
        })
    }

    /// Handle a node's registration request.
    ///
    /// Validates the node id and public key, derives the shared secret, and
    /// records the agreement. The response carries the server's identity so the
    /// node can derive the same secret.
    pub fn handle_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, Rejection> {
        self.register_node(request)
            .map(|_| self.registration_response())
            .map_err(Rejection::from)
    }

    /// Like [`Authority::handle_registration`], returning the registry handle
    /// and the internal error.
    pub fn register_node(&self, request: &RegistrationRequest) -> Result<AgreementHandle, PdpError> {
        let result = self.try_register(request);
        if let Err(err) = &result {
            tracing::warn!(node_id = %request.node_id, error = %err, "registration rejected");
        }
        result
    }

    fn try_register(&self, request: &RegistrationRequest) -> Result<AgreementHandle, PdpError> {
        let node_id = NodeId::parse(&request.node_id)?;
        let node_public_key = PublicKey::from_base64(&request.public_key)?;
        let secret = self.identity.derive_secret(&node_public_key)?;
        let handle = self.registry.register(node_id, node_public_key, secret)?;
        tracing::info!(node_id = %handle.node_id, generation = handle.generation, "node registered");
        Ok(handle)
    }

    /// The response a node receives after registering.
    pub fn registration_response(&self) -> RegistrationResponse {
        RegistrationResponse {
            server_node_id: self.identity.node_id().to_string(),
            server_public_key: self.identity.public_key().to_base64(),
        }
    }

    /// Authorize a request that presents the shared secret itself, base64.
    pub fn authorize(&self, node_id: &str, claimed_secret: &str) -> Result<(), Rejection> {
        let Ok(node_id) = NodeId::parse(node_id) else {
            return Err(Rejection::NotAuthorized);
        };
        let (claimed, well_formed) = decode_claimed(claimed_secret);
        let decision = self.verifier().authorize(&node_id, &claimed);
        if !well_formed {
            return Err(Rejection::NotAuthorized);
        }
        decision.into_result().map_err(Rejection::from)
    }

    /// Authorize a protected-request envelope.
    pub fn authorize_envelope(&self, envelope: &Envelope) -> Result<(), Rejection> {
        self.verifier()
            .authorize_envelope(envelope)
            .into_result()
            .map_err(Rejection::from)
    }

    /// Revoke a node's agreement. The node may register again afterwards.
    pub fn revoke(&self, node_id: &str) -> Result<(), RegistryError> {
        let node_id = NodeId::parse(node_id).map_err(|_| RegistryError::NotFound)?;
        self.registry.revoke(&node_id)?;
        tracing::info!(node_id = %node_id, "node revoked");
        Ok(())
    }

    /// Write the registry snapshot, if a snapshot path is configured.
    pub fn persist(&self) -> Result<(), PdpError> {
        if let Some(path) = &self.config.snapshot_path {
            self.registry.save_to(path)?;
        }
        Ok(())
    }

    /// A verifier over this authority's registry.
    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(&self.registry)
    }

    /// The agreement registry.
    pub fn registry(&self) -> &AgreementRegistry {
        &self.registry
    }

    /// The server identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The active configuration.
    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }
}

/// Decode a presented secret. An undecodable one becomes a full-length dummy
/// so the verifier comparison runs over the same number of bytes either way.
fn decode_claimed(claimed: &str) -> (SharedSecret, bool) {
    match SharedSecret::from_base64(claimed) {
        Ok(secret) => (secret, true),
        Err(_) => (SharedSecret::from_bytes([0u8; SHARED_SECRET_SIZE]), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CryptoError, DecodeError, encode_base64};
    use crate::server::AuthorityConfigBuilder;

    fn request_for(identity: &Identity) -> RegistrationRequest {
        RegistrationRequest {
            node_id: identity.node_id().to_string(),
            public_key: identity.public_key().to_base64(),
        }
    }

    fn authority() -> Authority {
        Authority::new(AuthorityConfig::default()).unwrap()
    }

    #[test]
    fn test_registration_response_identifies_server() {
        let authority = authority();
        let node = Identity::generate().unwrap();

        let response = authority.handle_registration(&request_for(&node)).unwrap();
        assert_eq!(response.server_node_id, authority.identity().node_id().to_string());
        assert_eq!(
            PublicKey::from_base64(&response.server_public_key).unwrap(),
            *authority.identity().public_key()
        );

        let server_public = PublicKey::from_base64(&response.server_public_key).unwrap();
        let node_secret = node.derive_secret(&server_public).unwrap();
        assert_eq!(authority.authorize(node.node_id().as_str(), &node_secret.to_base64()), Ok(()));
    }

    #[test]
    fn test_registration_rejects_invalid_point() {
        let authority = authority();
        let request = RegistrationRequest {
            node_id: "n1".into(),
            public_key: encode_base64(&[0u8; 32]),
        };
        assert_eq!(authority.handle_registration(&request), Err(Rejection::RequestRejected));
        assert!(matches!(
            authority.register_node(&request),
            Err(PdpError::Crypto(CryptoError::InvalidPoint))
        ));
        assert!(authority.registry().is_empty());
    }

    #[test]
    fn test_registration_rejects_malformed_node_id() {
        let authority = authority();
        let node = Identity::generate().unwrap();
        let mut request = request_for(&node);
        request.node_id = "not a node id".into();
        assert!(matches!(
            authority.register_node(&request),
            Err(PdpError::Decode(DecodeError::MalformedNodeId))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let authority = authority();
        let node = Identity::generate().unwrap();
        authority.handle_registration(&request_for(&node)).unwrap();

        // Same id, different key: an impersonation attempt
        let impostor = Identity::from_private_key(
            node.node_id().clone(),
            crate::crypto::PrivateKey::from_bytes([7u8; 32]),
        );
        assert_eq!(
            authority.handle_registration(&request_for(&impostor)),
            Err(Rejection::RequestRejected)
        );

        authority.revoke(node.node_id().as_str()).unwrap();
        assert!(authority.handle_registration(&request_for(&impostor)).is_ok());
    }

    #[test]
    fn test_authorize_rejections_are_uniform() {
        let authority = authority();
        let node = Identity::generate().unwrap();
        let response = authority.handle_registration(&request_for(&node)).unwrap();
        let server_public = PublicKey::from_base64(&response.server_public_key).unwrap();
        let secret = node.derive_secret(&server_public).unwrap();
        let id = node.node_id().as_str();

        let wrong = encode_base64(&[1u8; 32]);
        assert_eq!(authority.authorize(id, &wrong), Err(Rejection::NotAuthorized));
        assert_eq!(authority.authorize("ghost", &secret.to_base64()), Err(Rejection::NotAuthorized));
        assert_eq!(authority.authorize(id, "!!"), Err(Rejection::NotAuthorized));
        assert_eq!(authority.authorize("bad id", &secret.to_base64()), Err(Rejection::NotAuthorized));
    }

    #[test]
    fn test_malformed_secret_compares_full_length() {
        let short = encode_base64(&[1u8; 5]);
        let long = encode_base64(&[1u8; 64]);
        for bad in ["!!", "", short.as_str(), long.as_str()] {
            let (dummy, well_formed) = decode_claimed(bad);
            assert!(!well_formed);
            assert_eq!(dummy.as_bytes().len(), SHARED_SECRET_SIZE);
        }

        let secret = SharedSecret::from_bytes([3u8; SHARED_SECRET_SIZE]);
        let (decoded, well_formed) = decode_claimed(&secret.to_base64());
        assert!(well_formed);
        assert_eq!(decoded, secret);
    }

    #[test]
    fn test_revoke_unknown() {
        let authority = authority();
        assert_eq!(authority.revoke("ghost"), Err(RegistryError::NotFound));
        assert_eq!(authority.revoke(""), Err(RegistryError::NotFound));
    }

    #[test]
    fn test_capacity_from_config() {
        let config = AuthorityConfigBuilder::new().max_nodes(1).build();
        let authority = Authority::new(config).unwrap();
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert!(authority.handle_registration(&request_for(&a)).is_ok());
        assert_eq!(
            authority.handle_registration(&request_for(&b)),
            Err(Rejection::RequestRejected)
        );
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agreements.json");
        let config = AuthorityConfigBuilder::new().snapshot_path(&path).build();

        let node = Identity::generate().unwrap();
        let server_identity = {
            let authority = Authority::new(config.clone()).unwrap();
            authority.handle_registration(&request_for(&node)).unwrap();
            authority.persist().unwrap();
            *authority.identity().public_key()
        };
        assert!(path.exists());

        let reloaded = Authority::new(config).unwrap();
        assert_eq!(reloaded.registry().len(), 1);
        // Server identity is per process; the registry is what persists
        assert_ne!(*reloaded.identity().public_key(), server_identity);
        assert!(
            reloaded
                .registry()
                .agreement_info(node.node_id())
                .is_some_and(|info| !info.revoked)
        );
    }

    #[test]
    fn test_persist_without_path_is_noop() {
        let authority = authority();
        assert!(authority.persist().is_ok());
    }
}
