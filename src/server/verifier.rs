//! Authorization verifier.
//!
//! The trust boundary: every protected request passes through
//! [`Verifier::authorize`] or [`Verifier::authorize_envelope`] before any
//! possession-proof logic runs. Both deny paths do the same work, comparing
//! against a fixed dummy secret when the node is unknown, so the decision
//! leaks nothing through timing about whether a node is registered.

use std::hint::black_box;

use subtle::ConstantTimeEq;

use super::registry::AgreementRegistry;
use crate::core::{DenyReason, Envelope, NodeId, SHARED_SECRET_SIZE};
use crate::crypto::{SharedSecret, envelope_tag};

const AUDIT: &str = "pdp_auth::audit";

/// Result of one authorization check. Valid only for the request that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AuthorizationDecision {
    /// The request may proceed.
    Admit,
    /// The request must be refused.
    Deny(DenyReason),
}

impl AuthorizationDecision {
    /// Whether the request was admitted.
    pub fn is_admit(&self) -> bool {
        matches!(self, AuthorizationDecision::Admit)
    }

    /// Convert into a `Result`, for `?` at the call site.
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            AuthorizationDecision::Admit => Ok(()),
            AuthorizationDecision::Deny(reason) => Err(reason),
        }
    }
}

/// Stateless checker over a borrowed registry.
#[derive(Debug, Clone, Copy)]
pub struct Verifier<'r> {
    registry: &'r AgreementRegistry,
}

impl<'r> Verifier<'r> {
    /// Create a verifier for `registry`.
    pub fn new(registry: &'r AgreementRegistry) -> Self {
        Self { registry }
    }

    /// Check a presented secret against the node's active agreement.
    pub fn authorize(
        &self,
        node_id: &NodeId,
        claimed_secret: impl AsRef<[u8]>,
    ) -> AuthorizationDecision {
        let claimed = claimed_secret.as_ref();

        let decision = match self.registry.lookup(node_id) {
            Ok(secret) => {
                if bool::from(secret.as_bytes()[..].ct_eq(claimed)) {
                    AuthorizationDecision::Admit
                } else {
                    AuthorizationDecision::Deny(DenyReason::SecretMismatch)
                }
            }
            Err(_) => {
                let dummy = [0u8; SHARED_SECRET_SIZE];
                let _ = black_box(dummy[..].ct_eq(claimed));
                AuthorizationDecision::Deny(DenyReason::UnknownNode)
            }
        };

        audit(node_id.as_str(), None, decision);
        decision
    }

    /// Check an envelope's tag and nonce against the node's active agreement.
    ///
    /// On success the nonce is recorded, so the same envelope is refused as
    /// `Replayed` afterwards. The tag check and the nonce update happen under
    /// the node's slot lock.
    pub fn authorize_envelope(&self, envelope: &Envelope) -> AuthorizationDecision {
        let decision = match NodeId::parse(&envelope.node_id) {
            Ok(node_id) => self
                .registry
                .with_slot_mut(&node_id, |slot| {
                    // The MAC runs before any decision so every path costs one tag
                    let tag_ok = tag_matches(&slot.active()?.secret, envelope);
                    let replayed = slot.window.is_replay(envelope.nonce);
                    Some(match (replayed, tag_ok) {
                        (true, _) => AuthorizationDecision::Deny(DenyReason::Replayed),
                        (false, false) => AuthorizationDecision::Deny(DenyReason::SecretMismatch),
                        (false, true) => match slot.window.check_and_update(envelope.nonce) {
                            Ok(()) => AuthorizationDecision::Admit,
                            Err(reason) => AuthorizationDecision::Deny(reason),
                        },
                    })
                })
                .flatten(),
            Err(_) => None,
        };

        let decision = decision.unwrap_or_else(|| {
            let dummy = SharedSecret::from_bytes([0u8; SHARED_SECRET_SIZE]);
            let _ = black_box(tag_matches(&dummy, envelope));
            AuthorizationDecision::Deny(DenyReason::UnknownNode)
        });

        audit(&envelope.node_id, Some(envelope.nonce), decision);
        decision
    }
}

fn tag_matches(secret: &SharedSecret, envelope: &Envelope) -> bool {
    match envelope_tag(secret, &envelope.node_id, envelope.nonce, &envelope.payload) {
        Ok(expected) => expected[..].ct_eq(&envelope.tag[..]).into(),
        Err(_) => false,
    }
}

fn audit(node_id: &str, nonce: Option<u64>, decision: AuthorizationDecision) {
    match decision {
        AuthorizationDecision::Admit => {
            tracing::debug!(target: AUDIT, node_id, ?nonce, "admit");
        }
        AuthorizationDecision::Deny(reason) => {
            tracing::warn!(target: AUDIT, node_id, ?nonce, %reason, "deny");
        }
    }
}
