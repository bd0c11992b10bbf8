//! Agreement registry.
//!
//! Server-side bookkeeping of one shared secret per node. Locking is per node:
//! the outer map lock is held only long enough to find or create a node's
//! slot, and every read or write of an agreement happens under that slot's own
//! lock. Operations on unrelated nodes never wait on each other.
//!
//! Revoked agreements stay on record until the registry is full. A new node
//! arriving at a full registry reclaims a revoked node's slot; only active
//! agreements can make registration fail with `CapacityExceeded`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;

use super::replay::NonceWindow;
use crate::core::{DEFAULT_MAX_NODES, NodeId, RegistryError};
use crate::crypto::{PublicKey, SharedSecret};

/// Server-side record binding a node to its shared secret.
#[derive(Debug, Clone)]
pub struct Agreement {
    /// The node the agreement belongs to.
    pub node_id: NodeId,
    /// The public key the node registered with.
    pub node_public_key: PublicKey,
    /// The derived shared secret.
    pub secret: SharedSecret,
    /// When the agreement was registered.
    pub created_at: SystemTime,
    /// Whether the agreement has been revoked.
    pub revoked: bool,
    /// Registry-wide registration sequence number.
    pub generation: u64,
}

/// Public view of an agreement, without the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementInfo {
    /// Node id.
    pub node_id: NodeId,
    /// Node public key.
    pub node_public_key: PublicKey,
    /// Registration time.
    pub created_at: SystemTime,
    /// Revocation status.
    pub revoked: bool,
    /// Registration sequence number.
    pub generation: u64,
}

/// Returned by a successful [`AgreementRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementHandle {
    /// Node id.
    pub node_id: NodeId,
    /// Registration sequence number, distinct for every registration.
    pub generation: u64,
    /// Registration time.
    pub created_at: SystemTime,
}

/// Per-node state: the agreement plus its envelope nonce window.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub(crate) agreement: Option<Agreement>,
    pub(crate) window: NonceWindow,
    /// Set once the slot has been reclaimed and removed from the map.
    retired: bool,
}

impl Slot {
    /// The agreement if present and not revoked.
    pub(crate) fn active(&self) -> Option<&Agreement> {
        self.agreement.as_ref().filter(|a| !a.revoked)
    }
}

/// Map of node id to established agreement.
///
/// Exclusively owns every [`Agreement`]; nothing outside the registry can
/// mutate one.
#[derive(Debug)]
pub struct AgreementRegistry {
    slots: RwLock<HashMap<NodeId, Arc<RwLock<Slot>>>>,
    next_generation: AtomicU64,
    max_nodes: usize,
}

impl AgreementRegistry {
    /// Create an empty registry with the default node cap.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_NODES)
    }

    /// Create an empty registry tracking at most `max_nodes` nodes.
    pub fn with_capacity(max_nodes: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            max_nodes,
        }
    }

    /// Record a new agreement for `node_id`.
    ///
    /// # Errors
    /// - `AlreadyRegistered` if the node has an unrevoked agreement; the node
    ///   must be revoked first.
    /// - `CapacityExceeded` if the node is new and every slot holds an active
    ///   agreement.
    pub fn register(
        &self,
        node_id: NodeId,
        node_public_key: PublicKey,
        secret: SharedSecret,
    ) -> Result<AgreementHandle, RegistryError> {
        loop {
            let slot = self.slot_or_insert(&node_id)?;
            let mut slot = slot.write();
            // Reclaimed between lookup and lock
            if slot.retired {
                continue;
            }

            if slot.active().is_some() {
                tracing::warn!(node_id = %node_id, "registration refused: active agreement exists");
                return Err(RegistryError::AlreadyRegistered(node_id));
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let created_at = SystemTime::now();
            let superseded = slot.agreement.is_some();

            slot.agreement = Some(Agreement {
                node_id: node_id.clone(),
                node_public_key,
                secret,
                created_at,
                revoked: false,
                generation,
            });
            slot.window = NonceWindow::new();

            tracing::debug!(node_id = %node_id, generation, superseded, "agreement registered");
            return Ok(AgreementHandle {
                node_id,
                generation,
                created_at,
            });
        }
    }

    /// The active secret for `node_id`.
    ///
    /// # Errors
    /// `NotFound` if the node is unknown or its agreement is revoked.
    pub fn lookup(&self, node_id: &NodeId) -> Result<SharedSecret, RegistryError> {
        let slot = self.slot(node_id).ok_or(RegistryError::NotFound)?;
        let slot = slot.read();
        slot.active()
            .map(|a| a.secret.clone())
            .ok_or(RegistryError::NotFound)
    }

    /// Revoke the node's agreement.
    ///
    /// # Errors
    /// `NotFound` if the node is unknown or already revoked.
    pub fn revoke(&self, node_id: &NodeId) -> Result<(), RegistryError> {
        let slot = self.slot(node_id).ok_or(RegistryError::NotFound)?;
        let mut slot = slot.write();
        match slot.agreement.as_mut() {
            Some(agreement) if !agreement.revoked => {
                agreement.revoked = true;
                tracing::debug!(node_id = %node_id, generation = agreement.generation, "agreement revoked");
                Ok(())
            }
            _ => Err(RegistryError::NotFound),
        }
    }

    /// Public details of the node's agreement, revoked or not.
    pub fn agreement_info(&self, node_id: &NodeId) -> Option<AgreementInfo> {
        let slot = self.slot(node_id)?;
        let slot = slot.read();
        slot.agreement.as_ref().map(|a| AgreementInfo {
            node_id: a.node_id.clone(),
            node_public_key: a.node_public_key,
            created_at: a.created_at,
            revoked: a.revoked,
            generation: a.generation,
        })
    }

    /// Number of nodes with an agreement on record, revoked ones included.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.read().agreement.is_some())
            .count()
    }

    /// Whether the registry holds no agreements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of unrevoked agreements.
    pub fn active_count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.read().active().is_some())
            .count()
    }

    /// Run `f` on the node's slot under its write lock.
    ///
    /// Returns `None` if the node has never been seen.
    pub(crate) fn with_slot_mut<R>(
        &self,
        node_id: &NodeId,
        f: impl FnOnce(&mut Slot) -> R,
    ) -> Option<R> {
        let slot = self.slot(node_id)?;
        let mut slot = slot.write();
        Some(f(&mut slot))
    }

    /// Copy out every agreement with its highest accepted nonce.
    pub(crate) fn export(&self) -> Vec<(Agreement, Option<u64>)> {
        let slots: Vec<_> = self.slots.read().values().cloned().collect();
        let mut records: Vec<_> = slots
            .iter()
            .filter_map(|slot| {
                let slot = slot.read();
                let highest = slot.window.highest();
                slot.agreement.clone().map(|a| (a, highest))
            })
            .collect();
        records.sort_by_key(|(a, _)| a.generation);
        records
    }

    /// Build a registry from previously exported agreements.
    ///
    /// The caller guarantees node ids are unique.
    pub(crate) fn import(
        records: Vec<(Agreement, Option<u64>)>,
        max_nodes: usize,
    ) -> Result<Self, RegistryError> {
        if records.len() > max_nodes {
            return Err(RegistryError::CapacityExceeded(max_nodes));
        }

        let next_generation = records
            .iter()
            .map(|(a, _)| a.generation)
            .max()
            .map_or(1, |g| g.saturating_add(1));

        let slots = records
            .into_iter()
            .map(|(agreement, highest)| {
                let window = highest.map_or_else(NonceWindow::new, NonceWindow::resume_after);
                let node_id = agreement.node_id.clone();
                let slot = Slot {
                    agreement: Some(agreement),
                    window,
                    retired: false,
                };
                (node_id, Arc::new(RwLock::new(slot)))
            })
            .collect();

        Ok(Self {
            slots: RwLock::new(slots),
            next_generation: AtomicU64::new(next_generation),
            max_nodes,
        })
    }

    fn slot(&self, node_id: &NodeId) -> Option<Arc<RwLock<Slot>>> {
        self.slots.read().get(node_id).cloned()
    }

    fn slot_or_insert(&self, node_id: &NodeId) -> Result<Arc<RwLock<Slot>>, RegistryError> {
        if let Some(slot) = self.slot(node_id) {
            return Ok(slot);
        }

        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(node_id) {
            return Ok(slot.clone());
        }
        if slots.len() >= self.max_nodes && !Self::reclaim_revoked(&mut slots) {
            tracing::warn!(node_id = %node_id, max_nodes = self.max_nodes, "registry full");
            return Err(RegistryError::CapacityExceeded(self.max_nodes));
        }
        let slot = Arc::new(RwLock::new(Slot::default()));
        slots.insert(node_id.clone(), slot.clone());
        Ok(slot)
    }

    /// Drop the oldest slot without an active agreement. Called with the outer
    /// map lock held; busy slots are skipped rather than waited on.
    fn reclaim_revoked(slots: &mut HashMap<NodeId, Arc<RwLock<Slot>>>) -> bool {
        let victim = slots
            .iter()
            .filter_map(|(node_id, slot)| {
                let slot = slot.try_read()?;
                match &slot.agreement {
                    Some(agreement) if agreement.revoked => {
                        Some((agreement.generation, node_id.clone()))
                    }
                    _ => None,
                }
            })
            .min_by_key(|(generation, _)| *generation)
            .map(|(_, node_id)| node_id);

        let Some(node_id) = victim else {
            return false;
        };
        let Some(slot) = slots.get(&node_id) else {
            return false;
        };
        let Some(mut slot) = slot.try_write() else {
            return false;
        };
        if slot.active().is_some() {
            return false;
        }
        slot.retired = true;
        drop(slot);

        slots.remove(&node_id);
        tracing::debug!(node_id = %node_id, "revoked agreement reclaimed");
        true
    }
}

impl Default for AgreementRegistry {
    fn default() -> Self {
        Self::new()
    }
}
