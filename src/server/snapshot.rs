//! Durable registry snapshots.
//!
//! The registry is the only state that has to survive a server restart. A
//! snapshot is a versioned JSON document; writes go to a sibling temporary
//! file that is then renamed over the target, so a crash mid-write leaves the
//! previous snapshot intact. The file holds every shared secret, so on unix
//! it is created readable by the owner only, and a failed write removes the
//! temporary file.
//!
//! Restoring re-validates every public key and keeps each agreement's revoked
//! flag exactly as stored.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::registry::{Agreement, AgreementRegistry};
use crate::core::{NodeId, SNAPSHOT_VERSION, SnapshotError};
use crate::crypto::{PublicKey, SharedSecret};

/// On-disk form of an [`AgreementRegistry`].
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Format version, currently [`SNAPSHOT_VERSION`].
    pub version: u32,
    /// Every agreement on record, in registration order.
    pub agreements: Vec<AgreementRecord>,
}

/// One persisted agreement.
#[derive(Serialize, Deserialize)]
pub struct AgreementRecord {
    /// Node id.
    pub node_id: String,
    /// Node public key, base64.
    pub node_public_key: String,
    /// Shared secret, base64.
    pub secret: String,
    /// Registration time, seconds since the Unix epoch.
    pub created_at: u64,
    /// Revocation status.
    pub revoked: bool,
    /// Registration sequence number.
    pub generation: u64,
    /// Highest envelope nonce accepted under this agreement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_nonce: Option<u64>,
}

impl std::fmt::Debug for AgreementRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementRecord")
            .field("node_id", &self.node_id)
            .field("revoked", &self.revoked)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Drop for AgreementRecord {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl RegistrySnapshot {
    /// Capture the current registry contents.
    pub fn capture(registry: &AgreementRegistry) -> Self {
        let agreements = registry
            .export()
            .into_iter()
            .map(|(agreement, highest_nonce)| AgreementRecord {
                node_id: agreement.node_id.to_string(),
                node_public_key: agreement.node_public_key.to_base64(),
                secret: agreement.secret.to_base64(),
                created_at: agreement
                    .created_at
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_secs()),
                revoked: agreement.revoked,
                generation: agreement.generation,
                highest_nonce,
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            agreements,
        }
    }

    /// Rebuild a registry from this snapshot.
    ///
    /// # Errors
    /// `UnsupportedVersion` for unknown versions, `InvalidRecord` for
    /// duplicate node ids, malformed ids, invalid public keys or secrets, or
    /// more records than `max_nodes`.
    pub fn restore(&self, max_nodes: usize) -> Result<AgreementRegistry, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }

        let mut seen = HashSet::with_capacity(self.agreements.len());
        let mut records = Vec::with_capacity(self.agreements.len());

        for record in &self.agreements {
            let node_id = NodeId::parse(&record.node_id)
                .map_err(|_| invalid(&record.node_id, "malformed node id"))?;
            if !seen.insert(node_id.clone()) {
                return Err(invalid(&record.node_id, "duplicate node id"));
            }
            let node_public_key = PublicKey::from_base64(&record.node_public_key)
                .map_err(|_| invalid(&record.node_id, "invalid public key"))?;
            let secret = SharedSecret::from_base64(&record.secret)
                .map_err(|_| invalid(&record.node_id, "invalid secret"))?;

            let agreement = Agreement {
                node_id,
                node_public_key,
                secret,
                created_at: UNIX_EPOCH + Duration::from_secs(record.created_at),
                revoked: record.revoked,
                generation: record.generation,
            };
            records.push((agreement, record.highest_nonce));
        }

        AgreementRegistry::import(records, max_nodes)
            .map_err(|e| SnapshotError::InvalidRecord(e.to_string()))
    }

    /// Write the snapshot to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = Zeroizing::new(serde_json::to_vec_pretty(self)?);
        let tmp = temp_path(path);

        if let Err(err) = write_private(&tmp, &json).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        tracing::debug!(path = %path.display(), agreements = self.agreements.len(), "registry snapshot written");
        Ok(())
    }

    /// Read a snapshot from `path`.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = Zeroizing::new(fs::read(path)?);
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl AgreementRegistry {
    /// Persist the registry to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), SnapshotError> {
        RegistrySnapshot::capture(self).save(path)
    }

    /// Load a registry previously written with [`AgreementRegistry::save_to`].
    pub fn load_from(path: &Path, max_nodes: usize) -> Result<Self, SnapshotError> {
        let registry = RegistrySnapshot::load(path)?.restore(max_nodes)?;
        tracing::debug!(path = %path.display(), agreements = registry.len(), "registry snapshot restored");
        Ok(registry)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Create `path` fresh (owner-only on unix) and write `bytes` to it durably.
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    // A leftover from a crashed write may carry wider permissions
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn invalid(node_id: &str, what: &str) -> SnapshotError {
    SnapshotError::InvalidRecord(format!("{what} (node {node_id})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DEFAULT_MAX_NODES, DenyReason, Envelope, RegistryError};
    use crate::crypto::{Identity, envelope_tag};
    use crate::server::Verifier;

    fn node(id: &str) -> NodeId {
        id.parse().unwrap()
    }

    fn register(registry: &AgreementRegistry, id: &str) -> SharedSecret {
        let node_identity = Identity::generate().unwrap();
        let server = Identity::generate().unwrap();
        let secret = server.derive_secret(node_identity.public_key()).unwrap();
        registry
            .register(node(id), *node_identity.public_key(), secret.clone())
            .unwrap();
        secret
    }

    #[test]
    fn test_save_load_preserves_revocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let registry = AgreementRegistry::new();
        let live = register(&registry, "live");
        let _ = register(&registry, "revoked");
        registry.revoke(&node("revoked")).unwrap();
        registry.save_to(&path).unwrap();

        let restored = AgreementRegistry::load_from(&path, DEFAULT_MAX_NODES).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.active_count(), 1);
        assert_eq!(restored.lookup(&node("live")).unwrap(), live);
        assert_eq!(restored.lookup(&node("revoked")), Err(RegistryError::NotFound));
        assert!(restored.agreement_info(&node("revoked")).unwrap().revoked);

        let original = registry.agreement_info(&node("live")).unwrap();
        let reloaded = restored.agreement_info(&node("live")).unwrap();
        assert_eq!(original.node_public_key, reloaded.node_public_key);
        assert_eq!(original.generation, reloaded.generation);
        assert_eq!(
            original.created_at.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            reloaded.created_at.duration_since(UNIX_EPOCH).unwrap().as_secs()
        );

        // No temporary file left behind
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_restored_registry_still_rejects_duplicates() {
        let registry = AgreementRegistry::new();
        let _ = register(&registry, "n1");
        let restored = RegistrySnapshot::capture(&registry)
            .restore(DEFAULT_MAX_NODES)
            .unwrap();

        let intruder = Identity::generate().unwrap();
        let fake = SharedSecret::from_bytes([9u8; 32]);
        assert_eq!(
            restored.register(node("n1"), *intruder.public_key(), fake),
            Err(RegistryError::AlreadyRegistered(node("n1")))
        );
    }

    #[test]
    fn test_restored_registry_rejects_old_nonces() {
        let registry = AgreementRegistry::new();
        let secret = register(&registry, "n1");

        let envelope = |nonce: u64| Envelope {
            node_id: "n1".into(),
            nonce,
            payload: b"p".to_vec(),
            tag: envelope_tag(&secret, "n1", nonce, b"p").unwrap(),
        };
        for nonce in [0, 1, 5] {
            assert!(Verifier::new(&registry).authorize_envelope(&envelope(nonce)).is_admit());
        }

        let restored = RegistrySnapshot::capture(&registry)
            .restore(DEFAULT_MAX_NODES)
            .unwrap();
        let verifier = Verifier::new(&restored);
        // Nonce 3 was never used, but everything up to the highest is refused
        for nonce in [1, 3, 5] {
            assert_eq!(
                verifier.authorize_envelope(&envelope(nonce)),
                crate::server::AuthorizationDecision::Deny(DenyReason::Replayed)
            );
        }
        assert!(verifier.authorize_envelope(&envelope(6)).is_admit());
    }

    #[test]
    fn test_restore_rejects_bad_snapshots() {
        let registry = AgreementRegistry::new();
        let _ = register(&registry, "n1");
        let _ = register(&registry, "n2");

        let mut snapshot = RegistrySnapshot::capture(&registry);
        snapshot.version = 99;
        assert!(matches!(
            snapshot.restore(DEFAULT_MAX_NODES),
            Err(SnapshotError::UnsupportedVersion(99))
        ));

        let mut snapshot = RegistrySnapshot::capture(&registry);
        snapshot.agreements[1].node_id = snapshot.agreements[0].node_id.clone();
        assert!(matches!(
            snapshot.restore(DEFAULT_MAX_NODES),
            Err(SnapshotError::InvalidRecord(msg)) if msg.contains("duplicate")
        ));

        let mut snapshot = RegistrySnapshot::capture(&registry);
        snapshot.agreements[0].node_public_key = crate::core::encode_base64(&[0u8; 32]);
        assert!(matches!(
            snapshot.restore(DEFAULT_MAX_NODES),
            Err(SnapshotError::InvalidRecord(msg)) if msg.contains("public key")
        ));

        let snapshot = RegistrySnapshot::capture(&registry);
        assert!(matches!(
            snapshot.restore(1),
            Err(SnapshotError::InvalidRecord(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        // Stale temporary file from an earlier crash, world readable
        fs::write(temp_path(&path), b"stale").unwrap();
        fs::set_permissions(temp_path(&path), fs::Permissions::from_mode(0o644)).unwrap();

        let registry = AgreementRegistry::new();
        let secret = register(&registry, "n1");
        registry.save_to(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&secret.to_base64()));
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // Renaming a file over a non-empty directory fails
        let path = dir.path().join("registry.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), b"x").unwrap();

        let registry = AgreementRegistry::new();
        let _ = register(&registry, "n1");
        assert!(matches!(registry.save_to(&path), Err(SnapshotError::Io(_))));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_load_missing_or_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            RegistrySnapshot::load(&missing),
            Err(SnapshotError::Io(_))
        ));

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, b"{ not json").unwrap();
        assert!(matches!(
            RegistrySnapshot::load(&corrupt),
            Err(SnapshotError::Json(_))
        ));
    }

    #[test]
    fn test_record_debug_hides_secret() {
        let registry = AgreementRegistry::new();
        let secret = register(&registry, "n1");
        let snapshot = RegistrySnapshot::capture(&registry);
        let debug = format!("{snapshot:?}");
        assert!(!debug.contains(&secret.to_base64()));
        assert!(debug.contains("n1"));
    }
}
