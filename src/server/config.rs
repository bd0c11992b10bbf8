//! Authority configuration.

use std::path::PathBuf;

use crate::core::{DEFAULT_MAX_NODES, PdpError};

/// Environment variable naming the registry snapshot file.
pub const ENV_SNAPSHOT_PATH: &str = "PDP_AUTH_SNAPSHOT_PATH";

/// Environment variable capping the number of tracked nodes.
pub const ENV_MAX_NODES: &str = "PDP_AUTH_MAX_NODES";

/// Server-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// Where the agreement registry is persisted. `None` keeps it in memory only.
    pub snapshot_path: Option<PathBuf>,

    /// Maximum number of nodes the registry tracks.
    pub max_nodes: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl AuthorityConfig {
    /// Read configuration from the process environment.
    ///
    /// - `PDP_AUTH_SNAPSHOT_PATH`: registry snapshot file (optional)
    /// - `PDP_AUTH_MAX_NODES`: node cap (optional, positive integer)
    pub fn from_env() -> Result<Self, PdpError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PdpError> {
        let mut builder = AuthorityConfigBuilder::new();

        if let Some(path) = lookup(ENV_SNAPSHOT_PATH).filter(|p| !p.trim().is_empty()) {
            builder = builder.snapshot_path(path.trim());
        }

        if let Some(raw) = lookup(ENV_MAX_NODES) {
            let max = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    PdpError::Config(format!("{ENV_MAX_NODES} must be a positive integer, got {raw:?}"))
                })?;
            builder = builder.max_nodes(max);
        }

        Ok(builder.build())
    }
}

/// Builder for [`AuthorityConfig`].
#[derive(Debug, Default)]
pub struct AuthorityConfigBuilder {
    config: AuthorityConfig,
}

impl AuthorityConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist the registry at `path`.
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    /// Set the node cap.
    pub fn max_nodes(mut self, max: usize) -> Self {
        self.config.max_nodes = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> AuthorityConfig {
        self.config
    }
}
