//! Devnet bootstrap configuration.
//!
//! All paths the workflow touches are resolved once into a [`DevnetConfig`]
//! and passed down explicitly. Nothing reads `$HOME` or the current
//! directory after this point, so tests can point every phase at a
//! temporary directory.
//!
//! # Example
//!
//! ```rust
//! use devnet_bootstrap::config::DevnetConfig;
//!
//! let config = DevnetConfig::new("/src/penumbra", "/tmp/testnet_data");
//! assert_eq!(config.node_binary, "pd");
//! assert!(config.artifact_path().ends_with("target/release/pd"));
//! ```

use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, Result};
use crate::generate::GenesisParams;

/// Node binary built and used for generation.
pub const DEFAULT_NODE_BINARY: &str = "pd";

/// Network state directory, relative to `$HOME`.
pub const DEFAULT_STATE_DIR: &str = ".penumbra/testnet_data";

/// Node config patched after generation, relative to the state directory.
pub const NODE_CONFIG_PATH: &str = "node0/cometbft/config/config.toml";

/// Process supervisor executable.
pub const DEFAULT_SUPERVISOR: &str = "process-compose";

/// Supervisor config, relative to the workspace.
pub const DEFAULT_SUPERVISOR_CONFIG: &str = "deployments/compose/process-compose.yml";

/// Connection string for the external indexer store.
pub const DEFAULT_INDEXER_DATABASE_URL: &str =
    "postgresql://localhost:5432/penumbra_cometbft?sslmode=disable";

/// Written into the state directory once generation and patching succeed.
pub const COMPLETION_MARKER: &str = ".devnet-bootstrap-complete";

/// Resolved settings for one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevnetConfig {
    /// Cargo workspace containing the node binary.
    pub workspace: PathBuf,
    /// Network state directory.
    pub state_dir: PathBuf,
    /// Name of the node binary (cargo `--bin` target).
    pub node_binary: String,
    /// Supervisor executable.
    pub supervisor: String,
    /// Supervisor config file.
    pub supervisor_config: PathBuf,
    /// Connection string injected into the node config.
    pub indexer_database_url: String,
    /// Reuse an existing build artifact instead of running cargo.
    pub skip_build: bool,
    /// Parameters for network generation.
    pub genesis: GenesisParams,
}

impl DevnetConfig {
    /// Config with all defaults for the given workspace and state directory.
    pub fn new(workspace: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            supervisor_config: workspace.join(DEFAULT_SUPERVISOR_CONFIG),
            workspace,
            state_dir: state_dir.into(),
            node_binary: DEFAULT_NODE_BINARY.to_string(),
            supervisor: DEFAULT_SUPERVISOR.to_string(),
            indexer_database_url: DEFAULT_INDEXER_DATABASE_URL.to_string(),
            skip_build: false,
            genesis: GenesisParams::local_devnet(),
        }
    }

    /// Where cargo leaves the release build of the node binary.
    pub fn artifact_path(&self) -> PathBuf {
        crate::build::release_path(&self.workspace, &self.node_binary)
    }

    /// The node config the indexer patch targets.
    pub fn node_config_path(&self) -> PathBuf {
        self.state_dir.join(NODE_CONFIG_PATH)
    }

    /// Reject settings that would fail confusingly later on.
    pub fn validate(&self) -> Result<()> {
        if self.node_binary.trim().is_empty() {
            return Err(BootstrapError::Config("node binary name is empty".into()));
        }
        if self.node_binary.contains('/') {
            return Err(BootstrapError::Config(format!(
                "node binary must be a cargo bin target name, not a path: {}",
                self.node_binary
            )));
        }
        if self.supervisor.trim().is_empty() {
            return Err(BootstrapError::Config("supervisor executable is empty".into()));
        }
        if self.indexer_database_url.trim().is_empty() {
            return Err(BootstrapError::Config(
                "indexer database URL is empty".into(),
            ));
        }
        if self.indexer_database_url.contains(['"', '\n']) {
            return Err(BootstrapError::Config(
                "indexer database URL must not contain quotes or newlines".into(),
            ));
        }
        if !self.state_dir.is_absolute() {
            return Err(BootstrapError::Config(format!(
                "state directory must be absolute: {}",
                self.state_dir.display()
            )));
        }
        if !self.workspace.join("Cargo.toml").exists() {
            return Err(BootstrapError::Config(format!(
                "no Cargo.toml in workspace {}",
                self.workspace.display()
            )));
        }
        Ok(())
    }
}

/// Default network state directory under the given home directory.
pub fn default_state_dir(home: &Path) -> PathBuf {
    home.join(DEFAULT_STATE_DIR)
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
