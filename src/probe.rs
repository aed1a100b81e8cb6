//! Network state detection.
//!
//! Existence of the state directory is what decides whether generation
//! runs. The completion marker is only advisory: a directory without one
//! is still reused, but the operator is warned that it may be a leftover
//! from an interrupted generation.

use std::fs;
use std::path::PathBuf;

use crate::config::COMPLETION_MARKER;
use crate::error::{BootstrapError, Result};

/// What the probe found at the state directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Nothing there; generation must run.
    Absent,
    /// Directory exists and was completed by a previous bootstrap.
    Complete,
    /// Directory exists but carries no completion marker.
    Unmarked,
}

impl NetworkState {
    pub fn exists(&self) -> bool {
        !matches!(self, NetworkState::Absent)
    }
}

/// Side-effect free view of the network state directory.
pub struct NetworkStateProbe {
    state_dir: PathBuf,
}

impl NetworkStateProbe {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Whether network state already exists.
    pub fn exists(&self) -> bool {
        self.state_dir.is_dir()
    }

    /// Existence plus completion marker status.
    pub fn inspect(&self) -> NetworkState {
        if !self.exists() {
            NetworkState::Absent
        } else if self.state_dir.join(COMPLETION_MARKER).is_file() {
            NetworkState::Complete
        } else {
            NetworkState::Unmarked
        }
    }

    /// Record that generation and patching finished for `chain_id`.
    pub fn mark_complete(&self, chain_id: &str) -> Result<()> {
        let marker = self.state_dir.join(COMPLETION_MARKER);
        fs::write(&marker, format!("{}\n", chain_id))
            .map_err(|e| BootstrapError::io(format!("failed to write {}", marker.display()), e))
    }
}
