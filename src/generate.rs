//! Network state generation.
//!
//! Runs `<node> testnet generate` once against an absent state directory.
//! This is the expensive, non-idempotent step: callers must consult the
//! [`probe`](crate::probe) first and never run it twice for one directory.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::error::{BootstrapError, Result};
use crate::process::{CommandSpec, ProcessRunner};

/// Chain id of the local devnet.
pub const LOCAL_CHAIN_ID: &str = "penumbra-local-devnet";

/// Genesis allocation funded for local development.
pub const LOCAL_ALLOCATION_ADDRESS: &str = "penumbra1xq2e9x7uhfzezwunvazdamlxepf4jr5htsuqnzlsahuayyqxjjwg9lk0aytwm6wfj3jy29rv2kdpen57903s8wxv3jmqwj6m6v5jgn6y2cypfd03rke652k8wmavxra7e9wkrg";

/// Genesis parameters passed to the generation tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisParams {
    pub chain_id: String,
    /// Unbonding delay, in blocks.
    pub unbonding_delay: u64,
    /// Epoch length, in blocks.
    pub epoch_duration: u64,
    /// Governance voting window, in blocks.
    pub proposal_voting_blocks: u64,
    /// Flat gas price for every resource.
    pub gas_price_simple: u64,
    /// The single pre-funded address.
    pub allocation_address: String,
    /// Minimum time between blocks.
    pub timeout_commit: Duration,
}

impl GenesisParams {
    /// Short epochs and voting windows so governance and staking flows can
    /// be exercised in minutes.
    pub fn local_devnet() -> Self {
        Self {
            chain_id: LOCAL_CHAIN_ID.to_string(),
            unbonding_delay: 50,
            epoch_duration: 50,
            proposal_voting_blocks: 50,
            gas_price_simple: 1000,
            allocation_address: LOCAL_ALLOCATION_ADDRESS.to_string(),
            timeout_commit: Duration::from_millis(500),
        }
    }

    /// Named arguments for `testnet generate`.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--chain-id".into(),
            self.chain_id.clone(),
            "--unbonding-delay".into(),
            self.unbonding_delay.to_string(),
            "--epoch-duration".into(),
            self.epoch_duration.to_string(),
            "--proposal-voting-blocks".into(),
            self.proposal_voting_blocks.to_string(),
            "--gas-price-simple".into(),
            self.gas_price_simple.to_string(),
            "--allocation-address".into(),
            self.allocation_address.clone(),
            "--timeout-commit".into(),
            format!("{}ms", self.timeout_commit.as_millis()),
        ]
    }
}

/// Generates network state into a fixed directory.
pub struct NetworkBootstrapper<'a> {
    runner: &'a dyn ProcessRunner,
    binary: &'a Path,
    state_dir: &'a Path,
}

impl<'a> NetworkBootstrapper<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, binary: &'a Path, state_dir: &'a Path) -> Self {
        Self {
            runner,
            binary,
            state_dir,
        }
    }

    /// The full generation command line.
    pub fn command(&self, params: &GenesisParams) -> CommandSpec {
        CommandSpec::new(self.binary.to_string_lossy())
            .arg("testnet")
            .arg("--testnet-dir")
            .arg_path(self.state_dir)
            .arg("generate")
            .args(params.to_args())
    }

    /// Generate a new network.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Generation`] if the tool cannot start, exits
    /// non-zero, or exits zero without creating the state directory. Partial
    /// state is left in place for the operator to inspect and remove.
    pub async fn generate(&self, params: &GenesisParams) -> Result<()> {
        let cmd = self.command(params);
        info!(
            chain_id = %params.chain_id,
            state_dir = %self.state_dir.display(),
            "generating network state"
        );

        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| {
                BootstrapError::spawn_failure(e, |e| {
                    self.error(&cmd, format!("failed to start: {}", e), String::new())
                })
            })?;

        if !output.status.success() {
            return Err(self.error(&cmd, output.status.to_string(), output.stderr));
        }

        if !self.state_dir.is_dir() {
            return Err(self.error(
                &cmd,
                format!(
                    "exited successfully but did not create {}",
                    self.state_dir.display()
                ),
                output.stderr,
            ));
        }

        Ok(())
    }

    fn error(&self, cmd: &CommandSpec, status: String, stderr: String) -> BootstrapError {
        BootstrapError::Generation {
            command: cmd.to_string(),
            status,
            stderr,
            state_dir: self.state_dir.to_path_buf(),
        }
    }
}
